//! Account service backed by the configuration file
//!
//! Serves a fixed camera list with configured live-view references and
//! snapshot files. Credentials come from the config or from a cached
//! credential file left by an earlier login.

use super::{AccountService, CameraRef, ServiceError, SessionContext};
use crate::config::{AccountConfig, CameraConfig};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use std::io;
use std::path::Path;

/// Contents of the cached credential file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    pub account_id: u64,
    #[serde(deserialize_with = "string_or_number")]
    pub client_id: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

pub struct StaticAccountService {
    account: AccountConfig,
    cameras: Vec<CameraConfig>,
    credentials: RwLock<Option<Credentials>>,
}

impl StaticAccountService {
    pub fn new(account: AccountConfig, cameras: Vec<CameraConfig>) -> Self {
        Self {
            account,
            cameras,
            credentials: RwLock::new(None),
        }
    }

    fn inline_credentials(&self) -> Option<Credentials> {
        let token = self.account.token.clone()?;
        let account_id = self.account.account_id?;
        Some(Credentials {
            token,
            account_id,
            client_id: self.account.client_id.clone().unwrap_or_default(),
        })
    }

    async fn credentials(&self) -> Result<Credentials, ServiceError> {
        if let Some(creds) = self.credentials.read().clone() {
            return Ok(creds);
        }
        self.login().await?;
        self.credentials.read().clone().ok_or(ServiceError::NotAuthenticated)
    }

    fn camera_config(&self, camera: &CameraRef) -> Result<&CameraConfig, ServiceError> {
        self.cameras
            .iter()
            .find(|c| c.id.to_string() == camera.id)
            .ok_or_else(|| ServiceError::CameraNotFound(camera.id.clone()))
    }
}

async fn read_credentials(path: &Path) -> Result<Credentials, ServiceError> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ServiceError::NotAuthenticated),
        Err(e) => return Err(ServiceError::Request(format!("{}: {}", path.display(), e))),
    };
    serde_json::from_slice(&data)
        .map_err(|e| ServiceError::Request(format!("invalid credential file {}: {}", path.display(), e)))
}

async fn write_credentials(path: &Path, creds: &Credentials) -> Result<(), String> {
    let data = serde_json::to_vec_pretty(creds).map_err(|e| e.to_string())?;
    tokio::fs::write(path, data).await.map_err(|e| e.to_string())
}

fn to_camera_ref(config: &CameraConfig) -> CameraRef {
    CameraRef {
        id: config.id.to_string(),
        name: config.name.clone(),
        network_id: config.network_id,
        camera_type: config.camera_type.clone(),
    }
}

#[async_trait]
impl AccountService for StaticAccountService {
    async fn login(&self) -> Result<(), ServiceError> {
        if self.credentials.read().is_some() {
            return Ok(());
        }

        let creds = if let Some(creds) = self.inline_credentials() {
            if let Some(path) = &self.account.credentials_file {
                match write_credentials(path, &creds).await {
                    Ok(()) => debug!("Cached credentials in {}", path.display()),
                    Err(e) => warn!("Failed to cache credentials in {}: {}", path.display(), e),
                }
            }
            creds
        } else if let Some(path) = &self.account.credentials_file {
            let creds = read_credentials(path).await?;
            info!("Reusing cached credentials from {}", path.display());
            creds
        } else {
            return Err(ServiceError::NotAuthenticated);
        };

        info!("Logged in as account {}", creds.account_id);
        *self.credentials.write() = Some(creds);
        Ok(())
    }

    async fn list_cameras(&self) -> Result<Vec<CameraRef>, ServiceError> {
        Ok(self.cameras.iter().map(to_camera_ref).collect())
    }

    async fn get_cached_image(&self, camera: &CameraRef) -> Result<Option<Bytes>, ServiceError> {
        let Some(path) = &self.camera_config(camera)?.snapshot else {
            return Ok(None);
        };
        match tokio::fs::read(path).await {
            Ok(data) if data.is_empty() => Ok(None),
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ServiceError::Request(format!("{}: {}", path.display(), e))),
        }
    }

    async fn request_snapshot(&self, camera: &CameraRef) -> Result<(), ServiceError> {
        self.camera_config(camera)?;
        Err(ServiceError::Unsupported("snapshot requests"))
    }

    async fn force_refresh(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn get_liveview_reference(&self, camera: &CameraRef) -> Result<String, ServiceError> {
        self.camera_config(camera)?
            .liveview
            .clone()
            .ok_or_else(|| ServiceError::Request(format!("camera {} has no live view", camera.id)))
    }

    async fn request_recording(&self, camera: &CameraRef) -> Result<(), ServiceError> {
        self.camera_config(camera)?;
        Err(ServiceError::Unsupported("recording"))
    }

    async fn get_latest_clip_reference(
        &self,
        camera: &CameraRef,
    ) -> Result<Option<String>, ServiceError> {
        Ok(self.camera_config(camera)?.latest_clip.clone())
    }

    async fn session_context(&self, camera: &CameraRef) -> Result<SessionContext, ServiceError> {
        let config = self.camera_config(camera)?;
        let creds = self.credentials().await?;
        Ok(SessionContext {
            account_id: creds.account_id,
            client_id: creds.client_id,
            network_id: config.network_id,
            camera_id: config.id,
            auth_token: creds.token,
            session_id: None,
        })
    }
}
