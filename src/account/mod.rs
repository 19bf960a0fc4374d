//! Camera account service interface
//!
//! Authentication, camera metadata and cloud storage live behind this trait.
//! The live-view core only consumes it; every operation can fail with a
//! [`ServiceError`].

pub mod static_service;

pub use static_service::StaticAccountService;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

/// A camera as known to the account service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraRef {
    pub id: String,
    pub name: String,
    pub network_id: u64,
    pub camera_type: Option<String>,
}

/// Identifiers and credentials for one stream attempt. Read-only while the
/// attempt runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub account_id: u64,
    pub client_id: String,
    pub network_id: u64,
    pub camera_id: u64,
    pub auth_token: String,
    pub session_id: Option<String>,
}

impl SessionContext {
    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("camera {0} not found")]
    CameraNotFound(String),
    #[error("account service unavailable: {0}")]
    Unavailable(String),
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
    #[error("request failed: {0}")]
    Request(String),
}

impl ServiceError {
    /// Errors after which retrying against the service is pointless
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServiceError::NotAuthenticated | ServiceError::Unavailable(_))
    }
}

#[async_trait]
pub trait AccountService: Send + Sync {
    /// Authenticate, reusing cached credentials when present
    async fn login(&self) -> Result<(), ServiceError>;

    async fn list_cameras(&self) -> Result<Vec<CameraRef>, ServiceError>;

    /// Last image the service holds for the camera, if any
    async fn get_cached_image(&self, camera: &CameraRef) -> Result<Option<Bytes>, ServiceError>;

    /// Ask the camera to take a fresh picture
    async fn request_snapshot(&self, camera: &CameraRef) -> Result<(), ServiceError>;

    /// Refresh cached camera state from the cloud
    async fn force_refresh(&self) -> Result<(), ServiceError>;

    async fn get_liveview_reference(&self, camera: &CameraRef) -> Result<String, ServiceError>;

    async fn request_recording(&self, camera: &CameraRef) -> Result<(), ServiceError>;

    async fn get_latest_clip_reference(
        &self,
        camera: &CameraRef,
    ) -> Result<Option<String>, ServiceError>;

    async fn session_context(&self, camera: &CameraRef) -> Result<SessionContext, ServiceError>;

    async fn find_camera(&self, id: &str) -> Result<CameraRef, ServiceError> {
        self.list_cameras()
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| ServiceError::CameraNotFound(id.to_string()))
    }
}
