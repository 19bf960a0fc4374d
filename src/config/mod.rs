//! Configuration management for camlink

use crate::relay::{SnapshotConfig, StreamConfig, TranscoderConfig};
use crate::transport::{HandshakeCandidate, NegotiatorConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP configuration
    pub http: HttpConfig,

    /// Live-view tuning
    #[serde(default)]
    pub stream: StreamSettings,

    /// External transcoder
    #[serde(default)]
    pub transcoder: TranscoderConfig,

    /// Account credentials
    #[serde(default)]
    pub account: AccountConfig,

    /// Cameras served by the static account service
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// HTTP bind address
    pub host: String,

    /// HTTP port
    pub port: u16,
}

/// Timeouts are in milliseconds unless the field name says otherwise
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: u64,
    pub response_read_max: usize,
    pub start_code_window: usize,

    /// Unrecognized responses longer than this are treated as video
    pub min_video_bytes: usize,

    /// Handshake formats to probe, in order
    pub candidates: Vec<String>,

    /// Relay accepted proprietary streams through the transcoder
    pub relay_negotiated: bool,
    pub relay_read_timeout_secs: u64,
    pub relay_accept_timeout_secs: u64,

    /// Largest frame the demuxer will buffer
    pub max_frame_bytes: usize,
    pub queue_capacity: usize,

    pub snapshot_interval_ms: u64,
    pub snapshot_settle_ms: u64,
    pub snapshot_backoff_ms: u64,
    pub service_timeout_secs: u64,
    pub max_session_secs: u64,
    pub max_consecutive_failures: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        let stream = StreamConfig::default();
        let negotiator = &stream.negotiator;
        let snapshot = &stream.snapshot;
        Self {
            connect_timeout_ms: negotiator.connect_timeout.as_millis() as u64,
            response_timeout_ms: negotiator.response_timeout.as_millis() as u64,
            response_read_max: negotiator.response_read_max,
            start_code_window: negotiator.start_code_window,
            min_video_bytes: negotiator.min_video_bytes,
            candidates: stream
                .candidates
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            relay_negotiated: stream.relay_negotiated,
            relay_read_timeout_secs: stream.relay_read_timeout.as_secs(),
            relay_accept_timeout_secs: stream.relay_accept_timeout.as_secs(),
            max_frame_bytes: stream.max_pending_frame,
            queue_capacity: stream.queue_capacity,
            snapshot_interval_ms: snapshot.interval.as_millis() as u64,
            snapshot_settle_ms: snapshot.settle.as_millis() as u64,
            snapshot_backoff_ms: snapshot.error_backoff.as_millis() as u64,
            service_timeout_secs: snapshot.request_timeout.as_secs(),
            max_session_secs: snapshot.max_session.as_secs(),
            max_consecutive_failures: snapshot.max_consecutive_failures,
        }
    }
}

impl StreamSettings {
    /// Candidate names that do not name a handshake format
    pub fn unknown_candidates(&self) -> Vec<&str> {
        self.candidates
            .iter()
            .map(String::as_str)
            .filter(|name| HandshakeCandidate::from_name(name).is_none())
            .collect()
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            negotiator: NegotiatorConfig {
                connect_timeout: Duration::from_millis(self.connect_timeout_ms),
                response_timeout: Duration::from_millis(self.response_timeout_ms),
                response_read_max: self.response_read_max,
                start_code_window: self.start_code_window,
                min_video_bytes: self.min_video_bytes,
            },
            candidates: self
                .candidates
                .iter()
                .filter_map(|name| HandshakeCandidate::from_name(name))
                .collect(),
            relay_negotiated: self.relay_negotiated,
            relay_read_timeout: Duration::from_secs(self.relay_read_timeout_secs),
            relay_accept_timeout: Duration::from_secs(self.relay_accept_timeout_secs),
            max_pending_frame: self.max_frame_bytes,
            queue_capacity: self.queue_capacity,
            snapshot: SnapshotConfig {
                interval: Duration::from_millis(self.snapshot_interval_ms),
                settle: Duration::from_millis(self.snapshot_settle_ms),
                error_backoff: Duration::from_millis(self.snapshot_backoff_ms),
                request_timeout: Duration::from_secs(self.service_timeout_secs),
                max_session: Duration::from_secs(self.max_session_secs),
                max_consecutive_failures: self.max_consecutive_failures,
            },
        }
    }
}

/// Either inline credentials or a cached credential file written by a
/// previous login
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    pub token: Option<String>,
    pub account_id: Option<u64>,
    pub client_id: Option<String>,

    /// JSON file holding `{token, account_id, client_id}`
    pub credentials_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: u64,
    pub name: String,
    pub network_id: u64,
    #[serde(default)]
    pub camera_type: Option<String>,

    /// Live-view reference handed out for this camera
    #[serde(default)]
    pub liveview: Option<String>,

    /// Image file served as the camera's cached snapshot
    #[serde(default)]
    pub snapshot: Option<PathBuf>,

    #[serde(default)]
    pub latest_clip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, overridden by CAMLINK_LOG and --verbose
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            stream: StreamSettings::default(),
            transcoder: TranscoderConfig::default(),
            account: AccountConfig::default(),
            cameras: Vec::new(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.http.port == 0 {
            return Err("HTTP port must be non-zero".into());
        }

        let stream = &self.stream;
        if stream.candidates.is_empty() {
            return Err("At least one handshake candidate is required".into());
        }
        let unknown = stream.unknown_candidates();
        if !unknown.is_empty() {
            return Err(format!("Unknown handshake candidates: {}", unknown.join(", ")).into());
        }
        if stream.connect_timeout_ms == 0 || stream.response_timeout_ms == 0 {
            return Err("Stream connect and response timeouts must be non-zero".into());
        }
        if stream.response_read_max == 0 {
            return Err("Stream response_read_max must be non-zero".into());
        }
        if stream.queue_capacity == 0 {
            return Err("Stream queue_capacity must be non-zero".into());
        }
        if stream.max_frame_bytes < 1024 {
            return Err("Stream max_frame_bytes must be at least 1024".into());
        }
        if stream.relay_read_timeout_secs == 0 {
            return Err("Stream relay_read_timeout_secs must be non-zero".into());
        }
        if stream.max_consecutive_failures == 0 {
            return Err("Stream max_consecutive_failures must be non-zero".into());
        }

        if self.transcoder.binary.trim().is_empty() {
            return Err("Transcoder binary must be set".into());
        }
        if self.transcoder.fps == 0 {
            return Err("Transcoder fps must be non-zero".into());
        }
        if !(2..=31).contains(&self.transcoder.quality) {
            return Err("Transcoder quality must be between 2 and 31".into());
        }

        let mut ids = HashSet::new();
        for camera in &self.cameras {
            if !ids.insert(camera.id) {
                return Err(format!("Duplicate camera id {}", camera.id).into());
            }
            if camera.name.trim().is_empty() {
                return Err(format!("Camera {} has no name", camera.id).into());
            }
        }

        Ok(())
    }
}
