//! External transcoder process
//!
//! The transcoder turns a video URL into a rate-limited stream of
//! concatenated JPEG images on stdout. It sits behind [`TranscoderSpawner`]
//! so tests can substitute scripted output for a real binary.

use super::RelayError;
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

/// A running transcoder owned by one relay session
#[async_trait]
pub trait TranscoderHandle: Send {
    /// Next chunk of image output, `None` once the process closed stdout
    async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, RelayError>;

    /// Terminate the process and reap it
    async fn kill(&mut self);
}

#[async_trait]
pub trait TranscoderSpawner: Send + Sync {
    async fn spawn(&self, url: &str) -> Result<Box<dyn TranscoderHandle>, RelayError>;
}

/// Transcoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub binary: String,
    /// Output images per second
    pub fps: u32,
    /// MJPEG quantizer, 2 (best) to 31
    pub quality: u8,
    pub extra_args: Vec<String>,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            fps: 10,
            quality: 5,
            extra_args: Vec::new(),
        }
    }
}

/// Spawns ffmpeg writing `image2pipe` MJPEG to stdout
#[derive(Debug, Clone)]
pub struct FfmpegSpawner {
    config: TranscoderConfig,
}

impl FfmpegSpawner {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    /// Build the command line for `url`
    pub fn to_command(&self, url: &str) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.arg("-hide_banner").arg("-loglevel").arg("warning");

        let lower = url.to_ascii_lowercase();
        if lower.starts_with("rtsp://") || lower.starts_with("rtsps://") {
            cmd.arg("-rtsp_transport").arg("tcp");
        }

        cmd.arg("-i")
            .arg(url)
            .arg("-f")
            .arg("image2pipe")
            .arg("-vcodec")
            .arg("mjpeg")
            .arg("-q:v")
            .arg(self.config.quality.clamp(2, 31).to_string())
            .arg("-r")
            .arg(self.config.fps.max(1).to_string());

        for arg in &self.config.extra_args {
            cmd.arg(arg);
        }

        cmd.arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl TranscoderSpawner for FfmpegSpawner {
    async fn spawn(&self, url: &str) -> Result<Box<dyn TranscoderHandle>, RelayError> {
        let mut child = self
            .to_command(url)
            .spawn()
            .map_err(|e| RelayError::Spawn(self.config.binary.clone(), e.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RelayError::Spawn(self.config.binary.clone(), "stdout not piped".to_string()))?;

        info!(
            "Started {} (pid {:?}) for {}",
            self.config.binary,
            child.id(),
            redact(url)
        );
        Ok(Box::new(FfmpegHandle { child, stdout }))
    }
}

pub struct FfmpegHandle {
    child: Child,
    stdout: ChildStdout,
}

#[async_trait]
impl TranscoderHandle for FfmpegHandle {
    async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, RelayError> {
        let mut buf = vec![0u8; max.max(1)];
        let n = self
            .stdout
            .read(&mut buf)
            .await
            .map_err(|e| RelayError::Io(e.to_string()))?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!("Transcoder already gone: {}", e);
        }
        match tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await {
            Ok(Ok(status)) => debug!("Transcoder exited with status: {}", status),
            Ok(Err(e)) => warn!("Error waiting for transcoder: {}", e),
            Err(_) => warn!("Transcoder did not exit within 2s"),
        }
    }
}

/// Strip query strings, which may carry session tokens, before logging
pub fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
