//! Live-view delivery
//!
//! Chooses how frames for a camera are sourced (standard relay, negotiated
//! relay or snapshot fallback) and exposes one pull interface for all of them.

pub mod hasher;
pub mod selector;
pub mod session;
pub mod snapshot;
pub mod transcoder;

pub use selector::{FrameStream, LiveView, StreamConfig, StreamError, Strategy};
pub use session::RelaySession;
pub use snapshot::{SnapshotConfig, SnapshotPoller};
pub use transcoder::{FfmpegSpawner, TranscoderConfig, TranscoderHandle, TranscoderSpawner};

use crate::capture::DemuxError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("failed to spawn transcoder {0}: {1}")]
    Spawn(String, String),
    #[error("transcoder produced no output for {0:?}")]
    Stalled(Duration),
    #[error("relay exhausted: {0}")]
    Exhausted(String),
    #[error("transcoder read failed: {0}")]
    Io(String),
    #[error("failed to expose negotiated stream: {0}")]
    Expose(String),
    #[error(transparent)]
    Demux(#[from] DemuxError),
}
