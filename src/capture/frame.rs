//! Live-view frame data structure
//!
//! Represents one complete encoded image with delivery metadata.

use bytes::Bytes;
use std::fmt;
use std::time::Instant;

/// Where a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    /// Transcoder output demuxed from a relayed stream
    Relay,
    /// A still fetched from the account service
    Snapshot,
}

/// One complete JPEG image, markers included. The payload is passed through
/// untouched.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Encoded image bytes
    pub data: Bytes,

    /// Receive timestamp
    pub timestamp: Instant,

    /// Sequence number within its stream
    pub sequence: u64,

    pub source: FrameSource,
}

impl Frame {
    pub fn new(data: Bytes, sequence: u64, source: FrameSource) -> Self {
        Self {
            data,
            timestamp: Instant::now(),
            sequence,
            source,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame({} bytes, seq={}, {:?})",
            self.data.len(),
            self.sequence,
            self.source
        )
    }
}

/// Frame statistics for diagnostics
#[derive(Debug, Default, Clone)]
pub struct FrameStats {
    /// Total frames delivered
    pub total_frames: u64,

    /// Total bytes delivered
    pub total_bytes: u64,

    /// Frames dropped because the consumer fell behind
    pub dropped_frames: u64,

    /// Snapshots suppressed as duplicates
    pub duplicate_snapshots: u64,
}

impl FrameStats {
    /// Record a delivered frame
    pub fn record_frame(&mut self, bytes: usize) {
        self.total_frames += 1;
        self.total_bytes += bytes as u64;
    }
}
