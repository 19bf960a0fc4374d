//! Frame extraction
//!
//! Turns relayed byte streams into discrete JPEG frames for delivery.

pub mod demuxer;
pub mod frame;
pub mod queue;

pub use demuxer::{DemuxError, FrameDemuxer};
pub use frame::{Frame, FrameSource, FrameStats};
pub use queue::FrameQueue;
