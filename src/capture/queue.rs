//! Bounded per-consumer frame queue
//!
//! Holds demuxed frames until the consumer pulls them. When the consumer falls
//! behind, the oldest frame is dropped so the view stays live; delivery order
//! is otherwise preserved.

use super::frame::Frame;
use std::collections::VecDeque;

pub struct FrameQueue {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Enqueue a frame; returns true if an older frame was dropped to make room
    pub fn push(&mut self, frame: Frame) -> bool {
        let dropped = if self.frames.len() >= self.capacity {
            self.frames.pop_front();
            true
        } else {
            false
        };
        self.frames.push_back(frame);
        dropped
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
