//! Shared state for camlink
//!
//! Holds the account service, the live-view entry point and the registry of
//! connected viewers.

use crate::account::{AccountService, CameraRef};
use crate::config::Config;
use crate::relay::{FrameStream, LiveView};
use log::info;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How a viewer receives frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerKind {
    Mjpeg,
    Websocket,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewerInfo {
    pub camera_id: String,
    pub kind: ViewerKind,
    #[serde(skip)]
    pub connected_at: Instant,
}

/// Shared state for the application
pub struct SharedState {
    /// Configuration
    pub config: Arc<Config>,

    pub account: Arc<dyn AccountService>,

    pub live_view: LiveView,

    /// Server start time
    pub start_time: Instant,

    /// Connected viewers by stream id
    viewers: Mutex<HashMap<Uuid, ViewerInfo>>,
}

impl SharedState {
    pub fn new(config: Config, live_view: LiveView) -> Self {
        Self {
            config: Arc::new(config),
            account: live_view.account().clone(),
            live_view,
            start_time: Instant::now(),
            viewers: Mutex::new(HashMap::new()),
        }
    }

    /// Get server uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.lock().len()
    }

    pub fn viewers(&self) -> Vec<ViewerInfo> {
        self.viewers.lock().values().cloned().collect()
    }

    /// Open a stream for `camera` and register its viewer until the returned
    /// guard is dropped
    pub fn open_viewer(self: &Arc<Self>, camera: CameraRef, kind: ViewerKind) -> (FrameStream, ViewerGuard) {
        let stream = self.live_view.open_stream(camera);
        let id = stream.id();
        self.viewers.lock().insert(
            id,
            ViewerInfo {
                camera_id: stream.camera().id.clone(),
                kind,
                connected_at: Instant::now(),
            },
        );
        info!(
            "Viewer {} ({:?}) connected to camera {}",
            id,
            kind,
            stream.camera().id
        );
        let guard = ViewerGuard {
            id,
            state: self.clone(),
        };
        (stream, guard)
    }

    fn remove_viewer(&self, id: &Uuid) {
        if let Some(viewer) = self.viewers.lock().remove(id) {
            info!(
                "Viewer {} left camera {} after {:.1}s",
                id,
                viewer.camera_id,
                viewer.connected_at.elapsed().as_secs_f64()
            );
        }
    }
}

/// Unregisters a viewer when dropped
pub struct ViewerGuard {
    id: Uuid,
    state: Arc<SharedState>,
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.state.remove_viewer(&self.id);
    }
}
