//! HTTP surface
//!
//! Live view over MJPEG and WebSocket, camera actions and health checks.

pub mod shared;
pub use shared::{SharedState, ViewerGuard, ViewerKind};

pub mod http_server;
pub use http_server::{router, run_http_server};
