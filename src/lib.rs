//! camlink - live view for cloud cameras
//!
//! Negotiates the vendor's streaming endpoint, relays video through an
//! external transcoder into discrete JPEG frames, and falls back to polling
//! snapshots when no video can be had.

pub mod account;
pub mod capture;
pub mod config;
pub mod relay;
pub mod transport;
pub mod web;

#[cfg(test)]
mod testing;

// Re-exports
pub use account::{AccountService, CameraRef, ServiceError, SessionContext, StaticAccountService};
pub use capture::{Frame, FrameDemuxer, FrameSource};
pub use config::Config;
pub use relay::{FrameStream, LiveView, StreamConfig, StreamError, Strategy};
pub use transport::{EndpointReference, Negotiator, TlsConnector};
