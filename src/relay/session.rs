//! Relay session
//!
//! Owns the transcoder process (and, for negotiated streams, the task pumping
//! the vendor transport into it) and turns its output into frames. Teardown
//! is idempotent: the process receives at most one termination.

use super::transcoder::TranscoderHandle;
use super::RelayError;
use crate::capture::FrameDemuxer;
use crate::transport::{Negotiated, Transport};
use bytes::Bytes;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Read size for transcoder output and relayed transport data
pub const RELAY_CHUNK: usize = 64 * 1024;

pub struct RelaySession {
    label: String,
    transcoder: Option<Box<dyn TranscoderHandle>>,
    pump: Option<JoinHandle<()>>,
    demuxer: FrameDemuxer,
    read_timeout: Duration,
    closed: bool,
}

impl RelaySession {
    pub fn new(
        label: impl Into<String>,
        transcoder: Box<dyn TranscoderHandle>,
        demuxer: FrameDemuxer,
        read_timeout: Duration,
    ) -> Self {
        Self {
            label: label.into(),
            transcoder: Some(transcoder),
            pump: None,
            demuxer,
            read_timeout,
            closed: false,
        }
    }

    /// Attach the task feeding the transcoder; it is aborted on teardown
    pub fn with_pump(mut self, pump: JoinHandle<()>) -> Self {
        self.pump = Some(pump);
        self
    }

    /// Read transcoder output until at least one complete frame is available
    pub async fn next_frames(&mut self) -> Result<Vec<Bytes>, RelayError> {
        loop {
            let transcoder = self
                .transcoder
                .as_mut()
                .ok_or_else(|| RelayError::Exhausted("relay closed".to_string()))?;

            let chunk = match tokio::time::timeout(self.read_timeout, transcoder.read_chunk(RELAY_CHUNK)).await
            {
                Err(_) => return Err(RelayError::Stalled(self.read_timeout)),
                Ok(Err(e)) => return Err(e),
                Ok(Ok(None)) => return Err(RelayError::Exhausted("transcoder exited".to_string())),
                Ok(Ok(Some(chunk))) => chunk,
            };

            let frames = self.demuxer.push(&chunk)?;
            if !frames.is_empty() {
                return Ok(frames);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop the pump and kill the transcoder. Later calls do nothing.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!("Closing relay {}", self.label);

        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(mut transcoder) = self.transcoder.take() {
            transcoder.kill().await;
        }
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        // Dropping the handle kills the child (kill_on_drop); the pump has to
        // be stopped explicitly.
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Re-expose an accepted vendor stream on a loopback TCP port so a transcoder
/// can consume it. Returns the URL to hand to the transcoder and the pump task,
/// which owns the vendor transport from here on.
pub async fn expose_negotiated(
    negotiated: Negotiated,
    accept_timeout: Duration,
    read_timeout: Duration,
) -> Result<(String, JoinHandle<()>), RelayError> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| RelayError::Expose(e.to_string()))?;
    let addr = listener
        .local_addr()
        .map_err(|e| RelayError::Expose(e.to_string()))?;

    info!(
        "Re-exposing '{}' stream on tcp://{}",
        negotiated.candidate, addr
    );
    let pump = tokio::spawn(pump_transport(
        listener,
        negotiated.transport,
        negotiated.initial,
        accept_timeout,
        read_timeout,
    ));
    Ok((format!("tcp://{}", addr), pump))
}

async fn pump_transport(
    listener: TcpListener,
    mut transport: Box<dyn Transport>,
    initial: Bytes,
    accept_timeout: Duration,
    read_timeout: Duration,
) {
    let mut client = match tokio::time::timeout(accept_timeout, listener.accept()).await {
        Ok(Ok((client, peer))) => {
            debug!("Transcoder connected from {}", peer);
            client
        }
        Ok(Err(e)) => {
            warn!("Accept on relay listener failed: {}", e);
            transport.close().await;
            return;
        }
        Err(_) => {
            warn!("Transcoder did not connect within {:?}", accept_timeout);
            transport.close().await;
            return;
        }
    };
    drop(listener);

    let mut relayed = initial.len() as u64;
    if write_to(&mut client, &initial).await {
        loop {
            match transport.read(RELAY_CHUNK, read_timeout).await {
                Ok(data) => {
                    relayed += data.len() as u64;
                    if !write_to(&mut client, &data).await {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Vendor stream ended: {}", e);
                    break;
                }
            }
        }
    }

    info!("Relay pump finished after {} bytes", relayed);
    transport.close().await;
    if let Err(e) = client.shutdown().await {
        debug!("Shutting down transcoder side failed: {}", e);
    }
}

async fn write_to(client: &mut TcpStream, data: &[u8]) -> bool {
    match client.write_all(data).await {
        Ok(()) => true,
        Err(e) => {
            debug!("Transcoder side closed: {}", e);
            false
        }
    }
}
