//! Stream negotiator
//!
//! Connect, send one subscription record, read one response, classify it.
//! A rejected connection is never reused: every candidate gets its own
//! transport, so one `negotiate` call opens at most `candidates.len()`
//! connections.

use super::endpoint::EndpointReference;
use super::handshake::HandshakeCandidate;
use super::tls::{Connector, Transport, TransportError};
use crate::account::SessionContext;
use bytes::Bytes;
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Start codes of Annex-B elementary video streams
const START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

#[derive(Debug, Clone)]
pub struct NegotiatorConfig {
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    /// Upper bound for the single response read
    pub response_read_max: usize,
    /// How many leading bytes are searched for a start code
    pub start_code_window: usize,
    /// Unrecognized responses longer than this are taken as video
    pub min_video_bytes: usize,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(5),
            response_read_max: 64 * 1024,
            start_code_window: 20,
            min_video_bytes: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    Connecting,
    HandshakeSent,
    AwaitingResponse,
    Classified,
    Failed,
}

/// Why the endpoint did not start streaming
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// A parseable structured record, usually an error document
    Structured(serde_json::Value),
    /// Short unrecognized bytes, kept for diagnostics
    Unrecognized(Bytes),
    /// The candidate could not be serialized for this context
    Unencodable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationOutcome {
    Success(Bytes),
    ProtocolError(Rejection),
    Empty,
    Timeout,
    TransportError(TransportError),
}

impl NegotiationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, NegotiationOutcome::Success(_))
    }
}

impl fmt::Display for NegotiationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationOutcome::Success(data) => {
                write!(f, "video data ({} bytes, {})", data.len(), hex_preview(data, 30))
            }
            NegotiationOutcome::ProtocolError(Rejection::Structured(value)) => {
                write!(f, "rejected: {}", value)
            }
            NegotiationOutcome::ProtocolError(Rejection::Unrecognized(data)) => {
                write!(f, "unrecognized response ({} bytes, {})", data.len(), hex_preview(data, 30))
            }
            NegotiationOutcome::ProtocolError(Rejection::Unencodable(msg)) => {
                write!(f, "payload not encodable: {}", msg)
            }
            NegotiationOutcome::Empty => write!(f, "0 bytes received"),
            NegotiationOutcome::Timeout => write!(f, "timeout (no response)"),
            NegotiationOutcome::TransportError(e) => write!(f, "transport error: {}", e),
        }
    }
}

/// Lowercase hex of the first `limit` bytes
pub fn hex_preview(data: &[u8], limit: usize) -> String {
    data.iter().take(limit).map(|b| format!("{:02x}", b)).collect()
}

/// Classify the first response bytes of a subscription
pub fn classify(data: &[u8], config: &NegotiatorConfig) -> NegotiationOutcome {
    if data.is_empty() {
        return NegotiationOutcome::Empty;
    }

    let window = &data[..data.len().min(config.start_code_window)];
    if window.windows(START_CODE.len()).any(|w| w == START_CODE) {
        return NegotiationOutcome::Success(Bytes::copy_from_slice(data));
    }

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        if value.is_object() {
            return NegotiationOutcome::ProtocolError(Rejection::Structured(value));
        }
    }

    // Unverified against the real endpoint: a long unrecognized payload is
    // assumed to be video.
    if data.len() > config.min_video_bytes {
        NegotiationOutcome::Success(Bytes::copy_from_slice(data))
    } else {
        NegotiationOutcome::ProtocolError(Rejection::Unrecognized(Bytes::copy_from_slice(data)))
    }
}

#[derive(Debug, Clone)]
pub struct Attempt {
    pub candidate: HandshakeCandidate,
    pub payload_len: usize,
    pub outcome: NegotiationOutcome,
}

/// Per-candidate outcomes of one `negotiate` call, in probe order
#[derive(Debug, Clone, Default)]
pub struct NegotiationReport {
    pub attempts: Vec<Attempt>,
}

impl NegotiationReport {
    pub fn connection_attempts(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| !matches!(a.outcome, NegotiationOutcome::ProtocolError(Rejection::Unencodable(_))))
            .count()
    }

    pub fn outcome(&self, candidate: HandshakeCandidate) -> Option<&NegotiationOutcome> {
        self.attempts
            .iter()
            .find(|a| a.candidate == candidate)
            .map(|a| &a.outcome)
    }
}

impl fmt::Display for NegotiationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return write!(f, "no candidates tried");
        }
        for (i, attempt) in self.attempts.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{} -> {}", attempt.candidate, attempt.outcome)?;
        }
        Ok(())
    }
}

/// A subscription the endpoint accepted. Owns the live transport.
pub struct Negotiated {
    pub candidate: HandshakeCandidate,
    pub transport: Box<dyn Transport>,
    pub initial: Bytes,
    pub report: NegotiationReport,
}

impl fmt::Debug for Negotiated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiated")
            .field("candidate", &self.candidate)
            .field("initial_len", &self.initial.len())
            .field("report", &self.report)
            .finish()
    }
}

#[derive(Debug, Clone, Error)]
#[error("negotiation failed: {report}")]
pub struct NegotiationFailed {
    pub report: NegotiationReport,
}

pub struct Negotiator {
    connector: Arc<dyn Connector>,
    candidates: Vec<HandshakeCandidate>,
    config: NegotiatorConfig,
    state: NegotiationState,
}

impl Negotiator {
    pub fn new(
        connector: Arc<dyn Connector>,
        candidates: Vec<HandshakeCandidate>,
        config: NegotiatorConfig,
    ) -> Self {
        Self {
            connector,
            candidates,
            config,
            state: NegotiationState::Idle,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    fn transition(&mut self, next: NegotiationState) {
        debug!("Negotiation {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Probe every candidate in order until one yields video
    pub async fn negotiate(
        &mut self,
        endpoint: &EndpointReference,
        ctx: &SessionContext,
    ) -> Result<Negotiated, NegotiationFailed> {
        let mut report = NegotiationReport::default();
        let candidates = self.candidates.clone();

        for candidate in candidates {
            self.transition(NegotiationState::Connecting);
            let (payload_len, result) = self.attempt(candidate, endpoint, ctx).await;

            match result {
                Ok((transport, initial)) => {
                    info!(
                        "Subscription accepted by {} with '{}' format ({} bytes)",
                        endpoint, candidate, initial.len()
                    );
                    report.attempts.push(Attempt {
                        candidate,
                        payload_len,
                        outcome: NegotiationOutcome::Success(initial.clone()),
                    });
                    self.transition(NegotiationState::Classified);
                    return Ok(Negotiated {
                        candidate,
                        transport,
                        initial,
                        report,
                    });
                }
                Err(outcome) => {
                    warn!("'{}' format rejected by {}: {}", candidate, endpoint, outcome);
                    report.attempts.push(Attempt {
                        candidate,
                        payload_len,
                        outcome,
                    });
                }
            }
        }

        self.transition(NegotiationState::Failed);
        Err(NegotiationFailed { report })
    }

    /// One connect/write/read round. The transport is closed unless the
    /// response classifies as video.
    async fn attempt(
        &mut self,
        candidate: HandshakeCandidate,
        endpoint: &EndpointReference,
        ctx: &SessionContext,
    ) -> (usize, Result<(Box<dyn Transport>, Bytes), NegotiationOutcome>) {
        let payload = match candidate.build(ctx) {
            Ok(payload) => payload,
            Err(e) => {
                return (
                    0,
                    Err(NegotiationOutcome::ProtocolError(Rejection::Unencodable(e.to_string()))),
                )
            }
        };
        let payload_len = payload.len();

        let mut transport = match self
            .connector
            .connect(&endpoint.host, endpoint.port, self.config.connect_timeout)
            .await
        {
            Ok(transport) => transport,
            Err(e) => return (payload_len, Err(NegotiationOutcome::TransportError(e))),
        };

        debug!("Sending '{}' subscription ({} bytes)", candidate, payload_len);
        if let Err(e) = transport.write(&payload).await {
            transport.close().await;
            return (payload_len, Err(NegotiationOutcome::TransportError(e)));
        }
        self.transition(NegotiationState::HandshakeSent);

        self.transition(NegotiationState::AwaitingResponse);
        let outcome = match transport
            .read(self.config.response_read_max, self.config.response_timeout)
            .await
        {
            Ok(data) => classify(&data, &self.config),
            Err(TransportError::ReadTimeout) => NegotiationOutcome::Timeout,
            Err(TransportError::ConnectionClosed) => NegotiationOutcome::Empty,
            Err(e) => NegotiationOutcome::TransportError(e),
        };

        match outcome {
            NegotiationOutcome::Success(initial) => (payload_len, Ok((transport, initial))),
            other => {
                transport.close().await;
                (payload_len, Err(other))
            }
        }
    }
}
