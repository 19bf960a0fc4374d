//! Transport layer for the vendor streaming endpoint
//!
//! Endpoint parsing, the TLS session client, subscription payloads and the
//! negotiation state machine.

pub mod endpoint;
pub mod handshake;
pub mod negotiator;
pub mod tls;

pub use endpoint::{EndpointError, EndpointReference, Scheme};
pub use handshake::HandshakeCandidate;
pub use negotiator::{
    NegotiationFailed, NegotiationOutcome, NegotiationReport, Negotiated, Negotiator,
    NegotiatorConfig,
};
pub use tls::{Connector, TlsConnector, Transport, TransportError};
