//! Streaming endpoint references
//!
//! Parses the opaque live-view reference handed out by the account service
//! (`immis://host:port/path?session=id`, `rtsps://...`) into connection
//! parameters.

use std::fmt;
use thiserror::Error;

/// Default port of the proprietary streaming endpoint
pub const DEFAULT_PROPRIETARY_PORT: u16 = 443;

/// Endpoint reference scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Vendor streaming protocol (`immis://`, also accepted as `proto://`)
    Immis,
    /// Plain RTSP
    Rtsp,
    /// RTSP over TLS
    Rtsps,
}

impl Scheme {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "immis" | "proto" => Some(Scheme::Immis),
            "rtsp" => Some(Scheme::Rtsp),
            "rtsps" => Some(Scheme::Rtsps),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Immis => "immis",
            Scheme::Rtsp => "rtsp",
            Scheme::Rtsps => "rtsps",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Immis => DEFAULT_PROPRIETARY_PORT,
            Scheme::Rtsp => 554,
            Scheme::Rtsps => 322,
        }
    }

    /// True for schemes a transcoder can consume directly
    pub fn is_standard(&self) -> bool {
        matches!(self, Scheme::Rtsp | Scheme::Rtsps)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("malformed endpoint reference {0:?}: no recognized scheme")]
    UnknownScheme(String),
    #[error("malformed endpoint reference {0:?}: empty host")]
    EmptyHost(String),
    #[error("malformed endpoint reference {0:?}: invalid port {1:?}")]
    InvalidPort(String, String),
}

/// Parsed streaming endpoint, immutable for one streaming attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointReference {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Everything after the host segment, leading `/` included
    pub path: String,
    pub session_id: Option<String>,
    raw: String,
}

impl EndpointReference {
    /// Parse a `<scheme>://<host>[:<port>][/<path>][?session=<id>]` reference
    pub fn parse(raw: &str) -> Result<Self, EndpointError> {
        let raw = raw.trim();
        let (prefix, rest) = raw
            .split_once("://")
            .ok_or_else(|| EndpointError::UnknownScheme(raw.to_string()))?;
        let scheme =
            Scheme::from_prefix(prefix).ok_or_else(|| EndpointError::UnknownScheme(raw.to_string()))?;

        let (host_port, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], rest[idx..].to_string()),
            None => match rest.find('?') {
                Some(idx) => (&rest[..idx], format!("/{}", &rest[idx..])),
                None => (rest, "/".to_string()),
            },
        };

        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| EndpointError::InvalidPort(raw.to_string(), port.to_string()))?;
                (host, port)
            }
            None => (host_port, scheme.default_port()),
        };

        if host.is_empty() {
            return Err(EndpointError::EmptyHost(raw.to_string()));
        }

        let session_id = session_from_path(&path);

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path,
            session_id,
            raw: raw.to_string(),
        })
    }

    /// The reference exactly as received
    pub fn url(&self) -> &str {
        &self.raw
    }

    pub fn is_proprietary(&self) -> bool {
        self.scheme == Scheme::Immis
    }
}

impl fmt::Display for EndpointReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}

/// `session=` query value, or the raw path when the query carries none
fn session_from_path(path: &str) -> Option<String> {
    let (bare, query) = match path.split_once('?') {
        Some((bare, query)) => (bare, Some(query)),
        None => (path, None),
    };

    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("session=") {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    if bare.is_empty() || bare == "/" {
        None
    } else {
        Some(bare.to_string())
    }
}
