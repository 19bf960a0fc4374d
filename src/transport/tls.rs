//! Secure session client
//!
//! TLS over TCP to the vendor streaming endpoint. The endpoint is served from
//! infrastructure outside the public CA set, so certificate and hostname
//! validation are disabled and no SNI is sent. Do not reuse this connector for
//! anything else.

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_native_tls::TlsStream;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection to {0} timed out")]
    ConnectTimeout(String),
    #[error("connection to {0} refused")]
    ConnectionRefused(String),
    #[error("could not resolve {0}: {1}")]
    Dns(String, String),
    #[error("TLS handshake with {0} failed: {1}")]
    Tls(String, String),
    #[error("read timed out")]
    ReadTimeout,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected => TransportError::ConnectionClosed,
            _ => TransportError::Io(e.to_string()),
        }
    }
}

/// A duplex byte transport owned by exactly one stream attempt
#[async_trait]
pub trait Transport: Send {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read up to `max` bytes. Never returns an empty buffer; end of stream is
    /// reported as `ConnectionClosed`.
    async fn read(&mut self, max: usize, timeout: Duration) -> Result<Bytes, TransportError>;

    /// Release the underlying socket. Safe to call any number of times.
    async fn close(&mut self);
}

/// Opens transports; the seam the negotiator is tested through
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// Connector for the vendor TLS endpoint
#[derive(Debug, Clone, Default)]
pub struct TlsConnector;

impl TlsConnector {
    pub fn new() -> Self {
        Self
    }

    fn tls_config(addr: &str) -> Result<tokio_native_tls::TlsConnector, TransportError> {
        native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .use_sni(false)
            .build()
            .map(tokio_native_tls::TlsConnector::from)
            .map_err(|e| TransportError::Tls(addr.to_string(), e.to_string()))
    }
}

#[async_trait]
impl Connector for TlsConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let addr = format!("{}:{}", host, port);
        let connector = Self::tls_config(&addr)?;

        let attempt = async {
            let mut addrs = tokio::net::lookup_host((host, port))
                .await
                .map_err(|e| TransportError::Dns(host.to_string(), e.to_string()))?;
            let resolved = addrs
                .next()
                .ok_or_else(|| TransportError::Dns(host.to_string(), "no addresses".to_string()))?;
            debug!("Resolved {} -> {}", host, resolved);

            let tcp = TcpStream::connect(resolved).await.map_err(|e| {
                if e.kind() == io::ErrorKind::ConnectionRefused {
                    TransportError::ConnectionRefused(addr.clone())
                } else {
                    TransportError::Io(e.to_string())
                }
            })?;
            if let Err(e) = tcp.set_nodelay(true) {
                debug!("Could not disable Nagle on {}: {}", addr, e);
            }

            connector
                .connect(host, tcp)
                .await
                .map_err(|e| TransportError::Tls(addr.clone(), e.to_string()))
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(stream)) => {
                debug!("TLS session established with {}", addr);
                Ok(Box::new(TlsTransport {
                    stream: Some(stream),
                }))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::ConnectTimeout(addr)),
        }
    }
}

/// TLS transport; the socket is released on `close` or drop
pub struct TlsTransport {
    stream: Option<TlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for TlsTransport {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::ConnectionClosed)?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read(&mut self, max: usize, timeout: Duration) -> Result<Bytes, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::ConnectionClosed)?;
        let mut buf = vec![0u8; max.max(1)];
        match tokio::time::timeout(timeout, stream.read(&mut buf)).await {
            Ok(Ok(0)) => Err(TransportError::ConnectionClosed),
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(Bytes::from(buf))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(TransportError::ReadTimeout),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                warn!("TLS shutdown failed: {}", e);
            }
        }
    }
}
