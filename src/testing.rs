//! Scripted stand-ins for the network, the transcoder and the account
//! service, shared by unit tests.

use crate::account::{AccountService, CameraRef, ServiceError, SessionContext};
use crate::relay::{RelayError, TranscoderHandle, TranscoderSpawner};
use crate::transport::{Connector, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn context() -> SessionContext {
    SessionContext {
        account_id: 1001,
        client_id: "42".to_string(),
        network_id: 2002,
        camera_id: 3003,
        auth_token: "token".to_string(),
        session_id: None,
    }
}

pub fn camera() -> CameraRef {
    CameraRef {
        id: "3003".to_string(),
        name: "Porch".to_string(),
        network_id: 2002,
        camera_type: Some("doorbell".to_string()),
    }
}

/// A minimal marker-delimited image around `payload`
pub fn jpeg(payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// How one scripted connection behaves
#[derive(Debug, Clone)]
pub enum Script {
    /// Answer the first read with these bytes, then close
    Respond(Vec<u8>),
    /// Answer successive reads with these chunks, then close
    Stream(Vec<Vec<u8>>),
    /// Never answer; reads time out
    Silent,
    /// Close right after the handshake
    Closed,
    ConnectTimeout,
    /// Use up the whole connect timeout, then report it
    SlowConnect,
    Refuse,
}

#[derive(Default)]
struct ConnectorLog {
    connects: AtomicUsize,
    closed: AtomicUsize,
    writes: Mutex<Vec<Vec<u8>>>,
}

/// Hands out one scripted transport per connect, in order
pub struct FakeConnector {
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    log: Arc<ConnectorLog>,
}

impl FakeConnector {
    /// Once `scripts` runs out every connect is refused
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            fallback: Script::Refuse,
            log: Arc::new(ConnectorLog::default()),
        }
    }

    pub fn always(script: Script) -> Self {
        Self {
            fallback: script,
            ..Self::new(vec![])
        }
    }

    pub fn connect_count(&self) -> usize {
        self.log.connects.load(Ordering::SeqCst)
    }

    /// Transports closed so far, each counted once
    pub fn closed_count(&self) -> usize {
        self.log.closed.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.log.writes.lock().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let reads = match script {
            Script::ConnectTimeout => {
                return Err(TransportError::ConnectTimeout(format!("{}:{}", host, port)))
            }
            Script::SlowConnect => {
                tokio::time::sleep(timeout).await;
                return Err(TransportError::ConnectTimeout(format!("{}:{}", host, port)));
            }
            Script::Refuse => {
                return Err(TransportError::ConnectionRefused(format!("{}:{}", host, port)))
            }
            Script::Respond(data) => vec![data],
            Script::Stream(chunks) => chunks,
            Script::Closed => vec![],
            Script::Silent => {
                return Ok(Box::new(FakeTransport {
                    reads: VecDeque::new(),
                    silent: true,
                    closed: false,
                    log: self.log.clone(),
                }))
            }
        };
        Ok(Box::new(FakeTransport {
            reads: reads.into(),
            silent: false,
            closed: false,
            log: self.log.clone(),
        }))
    }
}

struct FakeTransport {
    reads: VecDeque<Vec<u8>>,
    silent: bool,
    closed: bool,
    log: Arc<ConnectorLog>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.log.writes.lock().push(data.to_vec());
        Ok(())
    }

    async fn read(&mut self, max: usize, _timeout: Duration) -> Result<Bytes, TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        if self.silent {
            return Err(TransportError::ReadTimeout);
        }
        match self.reads.pop_front() {
            Some(mut chunk) => {
                if chunk.len() > max {
                    let rest = chunk.split_off(max);
                    self.reads.push_front(rest);
                }
                Ok(Bytes::from(chunk))
            }
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Transcoder replaying fixed output chunks, then exiting
pub struct FakeTranscoder {
    chunks: VecDeque<Vec<u8>>,
    hang: bool,
    kills: Arc<AtomicUsize>,
}

impl FakeTranscoder {
    pub fn new(chunks: Vec<Vec<u8>>) -> (Self, Arc<AtomicUsize>) {
        let kills = Arc::new(AtomicUsize::new(0));
        (Self::with_kills(chunks, kills.clone()), kills)
    }

    /// A transcoder that never writes anything
    pub fn hanging() -> (Self, Arc<AtomicUsize>) {
        let (mut transcoder, kills) = Self::new(vec![]);
        transcoder.hang = true;
        (transcoder, kills)
    }

    fn with_kills(chunks: Vec<Vec<u8>>, kills: Arc<AtomicUsize>) -> Self {
        Self {
            chunks: chunks.into(),
            hang: false,
            kills,
        }
    }
}

#[async_trait]
impl TranscoderHandle for FakeTranscoder {
    async fn read_chunk(&mut self, _max: usize) -> Result<Option<Bytes>, RelayError> {
        if self.hang {
            futures::future::pending::<()>().await;
        }
        Ok(self.chunks.pop_front().map(Bytes::from))
    }

    async fn kill(&mut self) {
        self.kills.fetch_add(1, Ordering::SeqCst);
    }
}

/// Spawns one scripted transcoder per call and records the URLs it was given
pub struct FakeSpawner {
    outputs: Mutex<VecDeque<Vec<Vec<u8>>>>,
    urls: Mutex<Vec<String>>,
    pub kills: Arc<AtomicUsize>,
}

impl FakeSpawner {
    /// Spawning fails once `outputs` runs out
    pub fn new(outputs: Vec<Vec<Vec<u8>>>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            urls: Mutex::new(Vec::new()),
            kills: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl TranscoderSpawner for FakeSpawner {
    async fn spawn(&self, url: &str) -> Result<Box<dyn TranscoderHandle>, RelayError> {
        self.urls.lock().push(url.to_string());
        let chunks = self
            .outputs
            .lock()
            .pop_front()
            .ok_or_else(|| RelayError::Spawn("fake".to_string(), "no script left".to_string()))?;
        Ok(Box::new(FakeTranscoder::with_kills(chunks, self.kills.clone())))
    }
}

enum Images {
    Scripted(VecDeque<Option<Vec<u8>>>),
    Counting(u64),
}

/// Account service serving scripted snapshots
pub struct FakeAccount {
    images: Mutex<Images>,
    liveview: Mutex<Result<String, ServiceError>>,
    pub snapshot_requests: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub recordings: AtomicUsize,
    /// Make `force_refresh` fail with a transient error
    pub fail_refresh: AtomicBool,
}

impl FakeAccount {
    /// Serve `images` in order; afterwards the service reports itself
    /// unavailable.
    pub fn with_images(images: Vec<Option<Vec<u8>>>) -> Self {
        Self::build(Images::Scripted(images.into()))
    }

    /// A different image on every fetch, forever
    pub fn counting_images() -> Self {
        Self::build(Images::Counting(0))
    }

    fn build(images: Images) -> Self {
        Self {
            images: Mutex::new(images),
            liveview: Mutex::new(Err(ServiceError::Unsupported("live view"))),
            snapshot_requests: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            recordings: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
        }
    }

    pub fn set_liveview(&self, reference: Result<String, ServiceError>) {
        *self.liveview.lock() = reference;
    }
}

#[async_trait]
impl AccountService for FakeAccount {
    async fn login(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn list_cameras(&self) -> Result<Vec<CameraRef>, ServiceError> {
        Ok(vec![camera()])
    }

    async fn get_cached_image(&self, _camera: &CameraRef) -> Result<Option<Bytes>, ServiceError> {
        match &mut *self.images.lock() {
            Images::Scripted(queue) => match queue.pop_front() {
                Some(image) => Ok(image.map(Bytes::from)),
                None => Err(ServiceError::Unavailable("script exhausted".to_string())),
            },
            Images::Counting(n) => {
                *n += 1;
                Ok(Some(Bytes::from(jpeg(&n.to_be_bytes()))))
            }
        }
    }

    async fn request_snapshot(&self, _camera: &CameraRef) -> Result<(), ServiceError> {
        self.snapshot_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn force_refresh(&self) -> Result<(), ServiceError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(ServiceError::Request("refresh failed".to_string()));
        }
        Ok(())
    }

    async fn get_liveview_reference(&self, _camera: &CameraRef) -> Result<String, ServiceError> {
        self.liveview.lock().clone()
    }

    async fn request_recording(&self, _camera: &CameraRef) -> Result<(), ServiceError> {
        self.recordings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_latest_clip_reference(
        &self,
        _camera: &CameraRef,
    ) -> Result<Option<String>, ServiceError> {
        Ok(Some("https://clips.example/latest.mp4".to_string()))
    }

    async fn session_context(&self, _camera: &CameraRef) -> Result<SessionContext, ServiceError> {
        Ok(context())
    }
}
