//! Delivery strategy selection
//!
//! `LiveView::open_stream` hands out a lazy [`FrameStream`]. On the first pull
//! the stream looks up the camera's live-view reference and picks a strategy:
//!
//! 1. `rtsp`/`rtsps`: run the transcoder on the reference directly.
//! 2. proprietary: negotiate a subscription, re-expose the accepted stream
//!    locally and run the transcoder on that.
//! 3. anything failing above: poll snapshots from the account service.
//!
//! Relay failures never reach the consumer; the stream quietly switches to
//! snapshots. Only a failing snapshot fallback ends the stream with an error.

use super::session::{expose_negotiated, RelaySession};
use super::snapshot::{SnapshotConfig, SnapshotPoller};
use super::transcoder::TranscoderSpawner;
use super::RelayError;
use crate::account::{AccountService, CameraRef, ServiceError};
use crate::capture::demuxer::DEFAULT_MAX_PENDING;
use crate::capture::{Frame, FrameDemuxer, FrameQueue, FrameSource, FrameStats};
use crate::transport::{
    Connector, EndpointError, EndpointReference, HandshakeCandidate, NegotiationFailed, Negotiator,
    NegotiatorConfig, Transport, TransportError,
};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::Stream;
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    StandardRelay,
    NegotiatedRelay,
    SnapshotFallback,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::StandardRelay => "standard-relay",
            Strategy::NegotiatedRelay => "negotiated-relay",
            Strategy::SnapshotFallback => "snapshot",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error(transparent)]
    MalformedReference(#[from] EndpointError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationFailed),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("snapshot fallback failed: {0}")]
    Service(#[from] ServiceError),
}

/// Tunables for one live view
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub negotiator: NegotiatorConfig,
    pub candidates: Vec<HandshakeCandidate>,
    /// Relay an accepted proprietary stream through the transcoder
    pub relay_negotiated: bool,
    /// Longest silence tolerated from the transcoder
    pub relay_read_timeout: Duration,
    /// How long the transcoder gets to connect to a re-exposed stream
    pub relay_accept_timeout: Duration,
    pub max_pending_frame: usize,
    pub queue_capacity: usize,
    pub snapshot: SnapshotConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            negotiator: NegotiatorConfig::default(),
            candidates: HandshakeCandidate::DEFAULT_ORDER.to_vec(),
            relay_negotiated: true,
            relay_read_timeout: Duration::from_secs(15),
            relay_accept_timeout: Duration::from_secs(10),
            max_pending_frame: DEFAULT_MAX_PENDING,
            queue_capacity: 8,
            snapshot: SnapshotConfig::default(),
        }
    }
}

/// Entry point for live views; cheap to clone
#[derive(Clone)]
pub struct LiveView {
    account: Arc<dyn AccountService>,
    connector: Arc<dyn Connector>,
    spawner: Arc<dyn TranscoderSpawner>,
    config: Arc<StreamConfig>,
}

impl LiveView {
    pub fn new(
        account: Arc<dyn AccountService>,
        connector: Arc<dyn Connector>,
        spawner: Arc<dyn TranscoderSpawner>,
        config: StreamConfig,
    ) -> Self {
        Self {
            account,
            connector,
            spawner,
            config: Arc::new(config),
        }
    }

    pub fn account(&self) -> &Arc<dyn AccountService> {
        &self.account
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// A fresh frame sequence for `camera`. Nothing is started until the
    /// first pull.
    pub fn open_stream(&self, camera: CameraRef) -> FrameStream {
        let id = Uuid::new_v4();
        debug!("Opened stream {} for {}", id, camera.name);
        FrameStream {
            id,
            view: self.clone(),
            camera,
            stage: Stage::Pending,
            queue: FrameQueue::new(self.config.queue_capacity),
            sequence: 0,
            stats: FrameStats::default(),
            fallback_reason: None,
        }
    }

    async fn start_relay(
        &self,
        camera: &CameraRef,
        label: &str,
    ) -> Result<(Strategy, RelaySession), StreamError> {
        let reference = self
            .account
            .get_liveview_reference(camera)
            .await
            .map_err(|e| unavailable("live-view reference", e))?;
        let endpoint = EndpointReference::parse(&reference)?;
        info!("Live view for {} via {}", camera.name, endpoint.scheme);

        if endpoint.scheme.is_standard() {
            let transcoder = self.spawner.spawn(endpoint.url()).await?;
            let session = RelaySession::new(label, transcoder, self.demuxer(), self.config.relay_read_timeout);
            return Ok((Strategy::StandardRelay, session));
        }

        let ctx = self
            .account
            .session_context(camera)
            .await
            .map_err(|e| unavailable("session context", e))?
            .with_session(endpoint.session_id.clone());

        let mut negotiator = Negotiator::new(
            self.connector.clone(),
            self.config.candidates.clone(),
            self.config.negotiator.clone(),
        );
        let mut negotiated = negotiator.negotiate(&endpoint, &ctx).await?;

        if !self.config.relay_negotiated {
            negotiated.transport.close().await;
            return Err(RelayError::Exhausted("negotiated relay disabled".to_string()).into());
        }

        let (url, pump) = expose_negotiated(
            negotiated,
            self.config.relay_accept_timeout,
            self.config.relay_read_timeout,
        )
        .await?;
        let transcoder = match self.spawner.spawn(&url).await {
            Ok(transcoder) => transcoder,
            Err(e) => {
                pump.abort();
                return Err(e.into());
            }
        };
        let session = RelaySession::new(label, transcoder, self.demuxer(), self.config.relay_read_timeout)
            .with_pump(pump);
        Ok((Strategy::NegotiatedRelay, session))
    }

    fn demuxer(&self) -> FrameDemuxer {
        FrameDemuxer::new(self.config.max_pending_frame)
    }
}

/// Account-service failures while setting up a relay count as an exhausted
/// relay.
fn unavailable(what: &str, e: ServiceError) -> StreamError {
    RelayError::Exhausted(format!("{} unavailable: {}", what, e)).into()
}

/// Relay setup in flight; kept across pulls so an interrupted pull resumes it
type Setup = BoxFuture<'static, Result<(Strategy, RelaySession), StreamError>>;

enum Stage {
    Pending,
    Starting(Setup),
    Relay {
        strategy: Strategy,
        session: RelaySession,
    },
    Snapshot(SnapshotPoller),
    Done,
}

/// Pull-based frame sequence for one consumer. Owns its transport, transcoder
/// and buffers; consumed once, front to back.
pub struct FrameStream {
    id: Uuid,
    view: LiveView,
    camera: CameraRef,
    stage: Stage,
    queue: FrameQueue,
    sequence: u64,
    stats: FrameStats,
    fallback_reason: Option<StreamError>,
}

impl FrameStream {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn camera(&self) -> &CameraRef {
        &self.camera
    }

    /// Active strategy, once the stream has started
    pub fn strategy(&self) -> Option<Strategy> {
        match &self.stage {
            Stage::Relay { strategy, .. } => Some(*strategy),
            Stage::Snapshot(_) => Some(Strategy::SnapshotFallback),
            Stage::Pending | Stage::Starting(_) | Stage::Done => None,
        }
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Why the stream is on the snapshot fallback, if it is
    pub fn fallback_reason(&self) -> Option<&StreamError> {
        self.fallback_reason.as_ref()
    }

    /// Next frame. `Ok(None)` is a clean end; an error ends the stream and
    /// every later call returns `Ok(None)`.
    ///
    /// Cancel safe: dropping the returned future loses no progress. Relay
    /// setup and the snapshot cadence carry over to the next call.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        loop {
            if let Some(frame) = self.queue.pop() {
                self.stats.record_frame(frame.len());
                return Ok(Some(frame));
            }

            match &mut self.stage {
                Stage::Pending => {
                    let view = self.view.clone();
                    let camera = self.camera.clone();
                    let label = format!("{}/{}", self.camera.name, self.id);
                    self.stage = Stage::Starting(Box::pin(async move {
                        view.start_relay(&camera, &label).await
                    }));
                }
                Stage::Starting(setup) => {
                    let started = setup.await;
                    match started {
                        Ok((strategy, session)) => {
                            info!("Stream {} using {}", self.id, strategy);
                            self.stage = Stage::Relay { strategy, session };
                        }
                        Err(e) => self.fall_back(e),
                    }
                }
                Stage::Relay { session, .. } => match session.next_frames().await {
                    Ok(frames) => {
                        for data in frames {
                            self.enqueue(data, FrameSource::Relay);
                        }
                    }
                    Err(e) => {
                        session.close().await;
                        self.fall_back(e.into());
                    }
                },
                Stage::Snapshot(poller) => match poller.next_snapshot().await {
                    Ok(Some(image)) => {
                        self.stats.duplicate_snapshots = poller.duplicates();
                        let frame = self.make_frame(image, FrameSource::Snapshot);
                        self.stats.record_frame(frame.len());
                        return Ok(Some(frame));
                    }
                    Ok(None) => {
                        self.stage = Stage::Done;
                        return Ok(None);
                    }
                    Err(e) => {
                        self.stage = Stage::Done;
                        return Err(e.into());
                    }
                },
                Stage::Done => return Ok(None),
            }
        }
    }

    /// Tear down whatever the stream owns. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Stage::Relay { session, .. } = &mut self.stage {
            session.close().await;
        }
        if !matches!(self.stage, Stage::Done) {
            debug!("Stream {} closed", self.id);
        }
        self.stage = Stage::Done;
        self.queue.clear();
    }

    /// Adapt into a `futures::Stream`, for response bodies
    pub fn into_stream(self) -> impl Stream<Item = Result<Frame, StreamError>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            match stream.next_frame().await {
                Ok(Some(frame)) => Some((Ok(frame), stream)),
                Ok(None) => None,
                Err(e) => Some((Err(e), stream)),
            }
        })
    }

    fn fall_back(&mut self, reason: StreamError) {
        warn!(
            "Live relay for {} unavailable ({}), falling back to snapshots",
            self.camera.name, reason
        );
        let poller = SnapshotPoller::new(
            self.view.account.clone(),
            self.camera.clone(),
            self.view.config.snapshot.clone(),
        );
        self.stage = Stage::Snapshot(poller);
        self.fallback_reason = Some(reason);
    }

    fn enqueue(&mut self, data: Bytes, source: FrameSource) {
        let frame = self.make_frame(data, source);
        if self.queue.push(frame) {
            self.stats.dropped_frames += 1;
        }
    }

    fn make_frame(&mut self, data: Bytes, source: FrameSource) -> Frame {
        let frame = Frame::new(data, self.sequence, source);
        self.sequence += 1;
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{camera, jpeg, FakeAccount, FakeConnector, FakeSpawner, Script};
    use std::sync::atomic::Ordering;

    fn images() -> Vec<Option<Vec<u8>>> {
        vec![
            Some(jpeg(b"a")),
            Some(jpeg(b"a")),
            Some(jpeg(b"b")),
            Some(jpeg(b"c")),
            Some(jpeg(b"c")),
            Some(jpeg(b"a")),
        ]
    }

    fn distinct() -> Vec<Vec<u8>> {
        vec![jpeg(b"a"), jpeg(b"b"), jpeg(b"c"), jpeg(b"a")]
    }

    fn view(account: Arc<FakeAccount>, connector: Arc<FakeConnector>, spawner: Arc<FakeSpawner>) -> LiveView {
        LiveView::new(account, connector, spawner, StreamConfig::default())
    }

    /// Pull until the stream ends; returns frames and the terminal error
    async fn collect(stream: &mut FrameStream) -> (Vec<Frame>, Option<StreamError>) {
        let mut frames = Vec::new();
        loop {
            match stream.next_frame().await {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => return (frames, None),
                Err(e) => return (frames, Some(e)),
            }
        }
    }

    fn payloads(frames: &[Frame]) -> Vec<Vec<u8>> {
        frames.iter().map(|f| f.data.to_vec()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_negotiation_falls_back_to_snapshots() {
        let account = Arc::new(FakeAccount::with_images(images()));
        account.set_liveview(Ok("immis://stream.example:443/x?session=s1".to_string()));
        let connector = Arc::new(FakeConnector::new(vec![
            Script::Respond(br#"{"error":1}"#.to_vec()),
            Script::Respond(br#"{"error":2}"#.to_vec()),
            Script::Respond(br#"{"error":3}"#.to_vec()),
            Script::Respond(br#"{"error":4}"#.to_vec()),
        ]));
        let spawner = Arc::new(FakeSpawner::new(vec![]));
        let mut stream = view(account, connector.clone(), spawner.clone()).open_stream(camera());

        let (frames, err) = collect(&mut stream).await;
        assert_eq!(payloads(&frames), distinct());
        assert!(frames.iter().all(|f| f.source == FrameSource::Snapshot));
        assert!(matches!(err, Some(StreamError::Service(_))));
        assert!(matches!(stream.fallback_reason(), Some(StreamError::Negotiation(_))));
        assert_eq!(connector.connect_count(), 4);
        assert!(spawner.urls().is_empty());
        assert!(stream.next_frame().await.expect("after end").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeouts_fall_back_without_raising() {
        let account = Arc::new(FakeAccount::with_images(images()));
        account.set_liveview(Ok("proto://stream.example/x".to_string()));
        let connector = Arc::new(FakeConnector::always(Script::ConnectTimeout));
        let spawner = Arc::new(FakeSpawner::new(vec![]));
        let mut stream = view(account, connector.clone(), spawner).open_stream(camera());

        let first = stream.next_frame().await.expect("no error").expect("frame");
        assert_eq!(first.data.to_vec(), jpeg(b"a"));
        assert_eq!(stream.strategy(), Some(Strategy::SnapshotFallback));
        assert_eq!(connector.connect_count(), HandshakeCandidate::DEFAULT_ORDER.len());

        let (rest, _) = collect(&mut stream).await;
        let mut all = vec![first];
        all.extend(rest);
        assert_eq!(payloads(&all), distinct());
    }

    #[tokio::test(start_paused = true)]
    async fn rtsp_reference_relays_transcoder_frames() {
        let account = Arc::new(FakeAccount::with_images(vec![]));
        account.set_liveview(Ok("rtsps://cam.example:443/live?token=t".to_string()));
        let mut output = b"junk".to_vec();
        output.extend(jpeg(b"one"));
        output.extend(jpeg(b"two"));
        output.extend(jpeg(b"three"));
        let spawner = Arc::new(FakeSpawner::new(vec![vec![output[..9].to_vec(), output[9..].to_vec()]]));
        let connector = Arc::new(FakeConnector::new(vec![]));
        let mut stream = view(account, connector.clone(), spawner.clone()).open_stream(camera());

        let mut frames = Vec::new();
        for _ in 0..3 {
            frames.push(stream.next_frame().await.expect("frame").expect("some"));
        }
        assert_eq!(stream.strategy(), Some(Strategy::StandardRelay));
        assert_eq!(payloads(&frames), vec![jpeg(b"one"), jpeg(b"two"), jpeg(b"three")]);
        assert_eq!(frames.iter().map(|f| f.sequence).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(spawner.urls(), vec!["rtsps://cam.example:443/live?token=t".to_string()]);
        assert_eq!(connector.connect_count(), 0);
        assert_eq!(stream.stats().total_frames, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exiting_transcoder_falls_back() {
        let account = Arc::new(FakeAccount::with_images(vec![Some(jpeg(b"still"))]));
        account.set_liveview(Ok("rtsp://cam.example/live".to_string()));
        let spawner = Arc::new(FakeSpawner::new(vec![vec![]]));
        let connector = Arc::new(FakeConnector::new(vec![]));
        let mut stream = view(account, connector, spawner.clone()).open_stream(camera());

        let frame = stream.next_frame().await.expect("frame").expect("some");
        assert_eq!(frame.data.to_vec(), jpeg(b"still"));
        assert!(matches!(
            stream.fallback_reason(),
            Some(StreamError::Relay(RelayError::Exhausted(_)))
        ));
        assert_eq!(spawner.kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_pulls_resume_negotiation() {
        let account = Arc::new(FakeAccount::with_images(images()));
        account.set_liveview(Ok("immis://stream.example/x".to_string()));
        let connector = Arc::new(FakeConnector::always(Script::SlowConnect));
        let spawner = Arc::new(FakeSpawner::new(vec![]));
        let mut stream = view(account, connector.clone(), spawner).open_stream(camera());

        let mut interrupted = 0;
        let frame = loop {
            match tokio::time::timeout(Duration::from_secs(1), stream.next_frame()).await {
                Ok(next) => break next.expect("no error").expect("frame"),
                Err(_) => {
                    interrupted += 1;
                    assert!(connector.connect_count() <= HandshakeCandidate::DEFAULT_ORDER.len());
                }
            }
        };
        assert!(interrupted > 4, "only {} interruptions", interrupted);
        assert_eq!(frame.data.to_vec(), jpeg(b"a"));
        assert_eq!(stream.strategy(), Some(Strategy::SnapshotFallback));
        assert_eq!(connector.connect_count(), HandshakeCandidate::DEFAULT_ORDER.len());
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_frame_kills_transcoder_and_falls_back() {
        let account = Arc::new(FakeAccount::with_images(vec![Some(jpeg(b"still"))]));
        account.set_liveview(Ok("rtsp://cam.example/live".to_string()));
        let mut runaway = vec![0xFF, 0xD8];
        runaway.extend(vec![0u8; 200]);
        let spawner = Arc::new(FakeSpawner::new(vec![vec![jpeg(b"ok"), runaway]]));
        let connector = Arc::new(FakeConnector::new(vec![]));
        let config = StreamConfig {
            max_pending_frame: 64,
            ..StreamConfig::default()
        };
        let mut stream = LiveView::new(account, connector, spawner.clone(), config).open_stream(camera());

        let relayed = stream.next_frame().await.expect("frame").expect("some");
        assert_eq!(relayed.data.to_vec(), jpeg(b"ok"));
        assert_eq!(stream.strategy(), Some(Strategy::StandardRelay));

        let still = stream.next_frame().await.expect("no error").expect("some");
        assert_eq!(still.data.to_vec(), jpeg(b"still"));
        assert_eq!(still.source, FrameSource::Snapshot);
        assert_eq!(stream.strategy(), Some(Strategy::SnapshotFallback));
        assert!(matches!(
            stream.fallback_reason(),
            Some(StreamError::Relay(RelayError::Demux(_)))
        ));
        assert_eq!(spawner.kills.load(Ordering::SeqCst), 1);

        stream.close().await;
        assert_eq!(spawner.kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_reference_falls_back() {
        let account = Arc::new(FakeAccount::with_images(vec![Some(jpeg(b"still"))]));
        account.set_liveview(Ok("http://not-a-stream".to_string()));
        let spawner = Arc::new(FakeSpawner::new(vec![]));
        let connector = Arc::new(FakeConnector::new(vec![]));
        let mut stream = view(account, connector.clone(), spawner).open_stream(camera());

        assert!(stream.next_frame().await.expect("frame").is_some());
        assert!(matches!(
            stream.fallback_reason(),
            Some(StreamError::MalformedReference(_))
        ));
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn liveview_service_error_falls_back() {
        let account = Arc::new(FakeAccount::with_images(vec![Some(jpeg(b"still"))]));
        account.set_liveview(Err(ServiceError::Request("503".to_string())));
        let spawner = Arc::new(FakeSpawner::new(vec![]));
        let connector = Arc::new(FakeConnector::new(vec![]));
        let mut stream = view(account, connector, spawner).open_stream(camera());

        assert!(stream.next_frame().await.expect("frame").is_some());
        assert_eq!(stream.strategy(), Some(Strategy::SnapshotFallback));
    }

    #[tokio::test]
    async fn accepted_subscription_is_relayed_through_loopback() {
        let account = Arc::new(FakeAccount::with_images(vec![]));
        account.set_liveview(Ok("immis://stream.example:443/x?session=s1".to_string()));
        let connector = Arc::new(FakeConnector::new(vec![
            Script::Respond(br#"{"error":"no"}"#.to_vec()),
            Script::Stream(vec![vec![0, 0, 0, 1, 0x67], vec![0x68]]),
        ]));
        let spawner = Arc::new(FakeSpawner::new(vec![vec![jpeg(b"decoded")]]));
        let mut stream = view(account, connector.clone(), spawner.clone()).open_stream(camera());

        let frame = stream.next_frame().await.expect("frame").expect("some");
        assert_eq!(frame.data.to_vec(), jpeg(b"decoded"));
        assert_eq!(stream.strategy(), Some(Strategy::NegotiatedRelay));
        assert_eq!(connector.connect_count(), 2);
        let urls = spawner.urls();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].starts_with("tcp://127.0.0.1:"));

        stream.close().await;
        stream.close().await;
        assert_eq!(spawner.kills.load(Ordering::SeqCst), 1);
        assert!(stream.next_frame().await.expect("closed").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_negotiated_relay_closes_transport_and_falls_back() {
        let account = Arc::new(FakeAccount::with_images(vec![Some(jpeg(b"still"))]));
        account.set_liveview(Ok("immis://stream.example/x".to_string()));
        let connector = Arc::new(FakeConnector::new(vec![Script::Respond(vec![0, 0, 1, 0x65])]));
        let spawner = Arc::new(FakeSpawner::new(vec![]));
        let config = StreamConfig {
            relay_negotiated: false,
            ..StreamConfig::default()
        };
        let mut stream = LiveView::new(account, connector.clone(), spawner.clone(), config).open_stream(camera());

        assert!(stream.next_frame().await.expect("frame").is_some());
        assert_eq!(stream.strategy(), Some(Strategy::SnapshotFallback));
        assert_eq!(connector.closed_count(), 1);
        assert!(spawner.urls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_twice_signals_transcoder_once() {
        let account = Arc::new(FakeAccount::with_images(vec![]));
        account.set_liveview(Ok("rtsp://cam.example/live".to_string()));
        let spawner = Arc::new(FakeSpawner::new(vec![vec![jpeg(b"x"), jpeg(b"y")]]));
        let connector = Arc::new(FakeConnector::new(vec![]));
        let mut stream = view(account, connector, spawner.clone()).open_stream(camera());

        assert!(stream.next_frame().await.expect("frame").is_some());
        stream.close().await;
        stream.close().await;
        assert_eq!(spawner.kills.load(Ordering::SeqCst), 1);
        assert_eq!(stream.strategy(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn into_stream_ends_after_terminal_error() {
        use futures::StreamExt;

        let account = Arc::new(FakeAccount::with_images(vec![Some(jpeg(b"only"))]));
        account.set_liveview(Ok("http://bad".to_string()));
        let spawner = Arc::new(FakeSpawner::new(vec![]));
        let connector = Arc::new(FakeConnector::new(vec![]));
        let items: Vec<_> = view(account, connector, spawner)
            .open_stream(camera())
            .into_stream()
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }
}
