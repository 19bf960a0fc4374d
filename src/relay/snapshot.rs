//! Snapshot fallback
//!
//! When no video relay is possible, ask the account service for fresh stills
//! on a fixed cadence and hand out each new one as a frame. Consecutive
//! byte-identical images are suppressed. The session ends cleanly after
//! `max_session`.

use super::hasher::ChangeDetector;
use crate::account::{AccountService, CameraRef, ServiceError};
use bytes::Bytes;
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Wait between polls
    pub interval: Duration,
    /// Wait between requesting a snapshot and refreshing the cache
    pub settle: Duration,
    /// Wait after a failed poll
    pub error_backoff: Duration,
    /// Upper bound for any single account-service call
    pub request_timeout: Duration,
    pub max_session: Duration,
    /// Consecutive failed polls before giving up
    pub max_consecutive_failures: u32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            settle: Duration::from_millis(500),
            error_backoff: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
            max_session: Duration::from_secs(600),
            max_consecutive_failures: 5,
        }
    }
}

pub struct SnapshotPoller {
    account: Arc<dyn AccountService>,
    camera: CameraRef,
    config: SnapshotConfig,
    detector: ChangeDetector,
    deadline: Instant,
    /// Earliest start of the next poll; survives a cancelled pull
    next_poll_at: Option<Instant>,
    failures: u32,
    duplicates: u64,
}

impl SnapshotPoller {
    pub fn new(account: Arc<dyn AccountService>, camera: CameraRef, config: SnapshotConfig) -> Self {
        let deadline = Instant::now() + config.max_session;
        Self {
            account,
            camera,
            config,
            detector: ChangeDetector::default(),
            deadline,
            next_poll_at: None,
            failures: 0,
            duplicates: 0,
        }
    }

    /// Snapshots suppressed as duplicates so far
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Next distinct snapshot, `None` once the session time is used up, or
    /// the error that made the service unusable.
    pub async fn next_snapshot(&mut self) -> Result<Option<Bytes>, ServiceError> {
        loop {
            if let Some(at) = self.next_poll_at {
                tokio::time::sleep_until(at.min(self.deadline)).await;
            }
            if Instant::now() >= self.deadline {
                info!(
                    "Snapshot session for {} reached {:?}, ending",
                    self.camera.name, self.config.max_session
                );
                return Ok(None);
            }

            match self.poll_once().await {
                Ok(image) => {
                    self.failures = 0;
                    self.next_poll_at = Some(Instant::now() + self.config.interval);
                    match image {
                        Some(image) if self.detector.observe(&image) => return Ok(Some(image)),
                        Some(_) => {
                            self.duplicates += 1;
                            debug!("Snapshot for {} unchanged", self.camera.name);
                        }
                        None => debug!("No cached image for {} yet", self.camera.name),
                    }
                }
                Err(e) if e.is_fatal() => {
                    warn!("Snapshot fallback for {} failed: {}", self.camera.name, e);
                    return Err(e);
                }
                Err(e) => {
                    self.failures += 1;
                    warn!(
                        "Snapshot error for {} ({}/{}): {}",
                        self.camera.name, self.failures, self.config.max_consecutive_failures, e
                    );
                    if self.failures >= self.config.max_consecutive_failures {
                        return Err(e);
                    }
                    self.next_poll_at = Some(Instant::now() + self.config.error_backoff);
                }
            }
        }
    }

    async fn poll_once(&self) -> Result<Option<Bytes>, ServiceError> {
        match self.bounded(self.account.request_snapshot(&self.camera)).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            // Not every camera can be asked for a still; the cached image
            // may still change.
            Err(e) => debug!("Snapshot request for {} failed: {}", self.camera.name, e),
        }

        tokio::time::sleep(self.config.settle).await;
        self.bounded(self.account.force_refresh()).await?;
        self.bounded(self.account.get_cached_image(&self.camera)).await
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        tokio::time::timeout(self.config.request_timeout, call)
            .await
            .map_err(|_| {
                ServiceError::Request(format!("timed out after {:?}", self.config.request_timeout))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{camera, FakeAccount};
    use std::sync::atomic::Ordering;

    fn poller(account: Arc<FakeAccount>, config: SnapshotConfig) -> SnapshotPoller {
        SnapshotPoller::new(account, camera(), config)
    }

    #[tokio::test(start_paused = true)]
    async fn yields_only_changed_images() {
        let account = Arc::new(FakeAccount::with_images(vec![
            Some(b"A".to_vec()),
            Some(b"A".to_vec()),
            Some(b"B".to_vec()),
            None,
            Some(b"B".to_vec()),
            Some(b"C".to_vec()),
        ]));
        let mut poller = poller(account.clone(), SnapshotConfig::default());

        let mut seen = Vec::new();
        let err = loop {
            match poller.next_snapshot().await {
                Ok(Some(image)) => seen.push(image.to_vec()),
                Ok(None) => panic!("session ended early"),
                Err(e) => break e,
            }
        };
        assert_eq!(seen, vec![b"A".to_vec(), b"B".to_vec(), b"C".to_vec()]);
        assert!(err.is_fatal());
        assert_eq!(poller.duplicates(), 2);
        assert_eq!(account.snapshot_requests.load(Ordering::SeqCst), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn session_ends_cleanly_at_deadline() {
        let account = Arc::new(FakeAccount::counting_images());
        let config = SnapshotConfig {
            max_session: Duration::from_secs(10),
            ..SnapshotConfig::default()
        };
        let mut poller = poller(account, config);

        let start = Instant::now();
        let mut frames = 0;
        while let Some(_) = poller.next_snapshot().await.expect("snapshot") {
            frames += 1;
        }
        // one poll every settle + interval
        assert!((6..=8).contains(&frames), "got {} frames", frames);
        assert!(Instant::now() - start <= Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_pull_keeps_cadence() {
        let account = Arc::new(FakeAccount::counting_images());
        let config = SnapshotConfig::default();
        let gap = config.interval + config.settle;
        let mut poller = poller(account.clone(), config);

        poller.next_snapshot().await.expect("first").expect("image");
        let first = Instant::now();
        let cancelled =
            tokio::time::timeout(Duration::from_millis(100), poller.next_snapshot()).await;
        assert!(cancelled.is_err());

        poller.next_snapshot().await.expect("second").expect("image");
        assert!(Instant::now() - first >= gap);
        assert_eq!(account.refreshes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_give_up_after_limit() {
        let account = Arc::new(FakeAccount::counting_images());
        account.fail_refresh.store(true, Ordering::SeqCst);
        let config = SnapshotConfig {
            max_consecutive_failures: 3,
            ..SnapshotConfig::default()
        };
        let mut poller = poller(account.clone(), config);

        let err = poller.next_snapshot().await.expect_err("gives up");
        assert!(matches!(err, ServiceError::Request(_)));
        assert_eq!(account.refreshes.load(Ordering::SeqCst), 3);
    }
}
