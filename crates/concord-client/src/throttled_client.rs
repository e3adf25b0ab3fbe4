//! Throttled Concord client (decorator pattern)
//!
//! Wraps any `ConcordClient` implementation and spaces calls at least one
//! cooldown window apart. Each `ThrottledClient` owns its own `Throttle`, so
//! two call sites never share cooldown state.

use crate::client::ConcordClient;
use crate::error::Result;
use crate::pagination::Pagination;
use crate::types::{
    InstanceId, LogChunk, LogRange, PaginatedLogSegmentEntry, ProcessEntry, SegmentFilter,
    SegmentId,
};
use async_trait::async_trait;
use log::debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Source of the current time
///
/// Injected so throttle windows can be tested without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Tokio's clock (follows `tokio::time::pause` in tests)
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Longest window a throttle honours (about 30 years, like tokio's far future)
pub const MAX_WINDOW: Duration = Duration::from_secs(86400 * 365 * 30);

/// Cooldown window state
///
/// Every call reserves the earliest slot that is at least `window` after the
/// previous reservation and reports how long the caller has to wait for it.
pub struct Throttle {
    window: Duration,
    next_slot: Mutex<Option<Instant>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(TokioClock))
    }

    /// Windows above [`MAX_WINDOW`] are clamped to it
    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window: window.min(MAX_WINDOW),
            next_slot: Mutex::new(None),
            clock,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Reserve the next slot and return the delay until it opens
    pub fn reserve(&self) -> Duration {
        let now = self.clock.now();
        let mut next_slot = match self.next_slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let slot = match *next_slot {
            Some(slot) if slot > now => slot,
            _ => now,
        };
        // saturate instead of overflowing the clock
        *next_slot = Some(slot.checked_add(self.window).unwrap_or(slot));

        slot - now
    }

    /// Wait until the next slot opens
    pub async fn acquire(&self) {
        let delay = self.reserve();
        if !delay.is_zero() {
            debug!("Throttling request for {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }
}

/// Rate-limited Concord client using the decorator pattern
///
/// # Example
///
/// ```rust,ignore
/// use concord_client::{HttpClient, ThrottledClient};
/// use std::time::Duration;
///
/// let inner = HttpClient::new(config)?;
/// let client = ThrottledClient::new(inner, Duration::from_millis(500));
/// ```
#[derive(Debug)]
pub struct ThrottledClient<C: ConcordClient> {
    inner: C,
    throttle: Throttle,
}

impl<C: ConcordClient> ThrottledClient<C> {
    pub fn new(inner: C, window: Duration) -> Self {
        Self {
            inner,
            throttle: Throttle::new(window),
        }
    }

    pub fn with_throttle(inner: C, throttle: Throttle) -> Self {
        Self { inner, throttle }
    }

    /// Get a reference to the inner client
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: ConcordClient> ConcordClient for ThrottledClient<C> {
    async fn get_process(&self, instance_id: &InstanceId) -> Result<ProcessEntry> {
        self.throttle.acquire().await;
        self.inner.get_process(instance_id).await
    }

    async fn get_log(&self, instance_id: &InstanceId, range: &LogRange) -> Result<LogChunk> {
        self.throttle.acquire().await;
        self.inner.get_log(instance_id, range).await
    }

    async fn get_segment_log(
        &self,
        instance_id: &InstanceId,
        segment_id: SegmentId,
        range: &LogRange,
    ) -> Result<LogChunk> {
        self.throttle.acquire().await;
        self.inner
            .get_segment_log(instance_id, segment_id, range)
            .await
    }

    async fn list_log_segments(
        &self,
        instance_id: &InstanceId,
        page: Pagination,
        filter: SegmentFilter,
    ) -> Result<PaginatedLogSegmentEntry> {
        self.throttle.acquire().await;
        self.inner.list_log_segments(instance_id, page, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProcessStatus;

    /// Clock that only moves when told to
    struct FakeClock {
        now: Mutex<Instant>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
            }
        }

        fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    /// Mock client recording when each call reached it
    struct MockClient {
        calls: Mutex<Vec<Instant>>,
    }

    impl MockClient {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self) {
            self.calls.lock().unwrap().push(Instant::now());
        }
    }

    #[async_trait]
    impl ConcordClient for MockClient {
        async fn get_process(&self, instance_id: &InstanceId) -> Result<ProcessEntry> {
            self.record();
            Ok(ProcessEntry {
                instance_id: instance_id.clone(),
                status: ProcessStatus::Running,
                created_at: None,
                initiator: None,
            })
        }

        async fn get_log(&self, _instance_id: &InstanceId, range: &LogRange) -> Result<LogChunk> {
            self.record();
            Ok(LogChunk {
                data: String::new(),
                range: range.clone(),
            })
        }

        async fn get_segment_log(
            &self,
            _instance_id: &InstanceId,
            _segment_id: SegmentId,
            range: &LogRange,
        ) -> Result<LogChunk> {
            self.record();
            Ok(LogChunk {
                data: String::new(),
                range: range.clone(),
            })
        }

        async fn list_log_segments(
            &self,
            _instance_id: &InstanceId,
            page: Pagination,
            _filter: SegmentFilter,
        ) -> Result<PaginatedLogSegmentEntry> {
            self.record();
            Ok(page.paginate(Vec::new()))
        }
    }

    #[test]
    fn test_first_call_is_not_delayed() {
        let clock = Arc::new(FakeClock::new());
        let throttle = Throttle::with_clock(Duration::from_secs(1), clock);
        assert_eq!(throttle.reserve(), Duration::ZERO);
    }

    #[test]
    fn test_calls_within_window_are_spaced() {
        let clock = Arc::new(FakeClock::new());
        let throttle = Throttle::with_clock(Duration::from_secs(1), clock.clone());

        assert_eq!(throttle.reserve(), Duration::ZERO);
        assert_eq!(throttle.reserve(), Duration::from_secs(1));
        assert_eq!(throttle.reserve(), Duration::from_secs(2));

        clock.advance(Duration::from_millis(2500));
        assert_eq!(throttle.reserve(), Duration::from_millis(500));
    }

    #[test]
    fn test_window_resets_after_idle_period() {
        let clock = Arc::new(FakeClock::new());
        let throttle = Throttle::with_clock(Duration::from_secs(1), clock.clone());

        throttle.reserve();
        clock.advance(Duration::from_secs(10));
        assert_eq!(throttle.reserve(), Duration::ZERO);
    }

    #[test]
    fn test_throttles_do_not_share_state() {
        let clock = Arc::new(FakeClock::new());
        let a = Throttle::with_clock(Duration::from_secs(1), clock.clone());
        let b = Throttle::with_clock(Duration::from_secs(1), clock);

        a.reserve();
        assert_eq!(b.reserve(), Duration::ZERO);
    }

    #[test]
    fn test_huge_window_saturates() {
        let clock = Arc::new(FakeClock::new());
        let throttle = Throttle::with_clock(Duration::MAX, clock.clone());
        assert_eq!(throttle.window(), MAX_WINDOW);

        assert_eq!(throttle.reserve(), Duration::ZERO);
        assert_eq!(throttle.reserve(), MAX_WINDOW);

        clock.advance(Duration::from_secs(1));
        assert!(throttle.reserve() > MAX_WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_client_spaces_calls() {
        let client = ThrottledClient::new(MockClient::new(), Duration::from_millis(500));
        let id = InstanceId::new("abc");

        let started = Instant::now();
        client.get_process(&id).await.unwrap();
        client.get_log(&id, &LogRange::tail(10)).await.unwrap();
        client
            .list_log_segments(&id, Pagination::new(10), SegmentFilter::default())
            .await
            .unwrap();

        let calls = client.inner().calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0] - started, Duration::ZERO);
        assert!(calls[1] - calls[0] >= Duration::from_millis(500));
        assert!(calls[2] - calls[1] >= Duration::from_millis(500));
    }
}
