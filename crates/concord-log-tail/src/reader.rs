//! Incremental log reader
//!
//! Keeps the part of a process log fetched so far and knows which byte range
//! to ask for next. The first fetch asks for the tail of the log, every
//! following one for the bytes after the last known end.
//!
//! ```text
//!   EMPTY ──refresh──▶ LOADED ──refresh──▶ LOADED (appended)
//!     ▲                  │
//!     └──────reset───────┘
//! ```

use crate::error::{Result, TailError};
use concord_client::{
    ConcordClient, InstanceId, LogChunk, LogRange, ProcessStatus, SegmentId, SegmentStatus,
};
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default size of the first tail view
pub const DEFAULT_TAIL_BYTES: u64 = 2048;

/// Default upper bound for one refresh round trip
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which log a reader follows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// The whole process log
    Process(InstanceId),
    /// One segment of the process log
    Segment {
        instance_id: InstanceId,
        segment_id: SegmentId,
    },
}

impl LogTarget {
    pub fn instance_id(&self) -> &InstanceId {
        match self {
            Self::Process(id) => id,
            Self::Segment { instance_id, .. } => instance_id,
        }
    }
}

/// Log fetched so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogState {
    /// Fetched chunks in order, each one line-aligned
    pub lines: Vec<String>,
    /// Range of the most recently merged chunk
    pub range: LogRange,
    /// Smallest `low` seen since the last reset
    pub min: Option<u64>,
    pub status: Option<ProcessStatus>,
    /// Status of the followed segment; `None` for a process target
    pub segment_status: Option<SegmentStatus>,
}

impl LogState {
    /// There is log data before the earliest byte fetched so far
    pub fn should_offer_full_load(&self) -> bool {
        self.min.is_some_and(|min| min > 0)
    }

    fn merge(
        &mut self,
        chunk: LogChunk,
        status: ProcessStatus,
        segment_status: Option<SegmentStatus>,
    ) {
        if !chunk.data.is_empty() {
            self.lines.push(chunk.data);
        }
        if let Some(low) = chunk.range.low {
            self.min = Some(self.min.map_or(low, |min| min.min(low)));
        }
        self.range = chunk.range;
        self.status = Some(status);
        self.segment_status = segment_status;
    }
}

/// What one successful refresh changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Text appended to the log, if the chunk was not empty
    pub appended: Option<String>,
    pub range: LogRange,
    pub status: ProcessStatus,
    pub segment_status: Option<SegmentStatus>,
}

impl RefreshOutcome {
    /// Whether the log can still grow
    ///
    /// A followed segment stops growing once its own status leaves
    /// `RUNNING`, even while the process goes on.
    pub fn keep_polling(&self) -> bool {
        self.status.is_active() && self.segment_status.is_none_or(|s| s.is_running())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    pub tail_bytes: u64,
    pub request_timeout: Duration,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            tail_bytes: DEFAULT_TAIL_BYTES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug)]
struct ReaderState {
    target: LogTarget,
    log: LogState,
    /// Bumped on every reset so late fetches can tell they are stale
    generation: u64,
}

impl ReaderState {
    fn reset(&mut self) {
        self.log = LogState::default();
        self.generation += 1;
    }
}

struct Inner<C> {
    client: Arc<C>,
    options: ReaderOptions,
    state: Mutex<ReaderState>,
    in_flight: tokio::sync::Mutex<()>,
}

/// Incremental reader of one process log
///
/// Cheap to clone; clones share the same state. At most one fetch runs at a
/// time, an overlapping call fails with [`TailError::RefreshInFlight`].
///
/// # Example
///
/// ```rust,ignore
/// let reader = LogReader::new(client, LogTarget::Process(InstanceId::new("abc")));
/// reader.refresh(true).await?;          // bytes=-2048
/// let outcome = reader.refresh(false).await?; // bytes=<high>-
/// ```
pub struct LogReader<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for LogReader<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: ConcordClient> LogReader<C> {
    pub fn new(client: Arc<C>, target: LogTarget) -> Self {
        Self::with_options(client, target, ReaderOptions::default())
    }

    pub fn with_options(client: Arc<C>, target: LogTarget, options: ReaderOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                options,
                state: Mutex::new(ReaderState {
                    target,
                    log: LogState::default(),
                    generation: 0,
                }),
                in_flight: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn options(&self) -> ReaderOptions {
        self.inner.options
    }

    pub fn target(&self) -> LogTarget {
        self.lock().target.clone()
    }

    /// Snapshot of the log fetched so far
    pub fn state(&self) -> LogState {
        self.lock().log.clone()
    }

    pub fn should_offer_full_load(&self) -> bool {
        self.lock().log.should_offer_full_load()
    }

    /// Forget everything fetched so far
    ///
    /// A fetch still in flight will not be merged.
    pub fn reset(&self) {
        self.lock().reset();
    }

    /// Point the reader at another log, resetting it if the target changed
    pub fn set_target(&self, target: LogTarget) {
        let mut state = self.lock();
        if state.target != target {
            info!("Switching log reader to {:?}", target);
            state.target = target;
            state.reset();
        }
    }

    /// Fetch the next part of the log and merge it
    ///
    /// With `reset`, or when nothing was fetched yet, asks for the last
    /// `tail_bytes` bytes. Otherwise asks for everything after the last known
    /// end. A failed fetch leaves the state as it was.
    pub async fn refresh(&self, reset: bool) -> Result<RefreshOutcome> {
        self.refresh_inner(reset, None).await
    }

    /// [`refresh`](Self::refresh) that gives up once `cancel` fires
    ///
    /// The token is checked under the state lock right before merging, so a
    /// fetch that completes after cancellation changes nothing and fails with
    /// [`TailError::Cancelled`].
    pub async fn refresh_cancellable(
        &self,
        reset: bool,
        cancel: &CancellationToken,
    ) -> Result<RefreshOutcome> {
        self.refresh_inner(reset, Some(cancel)).await
    }

    async fn refresh_inner(
        &self,
        reset: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<RefreshOutcome> {
        let _guard = self.begin()?;

        let (target, requested, generation) = {
            let mut state = self.lock();
            if reset {
                state.reset();
            }
            let requested = match state.log.range.high {
                Some(high) => LogRange::from_offset(high),
                None => LogRange::tail(self.inner.options.tail_bytes),
            };
            (state.target.clone(), requested, state.generation)
        };

        self.fetch_and_merge(target, requested, generation, false, cancel)
            .await
    }

    /// Replace the state with the whole log, starting at byte 0
    pub async fn load_whole(&self) -> Result<RefreshOutcome> {
        let _guard = self.begin()?;

        let (target, generation) = {
            let state = self.lock();
            (state.target.clone(), state.generation)
        };

        self.fetch_and_merge(target, LogRange::whole(), generation, true, None)
            .await
    }

    fn begin(&self) -> Result<tokio::sync::MutexGuard<'_, ()>> {
        self.inner
            .in_flight
            .try_lock()
            .map_err(|_| TailError::RefreshInFlight)
    }

    async fn fetch_and_merge(
        &self,
        target: LogTarget,
        requested: LogRange,
        generation: u64,
        replace: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<RefreshOutcome> {
        let timeout = self.inner.options.request_timeout;
        let fetched = tokio::time::timeout(timeout, self.fetch(&target, &requested)).await;

        let mut state = self.lock();
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            debug!("Discarding log chunk fetched after cancellation");
            return Err(TailError::Cancelled);
        }
        let (status, segment_status, chunk) = fetched.map_err(|_| TailError::Timeout(timeout))??;
        if state.generation != generation {
            debug!("Discarding log chunk fetched before a reset");
            return Err(TailError::Superseded);
        }
        if replace {
            state.reset();
        }

        let outcome = RefreshOutcome {
            appended: (!chunk.data.is_empty()).then(|| chunk.data.clone()),
            range: chunk.range.clone(),
            status,
            segment_status,
        };
        state.log.merge(chunk, status, segment_status);

        debug!(
            "Merged log chunk {:?}-{:?}/{:?}, status {}",
            outcome.range.low, outcome.range.high, outcome.range.length, status
        );
        Ok(outcome)
    }

    /// Status, segment status and chunk are fetched in the same round trip
    async fn fetch(
        &self,
        target: &LogTarget,
        requested: &LogRange,
    ) -> concord_client::Result<(ProcessStatus, Option<SegmentStatus>, LogChunk)> {
        let client = &self.inner.client;
        let instance_id = target.instance_id();

        let status = async {
            client
                .get_process(instance_id)
                .await
                .map(|process| process.status)
        };
        let segment_status = async {
            match target {
                LogTarget::Process(_) => Ok(None),
                LogTarget::Segment {
                    instance_id,
                    segment_id,
                } => client
                    .find_log_segment(instance_id, *segment_id)
                    .await
                    .map(|segment| segment.and_then(|s| s.status)),
            }
        };
        let chunk = async {
            match target {
                LogTarget::Process(id) => client.get_log(id, requested).await,
                LogTarget::Segment {
                    instance_id,
                    segment_id,
                } => {
                    client
                        .get_segment_log(instance_id, *segment_id, requested)
                        .await
                }
            }
        };

        tokio::try_join!(status, segment_status, chunk)
    }

    fn lock(&self) -> MutexGuard<'_, ReaderState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
