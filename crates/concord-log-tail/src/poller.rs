//! Cancellable polling loop
//!
//! Runs an async operation right away and then once per interval for as long
//! as it answers `Ok(true)`. Loading and error state are published through a
//! `watch` channel.
//!
//! Cancellation is cooperative. Every invocation gets the run's
//! [`CancellationToken`]; `stop()` cancels it and guarantees that the loop
//! publishes nothing afterwards. An operation that acts on its own result
//! must check the token before doing so.

use log::{debug, info};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What an operation error does to the loop
pub enum ErrorPolicy<E> {
    /// Record the error and poll again
    Continue,
    /// Record the error and stop
    Stop,
    /// Stop only for errors matching the predicate
    StopWhen(fn(&E) -> bool),
}

impl<E> ErrorPolicy<E> {
    fn stops_on(&self, error: &E) -> bool {
        match self {
            Self::Continue => false,
            Self::Stop => true,
            Self::StopWhen(predicate) => predicate(error),
        }
    }
}

impl<E> Clone for ErrorPolicy<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for ErrorPolicy<E> {}

impl<E> Default for ErrorPolicy<E> {
    fn default() -> Self {
        Self::Continue
    }
}

impl<E> fmt::Debug for ErrorPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => f.write_str("Continue"),
            Self::Stop => f.write_str("Stop"),
            Self::StopWhen(_) => f.write_str("StopWhen(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollOptions<E> {
    pub interval: Duration,
    pub error_policy: ErrorPolicy<E>,
}

impl<E> PollOptions<E> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            error_policy: ErrorPolicy::Continue,
        }
    }

    pub fn error_policy(mut self, policy: ErrorPolicy<E>) -> Self {
        self.error_policy = policy;
        self
    }
}

/// Observable state of a polling loop
#[derive(Debug)]
pub struct PollState<E> {
    /// An operation is running
    pub loading: bool,
    /// Error of the last completed cycle
    pub last_error: Option<Arc<E>>,
    /// Completed cycles since the last `start`
    pub cycles: u64,
    /// The loop ended on its own (the operation said stop, or a stopping error)
    pub finished: bool,
}

impl<E> Default for PollState<E> {
    fn default() -> Self {
        Self {
            loading: false,
            last_error: None,
            cycles: 0,
            finished: false,
        }
    }
}

impl<E> Clone for PollState<E> {
    fn clone(&self) -> Self {
        Self {
            loading: self.loading,
            last_error: self.last_error.clone(),
            cycles: self.cycles,
            finished: self.finished,
        }
    }
}

/// Handles of one running loop
struct Run {
    cancel: CancellationToken,
    /// Serializes state publishing with `stop()`
    gate: Arc<Mutex<()>>,
    force: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// What the spawned loop needs to publish its state
struct Publisher<E> {
    state: Arc<watch::Sender<PollState<E>>>,
    cancel: CancellationToken,
    gate: Arc<Mutex<()>>,
}

impl<E> Publisher<E> {
    /// Apply an update unless the loop was stopped; returns false once stopped
    fn publish(&self, update: impl FnOnce(&mut PollState<E>)) -> bool {
        let _gate = lock_ignoring_poison(&self.gate);
        if self.cancel.is_cancelled() {
            return false;
        }
        self.state.send_modify(update);
        true
    }
}

/// Runs an async operation on an interval until it says stop
///
/// `start` on a running controller replaces the old loop. Dropping the
/// controller stops the loop.
///
/// # Example
///
/// ```rust,ignore
/// let poller = PollingController::new();
/// poller.start(move |cancel| poll_once(reader.clone(), cancel), Duration::from_secs(5));
///
/// let mut updates = poller.subscribe();
/// while updates.changed().await.is_ok() {
///     let state = updates.borrow_and_update().clone();
///     // show state.loading / state.last_error
/// }
/// ```
pub struct PollingController<E> {
    state: Arc<watch::Sender<PollState<E>>>,
    run: Mutex<Option<Run>>,
}

impl<E> PollingController<E> {
    pub fn new() -> Self {
        let (state, _) = watch::channel(PollState::default());
        Self {
            state: Arc::new(state),
            run: Mutex::new(None),
        }
    }

    /// Stop the loop; idempotent
    ///
    /// After this returns no state update is published and the operation is
    /// not invoked again. A running operation sees its token cancelled; it
    /// finishes in the background and its result is dropped.
    pub fn stop(&self) {
        let mut run = lock_ignoring_poison(&self.run);
        if let Some(run) = run.take() {
            let _gate = lock_ignoring_poison(&run.gate);
            run.cancel.cancel();
            debug!("Polling stopped");
        }
    }

    /// Cut the current interval short and run the operation now
    pub fn force_refresh(&self) {
        if let Some(run) = lock_ignoring_poison(&self.run).as_ref() {
            run.force.notify_one();
        }
    }

    /// A loop was started and has neither been stopped nor ended on its own
    pub fn is_running(&self) -> bool {
        lock_ignoring_poison(&self.run)
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState<E>> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PollState<E> {
        self.state.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn last_error(&self) -> Option<Arc<E>> {
        self.state.borrow().last_error.clone()
    }

    /// Wait until the loop ends on its own or is stopped
    pub async fn finished(&self) {
        let cancel = match lock_ignoring_poison(&self.run).as_ref() {
            Some(run) => run.cancel.clone(),
            None => return,
        };

        let mut updates = self.state.subscribe();
        tokio::select! {
            _ = updates.wait_for(|state| state.finished) => {}
            _ = cancel.cancelled() => {}
        }
    }
}

impl<E: Send + Sync + 'static> PollingController<E> {
    /// Start polling with the default error policy (errors do not stop the loop)
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<F, Fut>(&self, op: F, interval: Duration)
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<bool, E>> + Send + 'static,
    {
        self.start_with(op, PollOptions::new(interval));
    }

    pub fn start_with<F, Fut>(&self, op: F, options: PollOptions<E>)
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<bool, E>> + Send + 'static,
    {
        self.stop();
        self.state.send_replace(PollState::default());

        let cancel = CancellationToken::new();
        let gate = Arc::new(Mutex::new(()));
        let force = Arc::new(Notify::new());
        let publisher = Publisher {
            state: Arc::clone(&self.state),
            cancel: cancel.clone(),
            gate: Arc::clone(&gate),
        };

        info!("Polling started (every {:?})", options.interval);
        let handle = tokio::spawn(poll_loop(op, options, publisher, Arc::clone(&force)));

        *lock_ignoring_poison(&self.run) = Some(Run {
            cancel,
            gate,
            force,
            handle,
        });
    }
}

impl<E> Default for PollingController<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Drop for PollingController<E> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop<E, F, Fut>(
    mut op: F,
    options: PollOptions<E>,
    publisher: Publisher<E>,
    force: Arc<Notify>,
) where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    loop {
        let started = publisher.publish(|state| {
            state.loading = true;
            state.last_error = None;
        });
        if !started {
            return;
        }

        let (keep_polling, error) = match op(publisher.cancel.clone()).await {
            Ok(keep_polling) => (keep_polling, None),
            Err(e) => (!options.error_policy.stops_on(&e), Some(Arc::new(e))),
        };

        let published = publisher.publish(|state| {
            state.loading = false;
            state.last_error = error;
            state.cycles += 1;
            state.finished = !keep_polling;
        });
        if !published {
            debug!("Dropping result of a cancelled poll");
            return;
        }
        if !keep_polling {
            info!("Polling finished");
            return;
        }

        tokio::select! {
            _ = publisher.cancel.cancelled() => return,
            _ = tokio::time::sleep(options.interval) => {}
            _ = force.notified() => debug!("Poll forced"),
        }
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
