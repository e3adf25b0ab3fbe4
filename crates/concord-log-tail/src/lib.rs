//! Incremental tailing of Concord process logs
//!
//! - [`LogReader`] keeps the log fetched so far and asks the server only for
//!   the bytes it has not seen yet.
//! - [`PollingController`] re-runs an async operation on an interval, with
//!   cooperative cancellation.
//! - [`follow`] combines the two into `tail -f` for a process log.

pub mod error;
pub mod follow;
pub mod poller;
pub mod reader;

pub use error::{Result, TailError};
pub use follow::follow;
pub use poller::{ErrorPolicy, PollOptions, PollState, PollingController};
pub use reader::{
    LogReader, LogState, LogTarget, ReaderOptions, RefreshOutcome, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_TAIL_BYTES,
};
