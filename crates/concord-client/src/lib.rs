//! Concord process log API client
//!
//! This crate provides a trait-based client for the Concord process and
//! process log endpoints, including the byte-range protocol used to tail a
//! growing log. The design follows the decorator pattern, allowing throttling
//! to be composed with the base client.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              ConcordClient trait                 │
//! │  - get_process()                                 │
//! │  - get_log() / get_segment_log()                 │
//! │  - list_log_segments()                           │
//! └─────────────────────────────────────────────────┘
//!                        │
//!        ┌───────────────┴───────────────┐
//!        ▼                               ▼
//! ┌─────────────────┐         ┌─────────────────────┐
//! │   HttpClient    │         │  ThrottledClient    │
//! │ (direct API)    │◄────────│ (decorator)         │
//! └─────────────────┘         └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use concord_client::{ClientConfig, ConcordClient, HttpClient, InstanceId, LogRange};
//!
//! # async fn example() -> concord_client::Result<()> {
//! let config = ClientConfig::from_app_config(&concord_config::AppConfig::load());
//! let client = HttpClient::new(&config)?;
//!
//! let id = InstanceId::new("3d0f9a48-0b0c-4a4e-9bd6-7b4f1c2a9e10");
//! let tail = client.get_log(&id, &LogRange::tail(2048)).await?;
//!
//! // ask for everything after what we already have
//! let next = LogRange::from_offset(tail.range.high.unwrap_or_default());
//! let more = client.get_log(&id, &next).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod credentials;
pub mod error;
pub mod http_client;
pub mod pagination;
pub mod range;
pub mod throttled_client;
pub mod types;

pub use client::ConcordClient;
pub use credentials::ApiKeyResolver;
pub use error::{Error, RangeParseError, RequestError, Result};
pub use http_client::{ClientConfig, HttpClient};
pub use pagination::Pagination;
pub use throttled_client::{Clock, Throttle, ThrottledClient, TokioClock};
pub use types::{
    InstanceId, LogChunk, LogRange, LogSegmentEntry, Paginated, PaginatedLogSegmentEntry,
    ProcessEntry, ProcessStatus, SegmentFilter, SegmentId, SegmentStatus,
};
