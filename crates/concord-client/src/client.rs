//! Concord client trait
//!
//! This module defines the core `ConcordClient` trait that all client
//! implementations must satisfy.

use crate::error::Result;
use crate::pagination::Pagination;
use crate::types::{
    InstanceId, LogChunk, LogRange, LogSegmentEntry, PaginatedLogSegmentEntry, ProcessEntry,
    SegmentFilter, SegmentId,
};
use async_trait::async_trait;

/// Concord process log API
///
/// Implementations can be direct (hitting the server) or decorated
/// with throttling. Every call is a single attempt; retry policy belongs
/// to the caller (see the poller in `concord-log-tail`).
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow sharing across
/// async tasks and threads.
///
/// # Example
///
/// ```rust,ignore
/// use concord_client::{ConcordClient, InstanceId, LogRange};
///
/// async fn last_kb(client: &dyn ConcordClient) -> concord_client::Result<String> {
///     let chunk = client.get_log(&InstanceId::new("abc"), &LogRange::tail(1024)).await?;
///     Ok(chunk.data)
/// }
/// ```
#[async_trait]
pub trait ConcordClient: Send + Sync {
    /// Fetch the status entry of a process
    ///
    /// # Arguments
    ///
    /// * `instance_id` - Process instance
    async fn get_process(&self, instance_id: &InstanceId) -> Result<ProcessEntry>;

    /// Fetch a byte range of the whole process log
    ///
    /// # Arguments
    ///
    /// * `instance_id` - Process instance
    /// * `range` - Requested span, either bound may be open
    ///
    /// # Returns
    ///
    /// The text of the span and the range the server actually returned.
    async fn get_log(&self, instance_id: &InstanceId, range: &LogRange) -> Result<LogChunk>;

    /// Fetch a byte range of a single log segment
    ///
    /// Same range protocol as [`ConcordClient::get_log`], scoped to one segment.
    async fn get_segment_log(
        &self,
        instance_id: &InstanceId,
        segment_id: SegmentId,
        range: &LogRange,
    ) -> Result<LogChunk>;

    /// List the log segments of a process, one page at a time
    ///
    /// # Arguments
    ///
    /// * `instance_id` - Process instance
    /// * `page` - Offset and page size
    /// * `filter` - Collapsed view or the children of one segment
    ///
    /// # Returns
    ///
    /// The segments of the page and whether another page follows.
    async fn list_log_segments(
        &self,
        instance_id: &InstanceId,
        page: Pagination,
        filter: SegmentFilter,
    ) -> Result<PaginatedLogSegmentEntry>;

    /// Look up one segment by walking the segment list page by page
    ///
    /// Returns `None` if the process has no segment with that id.
    async fn find_log_segment(
        &self,
        instance_id: &InstanceId,
        segment_id: SegmentId,
    ) -> Result<Option<LogSegmentEntry>> {
        let mut page = Pagination::new(SEGMENT_LOOKUP_LIMIT);
        loop {
            let segments = self
                .list_log_segments(instance_id, page, SegmentFilter::default())
                .await?;
            let next = segments.next;
            if let Some(found) = segments.items.into_iter().find(|s| s.id == segment_id) {
                return Ok(Some(found));
            }
            if !next {
                return Ok(None);
            }
            page.next();
        }
    }
}

/// Page size used by [`ConcordClient::find_log_segment`]
pub const SEGMENT_LOOKUP_LIMIT: u32 = 100;
