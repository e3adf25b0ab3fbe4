//! Concord API data transfer objects
//!
//! These types represent the data returned from the Concord process and
//! process log endpoints. They are intentionally separate from the reader
//! state in `concord-log-tail` to keep this crate pure and reusable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier of a process instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a log segment within a process log
pub type SegmentId = i64;

/// A byte span of a process log
///
/// Used both as a request (which span to fetch, either bound may be open)
/// and as a response (the span actually returned plus the total `length`
/// of the log on the server). In the response form `unit` is always
/// `"bytes"` and `high` is the exclusive end offset reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRange {
    pub unit: Option<String>,
    pub length: Option<u64>,
    pub low: Option<u64>,
    pub high: Option<u64>,
}

impl LogRange {
    /// The last `bytes` bytes of the log
    pub fn tail(bytes: u64) -> Self {
        Self {
            high: Some(bytes),
            ..Self::default()
        }
    }

    /// Everything from `offset` onward
    pub fn from_offset(offset: u64) -> Self {
        Self {
            low: Some(offset),
            ..Self::default()
        }
    }

    /// The whole log, starting at byte 0
    pub fn whole() -> Self {
        Self::from_offset(0)
    }

    /// True if no bound has been set (the state after a reset)
    pub fn is_empty(&self) -> bool {
        self.low.is_none() && self.high.is_none() && self.length.is_none()
    }
}

/// The result of one ranged log fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogChunk {
    pub data: String,
    pub range: LogRange,
}

/// Lifecycle state of a process as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    New,
    Preparing,
    Enqueued,
    Waiting,
    Starting,
    Running,
    Suspended,
    Resuming,
    Finished,
    Failed,
    Cancelled,
    TimedOut,
    /// A status this client does not know about
    #[serde(other)]
    Unknown,
}

impl ProcessStatus {
    /// The process will not produce any more log output
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Failed | Self::Cancelled | Self::TimedOut
        )
    }

    /// Whether a log poller should keep asking for new data
    ///
    /// Suspended processes stop polling too; resuming them is an explicit
    /// user action that restarts the loop.
    pub fn is_active(&self) -> bool {
        !self.is_final() && *self != Self::Suspended
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::Preparing => "PREPARING",
            Self::Enqueued => "ENQUEUED",
            Self::Waiting => "WAITING",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Suspended => "SUSPENDED",
            Self::Resuming => "RESUMING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::TimedOut => "TIMED_OUT",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// The part of a process entry the log reader needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessEntry {
    pub instance_id: InstanceId,

    pub status: ProcessStatus,

    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub initiator: Option<String>,
}

/// Status of a single log segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentStatus {
    Running,
    Ok,
    Suspended,
    Error,
    #[serde(other)]
    Unknown,
}

impl SegmentStatus {
    /// Anything but `RUNNING` means the segment log will not grow
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// A named sub-division of a process log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSegmentEntry {
    pub id: SegmentId,

    #[serde(default)]
    pub correlation_id: Option<String>,

    pub name: String,

    #[serde(deserialize_with = "deserialize_date")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub status: Option<SegmentStatus>,

    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub status_updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub warnings: Option<u32>,

    #[serde(default)]
    pub errors: Option<u32>,

    #[serde(default)]
    pub parent_id: Option<SegmentId>,

    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

/// One page of a list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    /// True if another page follows this one
    pub next: bool,
}

pub type PaginatedLogSegmentEntry = Paginated<LogSegmentEntry>;

/// Narrows a segment listing
///
/// The default lists every segment of the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentFilter {
    /// Fold child segments into their parents
    pub collapsed: bool,
    /// Only the children of this segment
    pub parent_id: Option<SegmentId>,
}

impl SegmentFilter {
    pub fn collapsed() -> Self {
        Self {
            collapsed: true,
            parent_id: None,
        }
    }

    pub fn children_of(parent_id: SegmentId) -> Self {
        Self {
            collapsed: false,
            parent_id: Some(parent_id),
        }
    }

    /// Query parameters for the segment list endpoint
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if self.collapsed {
            query.push(("collapsed", "true".to_string()));
        }
        if let Some(parent_id) = self.parent_id {
            query.push(("parentId", parent_id.to_string()));
        }
        query
    }
}

/// Concord serializes timestamps as `2024-01-01T10:00:00.000+0000`, which is
/// not RFC 3339 (no colon in the offset). Accept both forms.
fn parse_date(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|d| d.with_timezone(&Utc))
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    parse_date(&value).map_err(serde::de::Error::custom)
}

fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(value) => parse_date(&value)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}
