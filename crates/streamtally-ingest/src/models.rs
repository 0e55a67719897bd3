//! Domain types shared across the sweep pipeline

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Timestamp layout of the `datetime` column, minute precision.
pub const SNAPSHOT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// A channel to poll
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelTarget(String);

impl ChannelTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a search item could not become a row
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("search item has no id.videoId")]
    MissingVideoId,
    #[error("search item has no snippet.title")]
    MissingTitle,
}

/// One live broadcast discovered by search
///
/// Mirrors the search item shape. Every nested field is optional so a
/// malformed item still deserializes and is rejected per item when the row
/// is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveVideoSummary {
    #[serde(default)]
    pub id: Option<SearchItemId>,
    #[serde(default)]
    pub snippet: Option<SearchSnippet>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchItemId {
    #[serde(default)]
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSnippet {
    #[serde(default)]
    pub title: Option<String>,
}

impl LiveVideoSummary {
    pub fn new(video_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Some(SearchItemId {
                video_id: Some(video_id.into()),
            }),
            snippet: Some(SearchSnippet {
                title: Some(title.into()),
            }),
        }
    }

    pub fn video_id(&self) -> Result<&str, RowError> {
        self.id
            .as_ref()
            .and_then(|id| id.video_id.as_deref())
            .ok_or(RowError::MissingVideoId)
    }

    pub fn title(&self) -> Result<&str, RowError> {
        self.snippet
            .as_ref()
            .and_then(|s| s.title.as_deref())
            .ok_or(RowError::MissingTitle)
    }
}

/// The unit persisted downstream. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerSnapshotRow {
    pub video_title: String,
    pub video_id: String,
    pub channel_name: Option<String>,
    pub current_viewers: Option<u64>,
    pub datetime: String,
}

/// Column names in staged artifact order.
pub const SNAPSHOT_COLUMNS: [&str; 5] = [
    "video_title",
    "video_id",
    "channel_name",
    "current_viewers",
    "datetime",
];

/// Rows for one channel in one sweep
pub type Batch = Vec<ViewerSnapshotRow>;

/// Format `at` truncated to the minute, as stored in `datetime`
pub fn snapshot_minute(at: DateTime<Utc>) -> String {
    let truncated = at
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at);
    truncated.format(SNAPSHOT_DATETIME_FORMAT).to_string()
}

/// Run token distinguishing one sweep's artifacts from another's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SweepId(Uuid);

impl SweepId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SweepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SweepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Destination table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// A staged artifact in the object store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub bucket: String,
    pub key: String,
    pub rows: usize,
}

impl ArtifactRef {
    /// Location handed to the warehouse load job
    pub fn uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_snapshot_minute_truncates_seconds() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 17, 4, 59).unwrap();
        assert_eq!(snapshot_minute(at), "2026-03-09 17:04");
    }

    #[test]
    fn test_summary_accessors_report_missing_fields() {
        let item: LiveVideoSummary =
            serde_json::from_value(serde_json::json!({ "snippet": { "title": "t" } })).unwrap();
        assert_eq!(item.video_id(), Err(RowError::MissingVideoId));
        assert_eq!(item.title(), Ok("t"));

        let item: LiveVideoSummary =
            serde_json::from_value(serde_json::json!({ "id": { "videoId": "v1" } })).unwrap();
        assert_eq!(item.video_id(), Ok("v1"));
        assert_eq!(item.title(), Err(RowError::MissingTitle));
    }

    #[test]
    fn test_summary_parses_search_item() {
        let item: LiveVideoSummary = serde_json::from_value(serde_json::json!({
            "kind": "youtube#searchResult",
            "id": { "kind": "youtube#video", "videoId": "abc" },
            "snippet": { "title": "Live Now", "channelId": "UC1" }
        }))
        .unwrap();
        assert_eq!(item.video_id(), Ok("abc"));
        assert_eq!(item.title(), Ok("Live Now"));
    }

    #[test]
    fn test_artifact_uri() {
        let artifact = ArtifactRef {
            bucket: "b".to_string(),
            key: "live_videos_UC1_x.csv".to_string(),
            rows: 3,
        };
        assert_eq!(artifact.uri(), "gs://b/live_videos_UC1_x.csv");
    }

    #[test]
    fn test_sweep_ids_differ() {
        assert_ne!(SweepId::new().to_string(), SweepId::new().to_string());
    }
}
