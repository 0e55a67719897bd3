//! Turns discovered live videos into viewer snapshot rows

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{snapshot_minute, Batch, ChannelTarget, LiveVideoSummary, RowError, ViewerSnapshotRow};
use crate::youtube::VideoPlatform;

/// Source of the snapshot timestamp
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct SnapshotAssembler {
    platform: Arc<dyn VideoPlatform>,
    clock: Clock,
}

impl SnapshotAssembler {
    pub fn new(platform: Arc<dyn VideoPlatform>) -> Self {
        Self::with_clock(platform, Arc::new(Utc::now))
    }

    pub fn with_clock(platform: Arc<dyn VideoPlatform>, clock: Clock) -> Self {
        Self { platform, clock }
    }

    /// Build one row per well-formed video, in input order.
    ///
    /// Every video gets its own viewer and channel-name lookup. Items missing
    /// their id or title are dropped with a warning; lookups that miss leave
    /// the field `None` and keep the row.
    pub async fn build_rows(&self, videos: &[LiveVideoSummary], channel: &ChannelTarget) -> Batch {
        let mut rows = Vec::with_capacity(videos.len());

        for video in videos {
            match self.build_row(video, channel).await {
                Ok(row) => rows.push(row),
                Err(e) => warn!(channel_id = %channel, error = %e, "Error processing video data, skipping item"),
            }
        }

        debug!(channel_id = %channel, rows = ?rows, "Collected rows");
        rows
    }

    async fn build_row(
        &self,
        video: &LiveVideoSummary,
        channel: &ChannelTarget,
    ) -> Result<ViewerSnapshotRow, RowError> {
        let video_id = video.video_id()?;
        let video_title = video.title()?;

        let current_viewers = self.platform.fetch_concurrent_viewers(video_id).await;
        let channel_name = self.platform.fetch_channel_name(channel).await;

        Ok(ViewerSnapshotRow {
            video_title: video_title.to_string(),
            video_id: video_id.to_string(),
            channel_name,
            current_viewers,
            datetime: snapshot_minute((self.clock)()),
        })
    }
}
