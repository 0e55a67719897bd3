//! Video platform access
//!
//! [`VideoPlatform`] is the seam the assembler and orchestrator depend on.
//! Its lookups never fail: a miss of any kind comes back as `None` (or a
//! shortened video list) so one bad response cannot abort a sweep.
//! [`YouTubeClient`] is the production implementation.

use async_trait::async_trait;

use crate::models::{ChannelTarget, LiveVideoSummary};

pub mod client;
pub mod types;

pub use client::{YouTubeClient, SEARCH_PAGE_SIZE};

#[async_trait]
pub trait VideoPlatform: Send + Sync {
    /// All live videos on `channel`, following continuation tokens.
    /// A failed page ends the walk and keeps what was already collected.
    async fn fetch_live_videos(&self, channel: &ChannelTarget) -> Vec<LiveVideoSummary>;

    /// Concurrent viewer count, `None` when the video is not live or the
    /// lookup failed
    async fn fetch_concurrent_viewers(&self, video_id: &str) -> Option<u64>;

    /// Channel display name, `None` on any miss
    async fn fetch_channel_name(&self, channel: &ChannelTarget) -> Option<String>;
}
