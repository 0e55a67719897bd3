//! HTTP client for the YouTube Data API v3

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use streamtally_common::{Result, TallyError};
use tracing::{debug, instrument, warn};

use super::types::{ChannelListResponse, SearchListResponse, VideoListResponse};
use super::VideoPlatform;
use crate::config::IngestConfig;
use crate::models::{ChannelTarget, LiveVideoSummary};

/// Items requested per search page; the API's own maximum.
pub const SEARCH_PAGE_SIZE: u32 = 50;

/// API client authenticated with a shared key
pub struct YouTubeClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl YouTubeClient {
    /// Create a client against `base_url`
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        Self::new(&config.api_base_url, &config.api_key, config.http_timeout())
    }

    /// One page of live video search results
    pub async fn search_page(
        &self,
        channel: &ChannelTarget,
        page_token: &str,
    ) -> Result<SearchListResponse> {
        let url = format!("{}/search", self.base_url);
        let max_results = SEARCH_PAGE_SIZE.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("part", "snippet"),
                ("eventType", "live"),
                ("type", "video"),
                ("channelId", channel.as_str()),
                ("key", self.api_key.as_str()),
                ("pageToken", page_token),
                ("maxResults", max_results.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// Concurrent viewers of a live video
    pub async fn concurrent_viewers(&self, video_id: &str) -> Result<u64> {
        let url = format!("{}/videos", self.base_url);

        let response: VideoListResponse = self
            .client
            .get(&url)
            .query(&[
                ("part", "liveStreamingDetails"),
                ("id", video_id),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let count = response
            .items
            .first()
            .ok_or_else(|| TallyError::api(format!("no video item for {}", video_id)))?
            .live_streaming_details
            .as_ref()
            .and_then(|d| d.concurrent_viewers.as_ref())
            .ok_or_else(|| TallyError::api(format!("video {} has no concurrentViewers", video_id)))?;

        count
            .value()
            .ok_or_else(|| TallyError::api(format!("unreadable concurrentViewers for {}", video_id)))
    }

    /// Display name of a channel
    pub async fn channel_name(&self, channel: &ChannelTarget) -> Result<String> {
        let url = format!("{}/channels", self.base_url);

        let response: ChannelListResponse = self
            .client
            .get(&url)
            .query(&[
                ("part", "snippet"),
                ("id", channel.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .items
            .first()
            .and_then(|item| item.snippet.as_ref())
            .and_then(|snippet| snippet.title.clone())
            .ok_or_else(|| TallyError::api(format!("no channel title for {}", channel)))
    }
}

#[async_trait]
impl VideoPlatform for YouTubeClient {
    #[instrument(skip(self), fields(channel_id = %channel))]
    async fn fetch_live_videos(&self, channel: &ChannelTarget) -> Vec<LiveVideoSummary> {
        let mut videos = Vec::new();
        let mut seen_tokens = HashSet::new();
        let mut page_token = String::new();

        loop {
            let page = match self.search_page(channel, &page_token).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, collected = videos.len(), "Error fetching search page, keeping partial results");
                    break;
                },
            };

            debug!(items = page.items.len(), "Fetched search page");
            videos.extend(page.items.into_iter().map(|item| {
                serde_json::from_value::<LiveVideoSummary>(item).unwrap_or_default()
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => {
                    if !seen_tokens.insert(token.clone()) {
                        warn!(page_token = %token, "Search repeated a page token, stopping");
                        break;
                    }
                    page_token = token;
                },
                _ => break,
            }
        }

        videos
    }

    async fn fetch_concurrent_viewers(&self, video_id: &str) -> Option<u64> {
        match self.concurrent_viewers(video_id).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(video_id = %video_id, error = %e, "Error fetching current viewers");
                None
            },
        }
    }

    async fn fetch_channel_name(&self, channel: &ChannelTarget) -> Option<String> {
        match self.channel_name(channel).await {
            Ok(name) => Some(name),
            Err(e) => {
                warn!(channel_id = %channel, error = %e, "Error fetching channel name");
                None
            },
        }
    }
}
