//! Response shapes of the three Data API endpoints used
//!
//! Only the fields read by the pipeline are modelled; everything is
//! optional or defaulted so partial responses still decode.

use serde::Deserialize;

/// `GET /search` page
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchListResponse {
    /// Raw items, converted one by one so a single odd item cannot sink the page
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// `GET /videos?part=liveStreamingDetails`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<VideoItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoItem {
    #[serde(default)]
    pub live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStreamingDetails {
    #[serde(default)]
    pub concurrent_viewers: Option<ViewerCount>,
}

/// The API sends counts as decimal strings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ViewerCount {
    Number(u64),
    Text(String),
}

impl ViewerCount {
    pub fn value(&self) -> Option<u64> {
        match self {
            ViewerCount::Number(n) => Some(*n),
            ViewerCount::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// `GET /channels?part=snippet`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelListResponse {
    #[serde(default)]
    pub items: Vec<ChannelItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelItem {
    #[serde(default)]
    pub snippet: Option<ChannelSnippet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelSnippet {
    #[serde(default)]
    pub title: Option<String>,
}
