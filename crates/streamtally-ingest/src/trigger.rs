//! Start signal decoding
//!
//! An invocation is started by an event envelope whose top-level `data`
//! field carries base64 of a UTF-8 JSON document. The payload is logged and
//! otherwise ignored; the channel list always comes from configuration.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use streamtally_common::{Result, TallyError};

use crate::models::ChannelTarget;

/// Event envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub data: String,
}

impl TriggerEvent {
    /// Parse an envelope from its JSON text
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| TallyError::trigger(format!("malformed envelope: {}", e)))
    }

    /// Envelope used for manual runs, listing the configured channels
    pub fn local(channels: &[ChannelTarget]) -> Result<Self> {
        let payload = serde_json::json!({ "channel_ids": channels });
        Ok(Self {
            data: STANDARD.encode(serde_json::to_vec(&payload)?),
        })
    }

    /// Decode `data` to its JSON payload
    pub fn decode(&self) -> Result<serde_json::Value> {
        let bytes = STANDARD
            .decode(self.data.trim())
            .map_err(|e| TallyError::trigger(format!("data is not base64: {}", e)))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| TallyError::trigger(format!("data is not UTF-8: {}", e)))?;
        serde_json::from_str(&text)
            .map_err(|e| TallyError::trigger(format!("data is not JSON: {}", e)))
    }
}
