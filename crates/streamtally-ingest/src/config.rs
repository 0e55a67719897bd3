//! Configuration management
//!
//! One [`IngestConfig`] is built per invocation from a JSON file merged with
//! `STREAMTALLY_`-prefixed environment variables, validated, and then passed
//! by reference to every component. Nothing here is revisited mid-run.

use figment::{
    providers::{Env, Format, Json},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use streamtally_common::{Result, TallyError};

use crate::models::{ChannelTarget, TableRef};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Prefix for environment overrides, e.g. `STREAMTALLY_API_KEY`.
pub const ENV_PREFIX: &str = "STREAMTALLY_";

/// YouTube Data API v3 root.
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// BigQuery v2 REST root.
pub const DEFAULT_WAREHOUSE_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Cloud Storage XML API, which accepts S3-style requests signed with HMAC keys.
pub const DEFAULT_STAGING_ENDPOINT: &str = "https://storage.googleapis.com";

pub const DEFAULT_STAGING_REGION: &str = "auto";

/// Delay between load job status polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Video platform API key, sent as the `key` query parameter
    pub api_key: String,

    /// Channels polled in order on every sweep
    pub channel_ids: Vec<String>,

    pub project_id: String,
    pub dataset_name: String,
    pub table_name: String,

    /// Staging bucket; artifacts are written directly under it
    pub bucket_name: String,

    /// Service-account key used to authenticate warehouse calls
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,

    /// Pre-issued bearer token; skips the service-account exchange
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub staging: StagingConfig,

    /// Local directory for artifacts before upload
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_warehouse_base_url")]
    pub warehouse_base_url: String,

    /// Per-request HTTP timeout; client defaults apply when unset
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on waiting for a load job; waits indefinitely when unset
    #[serde(default)]
    pub load_timeout_secs: Option<u64>,
}

/// S3-compatible staging store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    #[serde(default = "default_staging_endpoint")]
    pub endpoint: Option<String>,

    #[serde(default = "default_staging_region")]
    pub region: String,

    /// HMAC access key; falls back to `AWS_ACCESS_KEY_ID`
    #[serde(default)]
    pub access_key: Option<String>,

    /// HMAC secret; falls back to `AWS_SECRET_ACCESS_KEY`
    #[serde(default)]
    pub secret_key: Option<String>,

    #[serde(default = "default_path_style")]
    pub path_style: bool,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_staging_endpoint(),
            region: default_staging_region(),
            access_key: None,
            secret_key: None,
            path_style: default_path_style(),
        }
    }
}

impl StagingConfig {
    /// Access key and secret, from the config or the standard AWS variables.
    pub fn resolved_credentials(&self) -> Result<(String, String)> {
        let access_key = self
            .access_key
            .clone()
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| TallyError::config("staging.access_key is not set"))?;
        let secret_key = self
            .secret_key
            .clone()
            .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| TallyError::config("staging.secret_key is not set"))?;
        Ok((access_key, secret_key))
    }
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_warehouse_base_url() -> String {
    DEFAULT_WAREHOUSE_BASE_URL.to_string()
}

fn default_staging_endpoint() -> Option<String> {
    Some(DEFAULT_STAGING_ENDPOINT.to_string())
}

fn default_staging_region() -> String {
    DEFAULT_STAGING_REGION.to_string()
}

fn default_path_style() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl IngestConfig {
    /// Load from a JSON file with environment overrides, then validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TallyError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        Self::from_figment(
            Figment::new()
                .merge(Json::file(path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Extract from an already assembled figment and validate
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| TallyError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(TallyError::config("api_key must not be empty"));
        }

        if self.channel_ids.is_empty() {
            return Err(TallyError::config("channel_ids must list at least one channel"));
        }

        if let Some(pos) = self.channel_ids.iter().position(|c| c.trim().is_empty()) {
            return Err(TallyError::config(format!(
                "channel_ids[{}] is blank",
                pos
            )));
        }

        for (name, value) in [
            ("project_id", &self.project_id),
            ("dataset_name", &self.dataset_name),
            ("table_name", &self.table_name),
            ("bucket_name", &self.bucket_name),
        ] {
            if value.trim().is_empty() {
                return Err(TallyError::config(format!("{} must not be empty", name)));
            }
        }

        let has_token = self
            .access_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if !has_token {
            match &self.credentials_file {
                Some(path) if path.is_file() => {},
                Some(path) => {
                    return Err(TallyError::config(format!(
                        "credentials_file does not exist: {}",
                        path.display()
                    )))
                },
                None => {
                    return Err(TallyError::config(
                        "either credentials_file or access_token must be set",
                    ))
                },
            }
        }

        if self.poll_interval_ms == 0 {
            return Err(TallyError::config("poll_interval_ms must be greater than 0"));
        }

        for (name, value) in [
            ("http_timeout_secs", self.http_timeout_secs),
            ("load_timeout_secs", self.load_timeout_secs),
        ] {
            if value == Some(0) {
                return Err(TallyError::config(format!(
                    "{} must be greater than 0 when set",
                    name
                )));
            }
        }

        self.staging.resolved_credentials()?;

        Ok(())
    }

    pub fn channels(&self) -> Vec<ChannelTarget> {
        self.channel_ids
            .iter()
            .map(|id| ChannelTarget::new(id.trim()))
            .collect()
    }

    pub fn destination(&self) -> TableRef {
        TableRef {
            project_id: self.project_id.clone(),
            dataset_id: self.dataset_name.clone(),
            table_id: self.table_name.clone(),
        }
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_secs.map(Duration::from_secs)
    }
}
