//! Bearer tokens for warehouse calls
//!
//! A service-account key is turned into an access token with the OAuth 2.0
//! JWT bearer grant: an RS256-signed assertion is posted to the key's
//! `token_uri`. Tokens are cached until shortly before they expire.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use streamtally_common::{Result, TallyError};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::IngestConfig;

/// Scope needed to run load jobs
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Lifetime requested for each assertion; Google caps this at one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh a cached token this long before it expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Fields of a service-account key file that the token exchange uses
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TallyError::config(format!("cannot read credentials_file {}: {}", path.display(), e))
        })?;
        let key: Self = serde_json::from_str(&raw).map_err(|e| {
            TallyError::config(format!("credentials_file {} is not a service-account key: {}", path.display(), e))
        })?;

        match key.key_type.as_deref() {
            None | Some("service_account") => Ok(key),
            Some(other) => Err(TallyError::config(format!(
                "credentials_file has type '{}', expected 'service_account'",
                other
            ))),
        }
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub struct ServiceAccountTokens {
    client: Client,
    client_email: String,
    token_uri: String,
    signing_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokens {
    pub fn new(key: ServiceAccountKey, client: Client) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| TallyError::config(format!("invalid service-account private key: {}", e)))?;

        Ok(Self {
            client,
            client_email: key.client_email,
            token_uri: key.token_uri,
            signing_key,
            cached: Mutex::new(None),
        })
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: BIGQUERY_SCOPE,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| TallyError::auth(format!("failed to sign assertion: {}", e)))
    }

    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if token.expires_at - ChronoDuration::seconds(EXPIRY_MARGIN_SECS) > now {
                return Ok(token.access_token.clone());
            }
        }

        debug!(client_email = %self.client_email, "Exchanging service-account assertion for access token");

        let assertion = self.assertion(now)?;
        let response = self
            .client
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TallyError::auth(format!("token endpoint returned {}: {}", status, body)));
        }

        let token: TokenResponse = response.json().await?;
        let expires_in = token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: now + ChronoDuration::seconds(expires_in),
        });

        Ok(token.access_token)
    }
}

/// Where warehouse bearer tokens come from
pub enum TokenSource {
    Static(String),
    ServiceAccount(Box<ServiceAccountTokens>),
}

impl TokenSource {
    /// A configured `access_token` wins over `credentials_file`
    pub fn from_config(config: &IngestConfig, client: Client) -> Result<Self> {
        if let Some(token) = config.access_token.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(Self::Static(token.to_string()));
        }

        let path = config
            .credentials_file
            .as_deref()
            .ok_or_else(|| TallyError::config("either credentials_file or access_token must be set"))?;
        let key = ServiceAccountKey::from_file(path)?;
        Ok(Self::ServiceAccount(Box::new(ServiceAccountTokens::new(key, client)?)))
    }

    pub async fn token(&self) -> Result<String> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::ServiceAccount(tokens) => tokens.token().await,
        }
    }
}
