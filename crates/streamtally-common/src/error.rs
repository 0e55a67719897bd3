//! Error types for streamtally

use thiserror::Error;

/// Result type alias for streamtally operations
pub type Result<T> = std::result::Result<T, TallyError>;

/// Main error type for streamtally
#[derive(Error, Debug)]
pub enum TallyError {
    /// Missing or invalid settings; fatal before any channel is processed
    #[error("Configuration error: {0}")]
    Config(String),

    /// The start signal could not be decoded
    #[error("Invalid trigger event: {0}")]
    Trigger(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote API answered, but not with what was asked for
    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

impl TallyError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn trigger(msg: impl Into<String>) -> Self {
        Self::Trigger(msg.into())
    }

    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_convert() {
        let err: TallyError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, TallyError::Io(_)));
        assert_eq!(err.to_string(), "IO error: gone");
    }

    #[test]
    fn test_display_includes_context() {
        let err = TallyError::api("search returned 403");
        assert_eq!(err.to_string(), "API error: search returned 403");
    }
}
