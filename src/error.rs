use thiserror::Error;

/// Failures that can occur while relaying a single request or sweeping the store.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The inbound webhook body was not a valid update.
    #[error("malformed update: {0}")]
    Parse(String),

    /// A Telegram Bot API call failed (transport, non-2xx, or `ok: false`).
    #[error("telegram api: {0}")]
    Upstream(String),

    /// The key-value store failed or held data we could not decode.
    #[error("storage: {0}")]
    Storage(String),
}

impl RelayError {
    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Parse(_) => "parse",
            RelayError::Upstream(_) => "upstream",
            RelayError::Storage(_) => "storage",
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Parse(e.to_string())
    }
}

/// Request URLs embed the bot token, so they never reach the message.
impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        RelayError::Upstream(e.without_url().to_string())
    }
}

impl From<rusqlite::Error> for RelayError {
    fn from(e: rusqlite::Error) -> Self {
        RelayError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_from_serde() {
        let err: RelayError = serde_json::from_str::<serde_json::Value>("{nope")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "parse");
        assert!(err.to_string().starts_with("malformed update"));
    }

    #[test]
    fn test_storage_message() {
        let err = RelayError::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "storage: disk full");
        assert_eq!(err.kind(), "storage");
    }
}
