//! Error types for Gmail API operations.

/// Result type alias for Gmail API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Gmail API error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection, TLS or request construction failure.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Server answered 429.
    #[error("Rate limited by server (retry-after: {retry_after:?})")]
    RateLimited {
        /// Raw `Retry-After` header value, if the server sent one.
        retry_after: Option<String>,
    },

    /// Server answered 401. Credentials must be refreshed by the caller.
    #[error("Unauthorized: access token rejected")]
    Unauthorized,

    /// The history cursor is too old for an incremental query.
    #[error("History cursor expired")]
    CursorExpired,

    /// The requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },

    /// Response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The circuit breaker rejected the call without touching the network.
    #[error("Circuit breaker is open")]
    CircuitOpen,

    /// Retry ceiling reached.
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last failure.
        last_error: String,
    },
}

impl Error {
    /// Creates a status error, truncating long bodies.
    #[must_use]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.len() > 512 {
            let mut cut = 512;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Self::Status { status, body }
    }

    /// Returns true if the failure is transient and worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RateLimited { .. } | Self::Status { .. } | Self::Decode(_)
        )
    }

    /// Returns true if no local recovery is possible and the caller must act.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::CircuitOpen | Self::MaxRetriesExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_body_truncated() {
        let err = Error::status(500, "x".repeat(2000));
        match err {
            Error::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), 512);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_classification() {
        assert!(Error::RateLimited { retry_after: None }.is_retryable());
        assert!(Error::status(503, "").is_retryable());
        assert!(!Error::Unauthorized.is_retryable());
        assert!(Error::Unauthorized.is_terminal());
        assert!(Error::CircuitOpen.is_terminal());
        assert!(!Error::CursorExpired.is_terminal());
        assert!(!Error::CursorExpired.is_retryable());
    }
}
