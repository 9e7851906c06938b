//! Error types for the Gemini client.
//!
//! [`GeminiError`] separates quota rejections, which carry the server's
//! suggested wait, from every other failure of the call. The dispatcher
//! only needs that distinction to pick a retry delay.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by a single `generateContent` call.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// HTTP 429 or `RESOURCE_EXHAUSTED`. `retry_after` is the server-suggested
    /// delay when the response carried one.
    #[error("quota exceeded: {message}")]
    QuotaExceeded {
        retry_after: Option<Duration>,
        message: String,
    },

    /// Any other non-success status (400 bad request, 500, 503, ...).
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Transport failure (DNS, connection refused, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A 2xx response whose body was not a valid `GenerateResponse`.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl GeminiError {
    pub fn is_quota(&self) -> bool {
        matches!(self, GeminiError::QuotaExceeded { .. })
    }

    /// Server-suggested delay, only ever present on quota errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GeminiError::QuotaExceeded { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_display() {
        let err = GeminiError::QuotaExceeded {
            retry_after: Some(Duration::from_secs(10)),
            message: "Resource has been exhausted".into(),
        };
        assert_eq!(err.to_string(), "quota exceeded: Resource has been exhausted");
        assert!(err.is_quota());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn api_error_is_not_quota() {
        let err = GeminiError::Api {
            status: 503,
            message: "The model is overloaded".into(),
        };
        assert_eq!(err.to_string(), "API error (status 503): The model is overloaded");
        assert!(!err.is_quota());
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GeminiError>();
    }
}
