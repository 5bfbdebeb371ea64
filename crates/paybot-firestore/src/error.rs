//! Firestore error types.

use thiserror::Error;

/// Result type for Firestore operations.
pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Errors that can occur during Firestore operations.
#[derive(Debug, Error)]
pub enum FirestoreError {
    /// The service-account private key could not be imported. Fatal: nothing
    /// can be signed with a key that does not parse.
    #[error("invalid service account key: {0}")]
    KeyFormat(String),

    /// The token endpoint rejected our signed assertion.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The token exchange never reached the endpoint (DNS, connect, TLS).
    /// Callers may retry.
    #[error("transient auth failure: {0}")]
    TransientAuth(String),

    #[error("document not found: {0}")]
    NotFound(String),

    /// Non-2xx response from a document operation.
    #[error("store request failed (status {status}): {body}")]
    Store { status: u16, body: String },

    #[error("invalid query: {0}")]
    Validation(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FirestoreError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn transient_auth(msg: impl Into<String>) -> Self {
        Self::TransientAuth(msg.into())
    }

    pub fn key_format(msg: impl Into<String>) -> Self {
        Self::KeyFormat(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Map an HTTP error status and response body to an error variant.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            404 => Self::NotFound(body.into()),
            _ => Self::Store {
                status,
                body: body.into(),
            },
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::TransientAuth(_) => true,
            Self::Store { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }

    /// HTTP status associated with the error, when there is one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::NotFound(_) => Some(404),
            Self::Store { status, .. } => Some(*status),
            Self::Auth(_) => Some(401),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status_404() {
        let err = FirestoreError::from_http_status(404, "missing");
        assert!(matches!(err, FirestoreError::NotFound(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_from_http_status_500() {
        let err = FirestoreError::from_http_status(500, "internal error");
        assert!(matches!(err, FirestoreError::Store { status: 500, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_from_http_status_429() {
        let err = FirestoreError::from_http_status(429, "rate limited");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_from_http_status_400() {
        let err = FirestoreError::from_http_status(400, "bad request");
        assert!(matches!(err, FirestoreError::Store { status: 400, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_auth_errors_are_not_retried() {
        assert!(!FirestoreError::auth("rejected").is_retryable());
        assert!(FirestoreError::transient_auth("connect refused").is_retryable());
    }

    #[test]
    fn test_http_status_getter() {
        assert_eq!(
            FirestoreError::Store {
                status: 503,
                body: "unavailable".into()
            }
            .http_status(),
            Some(503)
        );
        assert_eq!(FirestoreError::not_found("doc").http_status(), Some(404));
        assert_eq!(FirestoreError::validation("bad op").http_status(), None);
    }
}
