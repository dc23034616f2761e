//! Error types for codecat-providers

use codecat_core::CollaboratorError;
use thiserror::Error;

/// Errors raised while talking to a collaborator.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// A required credential is not configured
    #[error("{0} is not set")]
    MissingCredential(&'static str),

    /// Transport-level failure (connect, TLS, timeout, body read)
    #[error("HTTP error: {message}")]
    Http { message: String, transient: bool },

    /// Non-success HTTP status
    #[error("{endpoint} answered {status}: {message}")]
    Status {
        status: u16,
        endpoint: String,
        message: String,
        /// The service signalled an exhausted rate limit.
        rate_limited: bool,
    },

    /// The body did not have the expected shape
    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    /// Rejected before any request was made
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::Status { status: 404, .. })
    }

    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http { transient, .. } => *transient,
            ProviderError::Status {
                status,
                rate_limited,
                ..
            } => *rate_limited || matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_timeout() || err.is_connect() || err.is_request() || err.is_body();
        ProviderError::Http {
            message: err.to_string(),
            transient,
        }
    }
}

impl From<ProviderError> for CollaboratorError {
    fn from(err: ProviderError) -> Self {
        if err.is_transient() {
            CollaboratorError::Transient(err.to_string())
        } else {
            CollaboratorError::Permanent(err.to_string())
        }
    }
}

/// Turn a non-success response into [`ProviderError::Status`].
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    endpoint: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let rate_limited = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.to_string()
    } else {
        truncate_message(body.trim())
    };
    tracing::debug!(status = status.as_u16(), endpoint, rate_limited, "request rejected");
    Err(ProviderError::Status {
        status: status.as_u16(),
        endpoint: endpoint.to_string(),
        message,
        rate_limited,
    })
}

fn truncate_message(body: &str) -> String {
    const LIMIT: usize = 300;
    match body.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16, rate_limited: bool) -> ProviderError {
        ProviderError::Status {
            status: code,
            endpoint: "test".into(),
            message: "nope".into(),
            rate_limited,
        }
    }

    #[test]
    fn throttling_and_server_errors_are_transient() {
        for code in [408, 429, 500, 502, 503, 504] {
            assert!(status(code, false).is_transient(), "{code}");
        }
        assert!(status(403, true).is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        for code in [400, 401, 403, 404, 422] {
            assert!(!status(code, false).is_transient(), "{code}");
        }
        assert!(matches!(
            CollaboratorError::from(status(401, false)),
            CollaboratorError::Permanent(msg) if msg.contains("401")
        ));
        assert!(matches!(
            CollaboratorError::from(ProviderError::InvalidResponse("no choices".into())),
            CollaboratorError::Permanent(_)
        ));
    }

    #[test]
    fn not_found_is_recognised() {
        assert!(status(404, false).is_not_found());
        assert!(!status(410, false).is_not_found());
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1_000);
        let message = truncate_message(&body);
        assert_eq!(message.len(), 303);
        assert!(message.ends_with("..."));
    }
}
