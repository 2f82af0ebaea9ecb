//! Error taxonomy for the Web API client
//!
//! Every failure the query compiler or the request pipeline can produce is a
//! [`DynamicsError`]. Rate-limit responses never surface directly: they are
//! retried inside the transport until the attempt budget runs out and then
//! become [`DynamicsError::RetryExhausted`].

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T, E = DynamicsError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DynamicsError {
    /// Non-2xx response whose status the caller did not declare as allowed.
    #[error("request failed with {} {reason}: {body}", .status.as_u16())]
    Transport {
        status: StatusCode,
        reason: String,
        body: String,
    },

    /// The server kept answering 429 past the configured attempt budget.
    #[error("rate limited: gave up after {attempts} attempts")]
    RetryExhausted { attempts: u32 },

    /// The identity endpoint rejected the credentials or returned a token
    /// payload that could not be understood.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    /// A response was missing something the protocol guarantees
    /// (retry timing, entity id header, envelope fields).
    #[error("malformed server response: {0}")]
    MalformedServerResponse(String),

    /// An expression was used in a position it cannot occupy.
    #[error("invalid filter composition: {0}")]
    InvalidFilterComposition(String),

    /// A required property or navigation resolved to an absent value.
    #[error("required property '{property}' is null or missing")]
    NullReferenceViolation { property: String },

    /// A property handle was constructed with an unusable name.
    #[error("invalid property: {0}")]
    InvalidProperty(String),

    /// The caller's cancellation token fired while the call was suspended.
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DynamicsError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedServerResponse(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Transport { status, .. } => Some(*status),
            Self::RetryExhausted { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            Self::Http(e) => e.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_renders_status_and_body() {
        let e = DynamicsError::Transport {
            status: StatusCode::NOT_FOUND,
            reason: "Not Found".into(),
            body: "{\"error\":\"missing\"}".into(),
        };
        assert_eq!(
            e.to_string(),
            "request failed with 404 Not Found: {\"error\":\"missing\"}"
        );
        assert_eq!(e.status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn cancellation_is_distinct() {
        assert!(DynamicsError::Cancelled.is_cancelled());
        assert!(!DynamicsError::malformed("x").is_cancelled());
        assert_eq!(
            DynamicsError::RetryExhausted { attempts: 5 }.status(),
            Some(StatusCode::TOO_MANY_REQUESTS)
        );
    }
}
