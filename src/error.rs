//! Error types for the analysis pipeline.
//!
//! Two families of errors exist:
//! - [`AppError`]: fatal conditions that abort a run (missing credentials,
//!   a failed news fetch, an unwritable output file, ...).
//! - [`AnalysisError`]: per-article failures while talking to the model or
//!   decoding its reply. These never abort a run; the analyzer substitutes a
//!   fallback analysis and records the reason.

use thiserror::Error;

/// Fatal errors that end a run with a non-zero exit code.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is absent or blank.
    #[error("missing credential: environment variable {var} is not set")]
    MissingCredential {
        /// Name of the missing variable.
        var: &'static str,
    },

    /// A run parameter is outside its accepted range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The settings file could not be read or decoded.
    #[error("configuration error: {0}")]
    Config(String),

    /// The news request failed or returned something unusable.
    #[error("news fetch failed: {reason}")]
    FetchFailed {
        /// Human-readable cause.
        reason: String,
    },

    /// The result document could not be written.
    #[error("failed to persist results: {reason}")]
    PersistFailed {
        /// Human-readable cause.
        reason: String,
    },
}

impl AppError {
    pub fn fetch(reason: impl Into<String>) -> Self {
        AppError::FetchFailed {
            reason: reason.into(),
        }
    }

    pub fn persist(reason: impl Into<String>) -> Self {
        AppError::PersistFailed {
            reason: reason.into(),
        }
    }
}

/// Reasons a single article could not be analyzed.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Transport-level failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The model endpoint answered with a non-success status.
    #[error("model endpoint returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// The completion carried no text.
    #[error("model reply was empty")]
    EmptyReply,

    /// No `{ ... }` object could be located in the reply.
    #[error("no JSON object found in model reply")]
    NoJson,

    /// A JSON object was found but did not decode.
    #[error("model reply is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// The decoded object is missing a field or holds a value outside its set.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Offending field name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

impl AnalysisError {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Timeouts, connection failures, rate limiting and server errors are
    /// transient; anything about the content of a reply is not.
    pub fn is_transient(&self) -> bool {
        match self {
            AnalysisError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            AnalysisError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_names_variable() {
        let e = AppError::MissingCredential {
            var: "OPENROUTER_API_KEY",
        };
        assert!(e.to_string().contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn test_fetch_helper_keeps_reason() {
        let e = AppError::fetch("status 429");
        assert!(matches!(e, AppError::FetchFailed { ref reason } if reason == "status 429"));
    }

    #[test]
    fn test_status_transience() {
        let rate_limited = AnalysisError::Status {
            status: 429,
            body: String::new(),
        };
        let server = AnalysisError::Status {
            status: 503,
            body: String::new(),
        };
        let bad_request = AnalysisError::Status {
            status: 400,
            body: String::new(),
        };
        assert!(rate_limited.is_transient());
        assert!(server.is_transient());
        assert!(!bad_request.is_transient());
    }

    #[test]
    fn test_parse_errors_are_not_transient() {
        assert!(!AnalysisError::NoJson.is_transient());
        assert!(!AnalysisError::EmptyReply.is_transient());
        let invalid = AnalysisError::InvalidField {
            field: "sentiment",
            reason: "bullish".to_string(),
        };
        assert!(!invalid.is_transient());
    }
}
