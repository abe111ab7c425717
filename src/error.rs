//! Error types for the pseudonymization core

use thiserror::Error;

/// Errors raised by the mapping engine and its detectors
#[derive(Debug, Error)]
pub enum PseudonymError {
    /// A mapping document could not be parsed, or violates a mapping invariant.
    /// The mapping it was meant to replace is left untouched.
    #[error("malformed mapping document: {reason}")]
    MalformedMapping { reason: String },

    /// The entity detector capability failed or is unavailable
    #[error("entity detector '{detector}' failed: {message}")]
    Detection { detector: String, message: String },

    /// A custom pattern rule did not compile
    #[error("invalid pattern '{name}'")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    /// Empty literals would match at every position of every text
    #[error("literal must not be empty")]
    EmptyLiteral,
}

impl PseudonymError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMapping {
            reason: reason.into(),
        }
    }

    pub(crate) fn detection(detector: &str, message: impl std::fmt::Display) -> Self {
        Self::Detection {
            detector: detector.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether this is a mapping document parse failure
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::MalformedMapping { .. })
    }

    /// Whether this is a detector capability failure
    pub fn is_detection_error(&self) -> bool {
        matches!(self, Self::Detection { .. })
    }
}

pub type Result<T, E = PseudonymError> = std::result::Result<T, E>;
