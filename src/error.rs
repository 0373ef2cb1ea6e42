//! Error types for generation and persistence
//!
//! Generation errors are classified by recoverability:
//! - Retryable: model call failed, timed out, or produced unusable output
//! - NonRetryable: configuration errors
//! - Conflict: another generation currently holds the slot

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by external collaborators (model, persona, history).
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Date-like input could not be turned into a `YYYY-MM-DD` key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateKeyError {
    #[error("Unsupported date type: {0}")]
    UnsupportedType(String),

    #[error("Timestamp out of range: {0}")]
    OutOfRange(String),
}

/// Persisting an artifact map to disk failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to serialize {path}: {message}")]
    Serialize { path: PathBuf, message: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error types for one generation attempt
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation already in progress")]
    AlreadyInProgress,

    #[error("No model provider available")]
    NoProvider,

    #[error("Model call failed: {0}")]
    Model(String),

    #[error("Model call timed out after {0} seconds")]
    Timeout(u64),

    #[error("Model output invalid after {attempts} attempts: {reason}")]
    Validation { attempts: usize, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl GenerationError {
    /// Returns true if a later attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::Model(_)
                | GenerationError::Timeout(_)
                | GenerationError::Validation { .. }
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            GenerationError::AlreadyInProgress => "Wait for the running generation to finish.",
            GenerationError::NoProvider => "Configure a model provider in ~/.lifeday/config.json",
            GenerationError::Model(_) => "Check the provider logs and try again.",
            GenerationError::Timeout(_) => "The model took too long. Try again or raise model_timeout_secs.",
            GenerationError::Validation { .. } => {
                "The model kept returning unusable output. Regenerate or adjust the prompt template."
            }
            GenerationError::Configuration(_) => "Check your configuration in ~/.lifeday/config.json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GenerationError::Timeout(30).is_retryable());
        assert!(GenerationError::Validation {
            attempts: 3,
            reason: "outfit empty".to_string()
        }
        .is_retryable());
        assert!(!GenerationError::AlreadyInProgress.is_retryable());
        assert!(!GenerationError::NoProvider.is_retryable());
    }

    #[test]
    fn test_validation_message_mentions_attempts() {
        let err = GenerationError::Validation {
            attempts: 3,
            reason: "style mismatch".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Model output invalid after 3 attempts: style mismatch"
        );
    }
}
