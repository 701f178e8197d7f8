//! Error taxonomy for the document pipeline.
//!
//! Recoverable extraction errors never leave the section extractor; only
//! the fatal variants of [`PipelineError`] reach the batch runner, and each
//! of them aborts a single document.

use std::time::Duration;
use thiserror::Error;

/// A rule that could not be compiled from configuration.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule '{rule}': invalid pattern: {source}")]
    Pattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule '{rule}': {reason}")]
    Invalid { rule: String, reason: String },
}

/// Why a document could not be masked safely.
#[derive(Debug, Error)]
pub enum MaskingError {
    #[error("document looks binary (contains NUL bytes)")]
    BinaryContent,

    #[error("document is {size} bytes, above the {limit} byte masking limit")]
    TooLarge { size: usize, limit: usize },
}

/// Failure of a single extraction attempt.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("response is not a JSON object: {0}")]
    Parse(String),

    #[error("response violates the record schema: {0}")]
    SchemaViolation(String),

    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM request failed: {0}")]
    Transport(String),

    #[error("extraction cancelled")]
    Cancelled,

    #[error("document has no extractable text")]
    EmptyInput,
}

impl ExtractionError {
    /// Errors that trigger the retry-then-fallback policy.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExtractionError::Parse(_)
                | ExtractionError::SchemaViolation(_)
                | ExtractionError::Timeout(_)
                | ExtractionError::Transport(_)
        )
    }
}

/// Fatal, per-document pipeline failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("masking failed for {source_id}: {source}")]
    MaskingFailure {
        source_id: String,
        #[source]
        source: MaskingError,
    },

    #[error("no well-formed record could be produced for {source_id}: {source}")]
    ExtractionTotalFailure {
        source_id: String,
        #[source]
        source: ExtractionError,
    },

    #[error("processing of {0} was cancelled")]
    Cancelled(String),
}
