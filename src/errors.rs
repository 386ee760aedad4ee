//! Error types for the invoice validation pipeline
//!
//! A single error enum covers every stage. `PipelineError::kind` maps each
//! variant onto the failure taxonomy the orchestrator reports to consumers.

use thiserror::Error;

/// Main error type for the invoice validation pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Parse stage produced no structured invoice
    #[error("Parser failed to return invoice JSON: {0}")]
    ParseFailed(String),

    /// A task executor raised while running a stage
    #[error("{stage} executor failed: {message}")]
    ExecutorError { stage: String, message: String },

    /// Compliance rule engine failure (normally absorbed into a degraded report)
    #[error("Rule engine error: {0}")]
    RuleEngineError(String),

    /// Executor exceeded the stage timeout
    #[error("{stage} stage timed out after {duration_ms}ms")]
    Timeout { stage: String, duration_ms: u64 },

    /// Consumer closed or dropped the event stream
    #[error("Event consumer went away; run cancelled")]
    Cancelled,

    /// State machine transition errors
    #[error("Invalid state transition from {from:?} to {to:?}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// Input file type is not one of pdf/png/jpg/jpeg/json/csv
    #[error("Unsupported file format: {0}")]
    UnsupportedFileType(String),

    /// Raw text could not be extracted from a document
    #[error("Text extraction failed: {0}")]
    ExtractionError(String),

    /// Ollama API errors
    #[error("Ollama API error: {0}")]
    OllamaApiError(String),

    /// Streaming errors
    #[error("Streaming error: {0}")]
    StreamingError(String),

    /// JSON parsing errors
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{0}")]
    Generic(String),
}

/// Coarse failure classes surfaced by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No structured result from the parse stage (fatal)
    ParseFailed,

    /// An executor raised, timed out, or returned the wrong output
    ExecutorError,

    /// Rule engine failure
    RuleEngineError,

    /// Consumer abandoned the run
    Cancelled,

    /// Anything outside the pipeline taxonomy
    Other,
}

impl PipelineError {
    /// Build an executor error for the given stage
    pub fn executor(stage: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::ExecutorError {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::ParseFailed(_) => ErrorKind::ParseFailed,
            PipelineError::ExecutorError { .. }
            | PipelineError::Timeout { .. }
            | PipelineError::OllamaApiError(_)
            | PipelineError::StreamingError(_)
            | PipelineError::JsonParseError(_)
            | PipelineError::HttpError(_) => ErrorKind::ExecutorError,
            PipelineError::RuleEngineError(_) => ErrorKind::RuleEngineError,
            PipelineError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Convert anyhow errors to PipelineError
impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Generic(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::Timeout {
            stage: "Parse".to_string(),
            duration_ms: 3000,
        };
        assert!(err.to_string().contains("Parse"));
        assert!(err.to_string().contains("3000"));
    }

    #[test]
    fn test_parse_failed_display() {
        let err = PipelineError::ParseFailed("no JSON object in output".to_string());
        assert!(err.to_string().starts_with("Parser failed to return invoice JSON"));
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            PipelineError::ParseFailed("x".into()).kind(),
            ErrorKind::ParseFailed
        );
        assert_eq!(
            PipelineError::executor("Report", "boom").kind(),
            ErrorKind::ExecutorError
        );
        assert_eq!(
            PipelineError::Timeout { stage: "Validate".into(), duration_ms: 1 }.kind(),
            ErrorKind::ExecutorError
        );
        assert_eq!(
            PipelineError::RuleEngineError("x".into()).kind(),
            ErrorKind::RuleEngineError
        );
        assert_eq!(PipelineError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            PipelineError::ConfigError("x".into()).kind(),
            ErrorKind::Other
        );
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = PipelineError::InvalidTransition {
            from: "Parsing".to_string(),
            to: "Init".to_string(),
            reason: "Cannot go backwards".to_string(),
        };
        assert!(err.to_string().contains("Parsing"));
        assert!(err.to_string().contains("Init"));
    }
}
