use std::path::PathBuf;

use thiserror::Error;

/// Core error type for the news pipeline and its delivery triggers.
#[derive(Debug, Error)]
pub enum TechNewsError {
    #[error("topic must not be empty")]
    InvalidTopic,
    #[error("invalid article query: {0}")]
    InvalidQuery(String),
    #[error("article source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("generation failed: {0}")]
    GenerationFailed(String),
    #[error("stage `{stage}` violated its output schema: {reason}")]
    SchemaViolation { stage: String, reason: String },
    #[error("no report string found in generation result")]
    ExtractionNotFound,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TechNewsError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    pub fn schema(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Transient generation failures are the only errors worth rerunning a pipeline for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GenerationFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, TechNewsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_generation_failures_are_retryable() {
        assert!(TechNewsError::GenerationFailed("timeout".into()).is_retryable());
        assert!(!TechNewsError::SourceUnavailable("down".into()).is_retryable());
        assert!(!TechNewsError::InvalidTopic.is_retryable());
        assert!(!TechNewsError::schema("extraction", "missing articles").is_retryable());
    }

    #[test]
    fn schema_violation_names_the_stage() {
        let err = TechNewsError::schema("synthesis", "report is blank");
        assert_eq!(
            err.to_string(),
            "stage `synthesis` violated its output schema: report is blank"
        );
    }
}
