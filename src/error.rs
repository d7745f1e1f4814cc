use std::path::PathBuf;

use thiserror::Error;

/// Every failure the engine can report, tagged by kind.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Model configuration document is missing or malformed.
    #[error("config error: {0}")]
    Config(String),

    /// Registry document is missing, malformed, or has no usable active entry.
    #[error("registry error: {0}")]
    Registry(String),

    /// The active entry points at a file that does not exist.
    #[error("Serialized model not found at {}", path.display())]
    ArtifactNotFound { path: PathBuf },

    /// Payload keys do not match the training schema, or a value is not numeric.
    #[error("Invalid payload: {0}")]
    Validation(String),

    /// The artifact exposes no usable capability or returned unusable scores.
    #[error("model interface error: {0}")]
    ModelInterface(String),

    /// Ensemble vote was called with unusable sub-model inputs or weights.
    #[error("ensemble input error: {0}")]
    EnsembleInput(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Registry,
    ArtifactNotFound,
    Validation,
    ModelInterface,
    EnsembleInput,
}

/// Whether the failure was caused by the request or by the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Caller,
    System,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Config(_) => ErrorKind::Config,
            EngineError::Registry(_) => ErrorKind::Registry,
            EngineError::ArtifactNotFound { .. } => ErrorKind::ArtifactNotFound,
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::ModelInterface(_) => ErrorKind::ModelInterface,
            EngineError::EnsembleInput(_) => ErrorKind::EnsembleInput,
        }
    }

    pub fn severity(&self) -> Severity {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::EnsembleInput => Severity::Caller,
            _ => Severity::System,
        }
    }

    pub fn is_caller_error(&self) -> bool {
        self.severity() == Severity::Caller
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_and_system_errors_are_split() {
        assert!(EngineError::Validation("x".into()).is_caller_error());
        assert!(EngineError::EnsembleInput("x".into()).is_caller_error());
        assert_eq!(
            EngineError::Registry("x".into()).severity(),
            Severity::System
        );
        let missing = EngineError::ArtifactNotFound {
            path: PathBuf::from("/nope/model.json"),
        };
        assert_eq!(missing.kind(), ErrorKind::ArtifactNotFound);
        assert!(!missing.is_caller_error());
        assert!(missing.to_string().contains("/nope/model.json"));
    }
}
