use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure of a single generation run. Recorded on the owning job, never retried here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GenerationError {
    Timeout { after_ms: u64 },
    Unrepairable(String),
    NoValidResults { received: usize },
    /// Every chunk fell below the similarity threshold.
    NoRelevantContext { candidates: usize },
    Provider(String),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::Timeout { after_ms } => {
                write!(f, "Generation timed out after {} ms", after_ms)
            }
            GenerationError::Unrepairable(msg) => {
                write!(f, "Generation output could not be repaired: {}", msg)
            }
            GenerationError::NoValidResults { received } => write!(
                f,
                "Generation produced no valid test cases ({} received)",
                received
            ),
            GenerationError::NoRelevantContext { candidates } => write!(
                f,
                "No document excerpt met the similarity threshold ({} chunks ranked)",
                candidates
            ),
            GenerationError::Provider(msg) => write!(f, "Generation provider failed: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportError {
    MissingColumn(String),
    Decode(String),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::MissingColumn(column) => {
                write!(f, "CSV is missing required column: {}", column)
            }
            ImportError::Decode(msg) => write!(f, "CSV could not be decoded: {}", msg),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub enum AppError {
    Internal(String),
    NotFound(String),
    ValidationError(String),
    ParseError(String),
    LLMError(String),
    DatabaseError(String),
    IoError(String),
    ConfigError(String),
    InvalidState(String),
    Generation(GenerationError),
    Import(ImportError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AppError::LLMError(msg) => write!(f, "LLM error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::IoError(msg) => write!(f, "IO error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            AppError::Generation(err) => write!(f, "{}", err),
            AppError::Import(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        AppError::Generation(err)
    }
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        AppError::Import(err)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
