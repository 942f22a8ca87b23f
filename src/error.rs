use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Callflow operations
#[derive(Error, Debug)]
pub enum CallflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parser error: {0}")]
    Parser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("No method encloses offset {offset} in {}", file.display())]
    NoEnclosingMethod { file: PathBuf, offset: usize },

    #[error("Source index out of date for {}: {reason}", file.display())]
    StaleSource { file: PathBuf, reason: String },

    #[error("Ambiguous call to {name}: candidates {candidates:?}")]
    AmbiguousCall { name: String, candidates: Vec<String> },

    #[error("Render error: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, CallflowError>;
