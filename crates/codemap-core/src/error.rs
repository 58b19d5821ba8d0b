use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodeMapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Version control error: {0}")]
    Git(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, CodeMapError>;
