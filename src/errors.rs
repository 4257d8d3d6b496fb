use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid remote location: {0}")]
    InvalidDestination(String),

    #[error("Remote storage rejected the credentials: {0}")]
    Auth(String),

    #[error("Remote storage operation failed: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command execution failed ({status}): {stderr}")]
    Command { status: String, stderr: String },

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
