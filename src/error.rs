use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchCgError {
    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Solve error: {0}")]
    Solve(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BatchCgError>;
