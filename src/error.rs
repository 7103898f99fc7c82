use thiserror::Error;

#[derive(Debug, Error)]
pub enum DefenseError {
    #[error("radio unavailable: {0}")]
    RadioUnavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DefenseError>;
