//! Error types for the spreadsheet server.

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid listen address: {0}")]
    InvalidAddress(String),
}

pub type ServerResult<T> = Result<T, ServerError>;
