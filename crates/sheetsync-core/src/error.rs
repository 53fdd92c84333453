//! Error types for persistence operations.

/// Errors the persistence layer can surface while loading or writing a
/// sheet file. Sheet-model operations (`set_cell`, `revert_cell`, ...)
/// reject bad requests with `bool`/`Option` per spec.md §4.3 rather than
/// this enum: request dispatch sends the same fixed `requestError` text
/// regardless of cause, so there's no caller that needs a reason code for
/// those.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
