use thiserror::Error;

use crate::sites::SiteVisibilityError;

#[derive(Debug, Error)]
pub enum DataAccessError {
    /// A statement was issued with neither a resolved grant nor a bypass.
    /// Always a programming error.
    #[error("data access policy inputs required when not bypassing")]
    PolicyInputsRequired,

    #[error(transparent)]
    Sites(#[from] SiteVisibilityError),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid savepoint name '{0}'")]
    InvalidSavepoint(String),

    #[error("unsupported statement: {0}")]
    Unsupported(String),
}
