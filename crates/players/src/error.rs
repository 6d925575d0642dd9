use thiserror::Error;

/// Errors from the player-store backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("player not found")]
    NotFound,

    #[error("player name already taken")]
    Duplicate,

    #[error("storage backend: {0}")]
    Backend(String),
}

/// Authentication and credential errors.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("invalid token format")]
    InvalidFormat,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("credential hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
