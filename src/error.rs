//! Error types for the anime list loader.

use thiserror::Error;

/// Errors from the backing store, for one owner group of a batch. These are
/// `Clone` because a single failure is handed to every caller in the group.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Database connection error.
    #[error("database connection error: {message}")]
    Connection { message: String },

    /// Database query error.
    #[error("database query error: {message}")]
    Query { message: String },

    /// A stored row couldn't be converted into a [`UserAnime`](crate::UserAnime).
    #[error("invalid user anime row: {message}")]
    Decode { message: String },
}

/// Wiring errors for request-scoped loaders. Unlike a missing item, these
/// mean the request was never set up to batch at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("no user anime loader in the current request scope")]
    LoaderMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
