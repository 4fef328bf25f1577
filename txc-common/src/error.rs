//! Shared error model for cross-crate APIs.

use thiserror::Error;

/// Unified result type used by all public interfaces of the session store.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error categories surfaced by the session store.
///
/// Absent read targets are values (`None` / empty lists), never errors; `NotFound` is raised only
/// by mutations that require prior state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A mutation required a record that no longer exists.
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// An optimistic transaction kept aborting against concurrent peers.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller paired an operation kind with the wrong record shape or handed in a
    /// malformed identifier.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backing store rejected a command or failed at the wire level.
    #[error("backing store error: {0}")]
    Backing(String),

    /// Codec failure or an otherwise unrecoverable internal state.
    #[error("internal error: {0}")]
    Internal(String),
}
