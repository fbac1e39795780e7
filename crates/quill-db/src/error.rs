use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique-constraint violation on a user-supplied field. Surfaced to
    /// the caller as a correctable conflict, not a crash.
    #[error("{0} already in use")]
    Conflict(&'static str),

    #[error("database lock poisoned")]
    LockPoisoned,

    /// A stored value failed to parse back into its domain type.
    #[error("corrupt stored value: {0}")]
    Decode(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
