//! Error types shared by the ORM runtime.

use thiserror::Error;

/// Failures raised while resolving models, records, or stores.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Attempted to write through a read-only surface, such as a view
    /// model or a reserved collection member.
    #[error("{0} is read only")]
    ReadOnly(String),

    /// No store matched the requested name, or the stack was empty.
    #[error("no matching active store")]
    StoreNotFound(Option<String>),

    /// A key path did not resolve to any schema member.
    #[error("invalid field: {0}")]
    InvalidField(String),

    /// A fetch key did not line up with the schema's key fields.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The store has no backend attached.
    #[error("store has no backend configured")]
    NoBackend,

    /// An error surfaced by the underlying storage driver.
    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl OrmError {
    /// Wraps an arbitrary driver error.
    pub fn database(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Database(err.into())
    }
}

pub type Result<T> = std::result::Result<T, OrmError>;
