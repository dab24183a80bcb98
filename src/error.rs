//! Typed errors raised by the gateway, reconciler and ledger
//!
//! None of these perform recovery; the driver decides whether an error ends
//! the loop or aborts the run.

use std::path::PathBuf;

use thiserror::Error;

use crate::reconcile::Direction;

pub type Result<T> = std::result::Result<T, MigrateError>;

#[derive(Debug, Error)]
pub enum MigrateError {
    /// Store file unreachable or uncreatable
    #[error("cannot open {store} store at {}: {source}", .path.display())]
    Connection {
        store: &'static str,
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot prepare current store at {}: {source}", .path.display())]
    InitScript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("memo {id} not found")]
    NotFound { id: i64 },

    #[error("no memo id {} {id}", .direction.comparison())]
    NoMatch { id: i64, direction: Direction },

    #[error("unsupported schema version '{0}'")]
    UnsupportedSchema(String),

    #[error("unknown resource storage type '{storage_type}' on memo {id}")]
    UnknownStorageType { id: i64, storage_type: String },

    #[error("{operation} failed for memo {id}: {source}")]
    Read {
        operation: &'static str,
        id: i64,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{operation} failed for memo {id}: {source}")]
    Write {
        operation: &'static str,
        id: i64,
        #[source]
        source: rusqlite::Error,
    },

    #[error("review of memo {id} failed: {source}")]
    Review {
        id: i64,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint ledger {operation} failed: {source}")]
    Ledger {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("checkpoint ledger has no segment to advance")]
    LedgerEmpty,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MigrateError {
    /// End-of-range signal for the driver loop rather than a failure
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NoMatch { .. })
    }
}
