pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod migrate;
pub mod reconcile;
pub mod review;
pub mod store;
pub mod taxonomy;

pub use config::Config;
pub use error::{MigrateError, Result};
pub use ledger::{CheckpointLedger, Segment};
pub use migrate::{MigrationSession, RunOptions, RunSummary};
pub use store::Stores;
