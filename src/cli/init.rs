//! Init command implementation

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::config::Config;
use crate::ledger::CheckpointLedger;
use crate::store::bootstrap_current_store;

pub fn run(config: &Config, overwrite: bool) -> Result<()> {
    let path = config.current_db_path();
    let created = bootstrap_current_store(&path, &config.bootstrap(overwrite))?;

    let conn = Connection::open(&path)
        .with_context(|| format!("opening current store {}", path.display()))?;
    CheckpointLedger::new(&conn)?;

    if created {
        println!("Created current store at {}", path.display());
    } else {
        println!(
            "Current store {} already exists, left untouched (use --overwrite to recreate).",
            path.display()
        );
    }
    Ok(())
}
