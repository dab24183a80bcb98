//! Resolve command implementation

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};

use crate::config::Config;
use crate::error::MigrateError;
use crate::reconcile::{self, Direction};

pub fn run(config: &Config, id: i64, backward: bool) -> Result<()> {
    let path = config.legacy_db_path();
    let legacy = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("opening legacy store {}", path.display()))?;

    let direction = if backward {
        Direction::Backward
    } else {
        Direction::Forward
    };

    match reconcile::resolve(&legacy, id, direction) {
        Ok(resolved) if resolved == id => println!("Memo {} exists.", id),
        Ok(resolved) => println!("Memo {} is missing; nearest {} is {}.", id, direction, resolved),
        Err(err @ MigrateError::NoMatch { .. }) => println!("{}", err),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
