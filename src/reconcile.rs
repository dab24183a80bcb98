//! Identifier reconciliation over the legacy store
//!
//! Deleted memos leave gaps in the legacy id space. A counter-driven
//! migration resolves every requested id to the nearest id that exists.

use std::fmt;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{MigrateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// Smallest existing id >= requested
    Forward,
    /// Largest existing id <= requested
    Backward,
}

impl Direction {
    pub fn comparison(&self) -> &'static str {
        match self {
            Direction::Forward => ">=",
            Direction::Backward => "<=",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => f.write_str("forward"),
            Direction::Backward => f.write_str("backward"),
        }
    }
}

/// Map `id` to the nearest existing memo id in `direction`.
pub fn resolve(legacy: &Connection, id: i64, direction: Direction) -> Result<i64> {
    let sql = match direction {
        Direction::Forward => "SELECT id FROM memo WHERE id >= ? ORDER BY id ASC LIMIT 1",
        Direction::Backward => "SELECT id FROM memo WHERE id <= ? ORDER BY id DESC LIMIT 1",
    };

    let found: Option<i64> = legacy
        .query_row(sql, params![id], |row| row.get(0))
        .optional()
        .map_err(|source| MigrateError::Read {
            operation: "resolve memo id",
            id,
            source,
        })?;

    found.ok_or(MigrateError::NoMatch { id, direction })
}
