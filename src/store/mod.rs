//! Schema gateway over the legacy (v0.21.0) and current (v0.17.1) stores
//!
//! Owns one connection per store and exposes version-aware reads and writes
//! for memos and resources. Migration policy lives in `crate::migrate`,
//! which also logs the failures returned from here.

mod records;
mod schema;

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, DatabaseName, OpenFlags, OptionalExtension};
use tracing::{error, info};

use crate::error::{MigrateError, Result};
use crate::reconcile::{self, Direction};

pub use records::{
    CurrentResource, LegacyResource, Note, Resource, RowStatus, SchemaVersion, StorageType,
    Visibility,
};
pub use schema::{CURRENT_INIT_SCRIPT, LEDGER_SCHEMA};

/// How the current store is created when absent
#[derive(Debug, Clone, Default)]
pub struct Bootstrap {
    /// DDL batch to apply; the bundled v0.17.1 script when `None`
    pub script: Option<PathBuf>,
    /// Remove an existing current store and create it again
    pub overwrite: bool,
}

/// Create the current store from the init script.
///
/// Returns `false` without touching the file when it already exists and
/// `overwrite` is not set.
pub fn bootstrap_current_store(path: &Path, bootstrap: &Bootstrap) -> Result<bool> {
    let init_error = |source| MigrateError::InitScript {
        path: path.to_path_buf(),
        source,
    };

    if path.is_file() {
        if !bootstrap.overwrite {
            info!(path = %path.display(), "current store already exists, reusing it");
            return Ok(false);
        }
        std::fs::remove_file(path).map_err(init_error)?;
        info!(path = %path.display(), "removed existing current store");
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(init_error)?;
    }

    let script = match &bootstrap.script {
        Some(script_path) => {
            std::fs::read_to_string(script_path).map_err(|source| MigrateError::InitScript {
                path: script_path.clone(),
                source,
            })?
        }
        None => CURRENT_INIT_SCRIPT.to_string(),
    };

    let applied = Connection::open(path).and_then(|conn| conn.execute_batch(&script));
    if let Err(source) = applied {
        error!(path = %path.display(), %source, "init script failed");
        // Leave no half-initialized file behind for the next run to reuse
        let _ = std::fs::remove_file(path);
        return Err(MigrateError::Connection {
            store: "current",
            path: path.to_path_buf(),
            source,
        });
    }

    info!(path = %path.display(), "created current store");
    Ok(true)
}

fn open_writable(store: &'static str, path: &Path, flags: OpenFlags) -> Result<Connection> {
    let connection_error = |source| MigrateError::Connection {
        store,
        path: path.to_path_buf(),
        source,
    };

    let conn = Connection::open_with_flags(path, flags).map_err(connection_error)?;

    // SQLite silently falls back to read-only on write-protected files
    if conn.is_readonly(DatabaseName::Main).map_err(connection_error)? {
        return Err(connection_error(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_READONLY),
            Some("store is not writable".to_string()),
        )));
    }

    Ok(conn)
}

/// The two store connections used by a migration run
pub struct Stores {
    legacy: Connection,
    current: Connection,
}

impl Stores {
    /// Open the legacy store and the current store, creating the latter
    /// from the init script when it does not exist yet.
    pub fn open(legacy_path: &Path, current_path: &Path, bootstrap: &Bootstrap) -> Result<Self> {
        let base = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        // Never create the legacy store: a wrong path must fail loudly
        let legacy = open_writable("legacy", legacy_path, base)?;

        bootstrap_current_store(current_path, bootstrap)?;
        let current = open_writable("current", current_path, base | OpenFlags::SQLITE_OPEN_CREATE)?;

        info!(
            legacy = %legacy_path.display(),
            current = %current_path.display(),
            "stores opened"
        );
        Ok(Self { legacy, current })
    }

    pub fn legacy(&self) -> &Connection {
        &self.legacy
    }

    pub fn current(&self) -> &Connection {
        &self.current
    }

    /// Nearest existing legacy memo id in `direction`
    pub fn resolve(&self, id: i64, direction: Direction) -> Result<i64> {
        reconcile::resolve(&self.legacy, id, direction)
    }

    /// Highest memo id in the legacy store, `None` when it holds no memos
    pub fn max_note_id(&self) -> Result<Option<i64>> {
        self.legacy
            .query_row("SELECT MAX(id) FROM memo", [], |row| row.get(0))
            .map_err(|source| MigrateError::Read {
                operation: "max memo id",
                id: 0,
                source,
            })
    }

    // ============================================
    // MEMOS
    // ============================================

    /// Read the legacy memo with exactly this id
    pub fn read_note(&self, id: i64) -> Result<Note> {
        let note = self
            .legacy
            .query_row(
                "SELECT id, creator_id, created_ts, updated_ts, content, row_status, visibility
                 FROM memo WHERE id = ?",
                params![id],
                |row| {
                    Ok(Note {
                        id: row.get(0)?,
                        creator_id: row.get(1)?,
                        created_ts: row.get(2)?,
                        updated_ts: row.get(3)?,
                        content: row.get(4)?,
                        row_status: row.get(5)?,
                        visibility: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(|source| MigrateError::Read {
                operation: "read note",
                id,
                source,
            })?;

        note.ok_or(MigrateError::NotFound { id })
    }

    /// Insert or fully replace the current memo with `note.id`
    pub fn write_note(&self, note: &Note) -> Result<()> {
        self.current
            .execute(
                "INSERT OR REPLACE INTO memo
                 (id, created_ts, updated_ts, creator_id, row_status, visibility, content)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    note.id,
                    note.created_ts,
                    note.updated_ts,
                    note.creator_id,
                    note.row_status,
                    note.visibility,
                    note.content,
                ],
            )
            .map_err(|source| MigrateError::Write {
                operation: "write note",
                id: note.id,
                source,
            })?;
        Ok(())
    }

    // ============================================
    // RESOURCES
    // ============================================

    fn ensure_legacy_note(&self, memo_id: i64) -> Result<()> {
        let exists: bool = self
            .legacy
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM memo WHERE id = ?)",
                params![memo_id],
                |row| row.get(0),
            )
            .map_err(|source| MigrateError::Read {
                operation: "check memo",
                id: memo_id,
                source,
            })?;

        if exists {
            Ok(())
        } else {
            Err(MigrateError::NotFound { id: memo_id })
        }
    }

    /// Resources attached to `memo_id` in the store of `version`, by row id
    pub fn read_resources(&self, memo_id: i64, version: SchemaVersion) -> Result<Vec<Resource>> {
        self.ensure_legacy_note(memo_id)?;

        let read_error = |source| MigrateError::Read {
            operation: "read resources",
            id: memo_id,
            source,
        };

        match version {
            SchemaVersion::Legacy => {
                let mut stmt = self
                    .legacy
                    .prepare(
                        r#"SELECT id, memo_id, creator_id, created_ts, updated_ts, filename,
                                  blob, type, size, storage_type, reference
                           FROM resource
                           WHERE memo_id = ?
                           ORDER BY id ASC"#,
                    )
                    .map_err(read_error)?;

                let rows = stmt
                    .query_map(params![memo_id], |row| {
                        Ok(Resource::Legacy(LegacyResource {
                            id: row.get(0)?,
                            memo_id: row.get(1)?,
                            creator_id: row.get(2)?,
                            created_ts: row.get(3)?,
                            updated_ts: row.get(4)?,
                            filename: row.get(5)?,
                            blob: row.get(6)?,
                            resource_type: row.get(7)?,
                            size: row.get(8)?,
                            storage_type: row.get(9)?,
                            reference: row.get(10)?,
                        }))
                    })
                    .map_err(read_error)?;

                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(read_error)
            }
            SchemaVersion::Current => {
                let mut stmt = self
                    .current
                    .prepare(
                        r#"SELECT id, memo_id, creator_id, created_ts, updated_ts, filename,
                                  blob, external_link, type, size, internal_path
                           FROM resource
                           WHERE memo_id = ?
                           ORDER BY id ASC"#,
                    )
                    .map_err(read_error)?;

                let rows = stmt
                    .query_map(params![memo_id], |row| {
                        Ok(Resource::Current(CurrentResource {
                            id: row.get(0)?,
                            memo_id: row.get(1)?,
                            creator_id: row.get(2)?,
                            created_ts: row.get(3)?,
                            updated_ts: row.get(4)?,
                            filename: row.get(5)?,
                            blob: row.get(6)?,
                            external_link: row.get(7)?,
                            resource_type: row.get(8)?,
                            size: row.get(9)?,
                            internal_path: row.get(10)?,
                        }))
                    })
                    .map_err(read_error)?;

                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(read_error)
            }
        }
    }

    /// Insert a resource row. Never replaces: sending the same resource
    /// twice stores it twice.
    pub fn write_resource(&self, resource: &CurrentResource, version: SchemaVersion) -> Result<i64> {
        if version != SchemaVersion::Current {
            return Err(MigrateError::UnsupportedSchema(version.tag().to_string()));
        }

        self.current
            .execute(
                r#"INSERT INTO resource
                   (memo_id, creator_id, created_ts, updated_ts, filename, blob,
                    external_link, type, size, internal_path)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    resource.memo_id,
                    resource.creator_id,
                    resource.created_ts,
                    resource.updated_ts,
                    resource.filename,
                    resource.blob,
                    resource.external_link,
                    resource.resource_type,
                    resource.size,
                    resource.internal_path,
                ],
            )
            .map_err(|source| MigrateError::Write {
                operation: "write resource",
                id: resource.memo_id,
                source,
            })?;

        Ok(self.current.last_insert_rowid())
    }

    /// Number of resources already attached to `memo_id` in the current store
    pub fn count_resources(&self, memo_id: i64) -> Result<i64> {
        self.current
            .query_row(
                "SELECT COUNT(*) FROM resource WHERE memo_id = ?",
                params![memo_id],
                |row| row.get(0),
            )
            .map_err(|source| MigrateError::Read {
                operation: "count resources",
                id: memo_id,
                source,
            })
    }
}
