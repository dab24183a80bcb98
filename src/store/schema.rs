//! SQLite schema definitions
//!
//! - CURRENT_INIT_SCRIPT: bundled v0.17.1 DDL, used when no init script is configured
//! - LEGACY_SCHEMA: v0.21.0 memo/resource tables (fixture for tests)
//! - LEDGER_SCHEMA: checkpoint segments, stored next to the migrated data

pub const CURRENT_INIT_SCRIPT: &str = include_str!("../../assets/memos_0171_struct.sql");

#[cfg(test)]
pub const LEGACY_SCHEMA: &str = include_str!("../../assets/memos_0210_struct.sql");

pub const LEDGER_SCHEMA: &str = r#"
-- ============================================
-- MIGRATION CHECKPOINTS
-- ============================================

-- One row per run segment. A row whose start_memo_id equals its
-- end_memo_id has made no progress and is retried from the same start.
CREATE TABLE IF NOT EXISTS migration_checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    start_time TEXT NOT NULL,              -- RFC 3339
    end_time TEXT,                         -- RFC 3339, mirrors start_time until advanced
    start_memo_id INTEGER NOT NULL,
    end_memo_id INTEGER,
    elapsed_time_hours REAL NOT NULL DEFAULT 0,
    items_migrated INTEGER NOT NULL DEFAULT 0,   -- end_memo_id - start_memo_id
    throughput REAL NOT NULL DEFAULT 0           -- items per hour, 0 when elapsed is 0
);
"#;
