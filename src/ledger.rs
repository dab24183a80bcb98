//! Checkpoint ledger: append-only progress segments in the current store
//!
//! Each run opens one segment with start == end and moves its end forward
//! as memos are confirmed. The next run resumes after the last confirmed
//! id, or retries the same start when the previous segment made no progress.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{MigrateError, Result};
use crate::store::LEDGER_SCHEMA;

/// One open-to-close span of migration progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub start_memo_id: i64,
    pub end_memo_id: Option<i64>,
    pub elapsed_time_hours: f64,
    pub items_migrated: i64,
    pub throughput: f64,
}

impl Segment {
    /// No progress recorded yet (fresh run, or a run that died before its first memo)
    pub fn is_open(&self) -> bool {
        self.end_memo_id.map_or(true, |end| end == self.start_memo_id)
    }

    /// Open even though its start memo was confirmed. The next run offers
    /// that memo again and rewrites whatever review it received.
    pub fn reoffers_start(&self) -> bool {
        self.is_open() && self.end_time.map_or(false, |end| end > self.start_time)
    }
}

fn ledger_error(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> MigrateError {
    move |source| MigrateError::Ledger { operation, source }
}

fn parse_time(idx: usize, text: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn map_segment(row: &rusqlite::Row) -> rusqlite::Result<Segment> {
    let end_time: Option<String> = row.get(2)?;
    Ok(Segment {
        id: row.get(0)?,
        start_time: parse_time(1, row.get(1)?)?,
        end_time: end_time.map(|t| parse_time(2, t)).transpose()?,
        start_memo_id: row.get(3)?,
        end_memo_id: row.get(4)?,
        elapsed_time_hours: row.get(5)?,
        items_migrated: row.get(6)?,
        throughput: row.get(7)?,
    })
}

const SEGMENT_COLUMNS: &str = "id, start_time, end_time, start_memo_id, end_memo_id, \
                               elapsed_time_hours, items_migrated, throughput";

/// Single writer over the `migration_checkpoints` table
pub struct CheckpointLedger<'a> {
    conn: &'a Connection,
}

impl<'a> CheckpointLedger<'a> {
    pub fn new(conn: &'a Connection) -> Result<Self> {
        conn.execute_batch(LEDGER_SCHEMA)
            .map_err(ledger_error("create table"))?;
        Ok(Self { conn })
    }

    /// Most recently inserted segment
    pub fn latest(&self) -> Result<Option<Segment>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM migration_checkpoints ORDER BY id DESC LIMIT 1",
                    SEGMENT_COLUMNS
                ),
                [],
                map_segment,
            )
            .optional()
            .map_err(ledger_error("read latest segment"))
    }

    /// All segments, oldest first
    pub fn segments(&self) -> Result<Vec<Segment>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM migration_checkpoints ORDER BY id ASC",
                SEGMENT_COLUMNS
            ))
            .map_err(ledger_error("list segments"))?;

        let rows = stmt
            .query_map([], map_segment)
            .map_err(ledger_error("list segments"))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ledger_error("list segments"))
    }

    /// Id the next run should start from
    pub fn resume_point(&self) -> Result<i64> {
        match self.latest()? {
            None => {
                info!("no checkpoint segments yet, starting from the first memo");
                Ok(1)
            }
            Some(segment) if segment.reoffers_start() => {
                warn!(
                    start_memo_id = segment.start_memo_id,
                    "previous segment only confirmed its start, that memo will be migrated again"
                );
                Ok(segment.start_memo_id)
            }
            Some(segment) if segment.is_open() => {
                info!(
                    start_memo_id = segment.start_memo_id,
                    "previous segment made no progress, retrying its start"
                );
                Ok(segment.start_memo_id)
            }
            Some(segment) => Ok(segment.end_memo_id.unwrap_or(segment.start_memo_id) + 1),
        }
    }

    pub fn begin(&self) -> Result<i64> {
        self.begin_at(Utc::now())
    }

    /// Open a new segment at the resume point and return that id.
    pub fn begin_at(&self, now: DateTime<Utc>) -> Result<i64> {
        let start_id = self.resume_point()?;
        let stamp = now.to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO migration_checkpoints (start_time, end_time, start_memo_id, end_memo_id)
                 VALUES (?, ?, ?, ?)",
                params![stamp, stamp, start_id, start_id],
            )
            .map_err(ledger_error("open segment"))?;

        info!(start_memo_id = start_id, start_time = %stamp, "checkpoint segment opened");
        Ok(start_id)
    }

    pub fn advance(&self, end_id: i64) -> Result<Segment> {
        self.advance_at(end_id, Utc::now())
    }

    /// Move the most recent segment's end to `end_id` and recompute its
    /// elapsed time, item count and throughput.
    pub fn advance_at(&self, end_id: i64, now: DateTime<Utc>) -> Result<Segment> {
        let segment = self.latest()?.ok_or(MigrateError::LedgerEmpty)?;

        let elapsed_time_hours =
            ((now - segment.start_time).num_milliseconds() as f64 / 3_600_000.0).max(0.0);
        let items_migrated = end_id - segment.start_memo_id;
        let throughput = if elapsed_time_hours > 0.0 {
            items_migrated as f64 / elapsed_time_hours
        } else {
            0.0
        };

        self.conn
            .execute(
                "UPDATE migration_checkpoints
                 SET end_time = ?, end_memo_id = ?, elapsed_time_hours = ?,
                     items_migrated = ?, throughput = ?
                 WHERE id = ?",
                params![
                    now.to_rfc3339(),
                    end_id,
                    elapsed_time_hours,
                    items_migrated,
                    throughput,
                    segment.id
                ],
            )
            .map_err(ledger_error("advance segment"))?;

        info!(end_memo_id = end_id, items_migrated, "checkpoint advanced");

        Ok(Segment {
            end_time: Some(now),
            end_memo_id: Some(end_id),
            elapsed_time_hours,
            items_migrated,
            throughput,
            ..segment
        })
    }
}
