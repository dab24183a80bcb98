//! Status command implementation

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::config::Config;
use crate::ledger::CheckpointLedger;

pub fn run(config: &Config, json: bool) -> Result<()> {
    let path = config.current_db_path();
    if !path.is_file() {
        println!("No current store at {}. Run 'memos-migrate init' first.", path.display());
        return Ok(());
    }

    let conn = Connection::open(&path)
        .with_context(|| format!("opening current store {}", path.display()))?;
    let ledger = CheckpointLedger::new(&conn)?;
    let segments = ledger.segments()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&segments)?);
        return Ok(());
    }

    if segments.is_empty() {
        println!("No migration segments yet. Run 'memos-migrate run' first.");
        return Ok(());
    }

    println!(
        "{:<5} {:<17} {:<8} {:<8} {:<8} {:<9} {:<10} {}",
        "#", "Started", "From", "To", "Items", "Hours", "Per hour", "State"
    );
    println!("{}", "-".repeat(80));

    for segment in &segments {
        let end = segment
            .end_memo_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let state = if segment.reoffers_start() {
            "open*"
        } else if segment.is_open() {
            "open"
        } else {
            "closed"
        };

        println!(
            "{:<5} {:<17} {:<8} {:<8} {:<8} {:<9.3} {:<10.1} {}",
            segment.id,
            segment.start_time.format("%Y-%m-%d %H:%M"),
            segment.start_memo_id,
            end,
            segment.items_migrated,
            segment.elapsed_time_hours,
            segment.throughput,
            state,
        );
    }

    if segments.last().map_or(false, |segment| segment.reoffers_start()) {
        println!(
            "\n* Only the first memo of this segment was confirmed. It will be offered again \
             and its current content replaced; use 'run --interactive' to review it."
        );
    }
    println!("\nNext run starts at memo {}", ledger.resume_point()?);
    Ok(())
}
