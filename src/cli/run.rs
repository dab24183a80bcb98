//! Run command implementation

use std::io;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::migrate::{self, MigrationSession, RunOptions};
use crate::review::{PassThrough, TerminalReviewer};

pub fn run(config: &Config, to: Option<i64>, interactive: bool, resources: bool) -> Result<()> {
    let session = MigrationSession::open(config, &config.bootstrap(false))
        .context("opening stores")?;

    let options = RunOptions {
        upper_bound: to,
        migrate_resources: resources,
    };

    let summary = if interactive {
        let mut reviewer = TerminalReviewer::new(io::stdin().lock(), io::stdout());
        migrate::run(&session, &mut reviewer, options)?
    } else {
        migrate::run(&session, &mut PassThrough, options)?
    };

    println!("\n{}", "=".repeat(60));
    println!("Started at memo:    {}", summary.start_id);
    println!("Upper bound:        {}", summary.upper_bound);
    println!(
        "Last migrated memo: {}",
        summary
            .last_migrated_id
            .map_or_else(|| "-".to_string(), |id| id.to_string())
    );
    println!("Memos written:      {}", summary.notes_migrated);
    if resources {
        println!("Resources written:  {}", summary.resources_migrated);
    }
    if let Some(segment) = &summary.segment {
        println!(
            "Segment #{}: {} -> {} ({:.1}/h)",
            segment.id,
            segment.start_memo_id,
            segment.end_memo_id.unwrap_or(segment.start_memo_id),
            segment.throughput
        );
    }
    if summary.cancelled {
        println!("Stopped by operator; the next run resumes from the last confirmed memo.");
    }
    println!("{}", "=".repeat(60));

    Ok(())
}
