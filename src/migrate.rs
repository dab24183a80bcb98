//! Migration driver
//!
//! Walks the legacy id space one memo at a time: resolve the requested id,
//! read, review, write, checkpoint. Nothing runs concurrently; memo N+1 is
//! not touched before memo N is written and checkpointed.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{MigrateError, Result};
use crate::ledger::{CheckpointLedger, Segment};
use crate::reconcile::Direction;
use crate::review::{ReviewOutcome, Reviewer};
use crate::store::{Bootstrap, Resource, SchemaVersion, Stores};
use crate::taxonomy::TaxonomyHandle;

/// Everything one run needs, opened once and passed explicitly
pub struct MigrationSession {
    pub stores: Stores,
    pub taxonomy: TaxonomyHandle,
    /// Operator identity recorded as creator of migrated records
    pub creator_id: i64,
}

impl MigrationSession {
    pub fn new(stores: Stores, taxonomy: TaxonomyHandle, creator_id: i64) -> Self {
        Self {
            stores,
            taxonomy,
            creator_id,
        }
    }

    pub fn open(config: &Config, bootstrap: &Bootstrap) -> Result<Self> {
        let stores = Stores::open(&config.legacy_db_path(), &config.current_db_path(), bootstrap)?;
        let taxonomy = TaxonomyHandle::from_config(config)?;
        Ok(Self::new(stores, taxonomy, config.creator_id))
    }

    pub fn ledger(&self) -> Result<CheckpointLedger<'_>> {
        CheckpointLedger::new(self.stores.current())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Highest requested id; `None` means the legacy store's current maximum
    pub upper_bound: Option<i64>,
    pub migrate_resources: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub start_id: i64,
    pub upper_bound: i64,
    pub last_migrated_id: Option<i64>,
    pub notes_migrated: u64,
    pub resources_migrated: u64,
    /// Operator cancelled during review
    pub cancelled: bool,
    pub segment: Option<Segment>,
}

/// Log a failure with its memo id and operation, then hand it back
fn logged(operation: &'static str, id: i64) -> impl FnOnce(MigrateError) -> MigrateError {
    move |err| {
        error!(id, operation, error = %err, "migration aborted");
        err
    }
}

/// Copy the legacy resources of `memo_id` that the current store does not
/// hold yet. Returns how many were written.
///
/// Every resource is converted before the first write, so a bad storage
/// type leaves nothing behind. Writes go in legacy row order; the first
/// `existing` rows are taken as already sent by an interrupted run.
fn migrate_resources(session: &MigrationSession, memo_id: i64) -> Result<u64> {
    let converted = session
        .stores
        .read_resources(memo_id, SchemaVersion::Legacy)?
        .into_iter()
        .filter_map(|resource| match resource {
            Resource::Legacy(legacy) => Some(legacy.to_current()),
            Resource::Current(_) => None,
        })
        .collect::<Result<Vec<_>>>()?;

    let existing = usize::try_from(session.stores.count_resources(memo_id)?).unwrap_or(0);
    if existing >= converted.len() {
        if existing > 0 {
            warn!(id = memo_id, existing, "resources already migrated, skipping");
        }
        return Ok(0);
    }
    if existing > 0 {
        warn!(
            id = memo_id,
            existing,
            legacy = converted.len(),
            "resuming partially migrated resources"
        );
    }

    let mut written = 0;
    for mut current in converted.into_iter().skip(existing) {
        current.creator_id = session.creator_id;
        session.stores.write_resource(&current, SchemaVersion::Current)?;
        written += 1;
    }
    Ok(written)
}

/// Migrate memos from the ledger's resume point up to the upper bound.
///
/// A cancelled review stops the run without writing that memo or moving
/// the checkpoint. Any read or write failure aborts with the segment left
/// where it was, so the next run picks up from the last confirmed id.
pub fn run(
    session: &MigrationSession,
    reviewer: &mut dyn Reviewer,
    options: RunOptions,
) -> Result<RunSummary> {
    let upper_bound = match options.upper_bound {
        Some(bound) => bound,
        None => session
            .stores
            .max_note_id()
            .map_err(logged("max memo id", 0))?
            .unwrap_or(0),
    };

    let ledger = session.ledger()?;
    let start_id = ledger.begin()?;
    info!(start_id, upper_bound, "migration started");

    let mut summary = RunSummary {
        start_id,
        upper_bound,
        ..RunSummary::default()
    };

    let mut requested = start_id;
    while requested <= upper_bound {
        let id = match session.stores.resolve(requested, Direction::Forward) {
            Ok(id) => id,
            Err(err) if err.is_exhausted() => {
                info!(requested, "no memos left in the legacy store");
                break;
            }
            Err(err) => return Err(logged("resolve", requested)(err)),
        };
        if id > upper_bound {
            info!(requested, next = id, "next memo lies beyond the upper bound");
            break;
        }
        if id != requested {
            info!(requested, resolved = id, "skipped gap in legacy ids");
        }

        let mut note = session
            .stores
            .read_note(id)
            .map_err(logged("read note", id))?;

        let outcome = reviewer
            .review(&note, &session.taxonomy)
            .map_err(|source| logged("review", id)(MigrateError::Review { id, source }))?;
        match outcome {
            ReviewOutcome::Proceed { content } => note.content = content,
            ReviewOutcome::Cancel => {
                warn!(id, "review cancelled, stopping without writing");
                summary.cancelled = true;
                break;
            }
        }

        note.creator_id = session.creator_id;
        session
            .stores
            .write_note(&note)
            .map_err(logged("write note", id))?;
        summary.notes_migrated += 1;

        if options.migrate_resources {
            summary.resources_migrated +=
                migrate_resources(session, id).map_err(logged("migrate resources", id))?;
        }

        summary.segment = Some(ledger.advance(id).map_err(logged("advance checkpoint", id))?);
        summary.last_migrated_id = Some(id);
        info!(id, "memo migrated");

        requested = id + 1;
    }

    info!(
        notes = summary.notes_migrated,
        resources = summary.resources_migrated,
        last = ?summary.last_migrated_id,
        cancelled = summary.cancelled,
        "migration finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::PassThrough;
    use crate::store::testing::{count_current_memos, fixture, insert_legacy_resource, Fixture};
    use crate::taxonomy::Taxonomy;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_subscriber::layer::{self, Layer, SubscriberExt};

    fn open_session(fx: Fixture) -> (tempfile::TempDir, MigrationSession) {
        let Fixture { dir, stores } = fx;
        let session = MigrationSession::new(
            stores,
            TaxonomyHandle::new(Taxonomy::default(), None),
            1,
        );
        (dir, session)
    }

    fn options(upper_bound: i64) -> RunOptions {
        RunOptions {
            upper_bound: Some(upper_bound),
            migrate_resources: false,
        }
    }

    fn migrated_ids(session: &MigrationSession) -> Vec<i64> {
        let mut stmt = session
            .stores
            .current()
            .prepare("SELECT id FROM memo ORDER BY id")
            .unwrap();
        let ids = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<i64>>>()
            .unwrap();
        ids
    }

    /// Records the order memos are offered in; cancels at `cancel_at`
    struct Recording {
        seen: Vec<i64>,
        cancel_at: Option<i64>,
    }

    impl Reviewer for Recording {
        fn review(&mut self, note: &crate::store::Note, _: &TaxonomyHandle) -> io::Result<ReviewOutcome> {
            self.seen.push(note.id);
            if Some(note.id) == self.cancel_at {
                return Ok(ReviewOutcome::Cancel);
            }
            Ok(ReviewOutcome::Proceed {
                content: format!("#reviewed\n{}", note.content),
            })
        }
    }

    #[test]
    fn test_full_run_skips_gaps() {
        let (_dir, session) = open_session(fixture(&[1, 2, 5, 6]));
        let mut reviewer = Recording {
            seen: vec![],
            cancel_at: None,
        };

        let summary = run(&session, &mut reviewer, options(6)).unwrap();

        assert_eq!(reviewer.seen, vec![1, 2, 5, 6]);
        assert_eq!(migrated_ids(&session), vec![1, 2, 5, 6]);
        assert_eq!(summary.notes_migrated, 4);
        assert_eq!(summary.last_migrated_id, Some(6));

        let segment = session.ledger().unwrap().latest().unwrap().unwrap();
        assert_eq!(segment.start_memo_id, 1);
        assert_eq!(segment.end_memo_id, Some(6));
        assert_eq!(segment.items_migrated, 5);
    }

    #[test]
    fn test_written_note_carries_review_and_operator() {
        let (_dir, session) = open_session(fixture(&[3]));
        let mut reviewer = Recording {
            seen: vec![],
            cancel_at: None,
        };
        run(&session, &mut reviewer, options(3)).unwrap();

        let (creator, content, visibility): (i64, String, String) = session
            .stores
            .current()
            .query_row(
                "SELECT creator_id, content, visibility FROM memo WHERE id = 3",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(creator, 1);
        assert_eq!(content, "#reviewed\nmemo 3");
        assert_eq!(visibility, "PUBLIC");
    }

    #[test]
    fn test_second_run_resumes_after_last_confirmed() {
        let (_dir, session) = open_session(fixture(&[1, 2, 3, 4, 5]));
        run(&session, &mut PassThrough, options(2)).unwrap();

        let mut reviewer = Recording {
            seen: vec![],
            cancel_at: None,
        };
        let summary = run(&session, &mut reviewer, options(5)).unwrap();
        assert_eq!(summary.start_id, 3);
        assert_eq!(reviewer.seen, vec![3, 4, 5]);
        assert_eq!(session.ledger().unwrap().segments().unwrap().len(), 2);
    }

    #[test]
    fn test_cancel_leaves_memo_unwritten_and_checkpoint_unmoved() {
        let (_dir, session) = open_session(fixture(&[1, 2, 3]));
        let mut reviewer = Recording {
            seen: vec![],
            cancel_at: Some(2),
        };
        let summary = run(&session, &mut reviewer, options(3)).unwrap();

        assert!(summary.cancelled);
        assert_eq!(migrated_ids(&session), vec![1]);
        let segment = session.ledger().unwrap().latest().unwrap().unwrap();
        assert_eq!(segment.end_memo_id, Some(1));

        // Segment made no progress beyond its start, so memo 1 is offered again
        let mut reviewer = Recording {
            seen: vec![],
            cancel_at: None,
        };
        run(&session, &mut reviewer, options(3)).unwrap();
        assert_eq!(reviewer.seen, vec![1, 2, 3]);
        assert_eq!(count_current_memos(&session.stores, 1), 1);
    }

    #[test]
    fn test_cancel_on_first_memo_retries_same_start() {
        let (_dir, session) = open_session(fixture(&[4, 5]));
        let mut reviewer = Recording {
            seen: vec![],
            cancel_at: Some(4),
        };
        run(&session, &mut reviewer, options(5)).unwrap();
        assert!(migrated_ids(&session).is_empty());

        let summary = run(&session, &mut PassThrough, options(5)).unwrap();
        assert_eq!(summary.start_id, 1);
        assert_eq!(migrated_ids(&session), vec![4, 5]);
    }

    #[test]
    fn test_exhausted_range_ends_quietly() {
        let (_dir, session) = open_session(fixture(&[1, 2]));
        let summary = run(&session, &mut PassThrough, options(10)).unwrap();
        assert_eq!(summary.notes_migrated, 2);
        assert_eq!(summary.last_migrated_id, Some(2));
    }

    #[test]
    fn test_upper_bound_defaults_to_max_id() {
        let (_dir, session) = open_session(fixture(&[1, 7]));
        let summary = run(
            &session,
            &mut PassThrough,
            RunOptions {
                upper_bound: None,
                migrate_resources: false,
            },
        )
        .unwrap();
        assert_eq!(summary.upper_bound, 7);
        assert_eq!(migrated_ids(&session), vec![1, 7]);
    }

    #[test]
    fn test_upper_bound_inside_gap_stops_before_next_memo() {
        let (_dir, session) = open_session(fixture(&[1, 2, 9]));
        let summary = run(&session, &mut PassThrough, options(5)).unwrap();
        assert_eq!(migrated_ids(&session), vec![1, 2]);
        assert_eq!(summary.last_migrated_id, Some(2));
    }

    #[test]
    fn test_resources_are_migrated_once() {
        let fx = fixture(&[1, 2]);
        insert_legacy_resource(&fx.stores, 1, "a.png", "LOCAL", "assets/a.png");
        insert_legacy_resource(&fx.stores, 1, "b.png", "EXTERNAL", "https://x/b.png");
        let (_dir, session) = open_session(fx);
        let opts = RunOptions {
            upper_bound: Some(2),
            migrate_resources: true,
        };

        let summary = run(&session, &mut PassThrough, opts).unwrap();
        assert_eq!(summary.resources_migrated, 2);

        // Re-sending memo 1 must not duplicate its resources
        assert_eq!(migrate_resources(&session, 1).unwrap(), 0);
        assert_eq!(session.stores.count_resources(1).unwrap(), 2);

        let resources = session.stores.read_resources(1, SchemaVersion::Current).unwrap();
        match &resources[1] {
            Resource::Current(r) => {
                assert_eq!(r.external_link, "https://x/b.png");
                assert_eq!(r.creator_id, 1);
            }
            Resource::Legacy(_) => panic!("expected current shape"),
        }
    }

    #[test]
    fn test_bad_resource_blocks_memo_until_fixed() {
        let fx = fixture(&[1, 2]);
        insert_legacy_resource(&fx.stores, 1, "a.png", "LOCAL", "assets/a.png");
        insert_legacy_resource(&fx.stores, 1, "b.png", "FTP", "ftp://x/b.png");
        let (_dir, session) = open_session(fx);
        let opts = RunOptions {
            upper_bound: Some(2),
            migrate_resources: true,
        };

        let err = run(&session, &mut PassThrough, opts).unwrap_err();
        assert!(matches!(err, MigrateError::UnknownStorageType { id: 1, .. }));
        assert_eq!(session.stores.count_resources(1).unwrap(), 0);

        // Nothing was lost: the retry fails the same way and stays on memo 1
        let err = run(&session, &mut PassThrough, opts).unwrap_err();
        assert!(matches!(err, MigrateError::UnknownStorageType { id: 1, .. }));
        assert_eq!(session.ledger().unwrap().resume_point().unwrap(), 1);

        session
            .stores
            .legacy()
            .execute("UPDATE resource SET storage_type = 'EXTERNAL' WHERE filename = 'b.png'", [])
            .unwrap();
        let summary = run(&session, &mut PassThrough, opts).unwrap();
        assert_eq!(summary.resources_migrated, 2);
        assert_eq!(session.stores.count_resources(1).unwrap(), 2);
        assert_eq!(session.ledger().unwrap().resume_point().unwrap(), 3);
    }

    #[test]
    fn test_partially_sent_resources_are_completed() {
        let fx = fixture(&[1]);
        insert_legacy_resource(&fx.stores, 1, "a.png", "LOCAL", "assets/a.png");
        insert_legacy_resource(&fx.stores, 1, "b.png", "LOCAL", "assets/b.png");
        insert_legacy_resource(&fx.stores, 1, "c.png", "LOCAL", "assets/c.png");
        let (_dir, session) = open_session(fx);

        // An interrupted run got as far as the first resource
        let first = match &session.stores.read_resources(1, SchemaVersion::Legacy).unwrap()[0] {
            Resource::Legacy(legacy) => legacy.to_current().unwrap(),
            Resource::Current(_) => panic!("expected legacy shape"),
        };
        session.stores.write_resource(&first, SchemaVersion::Current).unwrap();

        assert_eq!(migrate_resources(&session, 1).unwrap(), 2);

        let paths: Vec<String> = session
            .stores
            .read_resources(1, SchemaVersion::Current)
            .unwrap()
            .into_iter()
            .map(|resource| match resource {
                Resource::Current(r) => r.internal_path,
                Resource::Legacy(_) => panic!("expected current shape"),
            })
            .collect();
        assert_eq!(paths, vec!["assets/a.png", "assets/b.png", "assets/c.png"]);
    }

    #[test]
    fn test_write_failure_aborts_and_keeps_checkpoint() {
        let (_dir, session) = open_session(fixture(&[1, 2, 3, 4]));
        run(&session, &mut PassThrough, options(2)).unwrap();

        session
            .stores
            .current()
            .execute_batch(
                "CREATE TRIGGER reject_memo_4 BEFORE INSERT ON memo WHEN NEW.id = 4
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let err = run(&session, &mut PassThrough, options(4)).unwrap_err();
        assert!(matches!(err, MigrateError::Write { id: 4, .. }));

        let segment = session.ledger().unwrap().latest().unwrap().unwrap();
        assert_eq!(segment.start_memo_id, 3);
        assert_eq!(segment.end_memo_id, Some(3));
        assert_eq!(migrated_ids(&session), vec![1, 2, 3]);

        // The failed memo is retried on the next run
        assert_eq!(session.ledger().unwrap().resume_point().unwrap(), 3);
    }

    /// Counts ERROR events seen while it is the default subscriber
    struct ErrorCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for ErrorCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _: layer::Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_gateway_failure_is_logged_once() {
        let (_dir, session) = open_session(fixture(&[1, 2]));
        session
            .stores
            .current()
            .execute_batch(
                "CREATE TRIGGER reject_memo_2 BEFORE INSERT ON memo WHEN NEW.id = 2
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let errors = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ErrorCounter(Arc::clone(&errors)));
        let result = tracing::subscriber::with_default(subscriber, || {
            run(&session, &mut PassThrough, options(2))
        });

        assert!(matches!(result, Err(MigrateError::Write { id: 2, .. })));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }
}
