pub mod tracer;

pub use tracer::LineTracer;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, info_span, instrument, Instrument};

use crate::note::{DiffNote, Note, NoteId};
use crate::position::{DiffPosition, DiffRefs};

/// Why a position could not be carried forward. An expected outcome, not a
/// fault: the note simply becomes outdated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationFailed {
    #[error("position has no complete diff refs")]
    IncompleteSource,

    #[error("{path} was deleted")]
    FileDeleted { path: String },

    #[error("{path} changed between the two heads")]
    FileChanged { path: String },

    #[error("line {line} of {path} was changed")]
    LineChanged { path: String, line: u32 },

    #[error("line {line} of {path} no longer exists")]
    LineRemoved { path: String, line: u32 },

    #[error("removal of line {line} in {path} was undone")]
    RemovalUndone { path: String, line: u32 },

    #[error("migration timed out after {0:?}")]
    TimedOut(Duration),

    #[error("diff provider failed: {0}")]
    Provider(String),

    #[error("migrated position is invalid: {0}")]
    InvalidResult(String),
}

/// One request to carry a position from `old_refs` to `new_refs`.
#[derive(Debug, Clone)]
pub struct MigrationRequest {
    pub position: DiffPosition,
    pub old_refs: DiffRefs,
    pub new_refs: DiffRefs,
    /// Paths worth diffing: the position's own plus any caller hints
    pub paths: Vec<String>,
}

/// Carries a position forward when the compared revisions change.
#[async_trait]
pub trait PositionMigrator: Send + Sync {
    async fn migrate(&self, request: &MigrationRequest) -> Result<DiffPosition, MigrationFailed>;
}

/// What repositioning did to one note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositionOutcome {
    /// Already current, or anchored to a commit
    Unchanged,
    /// Position replaced with one in the current comparison
    Migrated,
    /// Position left as it was; the note is no longer active
    Outdated(MigrationFailed),
}

impl RepositionOutcome {
    pub fn is_outdated(&self) -> bool {
        matches!(self, RepositionOutcome::Outdated(_))
    }
}

/// Move `note` to `current`, or leave it untouched and report why not.
///
/// Never fails: a migrator error or timeout is an outdated note, and the
/// stored position is only ever replaced by a complete one in `current`.
#[instrument(skip_all, fields(note = %note.id(), to = %current))]
pub async fn reposition(
    note: &mut DiffNote,
    current: &DiffRefs,
    path_hints: &[String],
    migrator: &dyn PositionMigrator,
    timeout: Duration,
) -> RepositionOutcome {
    let request = match request_for(note, current, path_hints) {
        Ok(Some(request)) => request,
        Ok(None) => return RepositionOutcome::Unchanged,
        Err(reason) => return outdated(note.id(), reason),
    };

    let result = match tokio::time::timeout(timeout, migrator.migrate(&request)).await {
        Ok(result) => result,
        Err(_) => Err(MigrationFailed::TimedOut(timeout)),
    };
    settle(note, current, result)
}

/// Reposition every diff note of one noteable against a single `current`
/// snapshot.
///
/// All migrations run under one `timeout`. Nothing is written until every
/// migration has answered; if the deadline passes first, no position changes
/// and every pending note is reported outdated. Legacy notes have no
/// position and are reported unchanged. `path_hints` are added to every
/// request, as with [`reposition`].
#[instrument(skip_all, fields(to = %current, notes = notes.len()))]
pub async fn reposition_all(
    notes: &mut [Note],
    current: &DiffRefs,
    path_hints: &[String],
    migrator: &dyn PositionMigrator,
    timeout: Duration,
) -> Vec<(NoteId, RepositionOutcome)> {
    let mut pending = Vec::new();
    let mut outcomes: Vec<Option<RepositionOutcome>> = Vec::with_capacity(notes.len());
    for (index, note) in notes.iter().enumerate() {
        let outcome = match note.as_diff_note() {
            None => Some(RepositionOutcome::Unchanged),
            Some(diff_note) => match request_for(diff_note, current, path_hints) {
                Ok(Some(request)) => {
                    pending.push((index, request));
                    None
                }
                Ok(None) => Some(RepositionOutcome::Unchanged),
                Err(reason) => Some(RepositionOutcome::Outdated(reason)),
            },
        };
        outcomes.push(outcome);
    }

    let batch = async {
        let mut results = Vec::with_capacity(pending.len());
        for (index, request) in &pending {
            let result = migrator
                .migrate(request)
                .instrument(info_span!("migrate", index = *index))
                .await;
            results.push((*index, result));
        }
        results
    };

    let results = match tokio::time::timeout(timeout, batch).await {
        Ok(results) => results,
        Err(_) => {
            info!(pending = pending.len(), "repositioning batch timed out");
            pending
                .iter()
                .map(|(index, _)| (*index, Err(MigrationFailed::TimedOut(timeout))))
                .collect()
        }
    };

    for (index, result) in results {
        if let Some(note) = notes[index].as_diff_note_mut() {
            outcomes[index] = Some(settle(note, current, result));
        }
    }

    notes
        .iter()
        .zip(outcomes)
        .map(|(note, outcome)| (note.id(), outcome.unwrap_or(RepositionOutcome::Unchanged)))
        .collect()
}

/// Build the migration request, or `None` when there is nothing to do.
fn request_for(
    note: &DiffNote,
    current: &DiffRefs,
    path_hints: &[String],
) -> Result<Option<MigrationRequest>, MigrationFailed> {
    if note.is_for_commit() {
        return Ok(None);
    }
    let position = note.position();
    let old_refs = position
        .diff_refs()
        .filter(|_| position.is_complete())
        .ok_or(MigrationFailed::IncompleteSource)?;
    if &old_refs == current {
        return Ok(None);
    }

    let mut paths = position.paths();
    for hint in path_hints {
        if !paths.contains(hint) {
            paths.push(hint.clone());
        }
    }
    Ok(Some(MigrationRequest {
        position: position.clone(),
        old_refs,
        new_refs: current.clone(),
        paths,
    }))
}

fn settle(
    note: &mut DiffNote,
    current: &DiffRefs,
    result: Result<DiffPosition, MigrationFailed>,
) -> RepositionOutcome {
    let migrated = result.and_then(|position| {
        if !position.matches_refs(current) {
            return Err(MigrationFailed::InvalidResult(format!(
                "position points at {:?}, expected {}",
                position.diff_refs(),
                current
            )));
        }
        note.move_to(position)
            .map_err(|e| MigrationFailed::InvalidResult(e.to_string()))
    });
    match migrated {
        Ok(()) => {
            debug!(note = %note.id(), "position migrated");
            RepositionOutcome::Migrated
        }
        Err(reason) => outdated(note.id(), reason),
    }
}

fn outdated(note: NoteId, reason: MigrationFailed) -> RepositionOutcome {
    debug!(%note, %reason, "note outdated");
    RepositionOutcome::Outdated(reason)
}
