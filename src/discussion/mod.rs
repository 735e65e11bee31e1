pub mod identity;

pub use identity::{compute_id, compute_original_id, compute_position_id, DiscussionId};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::note::{Note, NoteId};
use crate::resolution::{self, Resolvable, Transition};

#[derive(Debug, Error)]
pub enum DiscussionError {
    #[error("Note {note} belongs to discussion {found}, not {expected}")]
    MismatchedNote {
        note: NoteId,
        expected: DiscussionId,
        found: DiscussionId,
    },
}

/// An ordered thread of notes sharing one discussion id.
///
/// Never empty: discussions only come out of [`Discussion::build`] or
/// [`Discussion::new`], which both start from a note.
#[derive(Debug, Clone, PartialEq)]
pub struct Discussion {
    notes: Vec<Note>,
}

impl Discussion {
    pub fn new(first: Note) -> Self {
        Self { notes: vec![first] }
    }

    /// Group notes by discussion id, in order of each id's first appearance,
    /// keeping the notes' order within every group.
    pub fn build(notes: Vec<Note>) -> Vec<Discussion> {
        let mut discussions: Vec<Discussion> = Vec::new();
        for note in notes {
            match discussions.iter_mut().find(|d| d.id() == note.discussion_id()) {
                Some(discussion) => discussion.notes.push(note),
                None => discussions.push(Discussion::new(note)),
            }
        }
        debug!(discussions = discussions.len(), "built discussions");
        discussions
    }

    pub fn id(&self) -> &DiscussionId {
        self.notes[0].discussion_id()
    }

    pub fn original_id(&self) -> &DiscussionId {
        self.notes[0].original_discussion_id()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn notes_mut(&mut self) -> &mut [Note] {
        &mut self.notes
    }

    pub fn into_notes(self) -> Vec<Note> {
        self.notes
    }

    pub fn first_note(&self) -> &Note {
        &self.notes[0]
    }

    /// Append a reply. Notes from another discussion are refused.
    pub fn push(&mut self, note: Note) -> Result<(), DiscussionError> {
        if note.discussion_id() != self.id() {
            return Err(DiscussionError::MismatchedNote {
                note: note.id(),
                expected: self.id().clone(),
                found: note.discussion_id().clone(),
            });
        }
        self.notes.push(note);
        Ok(())
    }

    /// Whether any note in the thread can be resolved.
    pub fn resolvable(&self) -> bool {
        self.notes.iter().any(Resolvable::resolvable)
    }

    /// Every resolvable note is resolved. Vacuously true when none is.
    pub fn is_resolved(&self) -> bool {
        self.notes.iter().filter(|n| n.resolvable()).all(|n| n.resolution().is_resolved())
    }

    /// A single comment rather than an ongoing thread.
    pub fn is_new(&self) -> bool {
        self.notes.len() == 1
    }

    /// The most recently resolved note, if any.
    pub fn last_resolved_note(&self) -> Option<&Note> {
        self.notes
            .iter()
            .filter(|n| n.is_resolved())
            .max_by_key(|n| n.resolution().resolved_at)
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.last_resolved_note().and_then(|n| n.resolution().resolved_at)
    }

    /// Resolve every resolvable note. Returns how many changed.
    pub fn resolve(&mut self, actor: &str) -> usize {
        self.apply(&Transition::resolve(actor))
    }

    pub fn resolve_at(&mut self, actor: &str, at: DateTime<Utc>) -> usize {
        self.apply(&Transition::resolve_at(actor, at))
    }

    /// Unresolve every resolved note. Returns how many changed.
    pub fn unresolve(&mut self) -> usize {
        self.apply(&Transition::Unresolve)
    }

    fn apply(&mut self, transition: &Transition) -> usize {
        let changed = resolution::apply(self.notes.iter_mut(), transition);
        debug!(discussion = %self.id(), changed, "applied resolution");
        changed
    }
}
