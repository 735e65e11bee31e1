pub mod diff_note;
pub mod legacy;
pub mod types;

pub use diff_note::DiffNote;
pub use legacy::{AmbiguityPolicy, LegacyDiffNote, LegacyMatch, StoredPatch};
pub use types::{MergeState, NoteHeader, NoteId, Noteable, NoteableKind, NoteableRef};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diff::{DiffError, DiffFile, PatchParser};
use crate::discussion::identity::DiscussionId;
use crate::position::PositionError;
use crate::resolution::{Resolvable, Resolution};

#[derive(Debug, Error)]
pub enum NoteError {
    #[error("Incomplete position: {0}")]
    IncompletePosition(PositionError),

    #[error("Invalid line code: {0}")]
    InvalidLineCode(String),

    #[error("Line code {line_code} matches {candidates} lines in the current diff")]
    AmbiguousLegacyMatch { line_code: String, candidates: usize },

    #[error(transparent)]
    Diff(#[from] DiffError),
}

/// A note anchored into a diff, in either of its two storage forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Note {
    #[serde(rename = "DiffNote")]
    Diff(DiffNote),
    #[serde(rename = "LegacyDiffNote")]
    Legacy(LegacyDiffNote),
}

/// Everything needed to decide whether a note still applies.
#[derive(Clone, Copy)]
pub struct ActivityContext<'a> {
    pub noteable: &'a Noteable,
    /// Current comparison of the noteable
    pub current_diff: &'a [DiffFile],
    pub parser: &'a dyn PatchParser,
}

impl Note {
    pub fn header(&self) -> &NoteHeader {
        match self {
            Note::Diff(note) => note.header(),
            Note::Legacy(note) => note.header(),
        }
    }

    pub fn id(&self) -> NoteId {
        self.header().id
    }

    pub fn noteable(&self) -> &NoteableRef {
        match self {
            Note::Diff(note) => note.noteable(),
            Note::Legacy(note) => note.noteable(),
        }
    }

    pub fn discussion_id(&self) -> &DiscussionId {
        match self {
            Note::Diff(note) => note.discussion_id(),
            Note::Legacy(note) => note.discussion_id(),
        }
    }

    pub fn original_discussion_id(&self) -> &DiscussionId {
        match self {
            Note::Diff(note) => note.original_discussion_id(),
            Note::Legacy(note) => note.original_discussion_id(),
        }
    }

    pub fn as_diff_note(&self) -> Option<&DiffNote> {
        match self {
            Note::Diff(note) => Some(note),
            Note::Legacy(_) => None,
        }
    }

    pub fn as_diff_note_mut(&mut self) -> Option<&mut DiffNote> {
        match self {
            Note::Diff(note) => Some(note),
            Note::Legacy(_) => None,
        }
    }

    /// Whether the note still points at something in the current comparison.
    pub fn is_active(&self, ctx: &ActivityContext<'_>) -> bool {
        match self {
            Note::Diff(note) => note.is_active_on(ctx.noteable),
            Note::Legacy(note) => note.is_active(ctx.current_diff, ctx.parser),
        }
    }

    /// File path shown for the note.
    pub fn file_path(&self) -> Option<&str> {
        match self {
            Note::Diff(note) => note.position().file_path(),
            Note::Legacy(note) => Some(note.patch().new_path.as_str()),
        }
    }
}

impl Resolvable for Note {
    fn resolvable(&self) -> bool {
        match self {
            Note::Diff(note) => note.resolvable(),
            Note::Legacy(note) => note.resolvable(),
        }
    }

    fn resolution(&self) -> &Resolution {
        match self {
            Note::Diff(note) => note.resolution(),
            Note::Legacy(note) => note.resolution(),
        }
    }

    fn resolution_mut(&mut self) -> &mut Resolution {
        match self {
            Note::Diff(note) => note.resolution_mut(),
            Note::Legacy(note) => note.resolution_mut(),
        }
    }
}

impl From<DiffNote> for Note {
    fn from(note: DiffNote) -> Self {
        Note::Diff(note)
    }
}

impl From<LegacyDiffNote> for Note {
    fn from(note: LegacyDiffNote) -> Self {
        Note::Legacy(note)
    }
}
