use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{NoteHeader, NoteId, Noteable, NoteableRef};
use super::NoteError;
use crate::diff::{find_file, DiffFile};
use crate::discussion::identity::{compute_original_id, compute_position_id, DiscussionId};
use crate::position::{DiffPosition, DiffRefs, LineCode, PositionError};
use crate::resolution::{Resolvable, Resolution};

/// A note anchored to a structured position inside a comparison.
///
/// `original_position` and `original_discussion_id` are fixed at creation;
/// `position` and `discussion_id` move forward as the comparison changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffNote {
    #[serde(flatten)]
    header: NoteHeader,
    noteable: NoteableRef,
    original_position: DiffPosition,
    position: DiffPosition,
    #[serde(flatten)]
    resolution: Resolution,
    discussion_id: DiscussionId,
    original_discussion_id: DiscussionId,
}

impl DiffNote {
    /// Create a note at `position`. Incomplete positions are rejected.
    pub fn create(
        header: NoteHeader,
        noteable: NoteableRef,
        position: DiffPosition,
    ) -> Result<Self, NoteError> {
        position.validate().map_err(NoteError::IncompletePosition)?;

        let key = position.key();
        let kind = noteable.kind.as_str();
        let discussion_id = compute_position_id(kind, &noteable.id, &key);
        let original_discussion_id = compute_original_id(kind, &noteable.id, &key);
        debug!(note = %header.id, discussion = %discussion_id, "created diff note");

        Ok(Self {
            header,
            noteable,
            original_position: position.clone(),
            position,
            resolution: Resolution::default(),
            discussion_id,
            original_discussion_id,
        })
    }

    pub fn header(&self) -> &NoteHeader {
        &self.header
    }

    pub fn id(&self) -> NoteId {
        self.header.id
    }

    pub fn noteable(&self) -> &NoteableRef {
        &self.noteable
    }

    pub fn position(&self) -> &DiffPosition {
        &self.position
    }

    pub fn original_position(&self) -> &DiffPosition {
        &self.original_position
    }

    pub fn discussion_id(&self) -> &DiscussionId {
        &self.discussion_id
    }

    pub fn original_discussion_id(&self) -> &DiscussionId {
        &self.original_discussion_id
    }

    pub fn is_for_commit(&self) -> bool {
        self.noteable.is_commit()
    }

    /// Whether the note still points into `current_refs`.
    ///
    /// Commit notes are always active; an incomplete position never is.
    pub fn is_active(&self, current_refs: &DiffRefs) -> bool {
        if !self.position.is_complete() {
            return false;
        }
        self.is_for_commit() || self.position.matches_refs(current_refs)
    }

    /// `is_active` against the noteable's current comparison.
    pub fn is_active_on(&self, noteable: &Noteable) -> bool {
        match noteable.current_refs() {
            Some(refs) => self.is_active(refs),
            None => self.is_for_commit() && self.position.is_complete(),
        }
    }

    /// Line code of the anchored line in the current comparison.
    pub fn line_code(&self, current: &[DiffFile]) -> Option<LineCode> {
        let path = self.position.file_path()?;
        find_file(current, path).and_then(|file| self.position.line_code_in(file))
    }

    /// Replace the position after a successful migration. The discussion id
    /// follows the new key; the original id never changes.
    pub(crate) fn move_to(&mut self, position: DiffPosition) -> Result<(), PositionError> {
        position.validate()?;
        self.discussion_id =
            compute_position_id(self.noteable.kind.as_str(), &self.noteable.id, &position.key());
        self.position = position;
        Ok(())
    }
}

impl Resolvable for DiffNote {
    fn resolvable(&self) -> bool {
        !self.header.system && !self.is_for_commit()
    }

    fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    fn resolution_mut(&mut self) -> &mut Resolution {
        &mut self.resolution
    }
}
