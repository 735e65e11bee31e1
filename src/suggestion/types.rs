use serde::{Deserialize, Serialize};

use crate::note::NoteId;

/// Why a suggestion cannot be applied, in the order the checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InapplicableReason {
    AlreadyApplied,
    ParentMerged,
    ParentClosed,
    SourceBranchDeleted,
    Outdated,
    UnchangedContent,
}

impl InapplicableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InapplicableReason::AlreadyApplied => "already_applied",
            InapplicableReason::ParentMerged => "parent_merged",
            InapplicableReason::ParentClosed => "parent_closed",
            InapplicableReason::SourceBranchDeleted => "source_branch_deleted",
            InapplicableReason::Outdated => "outdated",
            InapplicableReason::UnchangedContent => "unchanged_content",
        }
    }
}

impl std::fmt::Display for InapplicableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            InapplicableReason::AlreadyApplied => "the suggestion was already applied",
            InapplicableReason::ParentMerged => "the merge request was merged",
            InapplicableReason::ParentClosed => "the merge request was closed",
            InapplicableReason::SourceBranchDeleted => "the source branch was deleted",
            InapplicableReason::Outdated => "the suggested lines have changed",
            InapplicableReason::UnchangedContent => "the suggestion does not change anything",
        };
        f.write_str(message)
    }
}

/// A proposed replacement of `from_line..=to_line` in the file a diff note
/// is anchored to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub note_id: NoteId,
    /// 1-based first replaced line in the new file
    pub from_line: u32,
    /// 1-based last replaced line, inclusive
    pub to_line: u32,
    /// Text of the replaced lines when the suggestion was written
    pub from_content: String,
    /// Replacement text; empty removes the lines
    pub to_content: String,
    #[serde(default)]
    pub(crate) applied: bool,
    #[serde(default)]
    pub(crate) applied_commit_sha: Option<String>,
}

impl Suggestion {
    pub fn is_applied(&self) -> bool {
        self.applied
    }

    pub fn applied_commit_sha(&self) -> Option<&str> {
        self.applied_commit_sha.as_deref()
    }

    pub fn has_different_content(&self) -> bool {
        self.from_content != self.to_content
    }

    pub fn line_count(&self) -> u32 {
        self.to_line.saturating_sub(self.from_line) + 1
    }

    /// One-way: once applied, a suggestion stays applied.
    pub(crate) fn mark_applied(&mut self, commit_sha: &str) {
        self.applied = true;
        self.applied_commit_sha = Some(commit_sha.to_string());
    }
}
