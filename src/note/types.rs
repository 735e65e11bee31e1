use serde::{Deserialize, Serialize};

use crate::position::DiffRefs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub u64);

impl std::fmt::Display for NoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fields every note carries regardless of how it is anchored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteHeader {
    pub id: NoteId,
    /// Author's username
    pub author: String,
    pub body: String,
    /// Generated by the system rather than typed by a user
    #[serde(default)]
    pub system: bool,
}

impl NoteHeader {
    pub fn new(id: u64, author: &str, body: &str) -> Self {
        Self {
            id: NoteId(id),
            author: author.to_string(),
            body: body.to_string(),
            system: false,
        }
    }

    pub fn system(id: u64, body: &str) -> Self {
        Self {
            system: true,
            ..Self::new(id, "system", body)
        }
    }
}

/// What kind of entity is being discussed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteableKind {
    /// A single, immutable commit
    Commit,
    /// A mergeable change whose comparison moves with every push
    MergeRequest,
}

impl NoteableKind {
    /// Name used in discussion identities.
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteableKind::Commit => "commit",
            NoteableKind::MergeRequest => "merge_request",
        }
    }
}

/// Reference to the commented-on entity, stored on each note.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteableRef {
    pub kind: NoteableKind,
    /// Merge request id, or the commit sha
    pub id: String,
}

impl NoteableRef {
    pub fn commit(sha: &str) -> Self {
        Self {
            kind: NoteableKind::Commit,
            id: sha.to_string(),
        }
    }

    pub fn merge_request(id: &str) -> Self {
        Self {
            kind: NoteableKind::MergeRequest,
            id: id.to_string(),
        }
    }

    pub fn is_commit(&self) -> bool {
        self.kind == NoteableKind::Commit
    }
}

impl std::fmt::Display for NoteableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            NoteableKind::Commit => write!(f, "commit {}", self.id),
            NoteableKind::MergeRequest => write!(f, "!{}", self.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeState {
    #[default]
    Opened,
    Merged,
    Closed,
}

/// Live view of the commented-on entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Noteable {
    pub reference: NoteableRef,
    /// The comparison currently shown for this entity
    pub diff_refs: Option<DiffRefs>,
    #[serde(default)]
    pub state: MergeState,
    #[serde(default)]
    pub source_branch: Option<String>,
    /// Last known existence of `source_branch`
    #[serde(default = "default_true")]
    pub source_branch_exists: bool,
}

fn default_true() -> bool {
    true
}

impl Noteable {
    pub fn commit(parent_sha: &str, sha: &str) -> Self {
        Self {
            reference: NoteableRef::commit(sha),
            diff_refs: Some(DiffRefs::for_commit(parent_sha, sha)),
            state: MergeState::Opened,
            source_branch: None,
            source_branch_exists: false,
        }
    }

    pub fn merge_request(id: &str, refs: DiffRefs, source_branch: &str) -> Self {
        Self {
            reference: NoteableRef::merge_request(id),
            diff_refs: Some(refs),
            state: MergeState::Opened,
            source_branch: Some(source_branch.to_string()),
            source_branch_exists: true,
        }
    }

    pub fn current_refs(&self) -> Option<&DiffRefs> {
        self.diff_refs.as_ref()
    }

    pub fn is_commit(&self) -> bool {
        self.reference.is_commit()
    }
}
