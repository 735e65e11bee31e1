use serde::{Deserialize, Serialize};

/// The `(base, start, head)` triple identifying one three-way comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiffRefs {
    /// Merge-base of the two branches
    pub base_sha: String,
    /// Target branch tip when the comparison was taken
    pub start_sha: String,
    /// Source branch tip when the comparison was taken
    pub head_sha: String,
}

impl DiffRefs {
    pub fn new(
        base_sha: impl Into<String>,
        start_sha: impl Into<String>,
        head_sha: impl Into<String>,
    ) -> Self {
        Self {
            base_sha: base_sha.into(),
            start_sha: start_sha.into(),
            head_sha: head_sha.into(),
        }
    }

    /// Refs of a single commit compared against its parent.
    pub fn for_commit(parent_sha: impl Into<String>, sha: impl Into<String>) -> Self {
        let parent = parent_sha.into();
        Self::new(parent.clone(), parent, sha)
    }
}

impl std::fmt::Display for DiffRefs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}...{}..{}",
            short(&self.base_sha),
            short(&self.start_sha),
            short(&self.head_sha)
        )
    }
}

fn short(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    #[default]
    Text,
    Image,
}

impl PositionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionType::Text => "text",
            PositionType::Image => "image",
        }
    }
}

/// One end of a multi-line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinePoint {
    pub old_line: Option<u32>,
    pub new_line: Option<u32>,
}

impl LinePoint {
    pub fn new(old_line: Option<u32>, new_line: Option<u32>) -> Self {
        Self { old_line, new_line }
    }
}

/// Contiguous range covered by a multi-line comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: LinePoint,
    pub end: LinePoint,
}

/// Region of an image diff a comment points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageCoords {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// The SHA-free identity of a position, used to derive discussion ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub old_line: Option<u32>,
    pub new_line: Option<u32>,
    pub line_range: Option<LineRange>,
    pub position_type: PositionType,
    pub image: Option<ImageCoords>,
}
