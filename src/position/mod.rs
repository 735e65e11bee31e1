pub mod line_code;
pub mod types;

pub use line_code::LineCode;
pub use types::{DiffRefs, ImageCoords, LinePoint, LineRange, PositionKey, PositionType};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diff::{parse, DiffFile, LineKind};
use crate::hash::sha1_str;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("position has no file path for the side it points at")]
    MissingPath,

    #[error("text position has neither an old nor a new line")]
    MissingLine,

    #[error("position is missing one of base_sha, start_sha, head_sha")]
    MissingRefs,

    #[error("image position has no coordinates")]
    MissingImageCoords,

    #[error("line numbers are 1-based, got {0}")]
    InvalidLine(u32),

    #[error("line range endpoints must each name a line")]
    InvalidLineRange,

    #[error("invalid line code: {0}")]
    InvalidLineCode(String),
}

/// Strict equality of two comparisons.
pub fn matches_refs(a: &DiffRefs, b: &DiffRefs) -> bool {
    a == b
}

/// Immutable coordinates anchoring a note inside a comparison.
///
/// A context line has both `old_line` and `new_line`, an added line only
/// `new_line`, a removed line only `old_line`. Field order is part of the
/// serialized form and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffPosition {
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub old_line: Option<u32>,
    pub new_line: Option<u32>,
    pub base_sha: Option<String>,
    pub start_sha: Option<String>,
    pub head_sha: Option<String>,
    #[serde(default)]
    pub position_type: PositionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_range: Option<LineRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageCoords>,
}

impl DiffPosition {
    /// A text position with explicit paths and lines.
    pub fn text(
        old_path: Option<&str>,
        new_path: Option<&str>,
        old_line: Option<u32>,
        new_line: Option<u32>,
        refs: &DiffRefs,
    ) -> Self {
        Self {
            old_path: old_path.map(str::to_string),
            new_path: new_path.map(str::to_string),
            old_line,
            new_line,
            base_sha: Some(refs.base_sha.clone()),
            start_sha: Some(refs.start_sha.clone()),
            head_sha: Some(refs.head_sha.clone()),
            position_type: PositionType::Text,
            line_range: None,
            image: None,
        }
    }

    /// A line that only exists in the new version of `path`.
    pub fn added(path: &str, new_line: u32, refs: &DiffRefs) -> Self {
        Self::text(Some(path), Some(path), None, Some(new_line), refs)
    }

    /// A line that only exists in the old version of `path`.
    pub fn removed(path: &str, old_line: u32, refs: &DiffRefs) -> Self {
        Self::text(Some(path), Some(path), Some(old_line), None, refs)
    }

    /// A context line present on both sides.
    pub fn unchanged(path: &str, old_line: u32, new_line: u32, refs: &DiffRefs) -> Self {
        Self::text(Some(path), Some(path), Some(old_line), Some(new_line), refs)
    }

    pub fn image(path: &str, coords: ImageCoords, refs: &DiffRefs) -> Self {
        Self {
            position_type: PositionType::Image,
            image: Some(coords),
            ..Self::text(Some(path), Some(path), None, None, refs)
        }
    }

    pub fn with_line_range(mut self, range: LineRange) -> Self {
        self.line_range = Some(range);
        self
    }

    /// Check that every part this position's type needs is present.
    pub fn validate(&self) -> Result<(), PositionError> {
        if self.old_path.is_none() && self.new_path.is_none() {
            return Err(PositionError::MissingPath);
        }
        if self.diff_refs().is_none() {
            return Err(PositionError::MissingRefs);
        }
        match self.position_type {
            PositionType::Text => {
                if self.old_line.is_none() && self.new_line.is_none() {
                    return Err(PositionError::MissingLine);
                }
                if (self.old_line.is_some() && self.old_path.is_none())
                    || (self.new_line.is_some() && self.new_path.is_none())
                {
                    return Err(PositionError::MissingPath);
                }
                for line in [self.old_line, self.new_line].into_iter().flatten() {
                    if line == 0 {
                        return Err(PositionError::InvalidLine(line));
                    }
                }
                if let Some(range) = &self.line_range {
                    for point in [range.start, range.end] {
                        if point.old_line.is_none() && point.new_line.is_none() {
                            return Err(PositionError::InvalidLineRange);
                        }
                        if point.old_line == Some(0) || point.new_line == Some(0) {
                            return Err(PositionError::InvalidLineRange);
                        }
                    }
                }
            }
            PositionType::Image => {
                if self.image.is_none() {
                    return Err(PositionError::MissingImageCoords);
                }
            }
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.validate().is_ok()
    }

    /// The comparison this position was taken in, if all three SHAs are set.
    pub fn diff_refs(&self) -> Option<DiffRefs> {
        match (&self.base_sha, &self.start_sha, &self.head_sha) {
            (Some(base), Some(start), Some(head))
                if !base.is_empty() && !start.is_empty() && !head.is_empty() =>
            {
                Some(DiffRefs::new(base.as_str(), start.as_str(), head.as_str()))
            }
            _ => None,
        }
    }

    pub fn matches_refs(&self, refs: &DiffRefs) -> bool {
        self.diff_refs().is_some_and(|own| matches_refs(&own, refs))
    }

    /// Re-point this position at another comparison.
    pub fn set_refs(&mut self, refs: &DiffRefs) {
        self.base_sha = Some(refs.base_sha.clone());
        self.start_sha = Some(refs.start_sha.clone());
        self.head_sha = Some(refs.head_sha.clone());
    }

    /// The path shown for this position: new path unless only the old side exists.
    pub fn file_path(&self) -> Option<&str> {
        self.new_path.as_deref().or(self.old_path.as_deref())
    }

    /// Distinct paths this position touches, old side first.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for path in [&self.old_path, &self.new_path].into_iter().flatten() {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        paths
    }

    pub fn is_added_line(&self) -> bool {
        self.old_line.is_none() && self.new_line.is_some()
    }

    pub fn is_removed_line(&self) -> bool {
        self.old_line.is_some() && self.new_line.is_none()
    }

    /// Identity of this position without the revision pointers.
    pub fn key(&self) -> PositionKey {
        PositionKey {
            old_path: self.old_path.clone(),
            new_path: self.new_path.clone(),
            old_line: self.old_line,
            new_line: self.new_line,
            line_range: self.line_range,
            position_type: self.position_type,
            image: self.image,
        }
    }

    /// Derive the line code of this position from the file's current diff.
    pub fn line_code_in(&self, file: &DiffFile) -> Option<LineCode> {
        if self.position_type != PositionType::Text {
            return None;
        }
        let path = self.file_path()?;
        let lines = parse::parse_lines(&file.patch()).ok()?;
        let hit = lines.iter().find(|line| match (self.old_line, self.new_line) {
            (Some(old), Some(new)) => line.old_line() == Some(old) && line.new_line() == Some(new),
            (None, Some(new)) => line.kind == LineKind::Added && line.new_pos == new,
            (Some(old), None) => line.kind == LineKind::Removed && line.old_pos == old,
            (None, None) => false,
        });
        match (hit, self.old_line, self.new_line) {
            (Some(line), _, _) => Some(LineCode::new(path, line.old_pos, line.new_pos)),
            (None, Some(old), Some(new)) => Some(LineCode::new(path, old, new)),
            _ => None,
        }
    }
}

impl PositionKey {
    /// Stable string form of the key, one segment per component. Paths are
    /// hashed so separators inside them cannot collide with the encoding,
    /// and the type discriminator keeps text and image anchors apart.
    pub fn segments(&self) -> Vec<String> {
        let mut segments = vec![
            self.position_type.as_str().to_string(),
            path_digest(self.old_path.as_deref()),
            path_digest(self.new_path.as_deref()),
        ];
        match self.position_type {
            PositionType::Text => {
                segments.push(line_segment(self.old_line));
                segments.push(line_segment(self.new_line));
                if let Some(range) = &self.line_range {
                    segments.push(format!(
                        "{}:{}..{}:{}",
                        line_segment(range.start.old_line),
                        line_segment(range.start.new_line),
                        line_segment(range.end.old_line),
                        line_segment(range.end.new_line)
                    ));
                }
            }
            PositionType::Image => {
                if let Some(c) = &self.image {
                    segments.push(format!("{}x{}+{}+{}", c.width, c.height, c.x, c.y));
                }
            }
        }
        segments
    }
}

fn path_digest(path: Option<&str>) -> String {
    sha1_str(path.unwrap_or(""))
}

fn line_segment(line: Option<u32>) -> String {
    line.map(|l| l.to_string()).unwrap_or_default()
}
