pub mod memory;
pub mod parse;
pub mod types;

pub use parse::parse_diff;
pub use types::{DiffFile, DiffLine, Hunk, LineKind, LineMapping};

use async_trait::async_trait;
use std::ops::RangeInclusive;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("Failed to parse diff: {0}")]
    Parse(String),

    #[error("Unknown revision: {0}")]
    UnknownRevision(String),

    #[error("File {path} not found at {revision}")]
    MissingFile { revision: String, path: String },

    #[error("Lines {from}..={to} out of range for {path} ({len} lines)")]
    LineOutOfRange {
        path: String,
        from: u32,
        to: u32,
        len: usize,
    },

    #[error("Unknown branch: {0}")]
    UnknownBranch(String),

    #[error("Branch {branch} moved: expected {expected}, found {actual}")]
    StaleBranch {
        branch: String,
        expected: String,
        actual: String,
    },
}

/// Computes the diff between two revisions.
/// Must be deterministic for identical revision pairs.
#[async_trait]
pub trait DiffProvider: Send + Sync {
    /// Diff `from` against `to`, restricted to `paths` when non-empty.
    async fn diff(
        &self,
        from: &str,
        to: &str,
        paths: &[String],
    ) -> Result<Vec<DiffFile>, DiffError>;
}

/// Reads file content at a revision.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Return the 1-based inclusive `lines` of `path` at `revision`, each
    /// line keeping its trailing newline.
    async fn read_lines(
        &self,
        revision: &str,
        path: &str,
        lines: RangeInclusive<u32>,
    ) -> Result<String, DiffError>;
}

/// A replacement of `from_line..=to_line` in one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdit {
    pub path: String,
    pub from_line: u32,
    pub to_line: u32,
    pub content: String,
}

/// A single commit request against a branch.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub branch: String,
    /// Branch head the edits were computed against; the commit must be
    /// rejected if the branch has moved.
    pub start_sha: String,
    pub edits: Vec<FileEdit>,
    pub message: String,
    pub committer: String,
}

/// Writes content changes as a new commit on a branch.
#[async_trait]
pub trait ContentMutator: Send + Sync {
    /// Current head of `branch`, `None` once the branch is gone.
    async fn branch_head(&self, branch: &str) -> Result<Option<String>, DiffError>;

    /// Apply the request and return the new commit sha.
    async fn commit(&self, request: &CommitRequest) -> Result<String, DiffError>;
}

/// Turns a single-file patch fragment into numbered lines.
pub trait PatchParser: Send + Sync {
    fn parse(&self, fragment: &str) -> Result<Vec<DiffLine>, DiffError>;
}

/// `PatchParser` for unified diff text.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnifiedPatchParser;

impl PatchParser for UnifiedPatchParser {
    fn parse(&self, fragment: &str) -> Result<Vec<DiffLine>, DiffError> {
        parse::parse_lines(fragment)
    }
}

/// Find the entry for `path` in a comparison, on either side.
pub fn find_file<'a>(files: &'a [DiffFile], path: &str) -> Option<&'a DiffFile> {
    files
        .iter()
        .find(|f| f.new_path == path)
        .or_else(|| files.iter().find(|f| f.old_path == path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_file_prefers_new_path() {
        let diff = concat!(
            "diff --git a/a.rb b/b.rb\n--- a/a.rb\n+++ b/b.rb\n@@ -1 +1 @@\n-x\n+y\n",
            "diff --git a/b.rb b/b.rb\n--- a/b.rb\n+++ /dev/null\n@@ -1 +0,0 @@\n-z\n",
        );
        let files = parse_diff(diff).unwrap();
        assert_eq!(find_file(&files, "b.rb").unwrap().old_path, "a.rb");
        assert_eq!(find_file(&files, "a.rb").unwrap().new_path, "b.rb");
        assert!(find_file(&files, "c.rb").is_none());
    }

    #[test]
    fn test_unified_parser_round_trips_file_patch() {
        let diff = concat!(
            "diff --git a/a.rb b/a.rb\n--- a/a.rb\n+++ b/a.rb\n",
            "@@ -1,2 +1,2 @@\n a\n-b\n+c\n",
        );
        let files = parse_diff(diff).unwrap();
        let lines = UnifiedPatchParser.parse(&files[0].patch()).unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3].text, "+c");
    }
}
