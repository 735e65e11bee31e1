//! In-memory repository: snapshot commits and branches, with diffs
//! computed on demand. Backs the collaborator traits for tests and the demo.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::{Range, RangeInclusive};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use similar::{ChangeTag, TextDiff};
use tracing::debug;

use super::types::{DiffFile, Hunk};
use super::{CommitRequest, ContentMutator, ContentProvider, DiffError, DiffProvider};
use crate::hash::sha1_str;

const CONTEXT_RADIUS: usize = 3;

type Tree = BTreeMap<String, String>;

#[derive(Debug, Default)]
struct RepoState {
    commits: HashMap<String, Tree>,
    branches: HashMap<String, String>,
    sequence: u64,
}

impl RepoState {
    fn store(&mut self, parent: Option<&str>, tree: Tree) -> String {
        self.sequence += 1;
        let mut seed = format!("{}\0{}\0", self.sequence, parent.unwrap_or(""));
        for (path, content) in &tree {
            seed.push_str(path);
            seed.push('\0');
            seed.push_str(content);
            seed.push('\0');
        }
        let sha = sha1_str(&seed);
        self.commits.insert(sha.clone(), tree);
        sha
    }

    fn tree(&self, revision: &str) -> Result<&Tree, DiffError> {
        self.commits
            .get(revision)
            .ok_or_else(|| DiffError::UnknownRevision(revision.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<RepoState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RepoState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Commit a full snapshot of `files` to `branch`, creating the branch if
    /// needed. Returns the new commit sha.
    pub fn commit_files(&self, branch: &str, files: &[(&str, &str)]) -> String {
        let mut state = self.state();
        let parent = state.branches.get(branch).cloned();
        let tree = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect();
        let sha = state.store(parent.as_deref(), tree);
        state.branches.insert(branch.to_string(), sha.clone());
        sha
    }

    /// Commit a change of one file on top of `branch`.
    pub fn write_file(&self, branch: &str, path: &str, content: &str) -> Result<String, DiffError> {
        self.change_tree(branch, |tree| {
            tree.insert(path.to_string(), content.to_string());
        })
    }

    /// Commit the removal of one file on top of `branch`.
    pub fn delete_file(&self, branch: &str, path: &str) -> Result<String, DiffError> {
        self.change_tree(branch, |tree| {
            tree.remove(path);
        })
    }

    fn change_tree(
        &self,
        branch: &str,
        change: impl FnOnce(&mut Tree),
    ) -> Result<String, DiffError> {
        let mut state = self.state();
        let head = state
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| DiffError::UnknownBranch(branch.to_string()))?;
        let mut tree = state.tree(&head)?.clone();
        change(&mut tree);
        let sha = state.store(Some(&head), tree);
        state.branches.insert(branch.to_string(), sha.clone());
        Ok(sha)
    }

    /// Point `branch` at an existing commit (force push).
    pub fn set_branch(&self, branch: &str, revision: &str) -> Result<(), DiffError> {
        let mut state = self.state();
        state.tree(revision)?;
        state.branches.insert(branch.to_string(), revision.to_string());
        Ok(())
    }

    pub fn delete_branch(&self, branch: &str) -> bool {
        self.state().branches.remove(branch).is_some()
    }

    pub fn head(&self, branch: &str) -> Option<String> {
        self.state().branches.get(branch).cloned()
    }

    pub fn branch_exists(&self, branch: &str) -> bool {
        self.state().branches.contains_key(branch)
    }

    pub fn file_at(&self, revision: &str, path: &str) -> Option<String> {
        self.state().commits.get(revision)?.get(path).cloned()
    }
}

#[async_trait]
impl DiffProvider for MemoryRepository {
    async fn diff(
        &self,
        from: &str,
        to: &str,
        paths: &[String],
    ) -> Result<Vec<DiffFile>, DiffError> {
        let state = self.state();
        let old = state.tree(from)?;
        let new = state.tree(to)?;
        let files = diff_trees(old, new, paths);
        debug!(from, to, files = files.len(), "computed in-memory diff");
        Ok(files)
    }
}

#[async_trait]
impl ContentProvider for MemoryRepository {
    async fn read_lines(
        &self,
        revision: &str,
        path: &str,
        lines: RangeInclusive<u32>,
    ) -> Result<String, DiffError> {
        let state = self.state();
        let content = state
            .tree(revision)?
            .get(path)
            .ok_or_else(|| DiffError::MissingFile {
                revision: revision.to_string(),
                path: path.to_string(),
            })?;
        let all: Vec<&str> = content.split_inclusive('\n').collect();
        let range = checked_range(path, &lines, all.len())?;
        Ok(all[range].concat())
    }
}

#[async_trait]
impl ContentMutator for MemoryRepository {
    async fn branch_head(&self, branch: &str) -> Result<Option<String>, DiffError> {
        Ok(self.head(branch))
    }

    async fn commit(&self, request: &CommitRequest) -> Result<String, DiffError> {
        let mut state = self.state();
        let head = state
            .branches
            .get(&request.branch)
            .cloned()
            .ok_or_else(|| DiffError::UnknownBranch(request.branch.clone()))?;
        if head != request.start_sha {
            return Err(DiffError::StaleBranch {
                branch: request.branch.clone(),
                expected: request.start_sha.clone(),
                actual: head,
            });
        }

        let mut tree = state.tree(&head)?.clone();
        let mut edits = request.edits.clone();
        // Bottom-up so earlier replacements don't shift later ranges.
        edits.sort_by(|a, b| a.path.cmp(&b.path).then(b.from_line.cmp(&a.from_line)));
        for edit in &edits {
            let content = tree.get_mut(&edit.path).ok_or_else(|| DiffError::MissingFile {
                revision: head.clone(),
                path: edit.path.clone(),
            })?;
            let mut lines: Vec<String> =
                content.split_inclusive('\n').map(str::to_string).collect();
            let range = checked_range(&edit.path, &(edit.from_line..=edit.to_line), lines.len())?;
            lines.splice(range, edit.content.split_inclusive('\n').map(str::to_string));
            *content = lines.concat();
        }

        let sha = state.store(Some(&head), tree);
        state.branches.insert(request.branch.clone(), sha.clone());
        debug!(branch = %request.branch, sha = %sha, edits = edits.len(), "committed edits");
        Ok(sha)
    }
}

fn checked_range(
    path: &str,
    lines: &RangeInclusive<u32>,
    len: usize,
) -> Result<Range<usize>, DiffError> {
    let (from, to) = (*lines.start(), *lines.end());
    let out_of_range = || DiffError::LineOutOfRange {
        path: path.to_string(),
        from,
        to,
        len,
    };
    let start = usize::try_from(from).map_err(|_| out_of_range())?;
    let end = usize::try_from(to).map_err(|_| out_of_range())?;
    if start == 0 || start > end || end > len {
        return Err(out_of_range());
    }
    Ok(start - 1..end)
}

fn diff_trees(old: &Tree, new: &Tree, paths: &[String]) -> Vec<DiffFile> {
    let all: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    all.into_iter()
        .filter(|path| paths.is_empty() || paths.contains(path))
        .filter_map(|path| match (old.get(path), new.get(path)) {
            (Some(a), Some(b)) if a == b => None,
            (Some(a), Some(b)) => Some(diff_file(path, a, b, false, false)),
            (None, Some(b)) => Some(diff_file(path, "", b, true, false)),
            (Some(a), None) => Some(diff_file(path, a, "", false, true)),
            (None, None) => None,
        })
        .collect()
}

fn diff_file(path: &str, old: &str, new: &str, is_new: bool, is_deleted: bool) -> DiffFile {
    let diff = TextDiff::from_lines(old, new);
    let mut file = DiffFile {
        old_path: path.to_string(),
        new_path: path.to_string(),
        is_new,
        is_deleted,
        additions: 0,
        deletions: 0,
        hunks: Vec::new(),
    };

    for group in diff.grouped_ops(CONTEXT_RADIUS) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let (old_start, old_count) = unified_range(first.old_range().start..last.old_range().end);
        let (new_start, new_count) = unified_range(first.new_range().start..last.new_range().end);

        let mut lines = Vec::new();
        for op in &group {
            for change in diff.iter_changes(op) {
                let text = change.value().trim_end_matches('\n');
                let marker = match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Delete => {
                        file.deletions += 1;
                        '-'
                    }
                    ChangeTag::Insert => {
                        file.additions += 1;
                        '+'
                    }
                };
                lines.push(format!("{}{}", marker, text));
            }
        }

        file.hunks.push(Hunk {
            header: format!("@@ -{},{} +{},{} @@", old_start, old_count, new_start, new_count),
            old_start,
            old_count,
            new_start,
            new_count,
            lines,
        });
    }
    file
}

/// Unified diff convention: an empty side names the line before it.
fn unified_range(range: Range<usize>) -> (u32, u32) {
    let count = range.len();
    let start = if count == 0 { range.start } else { range.start + 1 };
    (to_u32(start), to_u32(count))
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
