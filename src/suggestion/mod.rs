pub mod lock;
pub mod types;

pub use lock::BranchLocks;
pub use types::{InapplicableReason, Suggestion};

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::diff::{CommitRequest, ContentMutator, ContentProvider, DiffError, FileEdit};
use crate::note::{DiffNote, MergeState, NoteId, Noteable};

/// Commit message used when no template is configured.
pub const DEFAULT_COMMIT_MESSAGE: &str =
    "Apply %{suggestions_count} suggestion(s) to %{files_count} file(s)";

#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("Suggestion cannot be applied: {0}")]
    Inapplicable(InapplicableReason),

    #[error("Suggestion on {path} lines {from_line}-{to_line} conflicts with another change")]
    ConflictingSuggestionApplication {
        path: String,
        from_line: u32,
        to_line: u32,
    },

    #[error("Suggestion does not belong to note {note} on this merge request")]
    NoteMismatch { note: NoteId },

    #[error("Invalid line range {from_line}-{to_line}")]
    InvalidRange { from_line: u32, to_line: u32 },

    #[error("Suggestions are only supported on merge requests")]
    UnsupportedNoteable,

    #[error("Suggestions must be anchored to a line of the new file")]
    NotOnNewLine,

    #[error("No suggestions to apply")]
    NothingToApply,

    #[error(transparent)]
    Content(#[from] DiffError),
}

impl Suggestion {
    /// A suggestion replacing `from_line..=to_line` of the note's file.
    pub fn new(
        note: &DiffNote,
        from_line: u32,
        to_line: u32,
        from_content: &str,
        to_content: &str,
    ) -> Result<Self, SuggestionError> {
        suggestion_path(note)?;
        if from_line == 0 || to_line < from_line {
            return Err(SuggestionError::InvalidRange { from_line, to_line });
        }
        Ok(Self {
            note_id: note.id(),
            from_line,
            to_line,
            from_content: from_content.to_string(),
            to_content: normalize(to_content),
            applied: false,
            applied_commit_sha: None,
        })
    }

    /// Read the lines around the note's anchor, `lines_above` before and
    /// `lines_below` after it, as the content being replaced.
    pub async fn capture(
        note: &DiffNote,
        content: &dyn ContentProvider,
        lines_above: u32,
        lines_below: u32,
        to_content: &str,
    ) -> Result<Self, SuggestionError> {
        let path = suggestion_path(note)?;
        let anchor = note.position().new_line.ok_or(SuggestionError::NotOnNewLine)?;
        let head = note.position().head_sha.as_deref().unwrap_or_default();
        let from_line = anchor.saturating_sub(lines_above).max(1);
        let to_line = anchor.saturating_add(lines_below);
        let from_content = content.read_lines(head, path, from_line..=to_line).await?;
        Self::new(note, from_line, to_line, &from_content, to_content)
    }

    /// First failing check, from what is already known about the note and
    /// its merge request. `None` means appliable.
    pub fn inapplicable_reason(
        &self,
        note: &DiffNote,
        noteable: &Noteable,
    ) -> Option<InapplicableReason> {
        if let Some(reason) = self.state_reason(noteable) {
            return Some(reason);
        }
        if !noteable.source_branch_exists {
            return Some(InapplicableReason::SourceBranchDeleted);
        }
        if !note.is_active_on(noteable) {
            return Some(InapplicableReason::Outdated);
        }
        self.content_reason()
    }

    pub fn appliable(&self, note: &DiffNote, noteable: &Noteable) -> bool {
        self.inapplicable_reason(note, noteable).is_none()
    }

    /// Same checks as [`Suggestion::inapplicable_reason`], but the branch
    /// and the replaced lines are read fresh. The note must still be active
    /// on the merge request and its lines must still hold `from_content` at
    /// the branch head.
    ///
    /// This is the gate [`SuggestionApplier`] applies under.
    #[instrument(
        skip_all,
        fields(note = %note.id(), from = self.from_line, to = self.to_line)
    )]
    pub async fn verify(
        &self,
        note: &DiffNote,
        noteable: &Noteable,
        content: &dyn ContentProvider,
        mutator: &dyn ContentMutator,
    ) -> Result<Option<InapplicableReason>, SuggestionError> {
        check_pair(note, self, noteable)?;
        if let Some(reason) = self.state_reason(noteable) {
            return Ok(Some(reason));
        }
        let branch = source_branch(noteable)?;
        let Some(head) = mutator.branch_head(branch).await? else {
            return Ok(Some(InapplicableReason::SourceBranchDeleted));
        };
        if !note.is_active_on(noteable) {
            debug!(%head, "note is not on the current comparison");
            return Ok(Some(InapplicableReason::Outdated));
        }
        let path = suggestion_path(note)?;
        if !self.holds_from_content(content, &head, path).await? {
            debug!(%head, path, "suggested lines changed");
            return Ok(Some(InapplicableReason::Outdated));
        }
        Ok(self.content_reason())
    }

    /// `verify` reduced to a yes/no.
    pub async fn appliable_fresh(
        &self,
        note: &DiffNote,
        noteable: &Noteable,
        content: &dyn ContentProvider,
        mutator: &dyn ContentMutator,
    ) -> Result<bool, SuggestionError> {
        Ok(self.verify(note, noteable, content, mutator).await?.is_none())
    }

    fn state_reason(&self, noteable: &Noteable) -> Option<InapplicableReason> {
        if self.applied {
            return Some(InapplicableReason::AlreadyApplied);
        }
        match noteable.state {
            MergeState::Merged => Some(InapplicableReason::ParentMerged),
            MergeState::Closed => Some(InapplicableReason::ParentClosed),
            MergeState::Opened => None,
        }
    }

    fn content_reason(&self) -> Option<InapplicableReason> {
        (!self.has_different_content()).then_some(InapplicableReason::UnchangedContent)
    }

    async fn holds_from_content(
        &self,
        content: &dyn ContentProvider,
        revision: &str,
        path: &str,
    ) -> Result<bool, SuggestionError> {
        match content.read_lines(revision, path, self.from_line..=self.to_line).await {
            Ok(current) => Ok(current == self.from_content),
            Err(DiffError::MissingFile { .. }) | Err(DiffError::LineOutOfRange { .. }) => {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Applies suggestions as commits on the source branch, one branch at a
/// time.
///
/// Appliers writing to the same repository should share one
/// [`BranchLocks`] through [`SuggestionApplier::with_locks`].
pub struct SuggestionApplier<'a> {
    content: &'a dyn ContentProvider,
    mutator: &'a dyn ContentMutator,
    locks: Arc<BranchLocks>,
    message_template: String,
}

impl<'a> SuggestionApplier<'a> {
    pub fn new(content: &'a dyn ContentProvider, mutator: &'a dyn ContentMutator) -> Self {
        Self {
            content,
            mutator,
            locks: Arc::new(BranchLocks::new()),
            message_template: DEFAULT_COMMIT_MESSAGE.to_string(),
        }
    }

    /// Serialize on `locks` instead of a private set.
    pub fn with_locks(mut self, locks: Arc<BranchLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Use `template` for commit messages; blank keeps the default.
    pub fn with_message_template(mut self, template: &str) -> Self {
        if !template.trim().is_empty() {
            self.message_template = template.to_string();
        }
        self
    }

    /// Apply one suggestion. Returns the new commit sha.
    pub async fn apply(
        &self,
        note: &DiffNote,
        suggestion: &mut Suggestion,
        noteable: &Noteable,
        committer: &str,
    ) -> Result<String, SuggestionError> {
        self.apply_batch(&mut [(note, suggestion)], noteable, committer).await
    }

    /// Apply every suggestion in `batch` as a single commit.
    ///
    /// Nothing is written unless every suggestion passes
    /// [`Suggestion::verify`] and no two replace overlapping lines of the
    /// same file. The branch stays locked from the final content check until
    /// the commit lands; lines that changed while waiting for the lock, or a
    /// branch that moved under the commit, are a conflict.
    #[instrument(
        skip_all,
        fields(noteable = %noteable.reference, suggestions = batch.len(), committer = %committer)
    )]
    pub async fn apply_batch(
        &self,
        batch: &mut [(&DiffNote, &mut Suggestion)],
        noteable: &Noteable,
        committer: &str,
    ) -> Result<String, SuggestionError> {
        if batch.is_empty() {
            return Err(SuggestionError::NothingToApply);
        }
        let branch = source_branch(noteable)?;

        for (note, suggestion) in batch.iter() {
            let verdict = suggestion
                .verify(note, noteable, self.content, self.mutator)
                .await?;
            if let Some(reason) = verdict {
                return Err(SuggestionError::Inapplicable(reason));
            }
        }

        let mut ranges = Vec::with_capacity(batch.len());
        for (note, suggestion) in batch.iter() {
            let path = suggestion_path(note)?.to_string();
            ranges.push((path, suggestion.from_line, suggestion.to_line));
        }
        check_overlaps(&mut ranges)?;

        let _guard = self.locks.lock(branch).await;
        let head = self
            .mutator
            .branch_head(branch)
            .await?
            .ok_or(SuggestionError::Inapplicable(InapplicableReason::SourceBranchDeleted))?;

        let mut edits = Vec::with_capacity(batch.len());
        for (note, suggestion) in batch.iter() {
            let path = suggestion_path(note)?;
            if !suggestion.holds_from_content(self.content, &head, path).await? {
                return Err(SuggestionError::ConflictingSuggestionApplication {
                    path: path.to_string(),
                    from_line: suggestion.from_line,
                    to_line: suggestion.to_line,
                });
            }
            edits.push(FileEdit {
                path: path.to_string(),
                from_line: suggestion.from_line,
                to_line: suggestion.to_line,
                content: suggestion.to_content.clone(),
            });
        }

        let mut paths: Vec<String> = Vec::new();
        for edit in &edits {
            if !paths.contains(&edit.path) {
                paths.push(edit.path.clone());
            }
        }
        let message = render_commit_message(
            &self.message_template,
            branch,
            committer,
            &paths,
            edits.len(),
        );
        let first = edits[0].clone();
        let request = CommitRequest {
            branch: branch.to_string(),
            start_sha: head,
            edits,
            message,
            committer: committer.to_string(),
        };
        let sha = match self.mutator.commit(&request).await {
            Ok(sha) => sha,
            Err(DiffError::StaleBranch { actual, .. }) => {
                debug!(%actual, "branch moved before the commit landed");
                return Err(SuggestionError::ConflictingSuggestionApplication {
                    path: first.path,
                    from_line: first.from_line,
                    to_line: first.to_line,
                });
            }
            Err(e) => return Err(e.into()),
        };

        for (_, suggestion) in batch.iter_mut() {
            suggestion.mark_applied(&sha);
        }
        info!(%sha, files = paths.len(), "applied suggestions");
        Ok(sha)
    }
}

/// Fill the placeholders of a commit message template.
pub fn render_commit_message(
    template: &str,
    branch: &str,
    username: &str,
    file_paths: &[String],
    suggestions_count: usize,
) -> String {
    template
        .replace("%{branch_name}", branch)
        .replace("%{username}", username)
        .replace("%{files_count}", &file_paths.len().to_string())
        .replace("%{suggestions_count}", &suggestions_count.to_string())
        .replace("%{file_paths}", &file_paths.join(", "))
}

fn source_branch(noteable: &Noteable) -> Result<&str, SuggestionError> {
    if noteable.is_commit() {
        return Err(SuggestionError::UnsupportedNoteable);
    }
    noteable
        .source_branch
        .as_deref()
        .ok_or(SuggestionError::UnsupportedNoteable)
}

/// The new-side file a suggestion on `note` rewrites.
fn suggestion_path(note: &DiffNote) -> Result<&str, SuggestionError> {
    if note.is_for_commit() {
        return Err(SuggestionError::UnsupportedNoteable);
    }
    let position = note.position();
    if position.new_line.is_none() {
        return Err(SuggestionError::NotOnNewLine);
    }
    position.new_path.as_deref().ok_or(SuggestionError::NotOnNewLine)
}

fn check_pair(
    note: &DiffNote,
    suggestion: &Suggestion,
    noteable: &Noteable,
) -> Result<(), SuggestionError> {
    if suggestion.note_id != note.id() || note.noteable() != &noteable.reference {
        return Err(SuggestionError::NoteMismatch { note: note.id() });
    }
    Ok(())
}

fn check_overlaps(ranges: &mut [(String, u32, u32)]) -> Result<(), SuggestionError> {
    ranges.sort();
    for pair in ranges.windows(2) {
        let (path, _, prev_to) = &pair[0];
        let (next_path, next_from, next_to) = &pair[1];
        if path == next_path && next_from <= prev_to {
            return Err(SuggestionError::ConflictingSuggestionApplication {
                path: next_path.clone(),
                from_line: *next_from,
                to_line: *next_to,
            });
        }
    }
    Ok(())
}

/// Replacement text always ends in a newline unless it deletes the lines.
fn normalize(to_content: &str) -> String {
    if to_content.is_empty() || to_content.ends_with('\n') {
        to_content.to_string()
    } else {
        format!("{}\n", to_content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::memory::MemoryRepository;
    use crate::note::{NoteHeader, NoteableRef};
    use crate::position::{DiffPosition, DiffRefs};
    use async_trait::async_trait;
    use std::time::Duration;

    fn numbered(n: u32) -> String {
        (1..=n).map(|i| format!("line {}\n", i)).collect()
    }

    /// Merge request on `feature` whose head rewrites lines 2 and 5 of a.rb.
    struct Setup {
        repo: MemoryRepository,
        noteable: Noteable,
    }

    fn setup() -> Setup {
        let repo = MemoryRepository::new();
        let base = repo.commit_files("main", &[("a.rb", &numbered(10))]);
        let head_content = numbered(10)
            .replace("line 2\n", "two\n")
            .replace("line 5\n", "five\n");
        let head = repo.commit_files("feature", &[("a.rb", &head_content)]);
        let refs = DiffRefs::new(base.clone(), base, head);
        let noteable = Noteable::merge_request("5", refs, "feature");
        Setup { repo, noteable }
    }

    impl Setup {
        fn note(&self, id: u64, line: u32) -> DiffNote {
            let refs = self.noteable.current_refs().unwrap();
            DiffNote::create(
                NoteHeader::new(id, "alice", "suggestion"),
                self.noteable.reference.clone(),
                DiffPosition::added("a.rb", line, refs),
            )
            .unwrap()
        }

        async fn suggest(&self, note: &DiffNote, to: &str) -> Suggestion {
            Suggestion::capture(note, &self.repo, 0, 0, to).await.unwrap()
        }

        fn head(&self) -> String {
            self.repo.head("feature").unwrap()
        }
    }

    #[tokio::test]
    async fn test_capture_reads_anchor_lines() {
        let s = setup();
        let note = s.note(1, 5);
        let suggestion = Suggestion::capture(&note, &s.repo, 1, 1, "FIVE").await.unwrap();
        assert_eq!(suggestion.from_line, 4);
        assert_eq!(suggestion.to_line, 6);
        assert_eq!(suggestion.from_content, "line 4\nfive\nline 6\n");
        assert_eq!(suggestion.to_content, "FIVE\n");
        assert_eq!(suggestion.line_count(), 3);
    }

    #[tokio::test]
    async fn test_merged_parent_is_reported() {
        let s = setup();
        let note = s.note(1, 5);
        let suggestion = s.suggest(&note, "FIVE").await;
        let mut merged = s.noteable.clone();
        merged.state = MergeState::Merged;

        assert!(!suggestion.is_applied());
        assert!(!suggestion.appliable(&note, &merged));
        assert_eq!(
            suggestion.inapplicable_reason(&note, &merged),
            Some(InapplicableReason::ParentMerged)
        );
    }

    #[tokio::test]
    async fn test_reasons_in_priority_order() {
        let s = setup();
        let note = s.note(1, 5);
        let suggestion = s.suggest(&note, "FIVE").await;
        assert_eq!(suggestion.inapplicable_reason(&note, &s.noteable), None);

        let mut closed = s.noteable.clone();
        closed.state = MergeState::Closed;
        closed.source_branch_exists = false;
        assert_eq!(
            suggestion.inapplicable_reason(&note, &closed),
            Some(InapplicableReason::ParentClosed)
        );

        let mut deleted = s.noteable.clone();
        deleted.source_branch_exists = false;
        assert_eq!(
            suggestion.inapplicable_reason(&note, &deleted),
            Some(InapplicableReason::SourceBranchDeleted)
        );

        let mut moved = s.noteable.clone();
        moved.diff_refs = Some(DiffRefs::new("b9", "b9", "h9"));
        assert_eq!(
            suggestion.inapplicable_reason(&note, &moved),
            Some(InapplicableReason::Outdated)
        );

        let same = s.suggest(&note, "five").await;
        assert_eq!(
            same.inapplicable_reason(&note, &s.noteable),
            Some(InapplicableReason::UnchangedContent)
        );

        let mut applied = suggestion.clone();
        applied.mark_applied("abc");
        let mut merged = s.noteable.clone();
        merged.state = MergeState::Merged;
        assert_eq!(
            applied.inapplicable_reason(&note, &merged),
            Some(InapplicableReason::AlreadyApplied)
        );
    }

    #[tokio::test]
    async fn test_fresh_check_reads_branch_and_content() {
        let s = setup();
        let note = s.note(1, 5);
        let suggestion = s.suggest(&note, "FIVE").await;
        assert_eq!(suggestion.verify(&note, &s.noteable, &s.repo, &s.repo).await.unwrap(), None);

        // lines 1-3 changed on the branch: line 5 still holds the captured text
        let unrelated = numbered(10).replace("line 2\n", "TWO\n").replace("line 5\n", "five\n");
        s.repo.write_file("feature", "a.rb", &unrelated).unwrap();
        assert!(suggestion.appliable_fresh(&note, &s.noteable, &s.repo, &s.repo).await.unwrap());

        s.repo.write_file("feature", "a.rb", &numbered(10)).unwrap();
        assert!(suggestion.appliable(&note, &s.noteable));
        assert_eq!(
            suggestion.verify(&note, &s.noteable, &s.repo, &s.repo).await.unwrap(),
            Some(InapplicableReason::Outdated)
        );

        s.repo.delete_branch("feature");
        assert_eq!(
            suggestion.verify(&note, &s.noteable, &s.repo, &s.repo).await.unwrap(),
            Some(InapplicableReason::SourceBranchDeleted)
        );
    }

    #[tokio::test]
    async fn test_apply_commits_and_is_one_way() {
        let s = setup();
        let note = s.note(1, 5);
        let mut suggestion = s.suggest(&note, "FIVE").await;
        let applier = SuggestionApplier::new(&s.repo, &s.repo);

        let sha = applier.apply(&note, &mut suggestion, &s.noteable, "bob").await.unwrap();
        assert_eq!(s.head(), sha);
        assert_eq!(suggestion.applied_commit_sha(), Some(sha.as_str()));
        assert!(s.repo.file_at(&sha, "a.rb").unwrap().contains("line 4\nFIVE\nline 6\n"));

        assert!(!suggestion.appliable(&note, &s.noteable));
        let mut reopened = s.noteable.clone();
        reopened.diff_refs = Some(DiffRefs::new("x", "x", sha.clone()));
        assert_eq!(
            suggestion.inapplicable_reason(&note, &reopened),
            Some(InapplicableReason::AlreadyApplied)
        );

        let again = applier.apply(&note, &mut suggestion, &s.noteable, "bob").await;
        assert!(matches!(
            again,
            Err(SuggestionError::Inapplicable(InapplicableReason::AlreadyApplied))
        ));
        assert_eq!(s.head(), sha);
    }

    #[tokio::test]
    async fn test_batch_is_one_commit() {
        let s = setup();
        let (n1, n2) = (s.note(1, 2), s.note(2, 5));
        let mut first = s.suggest(&n1, "TWO").await;
        let mut second = s.suggest(&n2, "").await;
        let before = s.head();

        let applier = SuggestionApplier::new(&s.repo, &s.repo);
        let sha = applier
            .apply_batch(&mut [(&n1, &mut first), (&n2, &mut second)], &s.noteable, "bob")
            .await
            .unwrap();

        assert_ne!(sha, before);
        assert_eq!(
            s.repo.file_at(&sha, "a.rb").unwrap(),
            "line 1\nTWO\nline 3\nline 4\nline 6\nline 7\nline 8\nline 9\nline 10\n"
        );
        assert!(first.is_applied() && second.is_applied());
        assert_eq!(first.applied_commit_sha(), second.applied_commit_sha());
    }

    #[tokio::test]
    async fn test_overlapping_batch_is_rejected() {
        let s = setup();
        let (n1, n2) = (s.note(1, 5), s.note(2, 5));
        let mut wide = Suggestion::capture(&n1, &s.repo, 1, 0, "x").await.unwrap();
        let mut narrow = s.suggest(&n2, "y").await;
        let before = s.head();

        let applier = SuggestionApplier::new(&s.repo, &s.repo);
        let err = applier
            .apply_batch(&mut [(&n1, &mut wide), (&n2, &mut narrow)], &s.noteable, "bob")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SuggestionError::ConflictingSuggestionApplication { from_line: 5, to_line: 5, .. }
        ));
        assert_eq!(s.head(), before);
        assert!(!wide.is_applied() && !narrow.is_applied());
    }

    #[tokio::test]
    async fn test_change_landing_while_waiting_for_lock_conflicts() {
        let s = setup();
        let note = s.note(1, 5);
        let mut suggestion = s.suggest(&note, "FIVE").await;
        let applier = SuggestionApplier::new(&s.repo, &s.repo);
        let repo = &s.repo;

        let guard = applier.locks.lock("feature").await;
        let other = async move {
            tokio::task::yield_now().await;
            repo.write_file("feature", "a.rb", &numbered(10).replace("line 5\n", "other\n"))
                .unwrap();
            drop(guard);
        };
        let apply = applier.apply(&note, &mut suggestion, &s.noteable, "bob");
        let (result, ()) = tokio::join!(apply, other);

        assert!(matches!(
            result,
            Err(SuggestionError::ConflictingSuggestionApplication { from_line: 5, to_line: 5, .. })
        ));
        assert!(!suggestion.is_applied());
    }

    #[tokio::test]
    async fn test_suggestions_need_a_merge_request_new_line() {
        let s = setup();
        let refs = s.noteable.current_refs().unwrap();
        let removed = DiffNote::create(
            NoteHeader::new(1, "alice", "x"),
            s.noteable.reference.clone(),
            DiffPosition::removed("a.rb", 5, refs),
        )
        .unwrap();
        assert!(matches!(
            Suggestion::new(&removed, 5, 5, "a", "b"),
            Err(SuggestionError::NotOnNewLine)
        ));

        let on_commit = DiffNote::create(
            NoteHeader::new(2, "alice", "x"),
            NoteableRef::commit("c1"),
            DiffPosition::added("a.rb", 5, &DiffRefs::for_commit("p1", "c1")),
        )
        .unwrap();
        assert!(matches!(
            Suggestion::new(&on_commit, 5, 5, "a", "b"),
            Err(SuggestionError::UnsupportedNoteable)
        ));

        let note = s.note(3, 5);
        assert!(matches!(
            Suggestion::new(&note, 6, 5, "a", "b"),
            Err(SuggestionError::InvalidRange { from_line: 6, to_line: 5 })
        ));
    }

    #[test]
    fn test_commit_message_placeholders() {
        let paths = vec!["a.rb".to_string(), "b.rb".to_string()];
        assert_eq!(
            render_commit_message(DEFAULT_COMMIT_MESSAGE, "feature", "bob", &paths, 3),
            "Apply 3 suggestion(s) to 2 file(s)"
        );
        let template = "%{username} on %{branch_name}: %{file_paths}";
        assert_eq!(
            render_commit_message(template, "feature", "bob", &paths, 3),
            "bob on feature: a.rb, b.rb"
        );
    }

    #[tokio::test]
    async fn test_fresh_check_and_apply_agree_after_unrelated_push() {
        let s = setup();
        let note = s.note(1, 5);
        let mut suggestion = s.suggest(&note, "FIVE").await;

        // a push that leaves a.rb alone still moves the comparison away from the note
        let pushed = s.repo.write_file("feature", "README.md", "docs\n").unwrap();
        let mut moved = s.noteable.clone();
        moved.diff_refs = moved.diff_refs.map(|r| DiffRefs::new(r.base_sha, r.start_sha, pushed));

        let fresh = suggestion
            .verify(&note, &moved, &s.repo, &s.repo)
            .await
            .unwrap();
        assert_eq!(fresh, Some(InapplicableReason::Outdated));

        let applier = SuggestionApplier::new(&s.repo, &s.repo);
        let applied = applier.apply(&note, &mut suggestion, &moved, "bob").await;
        assert!(matches!(
            applied,
            Err(SuggestionError::Inapplicable(InapplicableReason::Outdated))
        ));
        assert_eq!(fresh.is_none(), applied.is_ok());
        assert!(!suggestion.is_applied());

        // against the comparison it was written on, both say yes
        let fresh = suggestion
            .appliable_fresh(&note, &s.noteable, &s.repo, &s.repo)
            .await
            .unwrap();
        assert!(fresh);
    }

    #[tokio::test]
    async fn test_appliers_sharing_locks_wait_for_each_other() {
        let s = setup();
        let note = s.note(1, 5);
        let mut suggestion = s.suggest(&note, "FIVE").await;
        let locks = Arc::new(BranchLocks::new());
        let first = SuggestionApplier::new(&s.repo, &s.repo).with_locks(Arc::clone(&locks));
        let second = SuggestionApplier::new(&s.repo, &s.repo).with_locks(Arc::clone(&locks));

        let held = first.locks.lock("feature").await;
        let waiting = tokio::time::timeout(
            Duration::from_millis(20),
            second.apply(&note, &mut suggestion, &s.noteable, "bob"),
        )
        .await;
        assert!(waiting.is_err());
        assert!(!suggestion.is_applied());

        drop(held);
        second
            .apply(&note, &mut suggestion, &s.noteable, "bob")
            .await
            .unwrap();
        assert!(suggestion.is_applied());
    }

    /// Pushes to the branch right before every commit it forwards.
    struct Racing<'a> {
        repo: &'a MemoryRepository,
    }

    #[async_trait]
    impl ContentMutator for Racing<'_> {
        async fn branch_head(&self, branch: &str) -> Result<Option<String>, DiffError> {
            self.repo.branch_head(branch).await
        }

        async fn commit(&self, request: &CommitRequest) -> Result<String, DiffError> {
            self.repo.write_file(&request.branch, "README.md", "raced\n")?;
            self.repo.commit(request).await
        }
    }

    #[tokio::test]
    async fn test_branch_moving_under_commit_is_a_conflict() {
        let s = setup();
        let note = s.note(1, 5);
        let mut suggestion = s.suggest(&note, "FIVE").await;
        let racing = Racing { repo: &s.repo };

        let applier = SuggestionApplier::new(&s.repo, &racing);
        let result = applier.apply(&note, &mut suggestion, &s.noteable, "bob").await;

        assert!(matches!(
            result,
            Err(SuggestionError::ConflictingSuggestionApplication { from_line: 5, to_line: 5, .. })
        ));
        assert!(!suggestion.is_applied());
        assert_eq!(s.repo.file_at(&s.head(), "README.md").as_deref(), Some("raced\n"));
    }
}
