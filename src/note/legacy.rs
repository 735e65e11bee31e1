use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{NoteHeader, NoteId, NoteableRef};
use super::NoteError;
use crate::diff::{find_file, DiffFile, DiffLine, LineKind, PatchParser};
use crate::discussion::identity::{compute_id, DiscussionId};
use crate::position::LineCode;
use crate::resolution::{Resolvable, Resolution};

/// Lines of leading context shown for a legacy note.
pub const CONTEXT_LINES: usize = 16;

/// What to do when the stored line text occurs more than once in the
/// current comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AmbiguityPolicy {
    /// Take the first occurrence in diff order
    #[serde(rename = "first")]
    FirstMatch,
    /// Take the occurrence nearest the line number recorded in the line code
    #[default]
    #[serde(rename = "closest")]
    ClosestToRecorded,
    /// Refuse to pick
    #[serde(rename = "reject")]
    Reject,
}

/// The single-file patch captured when a legacy note was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPatch {
    pub old_path: String,
    pub new_path: String,
    /// Unified diff text for this file only
    pub diff: String,
}

impl StoredPatch {
    pub fn new(old_path: &str, new_path: &str, diff: &str) -> Self {
        Self {
            old_path: old_path.to_string(),
            new_path: new_path.to_string(),
            diff: diff.to_string(),
        }
    }

    /// Capture the patch of one file from a comparison.
    pub fn from_file(file: &DiffFile) -> Self {
        Self::new(&file.old_path, &file.new_path, &file.patch())
    }
}

/// The line in the current comparison a legacy note was matched to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyMatch {
    /// Index of the matched line within `lines`
    pub index: usize,
    pub line: DiffLine,
    /// How many lines carried the same text
    pub candidates: usize,
    /// The current file's parsed patch
    pub lines: Vec<DiffLine>,
}

impl LegacyMatch {
    /// Leading context of the matched line in the current comparison.
    pub fn context_window(&self, max_lines: usize) -> Vec<DiffLine> {
        context_window(&self.lines, self.index, max_lines)
    }
}

/// A note anchored by a line code into a patch stored alongside it.
///
/// There is no structured position: the note is found again by looking for
/// its line's exact text in the current comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyDiffNote {
    #[serde(flatten)]
    header: NoteHeader,
    noteable: NoteableRef,
    line_code: LineCode,
    patch: StoredPatch,
    #[serde(flatten)]
    resolution: Resolution,
    discussion_id: DiscussionId,
    original_discussion_id: DiscussionId,
    #[serde(skip)]
    diff_line: OnceLock<Option<DiffLine>>,
}

impl PartialEq for LegacyDiffNote {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
            && self.noteable == other.noteable
            && self.line_code == other.line_code
            && self.patch == other.patch
            && self.resolution == other.resolution
            && self.discussion_id == other.discussion_id
            && self.original_discussion_id == other.original_discussion_id
    }
}

impl LegacyDiffNote {
    pub fn create(
        header: NoteHeader,
        noteable: NoteableRef,
        line_code: &str,
        patch: StoredPatch,
    ) -> Result<Self, NoteError> {
        let code: LineCode = line_code
            .parse()
            .map_err(|_| NoteError::InvalidLineCode(line_code.to_string()))?;
        if !code.is_for_path(&patch.new_path) && !code.is_for_path(&patch.old_path) {
            return Err(NoteError::InvalidLineCode(line_code.to_string()));
        }

        let discussion_id = compute_id(noteable.kind.as_str(), &noteable.id, &[code.to_string()]);
        Ok(Self {
            header,
            noteable,
            line_code: code,
            patch,
            resolution: Resolution::default(),
            original_discussion_id: discussion_id.clone(),
            discussion_id,
            diff_line: OnceLock::new(),
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

    pub fn line_code(&self) -> &LineCode {
        &self.line_code
    }

    pub fn patch(&self) -> &StoredPatch {
        &self.patch
    }

    pub fn discussion_id(&self) -> &DiscussionId {
        &self.discussion_id
    }

    pub fn original_discussion_id(&self) -> &DiscussionId {
        &self.original_discussion_id
    }

    /// The stored line this note was written on, looked up once.
    pub fn diff_line(&self, parser: &dyn PatchParser) -> Result<Option<&DiffLine>, NoteError> {
        if let Some(line) = self.diff_line.get() {
            return Ok(line.as_ref());
        }
        let found = self.stored_lines(parser)?.into_iter().find(|line| self.is_for_line(line));
        Ok(self.diff_line.get_or_init(|| found).as_ref())
    }

    fn stored_lines(&self, parser: &dyn PatchParser) -> Result<Vec<DiffLine>, NoteError> {
        Ok(parser.parse(&self.patch.diff)?)
    }

    fn is_for_line(&self, line: &DiffLine) -> bool {
        !line.is_match()
            && line.old_pos == self.line_code.old_line
            && line.new_pos == self.line_code.new_line
    }

    /// Whether the stored line's text still occurs in the current patch of
    /// the same file.
    pub fn matches_current_content(&self, current: &[DiffFile], parser: &dyn PatchParser) -> bool {
        match self.candidates(current, parser) {
            Ok(Some((_, _, hits))) => !hits.is_empty(),
            Ok(None) => false,
            Err(e) => {
                debug!(note = %self.header.id, error = %e, "legacy content match failed");
                false
            }
        }
    }

    /// Locate the stored line in the current comparison.
    ///
    /// Returns `Ok(None)` when the file or the text is gone. When the text
    /// occurs more than once, `policy` picks the candidate.
    pub fn find_current_match(
        &self,
        current: &[DiffFile],
        parser: &dyn PatchParser,
        policy: AmbiguityPolicy,
    ) -> Result<Option<LegacyMatch>, NoteError> {
        let Some((stored, lines, hits)) = self.candidates(current, parser)? else {
            return Ok(None);
        };
        let index = match hits.as_slice() {
            [] => return Ok(None),
            [only] => *only,
            _ => {
                warn!(
                    note = %self.header.id,
                    line_code = %self.line_code,
                    candidates = hits.len(),
                    ?policy,
                    "ambiguous legacy match"
                );
                match policy {
                    AmbiguityPolicy::FirstMatch => hits[0],
                    AmbiguityPolicy::ClosestToRecorded => closest(&stored, &lines, &hits),
                    AmbiguityPolicy::Reject => {
                        return Err(NoteError::AmbiguousLegacyMatch {
                            line_code: self.line_code.to_string(),
                            candidates: hits.len(),
                        })
                    }
                }
            }
        };

        Ok(Some(LegacyMatch {
            index,
            line: lines[index].clone(),
            candidates: hits.len(),
            lines,
        }))
    }

    /// Stored line, current lines of the same file and the indices of the
    /// current lines carrying the stored text.
    fn candidates(
        &self,
        current: &[DiffFile],
        parser: &dyn PatchParser,
    ) -> Result<Option<(DiffLine, Vec<DiffLine>, Vec<usize>)>, NoteError> {
        let Some(stored) = self.diff_line(parser)?.cloned() else {
            return Ok(None);
        };
        let Some(file) = find_file(current, &self.patch.new_path)
            .or_else(|| find_file(current, &self.patch.old_path))
        else {
            return Ok(None);
        };
        let lines = parser.parse(&file.patch())?;
        let hits = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| !line.is_match() && line.text == stored.text)
            .map(|(i, _)| i)
            .collect();
        Ok(Some((stored, lines, hits)))
    }

    /// Commit notes are always active. Otherwise the note is active while its
    /// line text can still be found in the current comparison.
    pub fn is_active(&self, current: &[DiffFile], parser: &dyn PatchParser) -> bool {
        if self.noteable.is_commit() {
            return true;
        }
        match self.diff_line(parser) {
            Ok(None) => true,
            Ok(Some(_)) => self.matches_current_content(current, parser),
            Err(e) => {
                debug!(note = %self.header.id, error = %e, "stored patch unreadable");
                false
            }
        }
    }

    /// Leading context of the note's own line in the stored patch.
    pub fn context_window(
        &self,
        parser: &dyn PatchParser,
        max_lines: usize,
    ) -> Result<Vec<DiffLine>, NoteError> {
        let lines = self.stored_lines(parser)?;
        Ok(match lines.iter().position(|line| self.is_for_line(line)) {
            Some(index) => context_window(&lines, index, max_lines),
            None => Vec::new(),
        })
    }
}

impl Resolvable for LegacyDiffNote {
    fn resolvable(&self) -> bool {
        false
    }

    fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    fn resolution_mut(&mut self) -> &mut Resolution {
        &mut self.resolution
    }
}

/// At most `max_lines` lines ending at `index`, never reaching back past the
/// nearest hunk header.
pub fn context_window(lines: &[DiffLine], index: usize, max_lines: usize) -> Vec<DiffLine> {
    if max_lines == 0 || index >= lines.len() {
        return Vec::new();
    }
    let hunk_start = lines[..index]
        .iter()
        .rposition(DiffLine::is_match)
        .map_or(0, |i| i + 1);
    let start = hunk_start.max((index + 1).saturating_sub(max_lines));
    lines[start..=index].to_vec()
}

fn closest(stored: &DiffLine, lines: &[DiffLine], hits: &[usize]) -> usize {
    let recorded = |line: &DiffLine| match stored.kind {
        LineKind::Removed => line.old_pos,
        _ => line.new_pos,
    };
    let target = recorded(stored);
    hits.iter()
        .copied()
        .min_by_key(|&i| recorded(&lines[i]).abs_diff(target))
        .unwrap_or(hits[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{parse_diff, UnifiedPatchParser};
    use crate::note::tests::mr;

    const STORED: &str = "@@ -1,4 +1,4 @@\n def find\n-  return false\n+  return nil\n end\n";

    fn note(code: LineCode) -> LegacyDiffNote {
        LegacyDiffNote::create(
            NoteHeader::new(1, "alice", "why nil?"),
            mr().reference,
            &code.to_string(),
            StoredPatch::new("a.rb", "a.rb", STORED),
        )
        .unwrap()
    }

    fn current(body: &str) -> Vec<DiffFile> {
        parse_diff(&format!("diff --git a/a.rb b/a.rb\n--- a/a.rb\n+++ b/a.rb\n{}", body)).unwrap()
    }

    #[test]
    fn test_create_rejects_bad_line_codes() {
        let header = NoteHeader::new(1, "alice", "x");
        let patch = StoredPatch::new("a.rb", "a.rb", STORED);
        let err = LegacyDiffNote::create(header.clone(), mr().reference, "nope", patch.clone())
            .unwrap_err();
        assert!(matches!(err, NoteError::InvalidLineCode(_)));

        let other_file = LineCode::new("b.rb", 2, 2).to_string();
        let err = LegacyDiffNote::create(header, mr().reference, &other_file, patch).unwrap_err();
        assert!(matches!(err, NoteError::InvalidLineCode(_)));
    }

    #[test]
    fn test_diff_line_lookup() {
        let note = note(LineCode::new("a.rb", 3, 2));
        let line = note.diff_line(&UnifiedPatchParser).unwrap().unwrap();
        assert_eq!(line.text, "+  return nil");
        assert_eq!(line.kind, LineKind::Added);
    }

    #[test]
    fn test_matches_content_at_a_different_line() {
        let note = note(LineCode::new("a.rb", 3, 2));
        let files = current(concat!(
            "@@ -8,5 +8,6 @@\n # helper\n def find\n   log\n",
            "-  return false\n+  return nil\n end\n+\n",
        ));
        assert!(note.matches_current_content(&files, &UnifiedPatchParser));
        assert!(note.is_active(&files, &UnifiedPatchParser));

        let found = note
            .find_current_match(&files, &UnifiedPatchParser, AmbiguityPolicy::default())
            .unwrap()
            .unwrap();
        assert_eq!(found.line.new_pos, 11);
        assert_eq!(found.candidates, 1);

        let window = found.context_window(CONTEXT_LINES);
        assert!(window.len() <= CONTEXT_LINES);
        assert_eq!(window.last(), Some(&found.line));
        assert_eq!(window.first().map(|l| l.text.as_str()), Some(" # helper"));
    }

    #[test]
    fn test_content_edit_makes_note_inactive() {
        let note = note(LineCode::new("a.rb", 3, 2));
        let files = current("@@ -1,4 +1,4 @@\n def find\n-  return false\n+  return []\n end\n");
        assert!(!note.matches_current_content(&files, &UnifiedPatchParser));
        assert!(!note.is_active(&files, &UnifiedPatchParser));
        assert!(!note.is_active(&[], &UnifiedPatchParser));
    }

    #[test]
    fn test_missing_stored_line_counts_as_active() {
        let note = note(LineCode::new("a.rb", 40, 40));
        assert!(note.diff_line(&UnifiedPatchParser).unwrap().is_none());
        assert!(note.is_active(&[], &UnifiedPatchParser));
    }

    #[test]
    fn test_ambiguity_policies() {
        let note = note(LineCode::new("a.rb", 3, 2));
        let files = current(
            "@@ -1,2 +1,3 @@\n a\n+  return nil\n b\n@@ -20,2 +21,3 @@\n c\n+  return nil\n d\n",
        );

        let first = note
            .find_current_match(&files, &UnifiedPatchParser, AmbiguityPolicy::FirstMatch)
            .unwrap()
            .unwrap();
        assert_eq!(first.line.new_pos, 2);
        assert_eq!(first.candidates, 2);

        let closest = note
            .find_current_match(&files, &UnifiedPatchParser, AmbiguityPolicy::ClosestToRecorded)
            .unwrap()
            .unwrap();
        assert_eq!(closest.line.new_pos, 2);

        let err = note
            .find_current_match(&files, &UnifiedPatchParser, AmbiguityPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, NoteError::AmbiguousLegacyMatch { candidates: 2, .. }));
        assert!(note.matches_current_content(&files, &UnifiedPatchParser));
    }

    #[test]
    fn test_closest_prefers_recorded_line() {
        let stored = "@@ -20,2 +20,3 @@\n c\n+  return nil\n d\n";
        let note = LegacyDiffNote::create(
            NoteHeader::new(1, "alice", "x"),
            mr().reference,
            &LineCode::new("a.rb", 21, 21).to_string(),
            StoredPatch::new("a.rb", "a.rb", stored),
        )
        .unwrap();
        let files = current(
            "@@ -1,2 +1,3 @@\n a\n+  return nil\n b\n@@ -20,2 +21,3 @@\n c\n+  return nil\n d\n",
        );
        let found = note
            .find_current_match(&files, &UnifiedPatchParser, AmbiguityPolicy::ClosestToRecorded)
            .unwrap()
            .unwrap();
        assert_eq!(found.line.new_pos, 22);
    }

    #[test]
    fn test_context_window_is_bounded_and_stops_at_hunk_header() {
        let mut body = String::from("@@ -1,30 +1,30 @@\n");
        for i in 1..=30 {
            body.push_str(&format!(" line {}\n", i));
        }
        let lines = UnifiedPatchParser.parse(&body).unwrap();
        let window = context_window(&lines, 25, 16);
        assert_eq!(window.len(), 16);
        assert_eq!(window.last().unwrap().text, " line 25");
        assert_eq!(window.first().unwrap().text, " line 10");

        let short = context_window(&lines, 3, 16);
        assert_eq!(short.len(), 3);
        assert!(short.iter().all(|l| !l.is_match()));

        assert!(context_window(&lines, 3, 0).is_empty());
        assert!(context_window(&lines, 99, 16).is_empty());
    }

    #[test]
    fn test_stored_context_window() {
        let note = note(LineCode::new("a.rb", 3, 2));
        let window = note.context_window(&UnifiedPatchParser, CONTEXT_LINES).unwrap();
        let texts: Vec<_> = window.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec![" def find", "-  return false", "+  return nil"]);
    }

    #[test]
    fn test_never_resolvable_and_commit_notes_active() {
        let mut legacy = note(LineCode::new("a.rb", 3, 2));
        assert!(!legacy.resolve("alice"));
        assert!(!legacy.is_resolved());

        let on_commit = LegacyDiffNote::create(
            NoteHeader::new(2, "alice", "x"),
            NoteableRef::commit("c1"),
            &LineCode::new("a.rb", 3, 2).to_string(),
            StoredPatch::new("a.rb", "a.rb", STORED),
        )
        .unwrap();
        assert!(on_commit.is_active(&[], &UnifiedPatchParser));
    }

    #[test]
    fn test_serialization_skips_cached_line() {
        let note = note(LineCode::new("a.rb", 3, 2));
        note.diff_line(&UnifiedPatchParser).unwrap();
        let json = serde_json::to_string(&note).unwrap();
        assert!(!json.contains("diff_line"));
        let back: LegacyDiffNote = serde_json::from_str(&json).unwrap();
        assert_eq!(back, note);
        assert_eq!(serde_json::to_string(&back).unwrap(), json);
    }

    #[test]
    fn test_fixture_line_found_below_new_header() {
        let stored =
            parse_diff(include_str!("../../tests/fixtures/legacy_stored.patch")).unwrap();
        let current =
            parse_diff(include_str!("../../tests/fixtures/legacy_current.patch")).unwrap();
        let note = LegacyDiffNote::create(
            NoteHeader::new(7, "bob", "drop the debug output"),
            mr().reference,
            &LineCode::new("app/greeter.rb", 3, 3).to_string(),
            StoredPatch::from_file(&stored[0]),
        )
        .unwrap();
        assert_eq!(note.diff_line(&UnifiedPatchParser).unwrap().unwrap().text, "+  puts name");

        let found = note
            .find_current_match(&current, &UnifiedPatchParser, AmbiguityPolicy::default())
            .unwrap()
            .unwrap();
        assert_eq!(found.line.new_pos, 5);
        let window = found.context_window(CONTEXT_LINES);
        assert_eq!(window.len(), 5);
        assert_eq!(window[0].text, "+# frozen_string_literal: true");
    }
}
