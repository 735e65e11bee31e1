use serde::{Deserialize, Serialize};

/// A single file within a comparison.
/// Populated by the diff parser in parse.rs or by a `DiffProvider`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFile {
    /// Path before the change (e.g., "src/auth/config.rs")
    pub old_path: String,
    /// Path after the change; differs from `old_path` on renames
    pub new_path: String,
    /// Whether this is a new file
    pub is_new: bool,
    /// Whether this file was deleted
    pub is_deleted: bool,
    /// Lines added in this file
    pub additions: usize,
    /// Lines deleted in this file
    pub deletions: usize,
    /// Hunks (contiguous changed regions)
    pub hunks: Vec<Hunk>,
}

/// A contiguous region of changes within a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// The raw `@@ -a,b +c,d @@` header line
    pub header: String,
    /// Starting line number in the old file
    pub old_start: u32,
    /// Number of lines in the old file
    pub old_count: u32,
    /// Starting line number in the new file
    pub new_start: u32,
    /// Number of lines in the new file
    pub new_count: u32,
    /// Raw lines of the hunk (prefixed with +, -, or space)
    pub lines: Vec<String>,
}

/// The type of a parsed diff line. `Match` marks a hunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Match,
    Context,
    Added,
    Removed,
}

/// A parsed diff line with its position on both sides.
///
/// `old_pos` and `new_pos` are always set: an added line carries the old
/// counter it was inserted at, a removed line the new counter. This is what
/// line codes are built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: LineKind,
    /// Full line text including its `+`/`-`/` ` marker
    pub text: String,
    pub old_pos: u32,
    pub new_pos: u32,
}

impl DiffLine {
    /// Line number in the old file, if this line exists there.
    pub fn old_line(&self) -> Option<u32> {
        match self.kind {
            LineKind::Context | LineKind::Removed => Some(self.old_pos),
            _ => None,
        }
    }

    /// Line number in the new file, if this line exists there.
    pub fn new_line(&self) -> Option<u32> {
        match self.kind {
            LineKind::Context | LineKind::Added => Some(self.new_pos),
            _ => None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.kind == LineKind::Match
    }
}

/// Where a line number from one side of a diff lands on the other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMapping {
    /// Present on both sides (context, or outside every hunk).
    Unchanged { old: u32, new: u32 },
    /// Only in the new file.
    Added { new: u32 },
    /// Only in the old file.
    Removed { old: u32 },
}

impl DiffFile {
    /// The path this file is known by in the comparison: the new path unless
    /// the file was deleted.
    pub fn path(&self) -> &str {
        if self.is_deleted {
            &self.old_path
        } else {
            &self.new_path
        }
    }

    pub fn is_renamed(&self) -> bool {
        !self.is_new && !self.is_deleted && self.old_path != self.new_path
    }

    /// Whether this file entry concerns `path` on either side.
    pub fn touches(&self, path: &str) -> bool {
        self.old_path == path || self.new_path == path
    }

    /// Render the hunks back into a single-file patch fragment.
    pub fn patch(&self) -> String {
        let mut out = String::new();
        for hunk in &self.hunks {
            out.push_str(&hunk.header);
            out.push('\n');
            for line in &hunk.lines {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// Render this file as a `diff --git` section that [`super::parse_diff`]
    /// reads back.
    pub fn unified(&self) -> String {
        let old = if self.is_new {
            "/dev/null".to_string()
        } else {
            format!("a/{}", self.old_path)
        };
        let new = if self.is_deleted {
            "/dev/null".to_string()
        } else {
            format!("b/{}", self.new_path)
        };
        format!(
            "diff --git a/{} b/{}\n--- {}\n+++ {}\n{}",
            self.old_path,
            self.new_path,
            old,
            new,
            self.patch()
        )
    }

    /// Map an old-file line number to its place in the new file.
    pub fn map_old_line(&self, old: u32) -> LineMapping {
        let mut delta: i64 = 0;
        for hunk in &self.hunks {
            let (start, end) = covered(hunk.old_start, hunk.old_count);
            if old < start {
                break;
            }
            if old < end {
                if let Some(mapping) = hunk.walk(|line| line.old_line() == Some(old)) {
                    return mapping;
                }
            }
            delta += i64::from(hunk.new_count) - i64::from(hunk.old_count);
        }
        LineMapping::Unchanged { old, new: shift(old, delta) }
    }

    /// Map a new-file line number back to its place in the old file.
    pub fn map_new_line(&self, new: u32) -> LineMapping {
        let mut delta: i64 = 0;
        for hunk in &self.hunks {
            let (start, end) = covered(hunk.new_start, hunk.new_count);
            if new < start {
                break;
            }
            if new < end {
                if let Some(mapping) = hunk.walk(|line| line.new_line() == Some(new)) {
                    return mapping;
                }
            }
            delta += i64::from(hunk.old_count) - i64::from(hunk.new_count);
        }
        LineMapping::Unchanged { old: shift(new, delta), new }
    }
}

impl Hunk {
    /// Number the hunk's lines and return the mapping of the first one
    /// accepted by `pick`.
    fn walk(&self, pick: impl Fn(&DiffLine) -> bool) -> Option<LineMapping> {
        let mut old = self.old_start;
        let mut new = self.new_start;
        for raw in &self.lines {
            let kind = match raw.chars().next() {
                Some('+') => LineKind::Added,
                Some('-') => LineKind::Removed,
                Some(' ') => LineKind::Context,
                _ => continue,
            };
            let line = DiffLine { kind, text: raw.clone(), old_pos: old, new_pos: new };
            if pick(&line) {
                return Some(match kind {
                    LineKind::Added => LineMapping::Added { new },
                    LineKind::Removed => LineMapping::Removed { old },
                    _ => LineMapping::Unchanged { old, new },
                });
            }
            match kind {
                LineKind::Added => new += 1,
                LineKind::Removed => old += 1,
                _ => {
                    old += 1;
                    new += 1;
                }
            }
        }
        None
    }
}

/// Lines `[start, end)` a hunk side covers. An empty side (`-5,0`) covers
/// nothing but everything from the following line onwards sits after it.
fn covered(start: u32, count: u32) -> (u32, u32) {
    if count == 0 {
        (start + 1, start + 1)
    } else {
        (start, start + count)
    }
}

fn shift(line: u32, delta: i64) -> u32 {
    u32::try_from((i64::from(line) + delta).max(1)).unwrap_or(u32::MAX)
}
