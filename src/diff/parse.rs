use super::types::{DiffFile, DiffLine, Hunk, LineKind};
use super::DiffError;

/// Parse a multi-file unified diff into a vector of DiffFile structs.
///
/// Each file section starts with:
///   diff --git a/{old_path} b/{new_path}
///
/// New files have: `--- /dev/null`
/// Deleted files have: `+++ /dev/null`
///
/// Hunks start with: @@ -{old_start},{old_count} +{new_start},{new_count} @@
pub fn parse_diff(raw_diff: &str) -> Result<Vec<DiffFile>, DiffError> {
    if raw_diff.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut current_file: Option<DiffFile> = None;
    let mut current_hunk: Option<Hunk> = None;

    let finish_hunk = |file: &mut Option<DiffFile>, hunk: &mut Option<Hunk>| {
        if let (Some(file), Some(hunk)) = (file.as_mut(), hunk.take()) {
            file.hunks.push(hunk);
        }
    };

    let finish_file =
        |files: &mut Vec<DiffFile>, file: &mut Option<DiffFile>, hunk: &mut Option<Hunk>| {
            finish_hunk(file, hunk);
            if let Some(file) = file.take() {
                files.push(file);
            }
        };

    for line in raw_diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            finish_file(&mut files, &mut current_file, &mut current_hunk);
            let mut parts = rest.split_whitespace();
            let a_path = parts
                .next()
                .ok_or_else(|| DiffError::Parse("Missing a/ path in diff header".to_string()))?;
            let b_path = parts
                .next()
                .ok_or_else(|| DiffError::Parse("Missing b/ path in diff header".to_string()))?;
            current_file = Some(DiffFile {
                old_path: a_path.strip_prefix("a/").unwrap_or(a_path).to_string(),
                new_path: b_path.strip_prefix("b/").unwrap_or(b_path).to_string(),
                is_new: false,
                is_deleted: false,
                additions: 0,
                deletions: 0,
                hunks: Vec::new(),
            });
            continue;
        }

        if line.starts_with("@@") {
            finish_hunk(&mut current_file, &mut current_hunk);
            let (old_start, old_count, new_start, new_count) = parse_hunk_header(line)?;
            current_hunk = Some(Hunk {
                header: line.to_string(),
                old_start,
                old_count,
                new_start,
                new_count,
                lines: Vec::new(),
            });
            continue;
        }

        if current_hunk.is_none() && (line.starts_with("--- ") || line.starts_with("+++ ")) {
            if let Some(file) = current_file.as_mut() {
                let path = line[4..].trim();
                if line.starts_with("--- ") && path == "/dev/null" {
                    file.is_new = true;
                }
                if line.starts_with("+++ ") && path == "/dev/null" {
                    file.is_deleted = true;
                }
            }
            continue;
        }

        if let (Some(file), Some(hunk)) = (current_file.as_mut(), current_hunk.as_mut()) {
            if line.starts_with('+') {
                hunk.lines.push(line.to_string());
                file.additions += 1;
            } else if line.starts_with('-') {
                hunk.lines.push(line.to_string());
                file.deletions += 1;
            } else if line.starts_with(' ') {
                hunk.lines.push(line.to_string());
            }
        }
    }

    finish_file(&mut files, &mut current_file, &mut current_hunk);
    Ok(files)
}

/// Parse a patch fragment into numbered lines.
///
/// File headers (`diff --git`, `index`, `---`, `+++`, mode lines) before the
/// first hunk are skipped, every hunk header becomes a `Match` line, and
/// `\ No newline at end of file` markers are dropped.
pub fn parse_lines(fragment: &str) -> Result<Vec<DiffLine>, DiffError> {
    let mut lines = Vec::new();
    let mut old = 0u32;
    let mut new = 0u32;
    let mut in_hunk = false;

    for line in fragment.lines() {
        if line.starts_with("@@") {
            let (old_start, _, new_start, _) = parse_hunk_header(line)?;
            old = old_start;
            new = new_start;
            in_hunk = true;
            lines.push(DiffLine {
                kind: LineKind::Match,
                text: line.to_string(),
                old_pos: old,
                new_pos: new,
            });
            continue;
        }
        if !in_hunk || line.starts_with('\\') {
            continue;
        }
        if line.starts_with("diff --git ") {
            in_hunk = false;
            continue;
        }

        let kind = match line.chars().next() {
            Some('+') => LineKind::Added,
            Some('-') => LineKind::Removed,
            Some(' ') => LineKind::Context,
            // Some producers strip the marker from blank context lines.
            None => LineKind::Context,
            Some(_) => continue,
        };
        lines.push(DiffLine {
            kind,
            text: line.to_string(),
            old_pos: old,
            new_pos: new,
        });
        match kind {
            LineKind::Added => new += 1,
            LineKind::Removed => old += 1,
            _ => {
                old += 1;
                new += 1;
            }
        }
    }

    Ok(lines)
}

pub(crate) fn parse_hunk_header(line: &str) -> Result<(u32, u32, u32, u32), DiffError> {
    let header = line
        .trim()
        .strip_prefix("@@")
        .ok_or_else(|| DiffError::Parse("Invalid hunk header".to_string()))?
        .trim();
    // Anything after the closing `@@` is section context, not ranges.
    let header = header.split("@@").next().unwrap_or(header).trim();
    let mut parts = header.split_whitespace();
    let old_part = parts
        .next()
        .ok_or_else(|| DiffError::Parse("Missing old range".to_string()))?;
    let new_part = parts
        .next()
        .ok_or_else(|| DiffError::Parse("Missing new range".to_string()))?;

    let (old_start, old_count) = parse_range(old_part, '-')?;
    let (new_start, new_count) = parse_range(new_part, '+')?;

    Ok((old_start, old_count, new_start, new_count))
}

fn parse_range(part: &str, prefix: char) -> Result<(u32, u32), DiffError> {
    let range = part
        .strip_prefix(prefix)
        .ok_or_else(|| DiffError::Parse("Invalid range prefix".to_string()))?;
    let (start_str, count_str) = match range.split_once(',') {
        Some((start, count)) => (start, count),
        None => (range, "1"),
    };
    let start = start_str
        .parse::<u32>()
        .map_err(|_| DiffError::Parse(format!("Invalid range start in {}", part)))?;
    let count = count_str
        .parse::<u32>()
        .map_err(|_| DiffError::Parse(format!("Invalid range count in {}", part)))?;
    Ok((start, count))
}
