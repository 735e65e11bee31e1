//! Line tracing across two comparisons.
//!
//! With the old comparison `A..B` (old base, old head) and the new one
//! `C..D` (new base, new head), a line is followed through three diffs:
//! `B -> D` for lines on the new side, `A -> C` for lines only on the old
//! side, and `C -> D` to find out what the traced line is in the new
//! comparison.

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{MigrationFailed, MigrationRequest, PositionMigrator};
use crate::diff::{DiffError, DiffFile, DiffProvider, LineMapping};
use crate::position::{DiffPosition, LinePoint, LineRange, PositionType};

/// Where a traced line landed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Traced {
    old_path: String,
    new_path: String,
    old_line: Option<u32>,
    new_line: Option<u32>,
}

/// `PositionMigrator` that follows lines through a `DiffProvider`.
pub struct LineTracer<'a> {
    provider: &'a dyn DiffProvider,
}

impl<'a> LineTracer<'a> {
    pub fn new(provider: &'a dyn DiffProvider) -> Self {
        Self { provider }
    }

    async fn diff(
        &self,
        from: &str,
        to: &str,
        paths: &[String],
    ) -> Result<Vec<DiffFile>, MigrationFailed> {
        self.provider
            .diff(from, to, paths)
            .await
            .map_err(|e: DiffError| MigrationFailed::Provider(e.to_string()))
    }

    async fn trace_added(
        &self,
        req: &MigrationRequest,
        b_path: &str,
        b_line: u32,
    ) -> Result<Traced, MigrationFailed> {
        let bd = self
            .diff(&req.old_refs.head_sha, &req.new_refs.head_sha, &req.paths)
            .await?;
        let bd_file = by_old_path(&bd, b_path);
        if bd_file.is_some_and(|f| f.is_deleted) {
            return Err(MigrationFailed::FileDeleted { path: b_path.to_string() });
        }
        let d_path = bd_file.map_or(b_path, |f| f.new_path.as_str()).to_string();
        let d_line = old_to_new(bd_file, b_line).ok_or_else(|| MigrationFailed::LineChanged {
            path: b_path.to_string(),
            line: b_line,
        })?;

        let cd = self
            .diff(&req.new_refs.base_sha, &req.new_refs.head_sha, &[d_path.clone()])
            .await?;
        let cd_file = by_new_path(&cd, &d_path);
        Ok(Traced {
            old_path: cd_file.map_or(d_path.as_str(), |f| f.old_path.as_str()).to_string(),
            new_path: d_path.clone(),
            // still added, or now part of the base and shown as context
            old_line: new_to_old(cd_file, d_line),
            new_line: Some(d_line),
        })
    }

    async fn trace_removed(
        &self,
        req: &MigrationRequest,
        a_path: &str,
        a_line: u32,
    ) -> Result<Traced, MigrationFailed> {
        let ac = self
            .diff(&req.old_refs.base_sha, &req.new_refs.base_sha, &req.paths)
            .await?;
        let ac_file = by_old_path(&ac, a_path);
        let c_path = ac_file.map_or(a_path, |f| f.new_path.as_str()).to_string();
        let c_line = old_to_new(ac_file, a_line).ok_or_else(|| MigrationFailed::LineRemoved {
            path: a_path.to_string(),
            line: a_line,
        })?;

        let cd = self
            .diff(&req.new_refs.base_sha, &req.new_refs.head_sha, &[c_path.clone()])
            .await?;
        let cd_file = by_old_path(&cd, &c_path);
        if old_to_new(cd_file, c_line).is_some() {
            return Err(MigrationFailed::RemovalUndone {
                path: a_path.to_string(),
                line: a_line,
            });
        }
        Ok(Traced {
            new_path: cd_file.map_or(c_path.as_str(), |f| f.new_path.as_str()).to_string(),
            old_path: c_path,
            old_line: Some(c_line),
            new_line: None,
        })
    }

    async fn trace_unchanged(
        &self,
        req: &MigrationRequest,
        (a_path, a_line): (&str, u32),
        (b_path, b_line): (&str, u32),
    ) -> Result<Traced, MigrationFailed> {
        let ac = self.diff(&req.old_refs.base_sha, &req.new_refs.base_sha, &req.paths).await?;
        let ac_file = by_old_path(&ac, a_path);
        let c_path = ac_file.map_or(a_path, |f| f.new_path.as_str()).to_string();
        let c_line = old_to_new(ac_file, a_line);

        let bd = self.diff(&req.old_refs.head_sha, &req.new_refs.head_sha, &req.paths).await?;
        let bd_file = by_old_path(&bd, b_path);
        if bd_file.is_some_and(|f| f.is_deleted) {
            return Err(MigrationFailed::FileDeleted { path: b_path.to_string() });
        }
        let d_path = bd_file.map_or(b_path, |f| f.new_path.as_str()).to_string();
        let d_line = old_to_new(bd_file, b_line);

        let mut cd_paths = vec![c_path.clone()];
        if d_path != c_path {
            cd_paths.push(d_path.clone());
        }
        let cd = self.diff(&req.new_refs.base_sha, &req.new_refs.head_sha, &cd_paths).await?;
        let cd_file = by_new_path(&cd, &d_path).or_else(|| by_old_path(&cd, &c_path));

        match (c_line, d_line) {
            (Some(c), Some(d)) if old_to_new(cd_file, c) == Some(d) => Ok(Traced {
                old_path: c_path,
                new_path: d_path,
                old_line: Some(c),
                new_line: Some(d),
            }),
            // the line left the base but is still in the head: now an added line
            (None, Some(d)) => Ok(Traced {
                old_path: cd_file.map_or(d_path.as_str(), |f| f.old_path.as_str()).to_string(),
                new_path: d_path,
                old_line: None,
                new_line: Some(d),
            }),
            (_, None) | (Some(_), Some(_)) => Err(MigrationFailed::LineChanged {
                path: b_path.to_string(),
                line: b_line,
            }),
        }
    }

    /// Image comments only survive while the image is untouched.
    async fn trace_image(&self, req: &MigrationRequest) -> Result<DiffPosition, MigrationFailed> {
        let bd = self.diff(&req.old_refs.head_sha, &req.new_refs.head_sha, &req.paths).await?;
        let path = req.position.file_path().unwrap_or_default();
        if let Some(file) = bd.iter().find(|f| f.touches(path)) {
            return Err(if file.is_deleted {
                MigrationFailed::FileDeleted { path: path.to_string() }
            } else {
                MigrationFailed::FileChanged { path: path.to_string() }
            });
        }
        let mut position = req.position.clone();
        position.set_refs(&req.new_refs);
        Ok(position)
    }
}

#[async_trait]
impl PositionMigrator for LineTracer<'_> {
    #[instrument(skip_all, fields(from = %request.old_refs, to = %request.new_refs))]
    async fn migrate(&self, request: &MigrationRequest) -> Result<DiffPosition, MigrationFailed> {
        let position = &request.position;
        if !position.is_complete() {
            return Err(MigrationFailed::IncompleteSource);
        }
        if position.position_type == PositionType::Image {
            return self.trace_image(request).await;
        }

        let missing = || MigrationFailed::IncompleteSource;
        let old_path = position.old_path.as_deref();
        let new_path = position.new_path.as_deref();
        let traced = match (position.old_line, position.new_line) {
            (None, Some(b_line)) => {
                let b_path = new_path.ok_or_else(missing)?;
                self.trace_added(request, b_path, b_line).await?
            }
            (Some(a_line), None) => {
                let a_path = old_path.ok_or_else(missing)?;
                self.trace_removed(request, a_path, a_line).await?
            }
            (Some(a_line), Some(b_line)) => {
                let a = (old_path.ok_or_else(missing)?, a_line);
                let b = (new_path.ok_or_else(missing)?, b_line);
                self.trace_unchanged(request, a, b).await?
            }
            (None, None) => return Err(missing()),
        };
        debug!(?traced, "traced line");

        let mut migrated = DiffPosition::text(
            Some(&traced.old_path),
            Some(&traced.new_path),
            traced.old_line,
            traced.new_line,
            &request.new_refs,
        );
        migrated.line_range = position
            .line_range
            .and_then(|range| shift_range(range, position, &migrated));
        Ok(migrated)
    }
}

fn by_old_path<'f>(files: &'f [DiffFile], path: &str) -> Option<&'f DiffFile> {
    files.iter().find(|f| f.old_path == path && !f.is_new)
}

fn by_new_path<'f>(files: &'f [DiffFile], path: &str) -> Option<&'f DiffFile> {
    files.iter().find(|f| f.new_path == path && !f.is_deleted)
}

/// Old line through `file`; no diff entry means the file did not change.
fn old_to_new(file: Option<&DiffFile>, line: u32) -> Option<u32> {
    match file {
        None => Some(line),
        Some(f) if f.is_deleted => None,
        Some(f) => match f.map_old_line(line) {
            LineMapping::Unchanged { new, .. } => Some(new),
            _ => None,
        },
    }
}

fn new_to_old(file: Option<&DiffFile>, line: u32) -> Option<u32> {
    match file {
        None => Some(line),
        Some(f) if f.is_new => None,
        Some(f) => match f.map_new_line(line) {
            LineMapping::Unchanged { old, .. } => Some(old),
            _ => None,
        },
    }
}

/// Move a range by however far its anchor line moved on each side. A side
/// the anchor does not have on both ends keeps its numbers.
fn shift_range(range: LineRange, from: &DiffPosition, to: &DiffPosition) -> Option<LineRange> {
    let delta = |a: Option<u32>, b: Option<u32>| Some(i64::from(b?) - i64::from(a?));
    let old_delta = delta(from.old_line, to.old_line);
    let new_delta = delta(from.new_line, to.new_line);

    let shift = |line: Option<u32>, delta: Option<i64>| -> Result<Option<u32>, ()> {
        match (line, delta) {
            (Some(line), Some(delta)) => u32::try_from(i64::from(line) + delta)
                .ok()
                .filter(|l| *l > 0)
                .map(Some)
                .ok_or(()),
            (line, _) => Ok(line),
        }
    };
    let point = |p: LinePoint| -> Option<LinePoint> {
        Some(LinePoint::new(shift(p.old_line, old_delta).ok()?, shift(p.new_line, new_delta).ok()?))
    };
    Some(LineRange {
        start: point(range.start)?,
        end: point(range.end)?,
    })
}
