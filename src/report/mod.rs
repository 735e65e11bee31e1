pub mod types;

pub use types::{DiscussionSummary, ReviewReport, ThreadState};

use crate::discussion::Discussion;
use crate::note::{ActivityContext, Note};
use crate::resolution::Resolvable;
use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Summarise `discussions` against the comparison in `ctx`.
///
/// Unresolved threads come first; otherwise the input order is kept.
pub fn build(discussions: &[Discussion], ctx: &ActivityContext<'_>) -> ReviewReport {
    let mut summaries: Vec<DiscussionSummary> =
        discussions.iter().map(|d| summarize(d, ctx)).collect();
    summaries.sort_by_key(|s| s.state);

    let unresolved = summaries.iter().filter(|s| s.state == ThreadState::Unresolved).count();
    let outdated = summaries.iter().filter(|s| !s.active).count();

    ReviewReport {
        noteable: ctx.noteable.reference.to_string(),
        diff_refs: ctx.noteable.current_refs().map(|refs| refs.to_string()),
        discussions: summaries,
        unresolved,
        outdated,
    }
}

fn summarize(discussion: &Discussion, ctx: &ActivityContext<'_>) -> DiscussionSummary {
    let first = discussion.first_note();
    let state = if !discussion.resolvable() {
        ThreadState::Comment
    } else if discussion.is_resolved() {
        ThreadState::Resolved
    } else {
        ThreadState::Unresolved
    };

    DiscussionSummary {
        id: discussion.id().to_string(),
        location: location(first),
        author: first.header().author.clone(),
        excerpt: first.header().body.lines().next().unwrap_or_default().to_string(),
        notes: discussion.notes().len(),
        state,
        resolved_by: discussion
            .last_resolved_note()
            .and_then(|n| n.resolution().resolved_by.clone()),
        active: first.is_active(ctx),
    }
}

fn location(note: &Note) -> Option<String> {
    match note {
        Note::Diff(note) => {
            let position = note.position();
            let path = position.file_path()?;
            Some(match position.new_line.or(position.old_line) {
                Some(line) => format!("{}:{}", path, line),
                None => path.to_string(),
            })
        }
        Note::Legacy(note) => {
            let code = note.line_code();
            let line = if code.new_line > 0 { code.new_line } else { code.old_line };
            Some(format!("{}:{}", note.patch().new_path, line))
        }
    }
}

/// Output the report to terminal (default) or to a markdown file.
#[instrument(
    skip(report),
    fields(noteable = %report.noteable, discussions = report.discussions.len())
)]
pub fn output(report: &ReviewReport, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            write_markdown_report(report, path)
        }
    }
}

fn print_terminal_report(report: &ReviewReport) {
    println!();
    println!("Discussions on {}", report.noteable.bold());
    println!(
        "Diff: {} | Threads: {} | Unresolved: {} | Outdated: {}",
        report.diff_refs.as_deref().unwrap_or("none"),
        report.discussions.len(),
        report.unresolved,
        report.outdated
    );
    println!();

    for summary in &report.discussions {
        println!(
            "═══ {} {} ═══",
            colorize_state(summary.state),
            summary.location.as_deref().unwrap_or("(no anchor)")
        );
        let mut details = format!("  {} · {} note(s)", summary.author, summary.notes);
        if let Some(by) = &summary.resolved_by {
            details.push_str(&format!(" · resolved by {}", by));
        }
        if !summary.active {
            details.push_str(&format!(" · {}", "outdated".dimmed()));
        }
        println!("{}", details);
        println!("  • {}", summary.excerpt);
        println!();
    }
}

fn write_markdown_report(report: &ReviewReport, path: &Path) -> Result<(), ReportError> {
    let mut md = String::new();
    md.push_str(&format!("# Discussions on {}\n\n", report.noteable));
    md.push_str(&format!(
        "**Diff:** {} | **Threads:** {} | **Unresolved:** {} | **Outdated:** {}\n\n",
        report.diff_refs.as_deref().unwrap_or("none"),
        report.discussions.len(),
        report.unresolved,
        report.outdated
    ));

    if report.discussions.is_empty() {
        md.push_str("No discussions.\n");
    }
    for summary in &report.discussions {
        let location = match &summary.location {
            Some(location) => format!("`{}`", location),
            None => "(no anchor)".to_string(),
        };
        md.push_str(&format!("## [{}] {}\n\n", summary.state, location));
        md.push_str(&format!("- **Author:** {}\n", summary.author));
        md.push_str(&format!("- **Notes:** {}\n", summary.notes));
        if let Some(by) = &summary.resolved_by {
            md.push_str(&format!("- **Resolved by:** {}\n", by));
        }
        if !summary.active {
            md.push_str("- **Outdated**\n");
        }
        md.push_str(&format!("\n> {}\n\n", summary.excerpt));
    }

    std::fs::write(path, md)?;
    Ok(())
}

fn colorize_state(state: ThreadState) -> colored::ColoredString {
    match state {
        ThreadState::Unresolved => "UNRESOLVED".yellow().bold(),
        ThreadState::Resolved => "RESOLVED".green().bold(),
        ThreadState::Comment => "COMMENT".normal(),
    }
}
