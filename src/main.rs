use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use diff_notes::config::{Config, LegacyConfig};
use diff_notes::diff::memory::MemoryRepository;
use diff_notes::diff::{parse_diff, DiffFile, DiffProvider, UnifiedPatchParser};
use diff_notes::discussion::{compute_position_id, Discussion};
use diff_notes::migration::{reposition_all, LineTracer};
use diff_notes::note::{
    ActivityContext, AmbiguityPolicy, DiffNote, LegacyDiffNote, Note, NoteHeader, NoteableKind,
    NoteableRef, Noteable, StoredPatch,
};
use diff_notes::position::{DiffPosition, DiffRefs, LineCode};
use diff_notes::report;
use diff_notes::suggestion::{Suggestion, SuggestionApplier};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

/// diff-notes: inspect diff-anchored discussions, their identities and
/// whether they still apply to the current comparison.
#[derive(Parser, Debug)]
#[command(name = "diff-notes", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the line code of a line: sha1(path)_old_new
    LineCode {
        path: String,
        old_line: u32,
        new_line: u32,
    },

    /// Print the discussion id of a position read from a JSON file
    DiscussionId {
        /// DiffPosition as JSON
        position: PathBuf,

        #[arg(long, value_enum, default_value_t = Kind::MergeRequest)]
        kind: Kind,

        /// Id of the commit or merge request
        #[arg(long)]
        noteable_id: String,
    },

    /// Find a legacy note's line in the current diff and show its context
    LegacyMatch {
        /// Unified diff stored with the note
        #[arg(long)]
        stored: PathBuf,

        #[arg(long)]
        line_code: String,

        /// Unified diff of the current comparison
        #[arg(long)]
        current: PathBuf,

        /// Overrides `[legacy] ambiguity` from the config file
        #[arg(long, value_enum)]
        ambiguity: Option<Policy>,
    },

    /// Summarise the discussions of a snapshot
    ///
    /// Not required when --demo is used.
    Report {
        /// Snapshot JSON: { "noteable", "notes", "diff" }
        snapshot: Option<PathBuf>,

        /// Build a snapshot from a built-in in-memory repository
        #[arg(long)]
        demo: bool,

        /// Write the snapshot that was reported on to this path
        #[arg(long)]
        save_snapshot: Option<PathBuf>,

        /// Optional output file path for a markdown report
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the report as JSON instead
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Commit,
    MergeRequest,
}

impl From<Kind> for NoteableKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Commit => NoteableKind::Commit,
            Kind::MergeRequest => NoteableKind::MergeRequest,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Policy {
    First,
    Closest,
    Reject,
}

impl From<Policy> for AmbiguityPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::First => AmbiguityPolicy::FirstMatch,
            Policy::Closest => AmbiguityPolicy::ClosestToRecorded,
            Policy::Reject => AmbiguityPolicy::Reject,
        }
    }
}

/// Everything `report` needs: the noteable, its notes, and the unified diff
/// of its current comparison.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    noteable: Noteable,
    notes: Vec<Note>,
    diff: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = Config::load()?;

    match cli.command {
        Command::LineCode {
            path,
            old_line,
            new_line,
        } => {
            println!("{}", LineCode::new(&path, old_line, new_line));
        }
        Command::DiscussionId {
            position,
            kind,
            noteable_id,
        } => {
            let position: DiffPosition =
                serde_json::from_str(&std::fs::read_to_string(&position)?)?;
            position.validate()?;
            let kind = NoteableKind::from(kind);
            let id = compute_position_id(kind.as_str(), &noteable_id, &position.key());
            println!("{}", id);
        }
        Command::LegacyMatch {
            stored,
            line_code,
            current,
            ambiguity,
        } => {
            let mut legacy = config.legacy.clone();
            if let Some(policy) = ambiguity {
                legacy.ambiguity = policy.into();
            }
            legacy_match(&stored, &line_code, &current, &legacy)?;
        }
        Command::Report {
            snapshot,
            demo,
            save_snapshot,
            output,
            json,
        } => {
            let snapshot = if demo {
                info!("building demo snapshot");
                build_demo_snapshot(&config)
                    .instrument(info_span!("demo"))
                    .await?
            } else {
                let path = snapshot.as_deref().ok_or(
                    "A snapshot path is required unless --demo is used. \
                     Usage: diff-notes report <SNAPSHOT> or diff-notes report --demo",
                )?;
                debug!(path = %path.display(), "reading snapshot");
                serde_json::from_str(&std::fs::read_to_string(path)?)?
            };

            if let Some(path) = save_snapshot.as_deref() {
                std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
                info!(path = %path.display(), "saved snapshot");
            }

            let Snapshot { noteable, notes, diff } = snapshot;
            let current = parse_diff(&diff)?;
            let discussions = Discussion::build(notes);
            let ctx = ActivityContext {
                noteable: &noteable,
                current_diff: &current,
                parser: &UnifiedPatchParser,
            };

            info!("generating report");
            let built = report::build(&discussions, &ctx);
            if json {
                println!("{}", serde_json::to_string_pretty(&built)?);
            } else {
                report::output(&built, output.as_deref())?;
            }
            info!(unresolved = built.unresolved, outdated = built.outdated, "done");
        }
    }

    Ok(())
}

fn legacy_match(
    stored: &Path,
    line_code: &str,
    current: &Path,
    legacy: &LegacyConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let code: LineCode = line_code.parse()?;
    let stored_files = parse_diff(&std::fs::read_to_string(stored)?)?;
    let file = stored_files
        .iter()
        .find(|f| code.is_for_path(&f.new_path) || code.is_for_path(&f.old_path))
        .ok_or("The line code does not belong to any file in the stored diff")?;

    let note = LegacyDiffNote::create(
        NoteHeader::new(0, "cli", ""),
        NoteableRef::merge_request("0"),
        line_code,
        StoredPatch::from_file(file),
    )?;
    let current_files = parse_diff(&std::fs::read_to_string(current)?)?;

    match note.find_current_match(&current_files, &UnifiedPatchParser, legacy.ambiguity)? {
        None => println!("{} {}", "OUTDATED".yellow().bold(), "no line with the stored text"),
        Some(found) => {
            println!(
                "{} {} ({} candidate(s))",
                "MATCH".green().bold(),
                found.line.text,
                found.candidates
            );
            println!();
            for line in found.context_window(legacy.context_lines) {
                println!("{:>5} {:>5}  {}", line.old_pos, line.new_pos, line.text);
            }
        }
    }
    Ok(())
}

const DEMO_BASE: &str = include_str!("../tests/fixtures/demo_base.rb");
const DEMO_FEATURE: &str = include_str!("../tests/fixtures/demo_feature.rb");

/// Build a snapshot from an in-memory repository: notes on a merge request,
/// a suggestion applied on top, and every note carried to the new head.
async fn build_demo_snapshot(config: &Config) -> Result<Snapshot, Box<dyn std::error::Error>> {
    let repo = MemoryRepository::new();
    let base = repo.commit_files("main", &[("app/greeter.rb", DEMO_BASE)]);
    let head = repo.commit_files("feature", &[("app/greeter.rb", DEMO_FEATURE)]);
    let refs = DiffRefs::new(base.clone(), base.clone(), head);
    let mut noteable = Noteable::merge_request("42", refs, "feature");
    let refs = noteable.current_refs().cloned().ok_or("demo merge request has no diff")?;

    let added = DiffNote::create(
        NoteHeader::new(1, "alice", "Use the logger here instead of puts."),
        noteable.reference.clone(),
        DiffPosition::added("app/greeter.rb", 3, &refs),
    )?;
    let context = DiffPosition::unchanged("app/greeter.rb", 6, 7, &refs);
    let question = DiffNote::create(
        NoteHeader::new(2, "bob", "Should farewell be memoized too?"),
        noteable.reference.clone(),
        context.clone(),
    )?;
    let reply = DiffNote::create(
        NoteHeader::new(3, "alice", "No, it is called once per session."),
        noteable.reference.clone(),
        context,
    )?;

    let mut suggestion = Suggestion::capture(&added, &repo, 0, 0, "  logger.info(name)").await?;
    let applier = SuggestionApplier::new(&repo, &repo)
        .with_message_template(&config.suggestions.commit_message);
    let applied = applier.apply(&added, &mut suggestion, &noteable, "alice").await?;
    info!(sha = %applied, "applied demo suggestion");

    let pushed = DiffRefs::new(base.clone(), base.clone(), applied.clone());
    noteable.diff_refs = Some(pushed.clone());

    let mut notes = vec![Note::from(added), Note::from(question), Note::from(reply)];
    let tracer = LineTracer::new(&repo);
    let timeout = config.migration.timeout();
    let outcomes = reposition_all(&mut notes, &pushed, &[], &tracer, timeout).await;
    let outdated = outcomes.iter().filter(|(_, outcome)| outcome.is_outdated()).count();
    debug!(notes = outcomes.len(), outdated, "repositioned demo notes");

    let mut discussions = Discussion::build(notes);
    if let Some(thread) = discussions.iter_mut().find(|d| !d.is_new()) {
        thread.resolve("carol");
    }
    let notes = discussions.into_iter().flat_map(Discussion::into_notes).collect();

    let current: Vec<DiffFile> = repo.diff(&base, &applied, &[]).await?;
    let diff = current.iter().map(DiffFile::unified).collect();

    Ok(Snapshot { noteable, notes, diff })
}
