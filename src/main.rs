mod classify;
mod config;
mod convert;
mod db;
mod error;
mod ipc;
mod materials;
mod migrate;
mod topic;
mod video;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Topic content sidecar and migration tool.
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert legacy topic descriptions and materials to unified markdown
    MigrateToUnified {
        #[clap(short, long)]
        workspace: PathBuf,
        /// Convert and validate without saving
        #[clap(long)]
        dry_run: bool,
        /// Topics per chunk (defaults to the workspace setting)
        #[clap(long)]
        batch_size: Option<usize>,
        /// Revisit topics that are already migrated
        #[clap(long)]
        force: bool,
        /// Skip the confirmation prompt
        #[clap(short, long)]
        yes: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level);

    match args.command {
        None => serve_stdio(),
        Some(Commands::MigrateToUnified {
            workspace,
            dry_run,
            batch_size,
            force,
            yes,
        }) => migrate_to_unified(workspace, dry_run, batch_size, force, yes),
    }
}

fn setup_logging(log_level: &Option<String>) {
    let log_level = match log_level
        .as_deref()
        .unwrap_or("info")
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries IPC responses and the CLI report.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level.to_string()))
        .with_writer(io::stderr)
        .without_time()
        .init();
}

fn serve_stdio() -> anyhow::Result<()> {
    let mut state = ipc::AppState::default();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to reply to.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    Ok(())
}

fn migrate_to_unified(
    workspace: PathBuf,
    dry_run: bool,
    batch_size: Option<usize>,
    force: bool,
    yes: bool,
) -> anyhow::Result<()> {
    let conn = db::open_db(&workspace)
        .with_context(|| format!("failed to open workspace {}", workspace.display()))?;
    let settings = config::load_content_settings(&conn)?;
    let opts = migrate::MigrationOptions {
        dry_run,
        batch_size: batch_size.unwrap_or(settings.batch_size).max(1),
        force,
    };

    let mut stdout = io::stdout();
    if dry_run {
        writeln!(stdout, "DRY RUN MODE - No changes will be saved")?;
    }
    let pending = db::count_topics(&conn, !force)?;
    writeln!(stdout, "Found {} topics to migrate", pending)?;
    if pending == 0 {
        return Ok(());
    }

    if !dry_run && !yes {
        write!(stdout, "Migrate {} topics to unified content? [y/N] ", pending)?;
        stdout.flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if !matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            writeln!(stdout, "Migration cancelled.")?;
            return Ok(());
        }
    }

    info!(workspace = %workspace.display(), "running migrate-to-unified");
    let report = migrate::run_batch(&conn, &opts)?;

    writeln!(stdout, "{}", migrate::render_table(&report))?;
    for note in &report.notes {
        let label = match note.level {
            migrate::NoteLevel::Warning => "WARNING",
            migrate::NoteLevel::Error => "ERROR",
        };
        writeln!(stdout, "{} [{}]: {}", label, note.topic_id, note.message)?;
    }
    if dry_run {
        writeln!(stdout, "Dry run completed. Run without --dry-run to apply changes.")?;
    } else if report.stats.errors == 0 {
        writeln!(stdout, "Migration completed successfully!")?;
    } else {
        writeln!(
            stdout,
            "Migration completed with {} errors.",
            report.stats.errors
        )?;
    }
    stdout.flush()?;
    Ok(())
}
