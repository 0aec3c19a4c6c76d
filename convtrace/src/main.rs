//! convtrace - one-shot export of agent conversation transcripts to Langfuse
//!
//! Intended to run as an agent Stop hook or from cron: each invocation picks
//! up where the last one left off, emits traces for any newly completed
//! conversation turns, and exits.
//!
//! The exporter is opt-in (CONVTRACE_ENABLED=true or `sink.enabled` in the
//! config file) and never exits nonzero: a tracing hook must not break the
//! process that triggered it. Failures go to the diagnostic log.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/convtrace/config.toml
//! - Cursors/Logs: $XDG_STATE_HOME/convtrace/

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use convtrace_core::{Config, CursorStore, ExportCoordinator, LangfuseSink, Redactor, TraceSink};

#[derive(Parser)]
#[command(name = "convtrace")]
#[command(about = "Export agent conversation transcripts as Langfuse traces")]
#[command(version)]
struct Args {
    /// Verbose output (print a run summary to stdout)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Discover transcripts but do not export
    #[arg(long)]
    dry_run: bool,

    /// Override the transcript root directory
    #[arg(long)]
    root: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        // Failures are logged and printed, never escalated to the caller.
        eprintln!("convtrace: {:#}", e);
    }
    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<()> {
    let started = Instant::now();

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(root) = &args.root {
        config.export.transcript_root = Some(root.clone());
    }

    // Opt-in gate: without the activation flag nothing observable happens.
    if !config.sink.enabled {
        return Ok(());
    }

    let _log_guard = convtrace_core::logging::init(&config.logging)
        .context("failed to initialize logging")?;
    tracing::info!("convtrace starting");

    if let Err(e) = config.sink.validate() {
        tracing::error!("Sink not usable, doing nothing: {}", e);
        return Ok(());
    }

    let root = config.export.transcript_root();

    if args.dry_run {
        let transcripts = convtrace_core::transcript::discover(&root)
            .context("failed to discover transcripts")?;
        println!(
            "Discovered {} transcript(s) under {}:",
            transcripts.len(),
            root.display()
        );
        for t in &transcripts {
            println!("  - {} ({})", t.session_id, t.project_label);
        }
        println!("\nDry run - no traces exported");
        tracing::info!("Dry run complete");
        return Ok(());
    }

    let mut sink = match LangfuseSink::new(config.sink.clone()) {
        Ok(sink) => sink,
        Err(e) => {
            tracing::error!("Failed to initialize trace sink, doing nothing: {}", e);
            return Ok(());
        }
    };

    let coordinator = ExportCoordinator::new(
        root,
        CursorStore::new(Config::cursor_path()),
        Redactor::new(config.export.redact),
    );
    let summary = coordinator.run(&mut sink);

    if let Err(e) = sink.shutdown() {
        tracing::warn!("Failed to flush sink on shutdown: {}", e);
    }

    let elapsed = started.elapsed();
    tracing::info!(
        sessions = summary.sessions_seen,
        processed = summary.sessions_processed,
        skipped = summary.sessions_skipped,
        failed = summary.sessions_failed,
        turns = summary.turns_emitted,
        malformed = summary.malformed_lines,
        duration_secs = elapsed.as_secs_f64(),
        "Export run complete"
    );

    if args.verbose > 0 {
        println!(
            "convtrace: {} turn(s) across {} session(s) in {:.1}s",
            summary.turns_emitted,
            summary.sessions_seen,
            elapsed.as_secs_f64()
        );
    }

    if elapsed.as_secs() > config.export.budget_secs {
        tracing::warn!(
            "Export run took {:.1}s (soft budget {}s)",
            elapsed.as_secs_f64(),
            config.export.budget_secs
        );
    }

    Ok(())
}
