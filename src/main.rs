// src/main.rs
// =============================================================================
// This is the entry point of the link-sweeper binary.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging (LOG_LEVEL env var, default "info")
// 3. Load the config and build store -> prober -> checker -> scheduler
// 4. Dispatch to the subcommand handler and print its result
// 5. Exit with proper code (0 = success, 1 = dead links/errors, 2 = error)
// =============================================================================

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use link_sweeper::checker::{CheckResult, HttpProber, LinkChecker, SweepResult};
use link_sweeper::config::{AppConfig, FileConfig};
use link_sweeper::import::{self, DocumentFormat, ImportSummary};
use link_sweeper::scheduler::JobScheduler;
use link_sweeper::service::{CheckerService, ServiceStatus};
use link_sweeper::store::{LinkId, LinkRecord, LinkStatus, LinkStore, SqliteLinkStore};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// How long `run` waits for a sweep in flight after Ctrl-C
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// Returns:
//   Ok(0) = success
//   Ok(1) = dead or deleted links, or per-link errors
//   Err   = unexpected error (exit code 2)
async fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging();

    let file_config = match &cli.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(cli.db.clone(), file_config)?;

    let store = Arc::new(
        SqliteLinkStore::open(&config.db_path)
            .with_context(|| format!("Failed to open link database: {:?}", config.db_path))?,
    );

    // Store-only commands never build the HTTP clients
    match cli.command {
        Commands::List => handle_list(store.as_ref(), cli.json),
        Commands::Remove { id } => handle_remove(store.as_ref(), id, cli.json),
        Commands::Import {
            file,
            format,
            base_url,
        } => handle_import(store.as_ref(), &file, format, base_url.as_deref(), cli.json),
        Commands::Run => handle_run(&build_service(&config, store)?).await,
        Commands::Sweep => handle_sweep(&build_service(&config, store)?, cli.json).await,
        Commands::Probe { url } => {
            handle_probe(&build_service(&config, store)?, &url, cli.json).await
        }
        Commands::Status => handle_status(&build_service(&config, store)?, cli.json),
    }
}

// store -> prober -> checker -> scheduler
fn build_service(config: &AppConfig, store: Arc<SqliteLinkStore>) -> Result<CheckerService> {
    let prober = HttpProber::new(&config.checker.probe_options())
        .context("Failed to build HTTP clients")?;
    let checker = Arc::new(LinkChecker::new(
        store,
        Arc::new(prober),
        config.checker.checker_settings(),
    ));
    let service = CheckerService::new(
        checker,
        Arc::new(JobScheduler::new()),
        config.checker.sweep_interval,
    )?;
    Ok(service)
}

fn init_logging() {
    // Ignore a second init; only possible if something else set a subscriber
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init();
}

// Handles the 'run' subcommand: sweep on the schedule until Ctrl-C
async fn handle_run(service: &CheckerService) -> Result<i32> {
    service.start();
    info!("link-sweeper running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutdown signal received");
    // Let a sweep in flight finish its batch instead of dying mid-write
    service.shutdown(SHUTDOWN_GRACE).await;
    Ok(0)
}

// Handles the 'sweep' subcommand
async fn handle_sweep(service: &CheckerService, json: bool) -> Result<i32> {
    if !json {
        println!("🔍 Sweeping due links...\n");
    }
    let sweep = service.trigger_sweep().await?;

    if json {
        print_json(&sweep)?;
    } else {
        print_sweep(&sweep);
    }

    if sweep.dead + sweep.deleted + sweep.errors > 0 {
        Ok(1)
    } else {
        Ok(0)
    }
}

// Handles the 'probe' subcommand
async fn handle_probe(service: &CheckerService, url: &str, json: bool) -> Result<i32> {
    let result = service.probe_url(url).await;

    if json {
        print_json(&result)?;
    } else {
        print_probe(&result);
    }

    Ok(if result.is_live() { 0 } else { 1 })
}

// Handles the 'status' subcommand
fn handle_status(service: &CheckerService, json: bool) -> Result<i32> {
    let status = service.status()?;
    if json {
        print_json(&status)?;
    } else {
        print_status(&status);
    }
    Ok(0)
}

// Handles the 'list' subcommand
fn handle_list(store: &dyn LinkStore, json: bool) -> Result<i32> {
    let links = store.list_links()?;
    if json {
        print_json(&links)?;
    } else {
        print_links(&links);
    }
    Ok(0)
}

// Handles the 'import' subcommand
fn handle_import(
    store: &dyn LinkStore,
    file: &Path,
    format: Option<DocumentFormat>,
    base_url: Option<&str>,
    json: bool,
) -> Result<i32> {
    let format = format
        .or_else(|| DocumentFormat::from_path(file))
        .with_context(|| format!("Cannot tell the format of {:?}, pass --format", file))?;
    let document = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {:?}", file))?;

    let urls = import::extract_links(&document, format, base_url);
    let summary = import::import_links(store, &urls)?;

    if json {
        print_json(&summary)?;
    } else {
        print_import(file, &summary);
    }
    Ok(0)
}

// Handles the 'remove' subcommand
fn handle_remove(store: &dyn LinkStore, id: LinkId, json: bool) -> Result<i32> {
    store.delete_link(id)?;
    if json {
        print_json(&serde_json::json!({ "removed": id }))?;
    } else {
        println!("🗑️  Removed link {}", id);
    }
    Ok(0)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_sweep(sweep: &SweepResult) {
    println!("📊 Sweep summary:");
    println!("   📦 Batches: {}", sweep.batches);
    println!("   📋 Checked: {}", sweep.checked);
    println!("   ✅ Live: {}", sweep.live);
    println!("   ❌ Dead: {}", sweep.dead);
    println!("   🗑️  Deleted: {}", sweep.deleted);
    println!("   ⚠️  Errors: {}", sweep.errors);
    println!("   ⏱️  Took: {} ms", sweep.duration_ms);
}

fn print_probe(result: &CheckResult) {
    println!("{:<60} {:<10} {:<30}", "URL", "STATUS", "MESSAGE");
    println!("{}", "=".repeat(100));
    println!(
        "{:<60} {:<10} {:<30}",
        truncate(&result.url, 57),
        format_status(result.status),
        result.error_message.as_deref().unwrap_or("")
    );
}

fn print_status(status: &ServiceStatus) {
    println!("⏰ Jobs:");
    for job in &status.jobs {
        let state = if job.running {
            "running"
        } else if job.active {
            "armed"
        } else {
            "idle"
        };
        println!(
            "   {} ({}) every {}s, runs: {}, skipped: {}",
            job.name, state, job.interval_secs, job.run_count, job.skipped_runs
        );
        if let Some(last_run) = job.last_run {
            println!("      last run: {}", last_run.to_rfc3339());
        }
        if let Some(error) = &job.last_error {
            println!("      last error: {}", error);
        }
    }

    let links = &status.links;
    println!();
    println!("📊 Links:");
    println!("   ✅ Live: {}", links.live);
    println!("   ❌ Dead: {}", links.dead);
    println!("   ❔ Unknown: {}", links.unknown);
    println!("   ⏳ Due: {}", links.due);
    println!("   📋 Total: {}", links.total);
}

fn print_links(links: &[LinkRecord]) {
    println!(
        "{:<6} {:<60} {:<12} {:<6} {:<6} {:<25}",
        "ID", "URL", "STATUS", "CODE", "FAILS", "LAST CHECKED"
    );
    println!("{}", "=".repeat(120));

    for link in links {
        let code = link
            .status_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        let checked = link
            .last_checked_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<6} {:<60} {:<12} {:<6} {:<6} {:<25}",
            link.id,
            truncate(&link.url, 57),
            format_status(link.status),
            code,
            link.consecutive_failures,
            checked
        );
    }

    println!();
    println!("📋 Total: {}", links.len());
}

fn print_import(file: &Path, summary: &ImportSummary) {
    println!("📄 Imported from {}", file.display());
    println!("   🔗 Found: {}", summary.found);
    println!("   ➕ Added: {}", summary.added);
    println!("   🔁 Already stored: {}", summary.duplicates);
}

fn format_status(status: LinkStatus) -> &'static str {
    match status {
        LinkStatus::Live => "✅ LIVE",
        LinkStatus::Dead => "❌ DEAD",
        LinkStatus::Unknown => "❔ UNKNOWN",
    }
}

// Cuts on a char boundary so multi-byte URLs don't panic
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why does run() return Result<i32>?
//    - Ok(code) carries the "normal" outcomes: 0 all good, 1 problems found
//    - Err(..) is for things that went wrong with the tool itself -> exit 2
//
// 2. Why do logs go to stderr?
//    - stdout is for results; `--json | jq` must see only JSON
//
// 3. Why wait after Ctrl-C?
//    - stop() only cancels future sweeps
//    - std::process::exit would kill a sweep in the middle of a batch
//    - shutdown() gives it SHUTDOWN_GRACE to finish its writes first
// -----------------------------------------------------------------------------
