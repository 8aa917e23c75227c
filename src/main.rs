//! CLI entry point for the library mirror.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result, bail};
use clap::Parser;
use library_mirror::config::load_default_file_config;
use library_mirror::{
    FetchOutcome, FetchPool, HtmlRecordParser, LibraryClient, LibraryStore, LibrarySync,
    QueuedTokens, RetryCoordinator, SessionHolder, SessionRefresher, SessionToken,
    SyncOptions, SyncSummary, classify_page,
};
use tracing::{debug, info};
use url::Url;

mod cli;
mod progress;
mod prompt;
mod settings;

use cli::{Args, Command, FetchArgs, SyncArgs};
use prompt::StdinPrompt;
use settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr; stdout carries item text and summaries.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = load_default_file_config()?;
    if let (Some(path), Some(_)) = (&loaded.path, &loaded.config) {
        debug!(path = %path.display(), "loaded config file");
    }

    match &args.command {
        Command::Sync(sync_args) => {
            let settings = Settings::for_sync(sync_args, loaded.config.as_ref());
            run_sync(sync_args, &settings, args.quiet).await
        }
        Command::Fetch(fetch_args) => {
            let settings = Settings::for_fetch(fetch_args, loaded.config.as_ref());
            run_fetch(fetch_args, &settings).await
        }
    }
}

async fn run_sync(args: &SyncArgs, settings: &Settings, quiet: bool) -> Result<()> {
    info!(
        base_url = %settings.base_url,
        root = %settings.library_root.display(),
        workers = settings.workers,
        "library mirror starting"
    );

    let use_spinner = !quiet && !args.json && io::stderr().is_terminal();
    let spinner = progress::new_spinner(use_spinner);
    let prompt = StdinPrompt::new(settings.cookie_name.clone()).with_progress(spinner.clone());
    let initial = match &args.token {
        Some(raw) => SessionToken::from_input(raw, &settings.cookie_name),
        None if args.no_prompt => bail!("--no-prompt requires --token"),
        None => {
            let prompt = prompt.clone();
            tokio::task::spawn_blocking(move || {
                prompt.read_token("A library session token is required.")
            })
            .await??
        }
    };
    if initial.is_empty() {
        bail!("session token must not be empty");
    }

    let client = build_client(settings)?;
    let holder = Arc::new(SessionHolder::new(initial));
    let refresher = if args.no_prompt {
        SessionRefresher::new(Arc::clone(&holder), QueuedTokens::none())
    } else {
        SessionRefresher::new(Arc::clone(&holder), prompt)
    };
    let coordinator = RetryCoordinator::new(
        Arc::new(client),
        Arc::new(HtmlRecordParser),
        Arc::new(refresher),
    );
    let pool = FetchPool::new(settings.workers, coordinator)?;
    let store = LibraryStore::new(&settings.library_root).with_raw_text(settings.raw_text);
    let sync = LibrarySync::new(pool, store);

    let options = SyncOptions {
        overwrite: args.overwrite,
        start: args.start,
        end: args.end,
    };
    let range = sync.resolve_range(options).await?;

    let (spinner_task, stop) = progress::spawn_progress_ui(use_spinner, spinner, sync.stats());
    let result = sync.run_range(range, options).await;
    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = spinner_task {
        let _ = handle.await;
    }
    let summary = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &SyncSummary) {
    println!("Range:             {}", summary.range);
    println!("Already stored:    {}", summary.already_stored);
    println!("Stored:            {}", summary.stored_normal);
    println!("Stored (deleted):  {}", summary.stored_deleted);
    println!("Unavailable:       {}", summary.unavailable);
    println!("Malformed:         {}", summary.malformed);
    println!("Session refreshes: {}", summary.session_refreshes);
    println!(
        "Ledger:            {} appended, {} replaced, {} skipped, {} total",
        summary.ledger.appended,
        summary.ledger.replaced,
        summary.ledger.skipped,
        summary.ledger.total
    );
}

async fn run_fetch(args: &FetchArgs, settings: &Settings) -> Result<()> {
    let client = build_client(settings)?;
    let prompt = StdinPrompt::new(settings.cookie_name.clone());
    let token = match &args.token {
        Some(raw) => SessionToken::from_input(raw, &settings.cookie_name),
        None => {
            let prompt = prompt.clone();
            tokio::task::spawn_blocking(move || {
                prompt.read_token("A library session token is required.")
            })
            .await??
        }
    };
    if token.is_empty() {
        bail!("session token must not be empty");
    }
    let item = match &args.item {
        Some(item) => item.clone(),
        None => tokio::task::spawn_blocking(move || prompt.read_item()).await??,
    };

    let url = client.resolve_item_link(&item)?;
    let id = item_id(&url);
    let page = client.fetch_url(&url, &token).await?;

    match classify_page(id, &page, &HtmlRecordParser) {
        FetchOutcome::Fetched(record) => {
            println!("{}", record.text(settings.raw_text));
            Ok(())
        }
        FetchOutcome::AuthInvalid => bail!("session token was rejected by the library"),
        FetchOutcome::Unavailable => bail!("item {url} is unavailable"),
        FetchOutcome::MalformedResponse { reason } => {
            bail!("unrecognized page for {url}: {reason}")
        }
    }
}

fn build_client(settings: &Settings) -> Result<LibraryClient> {
    let client = LibraryClient::with_timeouts(
        &settings.base_url,
        settings.cookie_name.clone(),
        settings.connect_timeout_secs,
        settings.read_timeout_secs,
    )
    .with_context(|| format!("cannot use base URL '{}'", settings.base_url))?;
    Ok(client)
}

/// Trailing numeric path segment of an item link, 0 when absent.
fn item_id(url: &Url) -> u64 {
    url.path_segments()
        .and_then(Iterator::last)
        .and_then(|segment| segment.parse().ok())
        .unwrap_or(0)
}
