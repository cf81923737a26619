//! Digiscrape command-line entry point

use anyhow::{bail, Context};
use clap::Parser;
use digiscrape::auth::session::AuthMode;
use digiscrape::config::load_config_with_hash;
use digiscrape::run::control::RunLimits;
use digiscrape::run::runner::{Runner, RunnerOptions};
use digiscrape::state::StateLedger;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Digiscrape: gated back-office sale scraper
///
/// Crawls the back-office over an id range, gates deep extraction on page
/// content, and persists structured records with resumable progress.
#[derive(Parser, Debug)]
#[command(name = "digiscrape")]
#[command(version = "1.0.0")]
#[command(about = "Gated back-office sale scraper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Scrape a single nr
    #[arg(long, conflicts_with_all = ["start", "end"])]
    nr: Option<u32>,

    /// Starting nr
    #[arg(long, requires = "end")]
    start: Option<u32>,

    /// Ending nr (inclusive)
    #[arg(long, requires = "start")]
    end: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Development mode: safe defaults, verbose logs, local dumps
    #[arg(long)]
    dev: bool,

    /// No sink writes; ledger and local storage only
    #[arg(long)]
    dry_run: bool,

    /// Resume from the ledger (default outside dev mode)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Ignore the ledger and process the whole range
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Keep raw HTML in dev dumps (within the size cap)
    #[arg(long)]
    store_html: bool,

    /// Don't store decoded JSinfos blobs
    #[arg(long)]
    no_store_jsinfos: bool,

    /// Don't harvest explorer links
    #[arg(long)]
    no_store_explorer: bool,

    /// Stop after N records pass the gate
    #[arg(long)]
    limit_gated: Option<u32>,

    /// Stop after M minutes
    #[arg(long)]
    stop_after_minutes: Option<u64>,

    /// Stop after N total errors
    #[arg(long)]
    max_errors: Option<u32>,

    /// Stop after N consecutive errors
    #[arg(long)]
    max_consecutive_errors: Option<u32>,

    /// Stop after N 403 responses
    #[arg(long)]
    max_403: Option<u32>,

    /// Stop after N 429 responses
    #[arg(long)]
    max_429: Option<u32>,

    /// Re-raise any per-id error and end the run
    #[arg(long)]
    fail_fast: bool,

    /// Use only the configured session cookie, never attempt login
    #[arg(long, conflicts_with = "login_only")]
    cookie_only: bool,

    /// Ignore any configured cookie, always login with credentials
    #[arg(long)]
    login_only: bool,

    /// Override configured concurrency
    #[arg(long)]
    concurrency: Option<usize>,

    /// Override configured batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Show ledger statistics and exit
    #[arg(long, conflicts_with = "flush_spool")]
    stats: bool,

    /// Re-upload spooled batches to the sink and exit
    #[arg(long)]
    flush_spool: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet, cli.dev);

    tracing::info!("loading configuration from {}", cli.config.display());
    let (mut config, config_hash) =
        load_config_with_hash(&cli.config).context("failed to load configuration")?;
    tracing::info!("configuration loaded (hash: {config_hash})");

    if cli.stats {
        return handle_stats(&config);
    }

    // Dev mode gets safe defaults: tiny range, low pressure on the site.
    if cli.dev {
        if cli.concurrency.is_none() {
            config.scraper.concurrency = 2;
        }
        if cli.batch_size.is_none() {
            config.scraper.batch_size = 10;
        }
        config.scraper.rate_per_domain = 0.5;
    }
    if let Some(concurrency) = cli.concurrency {
        config.scraper.concurrency = concurrency;
    }
    if let Some(batch_size) = cli.batch_size {
        config.scraper.batch_size = batch_size;
    }

    let (start, end) = match (cli.nr, cli.start, cli.end) {
        (Some(nr), _, _) => (nr, nr),
        (None, Some(start), Some(end)) if start <= end => (start, end),
        (None, Some(start), Some(end)) => {
            bail!("--start {start} must not be greater than --end {end}")
        }
        _ if cli.dev => (52000, 52005),
        _ if cli.flush_spool => (0, 0),
        _ => bail!("must specify either --nr or --start/--end"),
    };

    let auth_mode = if cli.cookie_only {
        AuthMode::CookieOnly
    } else if cli.login_only {
        AuthMode::LoginOnly
    } else {
        AuthMode::Default
    };

    // Production runs resume by default; dev runs reprocess unless asked.
    let resume = if cli.dev { cli.resume } else { !cli.fresh };

    let options = RunnerOptions {
        start,
        end,
        resume,
        dev_mode: cli.dev,
        dry_run: cli.dry_run,
        store_html: cli.store_html,
        store_jsinfos: !cli.no_store_jsinfos,
        store_explorer: !cli.no_store_explorer,
        auth_mode,
        limits: RunLimits {
            limit_gated: cli.limit_gated,
            stop_after_minutes: cli.stop_after_minutes,
            max_errors: cli.max_errors,
            max_consecutive_errors: cli.max_consecutive_errors,
            max_403: cli.max_403,
            max_429: cli.max_429,
            fail_fast: cli.fail_fast,
        },
    };

    tracing::info!("============================================================");
    tracing::info!("digiscrape starting");
    tracing::info!("mode: {}", if cli.dev { "DEV" } else { "PROD" });
    tracing::info!("range: {start} - {end}");
    tracing::info!("concurrency: {}", config.scraper.concurrency);
    tracing::info!("rate per domain: {}", config.scraper.rate_per_domain);
    tracing::info!("batch size: {}", config.scraper.batch_size);
    tracing::info!("resume: {resume} | dry-run: {}", cli.dry_run);
    tracing::info!("============================================================");

    let runner = Runner::new(config, options).context("failed to initialize runner")?;

    if cli.flush_spool {
        let (batches, records) = runner.flush_spool().await?;
        println!("flushed {batches} spooled batches ({records} records)");
        return Ok(());
    }

    runner.run().await.context("run failed")?;
    Ok(())
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool, dev: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if dev {
        EnvFilter::new("digiscrape=debug,info")
    } else {
        match verbose {
            0 => EnvFilter::new("digiscrape=info,warn"),
            1 => EnvFilter::new("digiscrape=debug,info"),
            2 => EnvFilter::new("digiscrape=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --stats mode: prints ledger counts and exits.
fn handle_stats(config: &digiscrape::config::Config) -> anyhow::Result<()> {
    let ledger_path = config.storage.ledger_path();
    println!("ledger: {}\n", ledger_path.display());

    let ledger = StateLedger::open(&ledger_path)?;
    let stats = ledger.stats()?;
    if stats.is_empty() {
        println!("no records yet");
        return Ok(());
    }
    let total: u64 = stats.iter().map(|(_, count)| count).sum();
    for (status, count) in &stats {
        println!("{status:>10}: {count}");
    }
    println!("{:>10}: {total}", "total");
    Ok(())
}
