mod output;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use jobhound_core::models::{EmploymentType, Posting, RunStats, dedupe_by_fingerprint};
use jobhound_core::traits::{NullStore, PostingStore, Source};
use jobhound_core::{Engine, EngineConfig, RunContext};
use jobhound_db::{Database, DatabaseConfig, PostingQuery, PostingRepository};
use jobhound_sources::{
    BUILTIN_SOURCES, BoardProfile, FixtureSource, GLASSDOOR, INDEED, LINKEDIN, builtin_sources,
    source_by_name,
};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "jobhound", version, about = "Concurrent job board aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape job boards once and print the results
    Scrape {
        /// Search query passed to every source
        #[arg(short, long)]
        query: String,

        /// Built-in source to scrape (repeatable; defaults to all)
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// JSON fixture file to serve as an extra source
        #[arg(long)]
        fixture: Option<PathBuf>,

        /// Concurrent workers (overrides SCRAPER_WORKERS)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Source calls per second (overrides SCRAPER_RATE_LIMIT)
        #[arg(long)]
        rate_limit: Option<u32>,

        /// Run timeout in seconds (overrides SCRAPER_TIMEOUT)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Save results to the database (requires DATABASE_URL)
        #[arg(long, default_value_t = false)]
        save: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },

    /// Search stored postings
    Search {
        /// Matched against title, description and company
        #[arg(short, long)]
        keywords: Option<String>,

        /// Matched against location
        #[arg(short, long)]
        location: Option<String>,

        /// Only remote postings
        #[arg(long, default_value_t = false)]
        remote: bool,

        /// Exact source name
        #[arg(short, long)]
        source: Option<String>,

        /// Employment type (e.g. "full-time", "contract")
        #[arg(short = 't', long)]
        employment_type: Option<EmploymentType>,

        /// Number of results to show
        #[arg(long, default_value_t = 20)]
        limit: i64,

        /// Number of results to skip
        #[arg(long, default_value_t = 0)]
        offset: i64,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },

    /// Show aggregate statistics over stored postings
    Stats {
        /// Print as JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Delete stored postings older than the given number of days
    Prune {
        /// Age threshold in days (posting date, or scrape date when unknown)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        days: u32,
    },

    /// List built-in sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobhound=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scrape {
            query,
            sources,
            fixture,
            workers,
            rate_limit,
            timeout_secs,
            save,
            format,
        } => {
            let mut config = EngineConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
            if let Some(workers) = workers {
                config = config.with_workers(workers);
            }
            if let Some(rate_limit) = rate_limit {
                config = config.with_rate_limit(rate_limit);
            }
            if let Some(secs) = timeout_secs {
                config = config.with_timeout(Duration::from_secs(secs));
            }
            let sources = resolve_sources(&sources, fixture.as_ref())?;

            if save {
                let repo = connect_db().await?;
                cmd_scrape(&query, config, sources, &repo, format).await?;
            } else {
                cmd_scrape(&query, config, sources, &NullStore, format).await?;
            }
        }
        Commands::Search {
            keywords,
            location,
            remote,
            source,
            employment_type,
            limit,
            offset,
            format,
        } => {
            let query = PostingQuery {
                keywords,
                location,
                remote: remote.then_some(true),
                source,
                employment_type,
                limit,
                offset,
            };
            let repo = connect_db().await?;
            cmd_search(&query, &repo, format).await?;
        }
        Commands::Stats { json } => {
            let repo = connect_db().await?;
            cmd_stats(&repo, json).await?;
        }
        Commands::Prune { days } => {
            let repo = connect_db().await?;
            cmd_prune(&repo, days).await?;
        }
        Commands::Sources => cmd_sources(),
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<PostingRepository> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let db = Database::connect(&config)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to connect to database")?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;

    Ok(db.posting_repo())
}

fn resolve_sources(names: &[String], fixture: Option<&PathBuf>) -> Result<Vec<Arc<dyn Source>>> {
    let mut sources = Vec::new();
    for name in names {
        let Some(source) = source_by_name(name) else {
            bail!(
                "Unknown source '{name}'. Available: {}",
                BUILTIN_SOURCES.join(", ")
            );
        };
        sources.push(source);
    }

    if let Some(path) = fixture {
        let source = FixtureSource::load(path)
            .map_err(|e| anyhow::anyhow!(e))
            .with_context(|| format!("Failed to load fixture {}", path.display()))?;
        sources.push(Arc::new(source));
    }

    if sources.is_empty() {
        sources = builtin_sources();
    }
    Ok(sources)
}

/// Everything one scrape produced, before printing.
struct ScrapeOutcome {
    postings: Vec<Posting>,
    unique: Vec<Posting>,
    stats: RunStats,
    errors: Vec<String>,
    saved: usize,
}

/// Run the engine once, then hand the deduplicated postings to `store`.
async fn run_scrape(
    engine: &Engine,
    ctx: &RunContext,
    query: &str,
    store: &impl PostingStore,
) -> Result<ScrapeOutcome> {
    let result = engine.start(ctx, query).await;
    engine.shutdown();
    let postings = result.map_err(|e| anyhow::anyhow!(e))?;

    let unique = dedupe_by_fingerprint(postings.clone());
    let saved = store
        .save_batch(&unique)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to save postings")?;

    Ok(ScrapeOutcome {
        postings,
        unique,
        stats: engine.stats(),
        errors: engine.last_errors(),
        saved,
    })
}

async fn cmd_scrape(
    query: &str,
    config: EngineConfig,
    sources: Vec<Arc<dyn Source>>,
    store: &impl PostingStore,
    format: OutputFormat,
) -> Result<()> {
    let timeout = config.timeout;
    let mut engine = Engine::new(config).map_err(|e| anyhow::anyhow!(e))?;
    for source in sources {
        engine.register_source(source);
    }

    // Ctrl-C cancels the run; the engine returns as soon as it notices.
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            signal_token.cancel();
        }
    });

    let ctx = RunContext::from_token(token).with_timeout(timeout);
    let outcome = run_scrape(&engine, &ctx, query, store).await?;
    if outcome.saved > 0 {
        tracing::info!(
            saved = outcome.saved,
            unique = outcome.unique.len(),
            "Postings saved"
        );
    }

    let stdout = std::io::stdout().lock();
    let unique = outcome.unique.len();
    match format {
        OutputFormat::Summary => {
            let mut stdout = stdout;
            output::write_listing(&outcome.unique, &mut stdout)?;
            output::write_run_summary(&outcome.stats, unique, &outcome.errors, &mut stdout)?;
        }
        OutputFormat::Json => {
            output::write_json(&outcome.postings, stdout)?;
            output::write_run_summary(
                &outcome.stats,
                unique,
                &outcome.errors,
                std::io::stderr().lock(),
            )?;
        }
        OutputFormat::Csv => {
            output::write_csv(&outcome.postings, stdout)?;
            output::write_run_summary(
                &outcome.stats,
                unique,
                &outcome.errors,
                std::io::stderr().lock(),
            )?;
        }
    }

    Ok(())
}

async fn cmd_search(
    query: &PostingQuery,
    repo: &PostingRepository,
    format: OutputFormat,
) -> Result<()> {
    let postings = repo.search(query).await.map_err(|e| anyhow::anyhow!(e))?;
    let stdout = std::io::stdout().lock();

    match format {
        OutputFormat::Summary => output::write_stored_listing(&postings, stdout)?,
        OutputFormat::Json => output::write_json(&postings, stdout)?,
        OutputFormat::Csv => output::write_csv(&postings, stdout)?,
    }

    Ok(())
}

async fn cmd_stats(repo: &PostingRepository, json: bool) -> Result<()> {
    let stats = repo.stats().await.map_err(|e| anyhow::anyhow!(e))?;
    let stdout = std::io::stdout().lock();
    if json {
        output::write_json(&stats, stdout)
    } else {
        output::write_posting_stats(&stats, stdout)
    }
}

async fn cmd_prune(repo: &PostingRepository, days: u32) -> Result<()> {
    let deleted = repo
        .delete_older_than(days)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    println!("Deleted {deleted} postings older than {days} days");
    Ok(())
}

fn cmd_sources() {
    let profiles: [BoardProfile; 3] = [INDEED, LINKEDIN, GLASSDOOR];
    println!("Built-in sources:\n");
    for profile in profiles {
        println!(
            "  {:<10} {}-{} postings per query  {}",
            profile.name, profile.min_jobs, profile.max_jobs, profile.url_prefix
        );
    }
    println!("\nUse --fixture <file.json> to add postings from a local file.");
}
