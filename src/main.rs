mod config;
mod db;
mod dedup;
mod fetch;
mod parser;
mod report;
mod robots;
mod writer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::info;

use config::{ExtractConfig, Overrides};
use fetch::{FetchOptions, FetchResult, Fetcher};
use report::{Aggregator, Report};
use writer::SheetFormat;

const CHUNK_SIZE: usize = 500;

#[derive(Parser)]
#[command(
    name = "contact_scraper",
    about = "Extract names, emails and phone numbers from web pages and local HTML files"
)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every source listed in a file and write the contacts report
    Run {
        /// Text file with one URL or local path per line
        #[arg(short, long)]
        input: PathBuf,
        /// Workbook with `contacts` and `summary` sheets. With `--format csv`,
        /// the directory named after it receives contacts.csv and summary.csv
        #[arg(short, long, default_value = "output.xlsx")]
        out: PathBuf,
        #[arg(long, value_enum, default_value_t = SheetFormat::Xlsx)]
        format: SheetFormat,
        /// Also record the run in this SQLite database
        #[arg(long)]
        db: Option<PathBuf>,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Process the given sources and print the report as JSON
    Extract {
        /// URLs or local paths
        #[arg(required = true)]
        sources: Vec<String>,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// List recorded runs
    Stats {
        #[arg(long, default_value = db::DEFAULT_DB_PATH)]
        db: PathBuf,
        /// Max runs to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        /// Show the contacts and failed pages of one run
        #[arg(long)]
        run: Option<i64>,
    },
}

#[derive(Args)]
struct PipelineArgs {
    /// Seconds between requests to the same host
    #[arg(long, default_value_t = 0.5)]
    delay: f64,
    #[arg(long, default_value = fetch::DEFAULT_USER_AGENT)]
    user_agent: String,
    /// Ignore robots.txt rules
    #[arg(long)]
    no_robots: bool,
    /// Max concurrent fetches
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
    #[arg(long)]
    min_phone_digits: Option<usize>,
    #[arg(long)]
    max_phone_digits: Option<usize>,
    #[arg(long)]
    max_name_length: Option<usize>,
}

impl PipelineArgs {
    fn fetch_options(&self) -> Result<FetchOptions> {
        let delay = Duration::try_from_secs_f64(self.delay)
            .with_context(|| format!("Invalid --delay {}", self.delay))?;
        Ok(FetchOptions {
            user_agent: self.user_agent.clone(),
            delay,
            respect_robots: !self.no_robots,
            concurrency: self.concurrency,
        })
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            min_phone_digits: self.min_phone_digits,
            max_phone_digits: self.max_phone_digits,
            max_name_length: self.max_name_length,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let t0 = Instant::now();

    let result = match cli.command {
        Commands::Run {
            input,
            out,
            format,
            db: db_path,
            pipeline,
        } => {
            let started_at = Utc::now();
            let cfg = ExtractConfig::load(pipeline.overrides())?;
            let sources = read_sources(&input)?;
            println!("Found {} source(s) in {}", sources.len(), input.display());

            let report = run_pipeline(sources, &pipeline, &cfg).await?;
            let written = writer::write_report(&out, format, &report)?;

            if let Some(path) = db_path {
                let conn = db::connect(&path)?;
                db::init_schema(&conn)?;
                let run_id = db::save_run(&conn, started_at, &input.display().to_string(), &report)?;
                println!("Recorded run #{} in {}", run_id, path.display());
            }

            print_summary(&report);
            for path in written {
                println!("Wrote {}", path.display());
            }
            Ok(())
        }
        Commands::Extract { sources, pipeline } => {
            let cfg = ExtractConfig::load(pipeline.overrides())?;
            let report = run_pipeline(sources, &pipeline, &cfg).await?;
            let json = serde_json::json!({
                "records": report.records,
                "stats": report.stats,
                "success_rate": report.stats.success_rate(),
                "pages": report.pages,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
        Commands::Stats { db: path, limit, run } => {
            let conn = db::connect(&path)?;
            db::init_schema(&conn)?;
            match run {
                Some(run_id) => print_run(&conn, run_id),
                None => print_runs(&conn, limit),
            }
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "contact_scraper=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// One source per line; blank lines and `#` comments are skipped.
fn read_sources(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        bail!("Input file not found: {}", path.display());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let sources: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect();
    if sources.is_empty() {
        bail!("No URLs or paths found in {}", path.display());
    }
    Ok(sources)
}

async fn run_pipeline(
    sources: Vec<String>,
    pipeline: &PipelineArgs,
    cfg: &ExtractConfig,
) -> Result<Report> {
    let fetcher = Arc::new(Fetcher::new(pipeline.fetch_options()?)?);
    info!("Fetching {} sources", sources.len());
    let fetched = fetch::fetch_all(fetcher, sources).await?;
    process_pages(&fetched, cfg)
}

/// Extract pages in parallel chunks, then feed the aggregator in input order.
fn process_pages(fetched: &[FetchResult], cfg: &ExtractConfig) -> Result<Report> {
    let pb = ProgressBar::new(fetched.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut aggregator = Aggregator::new();
    for chunk in fetched.chunks(CHUNK_SIZE) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|r| r.outcome.as_ref().map(|page| parser::process_page(page, cfg)))
            .collect();

        for (fetch, result) in chunk.iter().zip(results) {
            match result {
                Ok(page) => {
                    info!(
                        "{}: {} contact(s) from {} candidate(s)",
                        truncate(&page.source, 80),
                        page.records.len(),
                        page.candidates
                    );
                    aggregator.ingest_page(page);
                }
                Err(e) => aggregator.page_failed(&fetch.source, e),
            }
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    let report = aggregator.finish();
    info!(
        "Collected {} record(s), {} unique after deduplication",
        report.stats.total_extracted, report.stats.unique_count
    );
    Ok(report)
}

fn print_summary(report: &Report) {
    let s = &report.stats;
    println!(
        "Pages: {} processed, {} failed ({:.1}% success)",
        s.pages_processed,
        s.pages_failed,
        s.success_rate() * 100.0
    );
    println!(
        "Contacts: {} extracted, {} unique, {} duplicates removed, {} candidates rejected",
        s.total_extracted, s.unique_count, s.duplicates_removed, s.rejected_candidates
    );
}

fn print_runs(conn: &rusqlite::Connection, limit: usize) -> Result<()> {
    let runs = db::fetch_runs(conn, limit)?;
    if runs.is_empty() {
        println!("No runs recorded. Use 'run --db <path>' to record one.");
        return Ok(());
    }

    println!(
        "{:>4} | {:<25} | {:<24} | {:>5} | {:>6} | {:>5} | {:>6} | {:>7}",
        "#", "Started", "Input", "Pages", "Failed", "Found", "Unique", "Success"
    );
    println!("{}", "-".repeat(102));
    for r in &runs {
        let s = &r.stats;
        println!(
            "{:>4} | {:<25} | {:<24} | {:>5} | {:>6} | {:>5} | {:>6} | {:>6.1}%",
            r.id,
            truncate(&r.started_at, 25),
            truncate(&r.input, 24),
            s.pages_attempted(),
            s.pages_failed,
            s.total_extracted,
            s.unique_count,
            s.success_rate() * 100.0
        );
    }
    println!("\n{} run(s)", runs.len());
    Ok(())
}

fn print_run(conn: &rusqlite::Connection, run_id: i64) -> Result<()> {
    let contacts = db::fetch_contacts(conn, run_id)?;
    let failed = db::fetch_failed_pages(conn, run_id)?;
    if contacts.is_empty() && failed.is_empty() {
        println!("Run #{} has no contacts or failed pages.", run_id);
        return Ok(());
    }

    println!(
        "{:<24} | {:<32} | {:<18} | {}",
        "Name", "Email", "Phone", "Source"
    );
    println!("{}", "-".repeat(100));
    for c in &contacts {
        println!(
            "{:<24} | {:<32} | {:<18} | {}",
            truncate(c.name.as_deref().unwrap_or("-"), 24),
            truncate(c.email.as_deref().unwrap_or("-"), 32),
            c.phone.as_deref().unwrap_or("-"),
            truncate(&c.source, 60)
        );
    }

    if !failed.is_empty() {
        println!("\n--- Failed pages ---");
        for (source, error) in &failed {
            println!("  {}: {}", truncate(source, 60), error);
        }
    }

    println!("\n{} contact(s), {} failed page(s)", contacts.len(), failed.len());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

// ── Tests ──
