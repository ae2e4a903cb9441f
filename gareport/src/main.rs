//! gareport - CLI for periodic web-analytics rollups
//!
//! Loads analytics batches into the period store, recomputes publisher
//! rollups, purges periods and prints stored rows.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/gareport/gareport.db (~/.local/share/gareport/gareport.db)
//! - Logs: $XDG_STATE_HOME/gareport/gareport.log (~/.local/state/gareport/gareport.log)
//! - Config: $XDG_CONFIG_HOME/gareport/config.toml (~/.config/gareport/config.toml)

mod process_lock;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use gareport_core::aggregate::{PeriodBatch, RunSummary};
use gareport_core::catalog::StaticCatalog;
use gareport_core::{period, Aggregator, CommitMode, Config, Database, CUMULATIVE_PERIOD};
use indicatif::{ProgressBar, ProgressStyle};
use process_lock::acquire_run_guard;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "gareport")]
#[command(about = "Periodic web-analytics rollups for a data catalog site")]
#[command(version)]
struct Args {
    /// Database file (default: from config, then XDG data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (default: $XDG_CONFIG_HOME/gareport/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log to stderr as well (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database and apply migrations
    Init,

    /// Replace one period with a batch file and roll it up
    Run {
        /// Period batch (JSON)
        #[arg(short, long)]
        batch: PathBuf,

        /// Catalog export (JSON); defaults to [catalog] path in config
        #[arg(short, long)]
        catalog: Option<PathBuf>,

        /// Override [aggregation] commit_mode (per_row or per_batch)
        #[arg(long)]
        commit_mode: Option<CommitMode>,
    },

    /// Recompute publisher rollups for a period from stored url rows
    Rollup {
        #[arg(short, long)]
        period: String,

        /// Catalog export (JSON); defaults to [catalog] path in config
        #[arg(short, long)]
        catalog: Option<PathBuf>,
    },

    /// Delete every row of a period, or of all periods with "all"
    Purge {
        period: String,
    },

    /// Print stored rows
    Show {
        #[arg(value_enum)]
        what: ShowKind,

        /// Period to show (url rows default to the cumulative "All" period)
        #[arg(short, long)]
        period: Option<String>,

        /// Maximum url rows (default: [aggregation] top_urls_limit)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only this sitewide stat
        #[arg(short, long)]
        stat: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the period name and complete day for a date
    Period {
        /// Date (YYYY-MM-DD); defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ShowKind {
    Urls,
    Publishers,
    Sitewide,
    Referrals,
    Periods,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    let console_level = match args.verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    };
    let _log_guard = gareport_core::logging::init(&config.logging, console_level)
        .context("failed to initialize logging")?;

    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| config.resolved_database_path());

    tracing::info!(db = %db_path.display(), "gareport starting");

    match args.command {
        Command::Init => cmd_init(&db_path),
        Command::Run {
            batch,
            catalog,
            commit_mode,
        } => cmd_run(&config, &db_path, &batch, catalog.as_deref(), commit_mode),
        Command::Rollup { period, catalog } => {
            cmd_rollup(&config, &db_path, &period, catalog.as_deref())
        }
        Command::Purge { period } => cmd_purge(&db_path, &period),
        Command::Show {
            what,
            period,
            limit,
            stat,
            json,
        } => {
            let db = open_db(&db_path)?;
            let options = ShowOptions {
                period: period.as_deref(),
                limit: limit.unwrap_or(config.aggregation.top_urls_limit),
                stat: stat.as_deref(),
                json,
            };
            cmd_show(&db, what, &options)
        }
        Command::Period { date } => cmd_period(date),
    }
}

fn open_db(db_path: &Path) -> Result<Database> {
    let db = Database::open(db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    db.migrate().context("failed to run database migrations")?;
    Ok(db)
}

fn load_catalog(arg: Option<&Path>, config: &Config) -> Result<StaticCatalog> {
    let Some(path) = arg.or(config.catalog.path.as_deref()) else {
        bail!("no catalog given: pass --catalog or set [catalog] path in config.toml");
    };
    StaticCatalog::load(path).with_context(|| format!("failed to load catalog {}", path.display()))
}

fn cmd_init(db_path: &Path) -> Result<()> {
    let db = open_db(db_path)?;
    let counts = db.count_rows(None)?;
    println!("Database: {}", db_path.display());
    println!("Rows:     {}", counts.total());
    println!("Log:      {}", gareport_core::logging::log_file_path().display());
    Ok(())
}

fn cmd_run(
    config: &Config,
    db_path: &Path,
    batch_path: &Path,
    catalog_path: Option<&Path>,
    commit_mode: Option<CommitMode>,
) -> Result<()> {
    let started = Instant::now();

    let batch = PeriodBatch::load(batch_path)
        .with_context(|| format!("failed to read batch {}", batch_path.display()))?;
    let catalog = load_catalog(catalog_path, config)?;

    let _run_guard = acquire_run_guard(db_path).context("failed to acquire run lock")?;
    let db = open_db(db_path)?;

    let mut aggregator = Aggregator::from_config(&db, &catalog, &config.aggregation);
    if let Some(mode) = commit_mode {
        aggregator = aggregator.with_commit_mode(mode);
    }

    let pb = ProgressBar::new(batch.urls.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let result = aggregator.run_period_with_progress(&batch, |done, _total, url| {
        pb.set_position(done as u64);
        pb.set_message(url.to_string());
    });
    pb.finish_and_clear();

    let summary = result.with_context(|| format!("run for period {} failed", batch.period_name))?;
    print_run_summary(&summary, aggregator.commit_mode());
    println!("Run complete in {} ms", started.elapsed().as_millis());
    Ok(())
}

fn print_run_summary(summary: &RunSummary, commit_mode: CommitMode) {
    println!("Period:            {}", summary.period_name);
    println!("Commit mode:       {}", commit_mode.as_str());
    println!("Rows purged:       {}", summary.purged.total());
    println!(
        "Urls ingested:     {} ({} new, {} updated)",
        summary.ingest.records, summary.ingest.rows_created, summary.ingest.rows_updated
    );
    println!("Dataset urls:      {}", summary.ingest.classified_datasets);
    println!("Publisher urls:    {}", summary.ingest.classified_publishers);
    println!("Cumulative rows:   {}", summary.cumulative_rows);
    println!("Referrals:         {}", summary.referrals);
    println!("Sitewide values:   {}", summary.sitewide_values);
    println!(
        "Publishers:        {} ({} top-level)",
        summary.rollup.publishers, summary.rollup.toplevel
    );
    println!(
        "Top-level totals:  {} views, {} visits",
        summary.rollup.total_views, summary.rollup.total_visits
    );
}

fn cmd_rollup(
    config: &Config,
    db_path: &Path,
    period_name: &str,
    catalog_path: Option<&Path>,
) -> Result<()> {
    let catalog = load_catalog(catalog_path, config)?;
    let _run_guard = acquire_run_guard(db_path).context("failed to acquire run lock")?;
    let db = open_db(db_path)?;

    let summary = Aggregator::from_config(&db, &catalog, &config.aggregation)
        .rollup_publishers(period_name)
        .with_context(|| format!("rollup for period {} failed", period_name))?;

    println!(
        "Rolled up {} publishers ({} top-level) for {}",
        summary.publishers, summary.toplevel, period_name
    );
    println!(
        "Top-level totals: {} views, {} visits",
        summary.total_views, summary.total_visits
    );
    Ok(())
}

fn cmd_purge(db_path: &Path, period_name: &str) -> Result<()> {
    let _run_guard = acquire_run_guard(db_path).context("failed to acquire run lock")?;
    let db = open_db(db_path)?;

    // Purging needs no catalog lookups.
    let catalog = StaticCatalog::default();
    let summary = Aggregator::new(&db, &catalog)
        .delete_period(period_name)
        .with_context(|| format!("failed to purge {}", period_name))?;

    println!("Purged {}:", period_name);
    println!("  urls:       {}", summary.urls);
    println!("  sitewide:   {}", summary.sitewide);
    println!("  publishers: {}", summary.publishers);
    println!("  referrals:  {}", summary.referrals);
    Ok(())
}

struct ShowOptions<'a> {
    period: Option<&'a str>,
    limit: usize,
    stat: Option<&'a str>,
    json: bool,
}

impl ShowOptions<'_> {
    fn required_period(&self) -> Result<&str> {
        match self.period {
            Some(period) => Ok(period),
            None => bail!("--period is required"),
        }
    }
}

fn cmd_show(db: &Database, what: ShowKind, options: &ShowOptions<'_>) -> Result<()> {
    match what {
        ShowKind::Urls => {
            let period = options.period.unwrap_or(CUMULATIVE_PERIOD);
            let rows = db.list_url_stats(period, options.limit)?;
            if options.json {
                return print_json(&rows);
            }
            println!("{:>10} {:>8}  {:<24} URL", "VIEWS", "VISITS", "PUBLISHER");
            for row in &rows {
                println!(
                    "{:>10} {:>8}  {:<24} {}",
                    row.pageviews,
                    row.visits,
                    row.department_id.as_deref().unwrap_or("-"),
                    row.url
                );
            }
        }
        ShowKind::Publishers => {
            let rows = db.list_publisher_stats(options.required_period()?)?;
            if options.json {
                return print_json(&rows);
            }
            println!(
                "{:<28} {:>10} {:>8} {:>5} {:>4}  PARENT",
                "PUBLISHER", "VIEWS", "VISITS", "SUBS", "TOP"
            );
            for row in &rows {
                println!(
                    "{:<28} {:>10} {:>8} {:>5} {:>4}  {}",
                    row.publisher_name,
                    row.views,
                    row.visits,
                    row.subpublishercount,
                    if row.toplevel { "yes" } else { "" },
                    row.parent
                );
            }
        }
        ShowKind::Sitewide => {
            let rows = db.list_sitewide_stats(options.required_period()?, options.stat)?;
            if options.json {
                return print_json(&rows);
            }
            for row in &rows {
                println!("{}\t{}\t{}", row.stat_name, row.key, row.value);
            }
        }
        ShowKind::Referrals => {
            let rows = db.list_referral_stats(options.required_period()?)?;
            if options.json {
                return print_json(&rows);
            }
            for row in &rows {
                println!("{:>8}  {:<24} {}", row.count, row.source, row.url);
            }
        }
        ShowKind::Periods => {
            let periods = db.list_periods()?;
            if options.json {
                return print_json(&periods);
            }
            for period_name in &periods {
                let counts = db.count_rows(Some(period_name))?;
                println!(
                    "{:<12} urls={} publishers={} sitewide={} referrals={}",
                    period_name, counts.urls, counts.publishers, counts.sitewide, counts.referrals
                );
            }
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_period(date: Option<NaiveDate>) -> Result<()> {
    let today = chrono::Local::now().date_naive();
    let date = date.unwrap_or(today);
    if date > today {
        bail!("{} is in the future", date);
    }
    println!(
        "{}\tcomplete through day {}",
        period::month_name(date),
        period::complete_day(date, today)
    );
    Ok(())
}
