mod browser;
mod catalog;
mod config;
mod db;
mod error;
mod export;
mod parser;
mod pipeline;
mod reconcile;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::browser::{BrowserKind, ChromeOptions, ChromeProvider, StaticProvider};
use crate::catalog::{Catalog, CatalogVariant};
use crate::config::{RunConfig, Settings};
use crate::db::{RecordStore, SqliteStore};
use crate::export::{ExportSink, FileSink};
use crate::pipeline::{RunOptions, RunReport};

#[derive(Parser)]
#[command(name = "tier_scraper", about = "Tier-list catalog scraper")]
struct Cli {
    /// Which catalog to work on
    #[arg(short, long, value_enum, default_value = "zzz", global = true)]
    catalog: Catalog,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the source page, merge into the store, and export
    Run {
        /// Max cards to process (overrides FRAGMENT_LIMIT)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Source page URL or saved HTML file (overrides SOURCE_URL)
        #[arg(long)]
        url: Option<String>,
        /// chromium, chrome or static (overrides BROWSER)
        #[arg(long)]
        browser: Option<String>,
    },
    /// Export the stored catalog without scraping
    Export,
    /// Show store statistics
    Stats,
    /// Entries ordered by average rating
    Overview {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Parse one saved popover fragment and print the record
    Parse {
        /// File holding the popover's inner HTML
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let variant = cli.catalog.variant();

    let mut settings = Settings::from_env();
    if let Commands::Run { limit, url, browser } = &cli.command {
        if let Some(n) = limit {
            settings.fragment_limit = Some(n.to_string());
        }
        if url.is_some() {
            settings.source_url = url.clone();
        }
        if browser.is_some() {
            settings.browser = browser.clone();
        }
    }
    let config = RunConfig::resolve(&settings, variant);

    match cli.command {
        Commands::Run { .. } => {
            let mut store = open_store(&config, variant)?;
            let sink = FileSink::new(&config.export_dir);
            let report = run(&config, variant, &mut store, &sink)?;
            print_report(&report);
        }
        Commands::Export => {
            let store = open_store(&config, variant)?;
            let entries = store.list_all()?;
            let summary = FileSink::new(&config.export_dir).export(variant, &entries)?;
            println!(
                "Exported {} records to {} and {}",
                summary.records,
                summary.json_path.display(),
                summary.csv_path.display()
            );
        }
        Commands::Stats => {
            let store = open_store(&config, variant)?;
            let s = store.stats()?;
            println!("Catalog:         {}", variant.title);
            println!("Total:           {}", s.total);
            println!("Fully rated:     {}", s.fully_rated);
            println!("Partially rated: {}", s.partially_rated);
            println!("Unrated:         {}", s.unrated);
            println!(
                "Last update:     {}",
                s.last_updated.as_deref().unwrap_or("-")
            );
        }
        Commands::Overview { limit } => {
            let store = open_store(&config, variant)?;
            let rows = store.fetch_overview(limit)?;
            if rows.is_empty() {
                println!("No entries stored. Run 'run' first.");
                return Ok(());
            }
            print_overview(variant, &rows);
        }
        Commands::Parse { file } => {
            let markup = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let entry = parser::process_fragment(variant, &markup)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&export::entry_to_json(variant, &entry))?
            );
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }
    Ok(())
}

fn open_store(config: &RunConfig, variant: &'static CatalogVariant) -> anyhow::Result<SqliteStore> {
    let conn = db::connect(&config.db_path)
        .with_context(|| format!("Failed to open {:?}", config.db_path))?;
    Ok(SqliteStore::open(conn, variant)?)
}

fn run(
    config: &RunConfig,
    variant: &CatalogVariant,
    store: &mut SqliteStore,
    sink: &dyn ExportSink,
) -> anyhow::Result<RunReport> {
    let options = RunOptions {
        source_url: config.source_url.clone(),
        fragment_limit: config.fragment_limit,
        wait_timeout: config.wait_timeout,
        settle_delay: config.settle_delay,
    };

    let report = match config.browser {
        BrowserKind::Chromium => {
            let provider = ChromeProvider::launch(&ChromeOptions {
                headless: config.headless,
                binary: config.chrome_path.clone(),
            })?;
            pipeline::run(variant, &options, provider, store, sink)?
        }
        BrowserKind::Static => {
            pipeline::run(variant, &options, StaticProvider::new(), store, sink)?
        }
    };
    Ok(report)
}

fn print_report(r: &RunReport) {
    println!(
        "Run {} → {}",
        r.started_at.format("%Y-%m-%d %H:%M:%S"),
        r.finished_at.format("%H:%M:%S")
    );
    println!(
        "Cards: {} ({} extracted, {} skipped)",
        r.fragments, r.extracted, r.skipped
    );
    println!(
        "Store: {} written ({} new, {} updated), {} unchanged, {} conflicts",
        r.merge.writes(),
        r.merge.inserted,
        r.merge.updated,
        r.merge.unchanged,
        r.merge.conflicts
    );
    println!(
        "Exported {} records to {} and {}",
        r.export.records,
        r.export.json_path.display(),
        r.export.csv_path.display()
    );
}

fn print_overview(variant: &CatalogVariant, rows: &[db::CatalogEntry]) {
    let tag_width = 14;
    let mut header = format!("{:>3} | {:<24}", "#", "Name");
    for field in variant.tags {
        header.push_str(&format!(" | {:<w$}", truncate(field.column, tag_width), w = tag_width));
    }
    header.push_str(&format!(" | {:>7}", "Avg"));
    println!("{}", header);
    println!("{}", "-".repeat(header.chars().count()));

    for (i, r) in rows.iter().enumerate() {
        let mut line = format!("{:>3} | {:<24}", i + 1, truncate(&r.name, 24));
        for field in variant.tags {
            let value = r.tag(field.column, variant).unwrap_or("-");
            line.push_str(&format!(" | {:<w$}", truncate(value, tag_width), w = tag_width));
        }
        let avg = r
            .average_rating
            .map(|a| format!("{:.2}", a))
            .unwrap_or_else(|| "-".into());
        line.push_str(&format!(" | {:>7}", avg));
        println!("{}", line);
    }

    println!("\n{} entries | {}", rows.len(), variant.title);
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
