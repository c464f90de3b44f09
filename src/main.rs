mod config;
mod db;
mod error;
mod fetcher;
mod parser;
mod pipeline;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{LoadMode, Settings};
use crate::parser::transform::ResultTable;

#[derive(Parser)]
#[command(name = "bakery_etl", about = "Scrape a bakery category page into a warehouse table")]
struct Cli {
    /// Config file layered over the defaults (BAKERY_* env vars still win)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, extract, transform and load in one run.
    ///
    /// Without --write the run only checks the destination, so it fails with
    /// "not initialised" until one --write run has created the database.
    Run {
        /// Append rows to the destination (creating it if needed) instead of only checking it
        #[arg(long)]
        write: bool,
        /// Rows to preview after the run
        #[arg(short = 'n', long, default_value = "5")]
        preview: usize,
    },
    /// Extract + transform a saved page without fetching or loading
    Parse {
        #[arg(short, long)]
        file: PathBuf,
        /// Rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Print the key outline of the embedded page payload
    Keys {
        /// Saved page to read (otherwise the configured URL is fetched)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Maximum nesting depth to print
        #[arg(short, long)]
        depth: Option<usize>,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    info!(fetch = ?settings.fetch, warehouse = ?settings.warehouse, "Settings loaded");

    let code = match cli.command {
        Commands::Run { write, preview } => {
            if write {
                settings.warehouse.mode = LoadMode::Write;
            }
            let outcome = pipeline::run(&settings);
            if let Some(table) = outcome.table() {
                print_table(table, preview);
            }
            println!("\n{}", outcome);
            if outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Commands::Parse { file, limit } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let table = parser::process_page(&html)?;
            print_table(&table, limit);
            println!("\n{} rows", table.len());
            ExitCode::SUCCESS
        }
        Commands::Keys { file, depth } => {
            let html = match file {
                Some(f) => std::fs::read_to_string(&f)
                    .with_context(|| format!("Failed to read {:?}", f))?,
                None => {
                    let fetcher = fetcher::Fetcher::new(&settings.fetch)?;
                    fetcher.fetch(&settings.fetch.url, &settings.fetch.headers()?)?
                }
            };
            let payload = parser::embedded::embedded_payload(&html)?;
            for line in parser::embedded::key_tree(&payload, depth) {
                println!("{}", line);
            }
            ExitCode::SUCCESS
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }

    Ok(code)
}

fn print_table(table: &ResultTable, limit: usize) {
    if table.is_empty() {
        println!("No rows.");
        return;
    }

    println!(
        "{:>3} | {:<32} | {:>9} | {:>6} | {:>6} | {:>11} | {:<32}",
        "#", table.columns[0], table.columns[1], table.columns[3], table.columns[4], table.columns[5], table.columns[2]
    );
    println!("{}", "-".repeat(118));

    for (i, r) in table.head(limit).iter().enumerate() {
        println!(
            "{:>3} | {:<32} | {:>9} | {:>6} | {:>6} | {:>11} | {:<32}",
            i + 1,
            truncate(r.title.as_deref().unwrap_or("-"), 32),
            opt_num(r.price, 2),
            opt_num(r.weight, 1),
            opt_num(r.rating, 1),
            r.num_reviews,
            truncate(r.description.as_deref().unwrap_or("-"), 32),
        );
    }

    if table.len() > limit {
        println!("... {} more", table.len() - limit);
    }
}

fn opt_num(v: Option<f64>, precision: usize) -> String {
    v.map(|x| format!("{:.*}", precision, x))
        .unwrap_or_else(|| "-".into())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max - 3).collect();
        format!("{}...", truncated)
    }
}
