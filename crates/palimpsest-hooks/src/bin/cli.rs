//! Palimpsest CLI
//!
//! Thin query veneer over the retrieval API (spec.md §6.4): out of scope as
//! a collaborator contract, but the natural harness for exercising
//! `palimpsest-core` by hand.

use std::io::{BufWriter, Write};
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;

use palimpsest_core::pipeline::session_start::{self, RetrievalOptions};
use palimpsest_core::storage::{MemoryFilter, Storage};

/// Palimpsest - Memory pipeline query CLI
#[derive(Parser)]
#[command(name = "palimpsest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query CLI for the Palimpsest memory pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hybrid keyword+semantic search over stored memories
    Search {
        /// Task/topic query
        topic: String,
        /// Maximum memories to return
        #[arg(short, long, default_value = "10")]
        k: usize,
        /// Minimum importance score
        #[arg(long, default_value = "0.0")]
        min_importance: f64,
        /// Restrict to one session (default: all sessions)
        #[arg(long)]
        session: Option<String>,
    },

    /// Keyword-only FTS5 search
    KeywordSearch {
        /// Space-separated keywords
        keywords: Vec<String>,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show memory store statistics
    Stats,

    /// Export memories in JSON or JSONL format
    Export {
        /// Output file path
        output: PathBuf,
        #[arg(long, default_value = "json")]
        format: String,
        #[arg(long)]
        session: Option<String>,
        /// Only export memories created after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            topic,
            k,
            min_importance,
            session,
        } => run_search(topic, k, min_importance, session),
        Commands::KeywordSearch { keywords, limit } => run_keyword_search(keywords, limit),
        Commands::Stats => run_stats(),
        Commands::Export {
            output,
            format,
            session,
            since,
        } => run_export(output, format, session, since),
    }
}

fn run_search(topic: String, k: usize, min_importance: f64, session: Option<String>) -> anyhow::Result<()> {
    let storage = Storage::open(None)?;

    let options = RetrievalOptions {
        k_max: k,
        min_importance,
        session_id: session,
        ..Default::default()
    };

    let report = session_start::run(&storage, &topic, &options)?;

    println!("{}", "=== Palimpsest Search ===".cyan().bold());
    println!();
    println!("{}: {}", "Query".white().bold(), topic);
    println!("{}: {}", "Retrieved".white().bold(), report.retrieved.len());
    println!();

    for item in &report.retrieved {
        let tag = if item.is_recent {
            "[recent]".yellow()
        } else {
            format!("[{:.3}]", item.similarity).normal()
        };
        println!("{} {}", tag, item.memory.intent.bold());
        println!("    → {}", item.memory.action);
        println!("    → {}", item.memory.outcome);
        println!(
            "    {}: {:.2}  {}: {:.2}",
            "importance".dimmed(),
            item.memory.importance,
            "task_importance".dimmed(),
            item.task_importance
        );
        println!();
    }

    if report.retrieved.is_empty() {
        println!("{}", "No memories matched the quality gate.".dimmed());
    }

    Ok(())
}

fn run_keyword_search(keywords: Vec<String>, limit: usize) -> anyhow::Result<()> {
    if keywords.is_empty() {
        anyhow::bail!("provide at least one keyword");
    }
    let storage = Storage::open(None)?;
    let query = keywords.join(" ");
    let results = storage.keyword_search(&query, limit)?;

    println!("{}", "=== Palimpsest Keyword Search ===".cyan().bold());
    println!();
    println!("{}: {}", "Matching".white().bold(), results.len());
    println!();

    for memory in &results {
        println!("{} {}", "•".dimmed(), memory.intent.bold());
        println!("    → {}", memory.action);
        println!("    → {}", memory.outcome);
        println!();
    }

    Ok(())
}

fn run_stats() -> anyhow::Result<()> {
    let storage = Storage::open(None)?;
    let stats = storage.stats()?;

    println!("{}", "=== Palimpsest Memory Statistics ===".cyan().bold());
    println!();
    println!("{}: {}", "Total Memories".white().bold(), stats.total);
    println!("{}: {:.2}", "Average Importance".white().bold(), stats.avg_importance);
    println!();

    println!("{}", "By category:".yellow().bold());
    for (category, count) in &stats.by_category {
        println!("  {:10} {}", category, count);
    }

    println!();
    println!("{}", "By flag:".yellow().bold());
    for (flag, count) in &stats.by_flag {
        println!("  {:16} {}", flag, count);
    }

    Ok(())
}

fn run_export(output: PathBuf, format: String, session: Option<String>, since: Option<String>) -> anyhow::Result<()> {
    if format != "json" && format != "jsonl" {
        anyhow::bail!("Invalid format '{}'. Must be 'json' or 'jsonl'.", format);
    }

    let since_date = match &since {
        Some(date_str) => {
            let naive = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                .map_err(|e| anyhow::anyhow!("Invalid date '{}': {}. Use YYYY-MM-DD format.", date_str, e))?;
            Some(
                naive
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight is always valid")
                    .and_utc(),
            )
        }
        None => None,
    };

    let storage = Storage::open(None)?;
    let filter = MemoryFilter {
        session_id: session,
        since: since_date,
        ..Default::default()
    };
    let memories = storage.scan(&filter)?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = std::fs::File::create(&output)?;
    let mut writer = BufWriter::new(file);

    match format.as_str() {
        "json" => {
            serde_json::to_writer_pretty(&mut writer, &memories)?;
            writer.write_all(b"\n")?;
        }
        "jsonl" => {
            for memory in &memories {
                serde_json::to_writer(&mut writer, memory)?;
                writer.write_all(b"\n")?;
            }
        }
        _ => unreachable!(),
    }

    writer.flush()?;

    println!(
        "{}",
        format!("Exported {} memories to {} ({})", memories.len(), output.display(), format)
            .green()
            .bold()
    );

    Ok(())
}
