//! Generate a performance test database of synthetic articles.
//!
//! Documents go through `Collection::add`, so the output is exactly what a
//! real collection would persist and can be reopened by benchmarks.
//!
//! Usage:
//!     cargo run --release --bin generate-perf-db -- [--docs N] [--seed S] [output_path]
//!
//! Default output: SyntheticData_perf.sqlite

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scour::{Collection, CollectionConfig, Database, Field};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// Words in a generated title
const TITLE_WORDS: std::ops::RangeInclusive<usize> = 2..=6;

/// Words in a generated body
const BODY_WORDS: std::ops::RangeInclusive<usize> = 20..=120;

/// Progress line interval
const REPORT_EVERY: usize = 1_000;

const WORDS: &[&str] = &[
    "the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "river", "mountain",
    "valley", "forest", "ocean", "harbor", "island", "desert", "canyon", "meadow", "glacier",
    "village", "market", "station", "library", "garden", "bridge", "tower", "castle",
    "engine", "signal", "network", "server", "client", "buffer", "thread", "socket", "kernel",
    "compiler", "parser", "token", "index", "query", "search", "ranking", "vector", "matrix",
    "summer", "winter", "autumn", "spring", "morning", "evening", "midnight", "weekend",
];

/// Rare words sprinkled in so some queries match only a handful of documents
const KEYWORDS: &[&str] = &[
    "riverside", "kaleidoscope", "quixotic", "zephyr", "labyrinth", "serendipity",
];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the SQLite database to create
    #[arg(default_value = "SyntheticData_perf.sqlite")]
    output: PathBuf,

    /// Number of documents to generate
    #[arg(short, long, default_value_t = 10_000)]
    docs: usize,

    /// Seed for the random generator
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
}

fn generate_text(rng: &mut StdRng, words: std::ops::RangeInclusive<usize>) -> String {
    let count = rng.gen_range(words);
    let mut out: Vec<&str> = (0..count).map(|_| WORDS[rng.gen_range(0..WORDS.len())]).collect();
    if rng.gen_bool(0.05) {
        let at = rng.gen_range(0..=out.len());
        out.insert(at, KEYWORDS[rng.gen_range(0..KEYWORDS.len())]);
    }
    out.join(" ")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scour=info".parse()?),
        )
        .init();

    let args = Args::parse();

    if args.output.exists() {
        std::fs::remove_file(&args.output).context("Failed to remove existing database")?;
    }
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    println!("Generating performance test database...");
    println!("Output: {}", args.output.display());

    let db = Arc::new(Database::open(&args.output).context("Failed to create database")?);
    let config = CollectionConfig::new("articles")
        .field(Field::string("title"))
        .field(Field::string("body"))
        .field(Field::int32("popularity"))
        .field(Field::int32("recency"))
        .rank_field("popularity")
        .rank_field("recency");
    let collection = Collection::open(config, db.clone()).context("Failed to open collection")?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut total_size = 0usize;

    for i in 0..args.docs {
        let doc = json!({
            "id": format!("doc-{i}"),
            "title": generate_text(&mut rng, TITLE_WORDS),
            "body": generate_text(&mut rng, BODY_WORDS),
            "popularity": rng.gen_range(0..10_000),
            "recency": rng.gen_range(0..365),
        })
        .to_string();
        total_size += doc.len();
        collection.add(&doc).with_context(|| format!("Failed to add document {i}"))?;

        if (i + 1) % REPORT_EVERY == 0 {
            println!("  Generated {}/{} documents...", i + 1, args.docs);
        }
    }

    println!();
    println!("Database created: {}", args.output.display());
    println!("  Documents: {}", collection.num_documents());
    println!("  Total JSON size: {:.2} MB", total_size as f64 / 1024.0 / 1024.0);
    println!("  Stored keys: {}", db.count()?);
    println!("  Database size: {:.2} MB", db.database_size()? as f64 / 1024.0 / 1024.0);
    Ok(())
}
