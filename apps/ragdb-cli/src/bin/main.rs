use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ragdb_core::artifacts::{load_chunks, SubjectPaths};
use ragdb_core::config::{Config, Settings};
use ragdb_core::corpus::load_corpus;
use ragdb_embed::default_embedder;
use ragdb_hybrid::{RetrievalPipeline, RetrieverFactory};
use ragdb_vector::write_dense_artifacts;

const EMBED_BATCH_SIZE: usize = 32;

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.is_empty() {
        eprintln!("Usage: {prog} <query|embed|corpus> [args...]");
        std::process::exit(1);
    }
    let cmd = args.remove(0);
    (cmd, args)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn required_arg(args: &[String], i: usize, usage: &str) -> String {
    args.get(i).cloned().unwrap_or_else(|| {
        eprintln!("Usage: ragdb {usage}");
        std::process::exit(1)
    })
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let settings = config.settings()?;
    let base = env::current_dir()?;
    let data_dir = settings.data.data_dir(&base);
    info!(env = config.env_name(), data_dir = %data_dir.display(), "config loaded");

    let (cmd, args) = parse_args();
    match cmd.as_str() {
        "query" => query(&settings, data_dir, &args)?,
        "embed" => {
            let subject = required_arg(&args, 0, "embed <subject>");
            let paths = SubjectPaths::new(&data_dir, &subject);
            let chunks = load_chunks(&paths)?;
            let embedder = default_embedder(&settings.embedding)?;
            let started = Instant::now();
            let written = write_dense_artifacts(&paths, &chunks, embedder.as_ref(), EMBED_BATCH_SIZE)?;
            println!(
                "✅ Embedded {} chunks ({} dims) into {} in {:.1}s",
                written.rows,
                written.dim,
                paths.dir().display(),
                started.elapsed().as_secs_f32()
            );
        }
        "corpus" => {
            let subject = required_arg(&args, 0, "corpus <subject>");
            let registry = settings.data.registry_path(&base);
            let mut out = io::stdout().lock();
            for source in load_corpus(&registry, &subject)? {
                writeln!(out, "{}", serde_json::to_string(&source)?)?;
            }
        }
        _ => {
            eprintln!("Unknown command: {cmd}");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn query(settings: &Settings, data_dir: PathBuf, args: &[String]) -> anyhow::Result<()> {
    let text = required_arg(args, 0, "query \"<text>\" [top_k]");
    let top_k = match args.get(1) {
        Some(raw) => raw.parse::<usize>().with_context(|| format!("top_k must be a positive integer, got '{raw}'"))?,
        None => settings.retrieval.top_k,
    };

    let embedder = default_embedder(&settings.embedding)?;
    let factory = RetrieverFactory::new(data_dir).with_embedder(embedder);
    let pipeline = RetrievalPipeline::new(&factory, &settings.retrieval.strategy)?;
    let results = pipeline.run(&text, top_k)?;

    let mut out = io::stdout().lock();
    for result in &results {
        writeln!(out, "{}", serde_json::to_string(result)?)?;
    }
    Ok(())
}
