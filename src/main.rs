use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use sift_core::{ChunkingStrategy, OutputFormat, SearchResponse, SiftConfig};
use sift_index::chunker::Chunker;
use sift_index::embedding::provider_from_config;
use sift_index::ingest::Ingestor;
use sift_index::persist::ArtifactPaths;
use sift_index::search::{Retriever, SearchRequest};
use sift_index::store::{StoreStats, VectorStore};

const CONFIG_FILE: &str = ".sift.toml";

#[derive(Parser)]
#[command(
    name = "sift",
    version,
    about = "Local semantic search over your documents",
    long_about = "Sift splits markdown and text files into chunks, embeds them with a local\n\
                   or hosted embedding model, and answers natural-language queries with exact\n\
                   nearest-neighbour search.\n\n\
                   Examples:\n  \
                     sift init                                Write a default .sift.toml\n  \
                     sift ingest docs/                        Index every .md/.txt under docs/\n  \
                     sift ingest notes.md --strategy headings One chunk per heading\n  \
                     sift search 'how do I rotate keys'       Query the index\n  \
                     sift search 'setup' --filter file_origin=README.md\n  \
                     sift stats                               Show index size and dimension"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .sift.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create a default .sift.toml in the current directory
    Init,
    /// Chunk, embed, and store documents
    #[command(long_about = "Chunk, embed, and store documents.\n\n\
        PATH may be a single .md/.markdown/.txt file or a directory, which is walked\n\
        recursively (respecting .gitignore). The store is saved once at the end.\n\n\
        Examples:\n  sift ingest docs/\n  sift ingest guide.md --strategy headings")]
    Ingest {
        /// File or directory to ingest
        path: PathBuf,

        /// Chunking strategy: length or headings (default: from config)
        #[arg(long)]
        strategy: Option<ChunkingStrategy>,

        /// Chunk size in characters (default: from config)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared by consecutive chunks (default: from config)
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },
    /// Query the index
    #[command(long_about = "Query the index with natural language.\n\n\
        Results are ordered nearest first. A result's score is 1 / (1 + distance),\n\
        so 1.0 is an exact match. Filters require metadata equality and may repeat.\n\n\
        Examples:\n  sift search 'error handling'\n  \
        sift search 'install' --top-k 10 --threshold 0.2 --filter file_origin=INSTALL.md")]
    Search {
        /// Query text
        query: String,

        /// Maximum number of results (default: from config)
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum similarity score (default: from config)
        #[arg(long)]
        threshold: Option<f32>,

        /// Metadata filter as key=value (repeatable)
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
    },
    /// Show index size, dimension, and artifact locations
    Stats,
}

const DEFAULT_CONFIG: &str = r#"# Sift configuration
# See https://github.com/Meru143/sift for documentation

[embedding]
# provider = "ollama"               # "ollama" or "openai"
# model = "mistral"                 # e.g. "nomic-embed-text", "text-embedding-3-small"
# base_url = "http://localhost:11434"
# api_key = "..."                   # openai only; falls back to OPENAI_API_KEY
# timeout_secs = 30

[ingest]
# chunking_strategy = "length"      # "length" or "headings" (markdown only)
# chunk_size = 1000                 # characters, at least 100
# chunk_overlap = 200               # must be smaller than chunk_size

[search]
# top_k = 5
# score_threshold = 0.0             # keep results with score >= threshold

[store]
# index_path = ".sift/vector_store.idx"
# metadata_path = ".sift/metadata.db"
"#;

fn parse_filter(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("filter key is empty in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load the config and the directory its store paths are relative to.
fn load_config(explicit: Option<&Path>) -> Result<(SiftConfig, PathBuf)> {
    if let Some(path) = explicit {
        let config = SiftConfig::from_file(path)?;
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        return Ok((config, root));
    }
    let default_path = Path::new(CONFIG_FILE);
    let config = if default_path.exists() {
        SiftConfig::from_file(default_path)?
    } else {
        SiftConfig::default()
    };
    Ok((config, PathBuf::new()))
}

fn spinner(message: &'static str) -> Option<indicatif::ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_style(
        indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Some(pb)
}

fn print_results(response: &SearchResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(response).into_diagnostic()?
            );
        }
        OutputFormat::Markdown => {
            if response.results.is_empty() {
                println!("No results found.");
                return Ok(());
            }
            println!("# Search Results\n");
            for (i, r) in response.results.iter().enumerate() {
                let origin = r.document_id.as_deref().unwrap_or("unknown");
                println!("## {}. {} (score: {:.3})\n", i + 1, origin, r.score);
                println!("{}\n", r.text);
            }
        }
        OutputFormat::Text => {
            if response.results.is_empty() {
                println!("No results found.");
                return Ok(());
            }
            for (i, r) in response.results.iter().enumerate() {
                let origin = r.document_id.as_deref().unwrap_or("unknown");
                println!(
                    "{}. {} [id {}] score {:.3} (distance {:.3})",
                    i + 1,
                    origin,
                    r.id,
                    r.score,
                    r.distance
                );
                for line in r.text.lines().take(6) {
                    println!("   {line}");
                }
                println!();
            }
        }
    }
    Ok(())
}

fn print_stats(stats: &StoreStats, format: OutputFormat) -> Result<()> {
    let dimension = stats
        .dimension
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".into());
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(stats).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("| Field | Value |");
            println!("|-------|-------|");
            println!("| Vectors | {} |", stats.vectors);
            println!("| Dimension | {dimension} |");
            println!("| Index | `{}` |", stats.index_path);
            println!("| Metadata | `{}` |", stats.metadata_path);
        }
        OutputFormat::Text => {
            println!("Vectors:   {}", stats.vectors);
            println!("Dimension: {dimension}");
            println!("Index:     {}", stats.index_path);
            println!("Metadata:  {}", stats.metadata_path);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Command::Init = cli.command {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            miette::bail!("{CONFIG_FILE} already exists");
        }
        std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
        println!("Created {CONFIG_FILE} with default configuration");
        return Ok(());
    }

    let (mut config, root) = load_config(cli.config.as_deref())?;
    let paths = ArtifactPaths::from_config(&config.store, &root);
    tracing::debug!(format = %cli.format, index = %paths.index.display(), "configuration loaded");

    match cli.command {
        Command::Init => unreachable!(),
        Command::Ingest {
            ref path,
            strategy,
            chunk_size,
            chunk_overlap,
        } => {
            if let Some(strategy) = strategy {
                config.ingest.chunking_strategy = strategy;
            }
            if let Some(size) = chunk_size {
                config.ingest.chunk_size = size;
            }
            if let Some(overlap) = chunk_overlap {
                config.ingest.chunk_overlap = overlap;
            }
            let chunker = Chunker::new(&config.ingest)?;
            let embedder = provider_from_config(&config.embedding)?;
            let store = Arc::new(VectorStore::open(paths)?);
            let ingestor = Ingestor::new(Arc::clone(&store), embedder, chunker);

            let pb = spinner("Ingesting documents...");
            let report = ingestor.ingest_path(path).await.inspect_err(|_| {
                if let Some(pb) = &pb {
                    pb.finish_with_message("Failed");
                }
            })?;
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
                }
                _ => {
                    println!(
                        "Ingested {} chunks from {} documents ({} vectors in store)",
                        report.chunks,
                        report.documents,
                        store.len()
                    );
                    if report.skipped > 0 {
                        eprintln!(
                            "Skipped {} unreadable files (run with --verbose for details)",
                            report.skipped
                        );
                    }
                }
            }
        }
        Command::Search {
            ref query,
            top_k,
            threshold,
            ref filters,
        } => {
            let mut request = SearchRequest::new(query.as_str(), &config.search);
            if let Some(k) = top_k {
                request.top_k = k;
            }
            if let Some(t) = threshold {
                request.score_threshold = t;
            }
            request.metadata_filters = filters.iter().cloned().collect();
            request.validate()?;

            let store = Arc::new(VectorStore::open(paths)?);
            if store.is_empty() {
                eprintln!("The index is empty. Run `sift ingest <PATH>` first.");
                print_results(
                    &SearchResponse {
                        results: Vec::new(),
                        total_results: 0,
                        query_embedding: Vec::new(),
                    },
                    cli.format,
                )?;
                return Ok(());
            }

            let embedder = provider_from_config(&config.embedding)?;
            let retriever = Retriever::new(store, embedder);

            let pb = spinner("Searching...");
            let response = retriever.search(&request).await.inspect_err(|_| {
                if let Some(pb) = &pb {
                    pb.finish_with_message("Failed");
                }
            })?;
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            print_results(&response, cli.format)?;
        }
        Command::Stats => {
            let store = VectorStore::open(paths)?;
            print_stats(&store.stats(), cli.format)?;
        }
    }

    Ok(())
}
