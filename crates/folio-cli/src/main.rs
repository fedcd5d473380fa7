//! Folio CLI - question answering over your documents.
//!
//! # Usage
//!
//! ```bash
//! # Load documents
//! folio ingest book.pdf novel.fb2 notes.txt
//!
//! # Ask a question (retrieval + generated answer with sources)
//! folio ask "Who keeps the lighthouse?"
//!
//! # Retrieval only
//! folio search "lighthouse keeper" -n 5 --json
//!
//! # Interactive session
//! folio chat
//!
//! # Maintenance
//! folio status
//! folio reindex
//! folio reset
//! ```
//!
//! Remote providers need `HUGGINGFACE_API_KEY` and `OPENROUTER_API_KEY`;
//! `--offline` swaps in deterministic local providers instead.

mod config;
mod output;
mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{CliConfig, DATA_DIR_ENV, HUGGINGFACE_KEY_ENV, OPENROUTER_KEY_ENV};
use folio_core::providers::{HuggingFaceEmbedder, OpenRouterGenerator};
use folio_core::testing::{ExtractiveGenerator, HashingEmbedder};
use folio_core::{EmbeddingProvider, EngineError, GenerationProvider, KnowledgeBase};
use session::{Action, Session};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Folio document question answering.
///
/// Loads PDF, FB2 and TXT documents into a local hybrid (semantic + keyword)
/// index and answers questions from them with cited sources.
#[derive(Parser)]
#[command(name = "folio", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Custom data directory (default: platform standard location)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (default: <config dir>/folio.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use local deterministic providers instead of remote APIs
    #[arg(long, global = true)]
    offline: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Parse, chunk and index documents
    Ingest {
        /// PDF, FB2 or TXT files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Answer a question from the loaded documents
    Ask { question: String },
    /// Show the best matching fragments without generating an answer
    Search {
        query: String,
        /// Maximum number of fragments to return
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Delete every loaded document
    Reset,
    /// Re-embed every fragment into a fresh embedding index
    Reindex,
    /// Show corpus statistics
    Status,
    /// Interactive session
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let file_config = CliConfig::load(cli.config.as_deref())?;
    let data_dir = config::resolve_data_dir(
        cli.data_dir.as_ref(),
        std::env::var(DATA_DIR_ENV).ok(),
        file_config.data_dir.as_ref(),
    )?;
    let engine_config = file_config.engine_config(data_dir);

    let (embedder, generator) = build_providers(&file_config, cli.offline, &engine_config)?;
    info!("Opening knowledge base at {}", engine_config.data_dir.display());
    let kb = KnowledgeBase::open(engine_config, embedder, generator)
        .await
        .context("Failed to open knowledge base")?;

    match cli.command {
        Command::Ingest { files } => {
            for path in &files {
                let name = path.display().to_string();
                let report = ingest_path(&kb, path)
                    .await
                    .with_context(|| format!("Failed to load {}", name))?;
                let line = if cli.json {
                    output::format_ingest_json(&name, &report)
                } else {
                    output::format_ingest_human(&name, &report)
                };
                println!("{}", line);
            }
        }
        Command::Ask { question } => {
            let answer = kb.answer_query(&question).await.map_err(report(cli.json))?;
            let text = if cli.json {
                output::format_answer_json(&question, &answer, kb.config().lexical_language)
            } else {
                output::format_answer_human(&answer)
            };
            println!("{}", text);
        }
        Command::Search { query, limit } => {
            let k = limit.unwrap_or(kb.config().top_k);
            let results = kb.retrieve(&query, k).await.map_err(report(cli.json))?;
            let text = if cli.json {
                output::format_search_json(&query, &results, kb.config().lexical_language)
            } else {
                output::format_search_human(&query, &results, kb.config().lexical_language)
            };
            println!("{}", text);
        }
        Command::Reset => {
            kb.reset_corpus().await.map_err(report(cli.json))?;
            if !cli.json {
                println!("All documents deleted.");
            }
        }
        Command::Reindex => {
            let count = kb.reindex().await.map_err(report(cli.json))?;
            if !cli.json {
                println!("Re-embedded {} fragments.", count);
            }
        }
        Command::Status => {
            let status = kb.status().await;
            let text = if cli.json {
                output::format_status_json(&status)
            } else {
                output::format_status_human(&status)
            };
            println!("{}", text);
        }
        Command::Chat => run_chat(&kb).await?,
    }

    Ok(())
}

/// Prints an engine error in the requested format, then hands it to anyhow
/// so the process exits non-zero.
fn report(json: bool) -> impl Fn(EngineError) -> anyhow::Error {
    move |err| {
        if json {
            println!("{}", output::format_error_json(&err));
        } else {
            eprintln!("{}", output::format_error_human(&err));
        }
        anyhow::Error::new(err)
    }
}

fn build_providers(
    file_config: &CliConfig,
    offline: bool,
    engine_config: &folio_core::EngineConfig,
) -> Result<(Arc<dyn EmbeddingProvider>, Arc<dyn GenerationProvider>)> {
    if offline {
        info!("Using offline providers");
        return Ok((
            Arc::new(HashingEmbedder::default()),
            Arc::new(ExtractiveGenerator),
        ));
    }

    let embedder = HuggingFaceEmbedder::with_options(
        &config::api_key(HUGGINGFACE_KEY_ENV)?,
        &file_config.embedding.base_url,
        &file_config.embedding.model,
        file_config.embedding.batch_size,
        engine_config.provider_timeout,
    )
    .context("Failed to create embedding client")?;
    let generator = OpenRouterGenerator::with_options(
        &config::api_key(OPENROUTER_KEY_ENV)?,
        &file_config.generation.base_url,
        &file_config.generation.model,
        engine_config.provider_timeout,
    )
    .context("Failed to create generation client")?;

    Ok((Arc::new(embedder), Arc::new(generator)))
}

async fn ingest_path(kb: &KnowledgeBase, path: &Path) -> Result<folio_core::IngestReport> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let report = kb.ingest_file(&path.to_string_lossy(), &bytes).await?;
    Ok(report)
}

/// Runs the interactive session on stdin/stdout until `/quit` or EOF.
async fn run_chat(kb: &KnowledgeBase) -> Result<()> {
    let mut session = Session::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", session::GREETING);
    loop {
        print!("{}", session.prompt());
        std::io::stdout().flush().context("Failed to write prompt")?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };

        match session.handle(&line) {
            Action::Reply(text) => {
                if !text.is_empty() {
                    println!("{}", text);
                }
            }
            Action::Ingest(path) => {
                println!("Loading {}...", path.display());
                match ingest_path(kb, &path).await {
                    Ok(report) => println!(
                        "{}",
                        output::format_ingest_human(&path.display().to_string(), &report)
                    ),
                    Err(err) => match err.downcast_ref::<EngineError>() {
                        Some(engine_err) => println!("{}", output::format_error_human(engine_err)),
                        None => println!("{:#}", err),
                    },
                }
            }
            Action::Answer(question) => {
                println!("Searching...");
                match kb.answer_query(&question).await {
                    Ok(answer) => println!("{}", output::format_answer_human(&answer)),
                    Err(err) => println!("{}", output::format_error_human(&err)),
                }
            }
            Action::Reset => match kb.reset_corpus().await {
                Ok(()) => println!("All documents deleted."),
                Err(err) => println!("{}", output::format_error_human(&err)),
            },
            Action::Status => println!("{}", output::format_status_human(&kb.status().await)),
            Action::Quit => break,
        }
    }

    Ok(())
}
