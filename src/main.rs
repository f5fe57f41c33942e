use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use berkshire_rag::core::config::{AppPaths, ConfigService};
use berkshire_rag::core::logging;
use berkshire_rag::rag::{IngestionOptions, IngestionReport, ProgressEvent};
use berkshire_rag::state::AppState;
use berkshire_rag::tools::SearchOutput;

#[derive(Parser, Debug)]
#[command(
    name = "berkshire-rag",
    version,
    about = "Ingest Berkshire Hathaway shareholder letters and ask questions about them"
)]
struct Cli {
    /// Path to config.yml (defaults to BERKSHIRE_CONFIG_PATH or the data dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, chunk, embed and store every letter in the source directory
    Ingest {
        /// Directory holding the PDF letters
        #[arg(long)]
        source: Option<PathBuf>,
        /// Chunks embedded and stored per transaction
        #[arg(long)]
        batch_size: Option<usize>,
        /// Print the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Semantic search over the ingested letters
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Ask the agent one question
    Ask {
        question: String,
        /// Continue an existing conversation
        #[arg(long)]
        session: Option<String>,
    },
    /// Interactive conversation with the agent
    Chat {
        #[arg(long)]
        session: Option<String>,
    },
    /// Drop all stored vectors and rebind the index to the configured embedding model
    Reindex {
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Show index statistics
    Stats,
    /// Print the effective configuration with secrets redacted
    Config,
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);

    let config_service = ConfigService::new(paths.clone()).with_config_path(cli.config.clone());

    if let Command::Config = cli.command {
        let document = config_service.load_document()?;
        let redacted = config_service.redact_sensitive_values(&document);
        println!("# {}", config_service.config_path().display());
        print!("{}", serde_yaml::to_string(&redacted)?);
        return Ok(());
    }

    let state = AppState::initialize(&config_service)
        .await
        .context("start-up failed")?;

    match cli.command {
        Command::Ingest {
            source,
            batch_size,
            json,
        } => run_ingest(&state, source, batch_size, json).await,
        Command::Search { query, top_k, json } => {
            let output = state.retrieval.search(&query, top_k).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_search(&output);
            }
            Ok(())
        }
        Command::Ask { question, session } => {
            let reply = state.agent.respond(session.as_deref(), &question).await?;
            println!("{}", reply.content);
            eprintln!("(session {})", reply.session_id);
            Ok(())
        }
        Command::Chat { session } => run_chat(&state, session).await,
        Command::Reindex { yes } => {
            if !yes {
                bail!("reindex deletes every stored vector; re-run with --yes to confirm");
            }
            let index = &state.config.vector_store.index_name;
            state
                .vector_store
                .create_index(index, state.llm.dimension())
                .await?;
            state
                .vector_store
                .reindex(index, state.llm.embedding_model())
                .await?;
            println!(
                "Index '{}' cleared and bound to '{}'. Run `ingest` to repopulate it.",
                index,
                state.llm.embedding_model()
            );
            Ok(())
        }
        Command::Stats => {
            let indexes = state.vector_store.describe().await?;
            if indexes.is_empty() {
                println!("No vector indexes yet. Run `ingest` first.");
            }
            for info in indexes {
                println!(
                    "{}: {} records, dimension {}, model {}",
                    info.name,
                    info.records,
                    info.dimension,
                    info.embedding_model.as_deref().unwrap_or("(unbound)")
                );
            }
            Ok(())
        }
        Command::Serve { port } => {
            let port = port.unwrap_or(state.config.server.port);
            let host = state.config.server.host.clone();
            berkshire_rag::server::serve(state, &host, port).await?;
            Ok(())
        }
        Command::Config => Ok(()),
    }
}

async fn run_ingest(
    state: &Arc<AppState>,
    source: Option<PathBuf>,
    batch_size: Option<usize>,
    json: bool,
) -> Result<()> {
    let source = state
        .paths
        .resolve(source.as_deref().unwrap_or(state.config.source.dir.as_path()));
    let mut options = IngestionOptions::from_config(&state.config);
    if let Some(size) = batch_size {
        options.batch_size = size.max(1);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let pipeline = state.ingestion_pipeline(options).with_progress(tx);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            render_progress(&event);
        }
    });

    let result = tokio::select! {
        result = pipeline.run(&source) => result,
        _ = tokio::signal::ctrl_c() => {
            bail!("ingestion cancelled; batches stored so far remain committed");
        }
    };
    drop(pipeline);
    let _ = printer.await;

    let report = result.with_context(|| format!("ingestion of {} failed", source.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.is_total_failure() {
        bail!("nothing was ingested");
    }
    Ok(())
}

async fn run_chat(state: &Arc<AppState>, session: Option<String>) -> Result<()> {
    let mut session = session;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Ask about the letters. Type `exit` to quit.");
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        match state.agent.respond(session.as_deref(), line).await {
            Ok(reply) => {
                println!("\n{}\n", reply.content);
                session = Some(reply.session_id);
            }
            Err(err) => eprintln!("error: {}", err),
        }
    }

    if let Some(id) = session {
        eprintln!("(session {})", id);
    }
    Ok(())
}

fn render_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::Discovered { documents } => eprintln!("Found {} document(s)", documents),
        ProgressEvent::DocumentChunked { file, chunks } => {
            eprintln!("  extracted {} ({} chunks)", file, chunks)
        }
        ProgressEvent::DocumentFailed { file, error } => eprintln!("  skipped {}: {}", file, error),
        ProgressEvent::BatchStored { batch, records } => {
            eprintln!("  stored batch {} ({} records)", batch, records)
        }
        ProgressEvent::BatchFailed { batch, error } => {
            eprintln!("  batch {} failed: {}", batch, error)
        }
    }
}

fn print_report(report: &IngestionReport) {
    println!(
        "Documents: {} processed, {} failed",
        report.documents_processed,
        report.documents_failed.len()
    );
    println!(
        "Chunks: {} created, {} embedded, {} stored in {} batch(es)",
        report.chunks_created, report.chunks_embedded, report.chunks_stored, report.batches_stored
    );
    for failed in &report.documents_failed {
        println!("  failed document {}: {}", failed.file, failed.error);
    }
    for failed in &report.batches_failed {
        println!("  failed batch {}: {}", failed.batch, failed.error);
    }
    for (year, count) in &report.per_year_counts {
        println!("  {}: {} chunks", year, count);
    }
}

fn print_search(output: &SearchOutput) {
    if output.results.is_empty() {
        println!("No matching passages.");
        return;
    }
    for (i, result) in output.results.iter().enumerate() {
        println!(
            "[{}] {} ({}) similarity {:.3}\n{}\n",
            i + 1,
            result.year,
            result.source,
            result.similarity,
            result.text
        );
    }
}
