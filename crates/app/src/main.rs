mod http;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_chat_core::ingest::display_name;
use pdf_chat_core::models::UNKNOWN_FILENAME;
use pdf_chat_core::{
    BackendCapabilities, ChatHandler, ChatService, ChunkingConfig, LocalEmbedder,
    LocalEmbedderKind, ProviderConfig, StoreConfig, VectorStore, DEFAULT_TOP_K,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the metadata file and the vector index file.
    #[arg(long, global = true, env = "PDF_CHAT_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Use exhaustive search even when the accelerated index is available.
    #[arg(long, global = true, default_value_t = false)]
    brute_force: bool,

    /// Local embedder used when no remote provider is configured or it fails (hash, ngram).
    #[arg(long, global = true, default_value = "hash")]
    local_embedder: LocalEmbedderKind,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8000)]
        port: u16,
        /// Chunks retrieved per chat message.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Ingest one PDF or every PDF under a folder.
    Ingest {
        #[arg(long, conflicts_with = "folder", required_unless_present = "folder")]
        file: Option<PathBuf>,
        /// Folder searched recursively for PDFs.
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Ask a question against the stored documents.
    Ask {
        #[arg(long)]
        message: String,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// List stored documents.
    Documents,
    /// Print record counts and the active index backend as JSON.
    Status,
    /// Remove every stored document and both data files.
    Clear,
}

impl Command {
    /// Whether the command searches or appends, and so needs the vector index to cover the
    /// whole ledger.
    fn needs_index(&self) -> bool {
        matches!(
            self,
            Command::Serve { .. } | Command::Ingest { .. } | Command::Ask { .. }
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        data_dir = %cli.data_dir.display(),
        "pdf-chat boot"
    );

    let capabilities = if cli.brute_force {
        BackendCapabilities::brute_force_only()
    } else {
        BackendCapabilities::detect()
    };
    let store = VectorStore::open(StoreConfig::in_dir(&cli.data_dir), capabilities);
    let handler = ChatHandler::from_config(
        &ProviderConfig::from_env(),
        LocalEmbedder::from(cli.local_embedder),
    );
    let service = Arc::new(ChatService::new(store, handler, ChunkingConfig::default()));

    if cli.command.needs_index()
        && service
            .reindex_if_needed()
            .await
            .context("rebuilding the vector index from stored metadata")?
    {
        info!("vector index rebuilt at startup");
    }

    match cli.command {
        Command::Serve { host, port, top_k } => {
            let addr: SocketAddr = format!("{host}:{port}")
                .parse()
                .with_context(|| format!("invalid listen address {host}:{port}"))?;
            http::serve(addr, http::AppState { service, top_k }).await?;
        }
        Command::Ingest { file, folder } => {
            if let Some(path) = file {
                let filename = display_name(&path)?;
                let receipt = service.upload(&path, &filename).await?;
                println!(
                    "{filename}: document_id={} chunks={}",
                    receipt.document_id, receipt.chunks_count
                );
            } else if let Some(folder) = folder {
                let report = service.ingest_folder(&folder).await?;
                for ingested in &report.ingested {
                    println!(
                        "{}: document_id={} chunks={}",
                        ingested.path.display(),
                        ingested.document_id,
                        ingested.chunks_count
                    );
                }
                if !report.skipped_files.is_empty() {
                    warn!(
                        skipped = report.skipped_files.len(),
                        folder = %folder.display(),
                        "some pdfs were skipped"
                    );
                    for skipped in &report.skipped_files {
                        println!("skipped {}: {}", skipped.path.display(), skipped.reason);
                    }
                }
                if report.ingested.is_empty() {
                    bail!("no pdf under {} could be ingested", folder.display());
                }
            }
        }
        Command::Ask { message, top_k } => {
            let reply = service.chat(&message, top_k).await?;
            println!("{}", reply.response);
            for hit in &reply.sources {
                println!(
                    "[{}] score={:.4} file={}",
                    hit.record.id,
                    hit.similarity_score,
                    hit.record.filename().unwrap_or(UNKNOWN_FILENAME)
                );
            }
        }
        Command::Documents => {
            let documents = service.documents().await;
            if documents.is_empty() {
                println!("no documents");
            }
            for document in documents {
                println!(
                    "{} {} chunks={}",
                    document.id, document.filename, document.chunks_count
                );
            }
        }
        Command::Status => {
            let status = service.status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Clear => {
            service.clear().await;
            println!("All documents cleared");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(args: &[&str]) -> Command {
        Cli::try_parse_from(args).expect("valid arguments").command
    }

    #[test]
    fn only_searching_and_ingesting_commands_rebuild_the_index() {
        assert!(command(&["pdf-chat", "serve"]).needs_index());
        assert!(command(&["pdf-chat", "ask", "--message", "hi"]).needs_index());
        assert!(command(&["pdf-chat", "ingest", "--file", "a.pdf"]).needs_index());

        assert!(!command(&["pdf-chat", "documents"]).needs_index());
        assert!(!command(&["pdf-chat", "status"]).needs_index());
        assert!(!command(&["pdf-chat", "clear"]).needs_index());
    }

    #[test]
    fn global_flags_parse_after_the_subcommand() {
        let cli = Cli::try_parse_from(["pdf-chat", "clear", "--brute-force", "--data-dir", "/tmp/x"])
            .expect("valid arguments");
        assert!(cli.brute_force);
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/x"));
        assert_eq!(cli.local_embedder, LocalEmbedderKind::Hash);
    }
}
