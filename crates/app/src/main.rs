use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use soil_report_core::{
    build_or_update, ingest_reports_best_effort, load_report, open_index, AnalysisOrchestrator,
    CharacterNgramEmbedder, ChunkingConfig, EmbeddingProvider, GeminiChat, GeminiEmbeddings,
    IndexError, ProviderConfig, Retriever, VectorIndex,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "soil-report", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    provider: ProviderArgs,

    /// Directory holding the persistent vector index
    #[arg(long, global = true, default_value = "chroma_db")]
    store_dir: PathBuf,
}

#[derive(Args)]
struct ProviderArgs {
    /// API key for the hosted embedding and chat models
    #[arg(long, global = true, env = "GOOGLE_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    /// Base URL of the Generative Language API
    #[arg(long, global = true, default_value = soil_report_core::config::DEFAULT_API_BASE)]
    api_base: String,

    /// Embedding model name
    #[arg(long, global = true, default_value = soil_report_core::config::DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Output size requested from the embedding model
    #[arg(long, global = true, default_value_t = soil_report_core::GEMINI_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Chat model name
    #[arg(long, global = true, default_value = soil_report_core::config::DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Sampling temperature for the analysis
    #[arg(long, global = true, default_value = "0.3")]
    temperature: f32,

    /// HTTP timeout for provider requests, in seconds
    #[arg(long, global = true, default_value = "60")]
    request_timeout_secs: u64,

    /// Use the local character n-gram embedder instead of the hosted one
    #[arg(long, global = true, default_value_t = false)]
    offline_embeddings: bool,
}

impl ProviderArgs {
    fn config(&self) -> ProviderConfig {
        ProviderConfig {
            api_key: self.api_key.clone(),
            api_base: self.api_base.clone(),
            embedding_model: self.embedding_model.clone(),
            embedding_dimensions: self.embedding_dimensions,
            chat_model: self.chat_model.clone(),
            temperature: self.temperature,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    fn embeddings(&self, config: &ProviderConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
        if self.offline_embeddings {
            return Ok(Arc::new(CharacterNgramEmbedder::default()));
        }
        Ok(Arc::new(GeminiEmbeddings::new(config)?))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the text extracted from a report.
    Extract {
        /// Soil test report (PDF).
        #[arg(long)]
        pdf: PathBuf,
        /// Truncate the preview to this many characters.
        #[arg(long)]
        max_chars: Option<usize>,
    },
    /// Chunk and embed one report, or every report under a folder, into the index.
    Index {
        /// PDF file or folder searched recursively.
        #[arg(long)]
        pdf: PathBuf,
    },
    /// Show the indexed chunks closest to a query.
    Retrieve {
        /// Search query
        #[arg(long)]
        query: String,
        /// Number of chunks to return.
        #[arg(long, default_value = "6")]
        k: usize,
    },
    /// Analyze a report with retrieved context.
    Analyze {
        /// Soil test report (PDF).
        #[arg(long)]
        pdf: PathBuf,
        /// Index the report before analyzing it.
        #[arg(long, default_value_t = false)]
        index: bool,
        /// Print the result as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            warn!(%error, "could not load .env");
        }
    }

    let cli = Cli::parse();
    let config = cli.provider.config();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        store_dir = %cli.store_dir.display(),
        "soil-report boot"
    );

    match cli.command {
        Command::Extract { pdf, max_chars } => {
            let report = load_report(&pdf)?;
            let text = report.full_text();
            let preview = match max_chars {
                Some(limit) => text.chars().take(limit).collect::<String>(),
                None => text,
            };

            println!("source: {} ({} pages)", report.source, report.pages.len());
            println!("{preview}");
        }
        Command::Index { pdf } => {
            let embeddings = cli.provider.embeddings(&config)?;
            let count = index_path(&pdf, &cli.store_dir, embeddings).await?;
            println!(
                "{} chunks indexed into {} at {}",
                count,
                cli.store_dir.display(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Retrieve { query, k } => {
            let embeddings = cli.provider.embeddings(&config)?;
            let retriever = existing_retriever(&cli.store_dir, embeddings)?.with_top_k(k);
            let hits = retriever.retrieve(&query).await?;

            println!("query: {query}");
            for hit in hits {
                println!("[{}, page {}] score={:.4}", hit.source(), hit.page(), hit.score);
                println!("  {}", hit.chunk.content.trim());
            }
        }
        Command::Analyze { pdf, index, json } => {
            let embeddings = cli.provider.embeddings(&config)?;
            let report = load_report(&pdf)?;

            let retriever = if index {
                let chunks = report.chunks(&ChunkingConfig::default())?;
                let (_, retriever) = build_or_update(&chunks, &cli.store_dir, embeddings).await?;
                Some(retriever)
            } else {
                match open_index(&cli.store_dir, embeddings) {
                    Ok((_, retriever)) => Some(retriever),
                    Err(IndexError::NotFound(location)) => {
                        warn!(%location, "no index yet; run `index` first or pass --index");
                        None
                    }
                    Err(error) => return Err(error.into()),
                }
            };

            let orchestrator = AnalysisOrchestrator::new(GeminiChat::new(&config)?);
            let result = orchestrator
                .analyze_with_retriever(&report.full_text(), retriever.as_ref())
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            println!("Soil quality:\n{}\n", result.analysis.quality);
            println!(
                "Recommended crops:\n{}\n",
                result.analysis.recommended_crops.join(", ")
            );
            println!("Suggestions:\n{}\n", result.analysis.suggestions);
            println!("Retrieved context (top matches):");
            for source in result.context_sources {
                println!("- {}, page {}", source.source, source.page);
            }
        }
    }

    Ok(())
}

async fn index_path(
    path: &Path,
    store_dir: &Path,
    embeddings: Arc<dyn EmbeddingProvider>,
) -> anyhow::Result<usize> {
    let ingestion = ingest_reports_best_effort(path, &ChunkingConfig::default())?;

    if !ingestion.skipped_files.is_empty() {
        warn!(
            "skipped_files={} for path={}",
            ingestion.skipped_files.len(),
            path.display()
        );
        for skipped in &ingestion.skipped_files {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
        }
    }

    if ingestion.reports == 0 {
        anyhow::bail!("no readable reports under {}", path.display());
    }

    info!(
        path = %path.display(),
        reports = ingestion.reports,
        chunk_count = ingestion.chunks.len(),
        "indexing chunks"
    );

    let (index, _) = build_or_update(&ingestion.chunks, store_dir, embeddings).await?;
    info!(total_entries = index.len(), "index ready");

    Ok(ingestion.chunks.len())
}

fn existing_retriever(
    store_dir: &Path,
    embeddings: Arc<dyn EmbeddingProvider>,
) -> anyhow::Result<Retriever> {
    match open_index(store_dir, embeddings) {
        Ok((_, retriever)) => Ok(retriever),
        Err(IndexError::NotFound(location)) => {
            anyhow::bail!("no index at {location}; run `soil-report index --pdf <file>` first")
        }
        Err(error) => Err(error.into()),
    }
}
