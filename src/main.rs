use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use docsync::config::Config;
use docsync::embedding::HttpEmbeddingClient;
use docsync::extract::DocumentExtractor;
use docsync::ledger::IngestionLedger;
use docsync::logging;
use docsync::pipeline::{CancelFlag, ChunkPolicy, IngestionOptions, IngestionPipeline};
use docsync::source::HttpFileSource;
use docsync::store::QdrantIndex;

/// Mirror a remote document collection into a vector index.
#[derive(Debug, Parser)]
#[command(name = "docsync", version, about)]
struct Cli {
    /// Override the remote collection identifier from the environment.
    #[arg(long)]
    collection: Option<String>,

    /// Override the worker concurrency bound.
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    logging::init_tracing();

    let chunk = ChunkPolicy::new(config.chunk_size, config.chunk_overlap)
        .context("invalid chunking configuration")?;
    let source = Arc::new(
        HttpFileSource::new(
            &config.source_base_url,
            config.source_api_token.as_deref(),
            config.request_timeout,
        )
        .context("failed to build file store client")?,
    );
    let extractor = Arc::new(DocumentExtractor::new(config.ocr_command.clone()));
    let embedder = Arc::new(
        HttpEmbeddingClient::new(
            config.embedding_endpoint(),
            config.embedding_api_key.as_deref(),
            &config.embedding_model,
            config.embedding_dimension,
            config.request_timeout,
        )
        .context("failed to build embedding client")?,
    );
    let index = Arc::new(
        QdrantIndex::new(
            &config.qdrant_url,
            config.qdrant_api_key.as_deref(),
            &config.qdrant_collection_name,
            config.embedding_dimension as u64,
            config.request_timeout,
        )
        .context("failed to build vector store client")?,
    );
    let ledger =
        Arc::new(IngestionLedger::open(&config.ledger_path).context("failed to open ledger")?);

    let options = IngestionOptions {
        collection_id: cli
            .collection
            .unwrap_or_else(|| config.source_collection_id.clone()),
        chunk,
        call_timeout: config.request_timeout,
        max_retries: config.max_retries,
        concurrency: cli.concurrency.unwrap_or(config.ingest_concurrency),
    };
    let pipeline = IngestionPipeline::new(source, extractor, embedder, index, ledger, options);

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received; finishing in-flight files");
                cancel.request();
            }
        });
    }

    let summary = pipeline.run(&cancel).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
