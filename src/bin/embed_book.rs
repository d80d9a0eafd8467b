use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use book_rag::indexer::chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use book_rag::indexer::EmbeddingPipeline;
use book_rag::rag::embeddings::EmbeddingClient;
use book_rag::rag::vector_store::VectorStore;

#[derive(Parser, Debug)]
#[command(name = "embed-book")]
#[command(about = "Chunk and embed the book's markdown content into the vector store")]
struct Args {
    /// Directory with the book's markdown files
    #[arg(short, long)]
    dir: PathBuf,

    /// Qdrant server URL
    #[arg(long, env = "QDRANT_URL")]
    qdrant_url: String,

    /// Qdrant API key
    #[arg(long, env = "QDRANT_API_KEY")]
    qdrant_api_key: Option<String>,

    /// Cohere API key
    #[arg(long, env = "COHERE_API_KEY")]
    cohere_api_key: String,

    /// Embedding model
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "embed-multilingual-v3.0")]
    embedding_model: String,

    /// Qdrant collection name
    #[arg(long, default_value = "book_content")]
    collection: String,

    /// Maximum chunk size in characters
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Overlap between chunks in characters
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    if !args.dir.exists() {
        anyhow::bail!("Directory does not exist: {}", args.dir.display());
    }

    println!("Connecting to Qdrant at {}...", args.qdrant_url);
    let vector_store = Arc::new(
        VectorStore::connect(
            &args.qdrant_url,
            args.qdrant_api_key.as_deref(),
            &args.collection,
        )
        .await?,
    );

    let embeddings = Arc::new(EmbeddingClient::new(
        args.cohere_api_key.clone(),
        args.embedding_model.clone(),
    )?);
    let pipeline = EmbeddingPipeline::new(embeddings, vector_store);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Indexing {}", args.dir.display()));

    let summary = pipeline
        .run(&args.dir, args.chunk_size, args.chunk_overlap)
        .await?;

    spinner.finish_with_message("done");

    println!("\nIndexing complete!");
    println!("  Files scanned:    {}", summary.total_files);
    println!("  Total chunks:     {}", summary.total_chunks);
    println!("  Embedded:         {}", summary.embedded);
    println!("  Unchanged:        {}", summary.skipped);
    println!("  Removed (stale):  {}", summary.deleted);
    println!("  Collection:       {}", args.collection);

    if !summary.failed_files.is_empty() {
        println!("\nFailed files:");
        for file in &summary.failed_files {
            println!("  {}", file);
        }
    }

    Ok(())
}
