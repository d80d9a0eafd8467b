pub mod chunker;
pub mod parser;
pub mod walker;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::rag::embeddings::{EmbeddingClient, MAX_EMBED_BATCH};
use crate::rag::vector_store::{ChunkPoint, VectorStore};
use self::chunker::{chunk_text, validate_chunk};
use self::parser::{parse_markdown_file, BookDocument};
use self::walker::walk_markdown_files;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("embedding regeneration already in progress")]
    Busy,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Outcome of one regeneration run.
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub total_files: usize,
    pub total_chunks: usize,
    /// Chunks embedded and written this run.
    pub embedded: usize,
    /// Chunks left untouched because their stored hash matched.
    pub skipped: usize,
    /// Stale points removed from the store.
    pub deleted: usize,
    pub failed_files: Vec<String>,
}

/// Chunk identity, stable across regenerations so re-embedding updates
/// rather than duplicates vectors.
pub fn point_id(file_path: &str, chunk_index: usize) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}:{}", file_path, chunk_index).as_bytes(),
    )
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// A chunk that needs embedding (new, or content changed).
#[derive(Debug, Clone)]
struct PendingChunk {
    id: Uuid,
    text: String,
    file_path: String,
    section: String,
    chapter: String,
    chunk_index: usize,
    content_hash: String,
}

#[derive(Debug, Default)]
struct IndexPlan {
    pending: Vec<PendingChunk>,
    current_ids: HashSet<String>,
    skipped: usize,
    total_chunks: usize,
}

/// Diff one document's chunks against the stored hashes.
fn plan_document(
    doc: &BookDocument,
    existing: &HashMap<String, String>,
    chunk_size: usize,
    overlap: usize,
    plan: &mut IndexPlan,
) {
    let section = doc.sections.first().cloned().unwrap_or_default();

    for chunk in chunk_text(&doc.content, chunk_size, overlap) {
        if let Err(reason) = validate_chunk(&chunk.text) {
            tracing::warn!(file = %doc.file_path, chunk = chunk.chunk_index, %reason, "skipping invalid chunk");
            continue;
        }

        let id = point_id(&doc.file_path, chunk.chunk_index);
        let hash = content_hash(&chunk.text);
        plan.current_ids.insert(id.to_string());
        plan.total_chunks += 1;

        if existing.get(&id.to_string()) == Some(&hash) {
            plan.skipped += 1;
            continue;
        }

        plan.pending.push(PendingChunk {
            id,
            text: chunk.text,
            file_path: doc.file_path.clone(),
            section: section.clone(),
            chapter: doc.chapter.clone(),
            chunk_index: chunk.chunk_index,
            content_hash: hash,
        });
    }
}

/// Operator-triggered regeneration: walk the source directory, chunk every
/// markdown file, embed what changed, and drop points whose chunk no longer
/// exists.
pub struct EmbeddingPipeline {
    embeddings: Arc<EmbeddingClient>,
    vector_store: Arc<VectorStore>,
    guard: Mutex<()>,
}

impl EmbeddingPipeline {
    pub fn new(embeddings: Arc<EmbeddingClient>, vector_store: Arc<VectorStore>) -> Self {
        Self {
            embeddings,
            vector_store,
            guard: Mutex::new(()),
        }
    }

    pub async fn run(
        &self,
        source_dir: &Path,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<PipelineSummary, PipelineError> {
        let _guard = self.guard.try_lock().map_err(|_| PipelineError::Busy)?;
        self.run_inner(source_dir, chunk_size, overlap)
            .await
            .map_err(PipelineError::Other)
    }

    async fn run_inner(
        &self,
        source_dir: &Path,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<PipelineSummary> {
        let files = walk_markdown_files(source_dir);
        tracing::info!(
            files = files.len(),
            dir = %source_dir.display(),
            "starting embedding regeneration"
        );

        let existing: HashMap<String, String> = self
            .vector_store
            .scroll_stored_points()
            .await?
            .into_iter()
            .map(|point| (point.id, point.content_hash))
            .collect();

        let mut summary = PipelineSummary {
            total_files: files.len(),
            ..Default::default()
        };
        let mut plan = IndexPlan::default();

        for path in &files {
            match parse_markdown_file(source_dir, path) {
                Ok(doc) => plan_document(&doc, &existing, chunk_size, overlap, &mut plan),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "failed to parse file");
                    summary.failed_files.push(
                        path.file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_else(|| path.display().to_string()),
                    );
                }
            }
        }

        summary.total_chunks = plan.total_chunks;
        summary.skipped = plan.skipped;

        for batch in plan.pending.chunks(MAX_EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.embeddings.embed_documents(&texts).await?;

            let points: Vec<ChunkPoint> = batch
                .iter()
                .zip(vectors.into_iter())
                .map(|(chunk, embedding)| ChunkPoint {
                    id: chunk.id,
                    content: chunk.text.clone(),
                    file_path: chunk.file_path.clone(),
                    section: chunk.section.clone(),
                    chapter: chunk.chapter.clone(),
                    chunk_index: chunk.chunk_index,
                    content_hash: chunk.content_hash.clone(),
                    embedding,
                })
                .collect();

            summary.embedded += points.len();
            self.vector_store.upsert_chunks(points).await?;
        }

        let stale: Vec<String> = existing
            .keys()
            .filter(|id| !plan.current_ids.contains(*id))
            .cloned()
            .collect();
        if !stale.is_empty() {
            tracing::info!(stale = stale.len(), "removing stale points");
            summary.deleted = stale.len();
            self.vector_store.delete_points(stale).await?;
        }

        tracing::info!(
            files = summary.total_files,
            chunks = summary.total_chunks,
            embedded = summary.embedded,
            skipped = summary.skipped,
            deleted = summary.deleted,
            "embedding regeneration complete"
        );

        Ok(summary)
    }
}
