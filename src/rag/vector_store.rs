use anyhow::Result;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, CreateCollectionBuilder, DeletePointsBuilder, Distance, PointStruct,
    PointsIdsList, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::{Map as JsonMap, Value as JsonValue};
use uuid::Uuid;

use crate::rag::embeddings::EMBEDDING_DIMENSIONS;

/// One chunk ready to be written to the store.
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    pub id: Uuid,
    pub content: String,
    pub file_path: String,
    pub section: String,
    pub chapter: String,
    pub chunk_index: usize,
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

/// One search hit with its payload and similarity score.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub content: String,
    pub file_path: String,
    pub section: String,
    pub chapter: String,
    pub chunk_index: usize,
    pub score: f32,
}

/// A stored point's identity and content hash, for change detection.
#[derive(Debug, Clone)]
pub struct StoredPoint {
    pub id: String,
    pub content_hash: String,
}

pub struct VectorStore {
    client: Qdrant,
    collection_name: String,
}

impl VectorStore {
    pub async fn connect(
        url: &str,
        api_key: Option<&str>,
        collection_name: &str,
    ) -> Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Qdrant client build failed: {}", e))?;

        let store = Self {
            client,
            collection_name: collection_name.to_string(),
        };
        store.ensure_collection().await?;

        Ok(store)
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    async fn ensure_collection(&self) -> Result<()> {
        if !self.client.collection_exists(&self.collection_name).await? {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection_name).vectors_config(
                        VectorParamsBuilder::new(EMBEDDING_DIMENSIONS as u64, Distance::Cosine),
                    ),
                )
                .await?;
            tracing::info!(collection = %self.collection_name, "created Qdrant collection");
        }
        Ok(())
    }

    pub async fn upsert_chunks(&self, chunks: Vec<ChunkPoint>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = chunks
            .into_iter()
            .map(|chunk| {
                let mut payload = JsonMap::new();
                payload.insert("content".to_string(), JsonValue::String(chunk.content));
                payload.insert("file_path".to_string(), JsonValue::String(chunk.file_path));
                payload.insert("section".to_string(), JsonValue::String(chunk.section));
                payload.insert("chapter".to_string(), JsonValue::String(chunk.chapter));
                payload.insert(
                    "chunk_index".to_string(),
                    JsonValue::Number(chunk.chunk_index.into()),
                );
                payload.insert(
                    "content_hash".to_string(),
                    JsonValue::String(chunk.content_hash),
                );
                PointStruct::new(chunk.id.to_string(), chunk.embedding, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points))
            .await?;

        Ok(())
    }

    pub async fn search(&self, query_vector: Vec<f32>, top_k: u64) -> Result<Vec<RetrievedChunk>> {
        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection_name, query_vector, top_k)
                    .with_payload(true),
            )
            .await?;

        let mut results = Vec::new();
        for point in search_result.result {
            let content = point
                .payload
                .get("content")
                .and_then(|v| v.as_str())
                .cloned()
                .unwrap_or_default();
            if content.is_empty() {
                continue;
            }
            results.push(RetrievedChunk {
                content,
                file_path: point
                    .payload
                    .get("file_path")
                    .and_then(|v| v.as_str())
                    .cloned()
                    .unwrap_or_default(),
                section: point
                    .payload
                    .get("section")
                    .and_then(|v| v.as_str())
                    .cloned()
                    .unwrap_or_default(),
                chapter: point
                    .payload
                    .get("chapter")
                    .and_then(|v| v.as_str())
                    .cloned()
                    .unwrap_or_default(),
                chunk_index: point
                    .payload
                    .get("chunk_index")
                    .and_then(|v| v.as_integer())
                    .unwrap_or(0) as usize,
                score: point.score,
            });
        }

        Ok(results)
    }

    /// Walk the whole collection, returning every point id with its stored
    /// content hash.
    pub async fn scroll_stored_points(&self) -> Result<Vec<StoredPoint>> {
        let mut stored = Vec::new();
        let mut offset: Option<qdrant_client::qdrant::PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&self.collection_name)
                .limit(256)
                .with_payload(true);

            if let Some(ref off) = offset {
                builder = builder.offset(off.clone());
            }

            let result = self.client.scroll(builder).await?;

            for point in &result.result {
                let Some(id) = point.id.as_ref().and_then(|id| {
                    id.point_id_options.as_ref().map(|options| match options {
                        PointIdOptions::Uuid(uuid) => uuid.clone(),
                        PointIdOptions::Num(num) => num.to_string(),
                    })
                }) else {
                    continue;
                };

                let content_hash = point
                    .payload
                    .get("content_hash")
                    .and_then(|v| v.as_str())
                    .cloned()
                    .unwrap_or_default();

                stored.push(StoredPoint { id, content_hash });
            }

            offset = result.next_page_offset;
            if offset.is_none() {
                break;
            }
        }

        Ok(stored)
    }

    pub async fn delete_points(&self, ids: Vec<String>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<qdrant_client::qdrant::PointId> = ids
            .into_iter()
            .map(|id| qdrant_client::qdrant::PointId {
                point_id_options: Some(PointIdOptions::Uuid(id)),
            })
            .collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection_name)
                    .points(PointsIdsList { ids: point_ids }),
            )
            .await?;

        Ok(())
    }

    pub async fn count(&self) -> Result<u64> {
        let info = self.client.collection_info(self.collection_name.as_str()).await?;
        Ok(info
            .result
            .and_then(|collection| collection.points_count)
            .unwrap_or(0))
    }
}
