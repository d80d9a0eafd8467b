use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Dimension of `embed-multilingual-v3.0` vectors.
pub const EMBEDDING_DIMENSIONS: usize = 1024;

/// Largest batch the embed API accepts in one call.
pub const MAX_EMBED_BATCH: usize = 96;

const COHERE_BASE_URL: &str = "https://api.cohere.ai";

/// Input hint: documents being indexed vs a search query.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    SearchDocument,
    SearchQuery,
}

#[derive(Debug, Serialize)]
struct EmbedApiRequest<'a> {
    texts: &'a [String],
    model: &'a str,
    input_type: InputType,
}

#[derive(Debug, Deserialize)]
struct EmbedApiResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Cohere embedding client.
pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl EmbeddingClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Self::with_base_url(api_key, model, COHERE_BASE_URL.to_string())
    }

    /// Custom base URL, for tests.
    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Result<Self> {
        if api_key.is_empty() {
            anyhow::bail!("Cohere API key is empty");
        }

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model,
            dimensions: EMBEDDING_DIMENSIONS,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a batch of document chunks for indexing.
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.len() > MAX_EMBED_BATCH {
            anyhow::bail!(
                "embedding batch of {} exceeds the API maximum of {}",
                texts.len(),
                MAX_EMBED_BATCH
            );
        }
        self.embed(texts, InputType::SearchDocument).await
    }

    /// Embed a single search query.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let texts = vec![text.to_string()];
        let mut embeddings = self.embed(&texts, InputType::SearchQuery).await?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedding API returned no vector for the query"))
    }

    async fn embed(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embed", self.base_url);
        let request = EmbedApiRequest {
            texts,
            model: &self.model,
            input_type,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "embedding API error");
            anyhow::bail!("embedding API request failed: {} - {}", status, body);
        }

        let api_response: EmbedApiResponse = response.json().await?;

        if api_response.embeddings.len() != texts.len() {
            anyhow::bail!(
                "embedding API returned {} vectors for {} texts",
                api_response.embeddings.len(),
                texts.len()
            );
        }
        for vector in &api_response.embeddings {
            if vector.len() != self.dimensions {
                anyhow::bail!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimensions,
                    vector.len()
                );
            }
        }

        Ok(api_response.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> EmbeddingClient {
        EmbeddingClient::with_base_url(
            "test-key".to_string(),
            "embed-multilingual-v3.0".to_string(),
            server.uri(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn embeds_documents_in_order() {
        let server = MockServer::start().await;
        let vectors: Vec<Vec<f32>> = vec![vec![0.1; 1024], vec![0.2; 1024]];

        Mock::given(method("POST"))
            .and(path("/v1/embed"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "input_type": "search_document"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "embeddings": vectors })),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result = client
            .embed_documents(&["first chunk".to_string(), "second chunk".to_string()])
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert!(result[0].iter().all(|v| (*v - 0.1).abs() < f32::EPSILON));
    }

    #[tokio::test]
    async fn query_embedding_uses_search_query_hint() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embed"))
            .and(body_partial_json(serde_json::json!({
                "input_type": "search_query"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [vec![0.5_f32; 1024]]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let vector = client.embed_query("what is a robot?").await.unwrap();
        assert_eq!(vector.len(), EMBEDDING_DIMENSIONS);
    }

    #[tokio::test]
    async fn surfaces_api_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embed"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(serde_json::json!({ "message": "rate limited" })),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.embed_query("anything at all").await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn rejects_wrong_dimensions() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [vec![0.5_f32; 8]]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.embed_query("short vector").await.unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[tokio::test]
    async fn rejects_oversized_batches() {
        let server = MockServer::start().await;
        let client = test_client(&server);
        let texts: Vec<String> = (0..MAX_EMBED_BATCH + 1).map(|i| format!("text {}", i)).collect();
        let err = client.embed_documents(&texts).await.unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }
}
