use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 1500,
            top_p: 0.95,
            top_k: 40,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

/// Gemini generateContent client.
pub struct CompletionClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl CompletionClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Self::with_base_url(api_key, model, GEMINI_BASE_URL.to_string())
    }

    /// Custom base URL, for tests.
    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Result<Self> {
        if api_key.is_empty() {
            anyhow::bail!("Gemini API key is empty");
        }

        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model,
        })
    }

    /// Generate an answer from a system instruction and a user prompt.
    pub async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let request = GenerateRequest {
            system_instruction: Content {
                parts: vec![Part {
                    text: system.to_string(),
                }],
            },
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig::default(),
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "completion API error");
            anyhow::bail!("completion API request failed: {} - {}", status, body);
        }

        let generated: GenerateResponse = response.json().await?;
        extract_answer(generated)
    }
}

/// Pull the answer text out of a response, treating blocked or empty
/// candidates as errors carrying the finish reason.
fn extract_answer(response: GenerateResponse) -> Result<String> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("completion API returned no candidates"))?;

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate
            .finish_reason
            .unwrap_or_else(|| "UNKNOWN".to_string());
        anyhow::bail!("completion API produced no text (finish reason: {})", reason);
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> CompletionClient {
        CompletionClient::with_base_url(
            "test-key".to_string(),
            "gemini-2.5-flash".to_string(),
            server.uri(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn returns_candidate_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/models/gemini-2.5-flash:generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "An answer." }] },
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let answer = client.generate("be helpful", "a question").await.unwrap();
        assert_eq!(answer, "An answer.");
    }

    #[tokio::test]
    async fn blocked_candidate_is_an_error_with_reason() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "finishReason": "RECITATION" }]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.generate("be helpful", "a question").await.unwrap_err();
        assert!(err.to_string().contains("RECITATION"));
    }

    #[tokio::test]
    async fn empty_response_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "candidates": [] })),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.generate("be helpful", "a question").await.unwrap_err();
        assert!(err.to_string().contains("no candidates"));
    }

    #[tokio::test]
    async fn api_failure_carries_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.generate("be helpful", "a question").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
