use anyhow::{Context, Result};

/// Default maximum request body size (10 MiB).
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024;

/// Runtime configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cohere_api_key: String,
    pub gemini_api_key: String,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub database_url: String,
    pub context7_mcp_server_url: Option<String>,
    /// When set, every request must carry this value in `X-API-Key`.
    pub api_key: Option<String>,
    pub port: u16,
    pub embedding_model: String,
    pub chat_model: String,
    pub collection_name: String,
    pub max_request_bytes: usize,
    pub rate_limit_per_minute: u32,
    pub embed_rate_limit_per_minute: u32,
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} environment variable is required", name))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let port = optional("PORT")
            .map(|v| v.parse::<u16>().with_context(|| format!("invalid PORT: {}", v)))
            .transpose()?
            .unwrap_or(8000);

        let max_request_bytes = optional("MAX_REQUEST_BYTES")
            .map(|v| {
                v.parse::<usize>()
                    .with_context(|| format!("invalid MAX_REQUEST_BYTES: {}", v))
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_REQUEST_BYTES);

        let rate_limit_per_minute = optional("RATE_LIMIT_PER_MINUTE")
            .map(|v| {
                v.parse::<u32>()
                    .with_context(|| format!("invalid RATE_LIMIT_PER_MINUTE: {}", v))
            })
            .transpose()?
            .unwrap_or(100);

        let embed_rate_limit_per_minute = optional("EMBED_RATE_LIMIT_PER_MINUTE")
            .map(|v| {
                v.parse::<u32>()
                    .with_context(|| format!("invalid EMBED_RATE_LIMIT_PER_MINUTE: {}", v))
            })
            .transpose()?
            .unwrap_or(10);

        Ok(Self {
            cohere_api_key: required("COHERE_API_KEY")?,
            gemini_api_key: required("GEMINI_API_KEY")?,
            qdrant_url: required("QDRANT_URL")?,
            qdrant_api_key: optional("QDRANT_API_KEY"),
            database_url: required("NEON_DATABASE_URL")?,
            context7_mcp_server_url: optional("CONTEXT7_MCP_SERVER_URL"),
            api_key: optional("API_KEY"),
            port,
            embedding_model: optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "embed-multilingual-v3.0".to_string()),
            chat_model: optional("CHAT_MODEL").unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            collection_name: optional("QDRANT_COLLECTION")
                .unwrap_or_else(|| "book_content".to_string()),
            max_request_bytes,
            rate_limit_per_minute,
            embed_rate_limit_per_minute,
        })
    }
}
