use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_QUESTION_CHARS: usize = 5;
pub const MAX_QUESTION_CHARS: usize = 1000;
pub const MIN_SELECTED_TEXT_CHARS: usize = 10;
pub const MAX_SELECTED_TEXT_CHARS: usize = 5000;

static SESSION_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid session id pattern"));

/// Query scope: whole-book retrieval or a caller-supplied selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Full,
    Selected,
}

impl QueryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryMode::Full => "full",
            QueryMode::Selected => "selected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "full" => Some(QueryMode::Full),
            "selected" => Some(QueryMode::Selected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub selected_text: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// One retrieved passage reference returned alongside an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub file_path: String,
    pub section: String,
    pub relevance_score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbedRequest {
    pub source_path: String,
    #[serde(default)]
    pub collection_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedResponse {
    pub status: String,
    pub job_id: Uuid,
    pub total_files: usize,
    pub total_chunks: usize,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub mode: Option<String>,
}

/// One question/answer exchange, immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InteractionLog {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub question: String,
    pub answer: String,
    pub mode: String,
    pub session_id: Option<String>,
    pub sources: serde_json::Value,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<InteractionLog>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Bookkeeping row for one embedding regeneration run.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmbeddingJob {
    pub id: Uuid,
    pub status: String,
    pub total_files: Option<i32>,
    pub processed_files: Option<i32>,
    pub total_embeddings: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

pub fn validate_question(message: &str) -> Result<(), String> {
    let trimmed = message.trim();
    let len = trimmed.chars().count();
    if len < MIN_QUESTION_CHARS {
        return Err(format!(
            "Message must be at least {} characters long",
            MIN_QUESTION_CHARS
        ));
    }
    if len > MAX_QUESTION_CHARS {
        return Err(format!(
            "Message must be no more than {} characters long",
            MAX_QUESTION_CHARS
        ));
    }
    Ok(())
}

pub fn validate_selected_text(selected_text: &str) -> Result<(), String> {
    let len = selected_text.chars().count();
    if len < MIN_SELECTED_TEXT_CHARS {
        return Err(format!(
            "Selected text must be at least {} characters long",
            MIN_SELECTED_TEXT_CHARS
        ));
    }
    if len > MAX_SELECTED_TEXT_CHARS {
        return Err(format!(
            "Selected text must be no more than {} characters long",
            MAX_SELECTED_TEXT_CHARS
        ));
    }
    Ok(())
}

pub fn validate_session_id(session_id: &str) -> Result<(), String> {
    if !SESSION_ID_PATTERN.is_match(session_id) {
        return Err(
            "Session ID must contain only alphanumeric characters, hyphens, and underscores"
                .to_string(),
        );
    }
    Ok(())
}
