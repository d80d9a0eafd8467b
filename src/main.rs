use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::Method;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use chrono::Utc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use book_rag::completion::CompletionClient;
use book_rag::config::Settings;
use book_rag::error::ApiError;
use book_rag::filters::api_key::require_api_key;
use book_rag::filters::rate_limit::{enforce_rate_limit, RateLimiter};
use book_rag::indexer::chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use book_rag::indexer::walker::walk_markdown_files;
use book_rag::indexer::{EmbeddingPipeline, PipelineError};
use book_rag::models::{
    validate_question, validate_selected_text, validate_session_id, ChatRequest, ChatResponse,
    EmbedRequest, EmbedResponse, EmbeddingJob, LogQuery, LogsResponse, QueryMode, SourceRef,
};
use book_rag::rag::embeddings::EmbeddingClient;
use book_rag::rag::vector_store::VectorStore;
use book_rag::rag::RagEngine;
use book_rag::store::Store;

struct AppState {
    store: Store,
    rag: RagEngine,
    pipeline: EmbeddingPipeline,
    vector_store: Arc<VectorStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    dotenv::dotenv().ok();
    let settings = Settings::from_env()?;

    tracing::info!("connecting to Postgres");
    let store = Store::connect(&settings.database_url).await?;
    store.init_schema().await?;

    tracing::info!(url = %settings.qdrant_url, collection = %settings.collection_name, "connecting to Qdrant");
    let vector_store = Arc::new(
        VectorStore::connect(
            &settings.qdrant_url,
            settings.qdrant_api_key.as_deref(),
            &settings.collection_name,
        )
        .await?,
    );

    let embeddings = Arc::new(EmbeddingClient::new(
        settings.cohere_api_key.clone(),
        settings.embedding_model.clone(),
    )?);
    let completion = CompletionClient::new(
        settings.gemini_api_key.clone(),
        settings.chat_model.clone(),
    )?;

    let rag = RagEngine::new(Arc::clone(&embeddings), Arc::clone(&vector_store), completion);
    let pipeline = EmbeddingPipeline::new(embeddings, Arc::clone(&vector_store));

    let state = Arc::new(AppState {
        store,
        rag,
        pipeline,
        vector_store,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let default_limiter = RateLimiter::per_minute(settings.rate_limit_per_minute);
    let embed_limiter = RateLimiter::per_minute(settings.embed_rate_limit_per_minute);

    // The embed route gets its own, stricter window.
    let query_routes = Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/logs", get(logs_handler))
        .route("/api/embeddings/count", get(embeddings_count_handler))
        .route("/api/embed/jobs/:id", get(embedding_job_handler))
        .route_layer(middleware::from_fn_with_state(
            default_limiter,
            enforce_rate_limit,
        ));

    let embed_routes = Router::new()
        .route("/api/embed", post(embed_handler))
        .route_layer(middleware::from_fn_with_state(
            embed_limiter,
            enforce_rate_limit,
        ));

    let app = Router::new()
        .merge(query_routes)
        .merge(embed_routes)
        .route_layer(middleware::from_fn_with_state(
            settings.api_key.clone(),
            require_api_key,
        ))
        .route("/api/health", get(health_handler))
        .route("/", get(root_handler))
        .layer(DefaultBodyLimit::max(settings.max_request_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Append the interaction row; a logging failure never fails the request.
async fn log_best_effort(
    state: &AppState,
    question: &str,
    answer: &str,
    mode: QueryMode,
    session_id: &str,
    sources: &[SourceRef],
    error: Option<&str>,
) {
    if let Err(e) = state
        .store
        .log_interaction(question, answer, mode, Some(session_id), sources, error)
        .await
    {
        tracing::error!(error = %e, "failed to write interaction log");
    }
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    validate_question(&request.message).map_err(ApiError::BadRequest)?;
    if let Some(text) = &request.selected_text {
        validate_selected_text(text).map_err(ApiError::BadRequest)?;
    }
    if let Some(session_id) = &request.session_id {
        validate_session_id(session_id).map_err(ApiError::BadRequest)?;
    }

    let session_id = request
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let mode = if request.selected_text.is_some() {
        QueryMode::Selected
    } else {
        QueryMode::Full
    };

    match state
        .rag
        .answer(&request.message, request.selected_text.as_deref())
        .await
    {
        Ok(result) => {
            tracing::info!(
                session = %session_id,
                mode = mode.as_str(),
                context_used = result.context_used,
                sources = result.sources.len(),
                "processed chat request"
            );
            log_best_effort(
                &state,
                &request.message,
                &result.answer,
                mode,
                &session_id,
                &result.sources,
                None,
            )
            .await;
            Ok(Json(ChatResponse {
                answer: result.answer,
                sources: result.sources,
                session_id,
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "query pipeline failed");
            log_best_effort(
                &state,
                &request.message,
                "",
                mode,
                &session_id,
                &[],
                Some(&e.to_string()),
            )
            .await;
            Err(ApiError::Upstream(format!(
                "Error processing chat request: {}",
                e
            )))
        }
    }
}

async fn embed_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EmbedRequest>,
) -> Result<Json<EmbedResponse>, ApiError> {
    let source_path = Path::new(&request.source_path);
    if !source_path.exists() {
        return Err(ApiError::BadRequest(format!(
            "Source path does not exist: {}",
            request.source_path
        )));
    }
    if !source_path.is_dir() {
        return Err(ApiError::BadRequest(format!(
            "Source path is not a directory: {}",
            request.source_path
        )));
    }
    if let Some(name) = &request.collection_name {
        if name != state.vector_store.collection_name() {
            return Err(ApiError::BadRequest(format!(
                "This deployment indexes collection '{}'",
                state.vector_store.collection_name()
            )));
        }
    }

    let total_files = walk_markdown_files(source_path).len();
    let job_id = state
        .store
        .create_embedding_job(total_files as i32)
        .await
        .map_err(ApiError::internal)?;

    match state
        .pipeline
        .run(source_path, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
        .await
    {
        Ok(summary) => {
            let processed = summary.total_files - summary.failed_files.len();
            if let Err(e) = state
                .store
                .finish_embedding_job(
                    job_id,
                    "completed",
                    processed as i32,
                    summary.embedded as i32,
                    None,
                )
                .await
            {
                tracing::error!(error = %e, "failed to update embedding job");
            }

            Ok(Json(EmbedResponse {
                status: "completed".to_string(),
                job_id,
                total_files: summary.total_files,
                total_chunks: summary.total_chunks,
                message: format!(
                    "Embedding regeneration completed: {} embedded, {} unchanged, {} removed",
                    summary.embedded, summary.skipped, summary.deleted
                ),
            }))
        }
        Err(PipelineError::Busy) => {
            if let Err(e) = state
                .store
                .finish_embedding_job(job_id, "failed", 0, 0, Some("already in progress"))
                .await
            {
                tracing::error!(error = %e, "failed to update embedding job");
            }
            Err(ApiError::Conflict(
                "Embedding regeneration already in progress".to_string(),
            ))
        }
        Err(PipelineError::Other(e)) => {
            tracing::error!(error = %e, "embedding regeneration failed");
            if let Err(update_err) = state
                .store
                .finish_embedding_job(job_id, "failed", 0, 0, Some(&e.to_string()))
                .await
            {
                tracing::error!(error = %update_err, "failed to update embedding job");
            }
            Err(ApiError::Upstream(format!(
                "Embedding regeneration failed: {}",
                e
            )))
        }
    }
}

async fn embeddings_count_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let count = state.vector_store.count().await.map_err(ApiError::upstream)?;
    Ok(Json(serde_json::json!({
        "count": count,
        "collection_name": state.vector_store.collection_name(),
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

async fn embedding_job_handler(
    State(state): State<Arc<AppState>>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<Json<EmbeddingJob>, ApiError> {
    let job = state
        .store
        .get_embedding_job(id)
        .await
        .map_err(ApiError::internal)?;
    job.map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No embedding job {}", id)))
}

async fn logs_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogQuery>,
) -> Result<Json<LogsResponse>, ApiError> {
    if let Some(mode) = &query.mode {
        if QueryMode::parse(mode).is_none() {
            return Err(ApiError::BadRequest(
                "Mode must be either 'full' or 'selected'".to_string(),
            ));
        }
    }

    let response = state
        .store
        .query_logs(query)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(response))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let (postgres, qdrant) =
        futures::future::join(state.store.ping(), state.vector_store.count()).await;

    let postgres_status = match postgres {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };
    let qdrant_status = match qdrant {
        Ok(_) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let status = if postgres_status == "connected" && qdrant_status == "connected" {
        "healthy"
    } else {
        "degraded"
    };

    Json(serde_json::json!({
        "status": status,
        "timestamp": Utc::now().to_rfc3339(),
        "services": {
            "postgres": postgres_status,
            "qdrant": qdrant_status,
        }
    }))
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "Book RAG Chatbot API",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/api/health",
    }))
}
