use anyhow::Result;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{EmbeddingJob, InteractionLog, LogQuery, LogsResponse, QueryMode, SourceRef};

const DEFAULT_LOG_LIMIT: i64 = 20;
const MAX_LOG_LIMIT: i64 = 100;

/// PostgreSQL persistence: interaction logs and embedding job records.
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS interaction_logs (
                id UUID PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                mode TEXT NOT NULL,
                session_id TEXT,
                sources JSONB NOT NULL,
                error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_interaction_logs_created_at
            ON interaction_logs(created_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embedding_jobs (
                id UUID PRIMARY KEY,
                status TEXT NOT NULL,
                total_files INT,
                processed_files INT,
                total_embeddings INT,
                started_at TIMESTAMPTZ NOT NULL,
                finished_at TIMESTAMPTZ,
                error_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Append one interaction row. Rows are never updated afterwards.
    pub async fn log_interaction(
        &self,
        question: &str,
        answer: &str,
        mode: QueryMode,
        session_id: Option<&str>,
        sources: &[SourceRef],
        error: Option<&str>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO interaction_logs
            (id, created_at, question, answer, mode, session_id, sources, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .bind(question)
        .bind(answer)
        .bind(mode.as_str())
        .bind(session_id)
        .bind(serde_json::to_value(sources)?)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn query_logs(&self, query: LogQuery) -> Result<LogsResponse> {
        let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
        let offset = query.offset.unwrap_or(0).max(0);
        let mode = query.mode.as_deref().and_then(QueryMode::parse);

        let (logs, total) = match mode {
            Some(mode) => {
                let logs: Vec<InteractionLog> = sqlx::query_as(
                    r#"
                    SELECT * FROM interaction_logs
                    WHERE mode = $1
                    ORDER BY created_at DESC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(mode.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;

                let total: (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM interaction_logs WHERE mode = $1")
                        .bind(mode.as_str())
                        .fetch_one(&self.pool)
                        .await?;

                (logs, total.0)
            }
            None => {
                let logs: Vec<InteractionLog> = sqlx::query_as(
                    r#"
                    SELECT * FROM interaction_logs
                    ORDER BY created_at DESC
                    LIMIT $1 OFFSET $2
                    "#,
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;

                let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM interaction_logs")
                    .fetch_one(&self.pool)
                    .await?;

                (logs, total.0)
            }
        };

        Ok(LogsResponse {
            logs,
            total,
            limit,
            offset,
        })
    }

    pub async fn create_embedding_job(&self, total_files: i32) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO embedding_jobs (id, status, total_files, started_at)
            VALUES ($1, 'processing', $2, $3)
            "#,
        )
        .bind(id)
        .bind(total_files)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn finish_embedding_job(
        &self,
        job_id: Uuid,
        status: &str,
        processed_files: i32,
        total_embeddings: i32,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE embedding_jobs
            SET status = $2,
                processed_files = $3,
                total_embeddings = $4,
                finished_at = $5,
                error_message = $6
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(status)
        .bind(processed_files)
        .bind(total_embeddings)
        .bind(Utc::now())
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_embedding_job(&self, job_id: Uuid) -> Result<Option<EmbeddingJob>> {
        let job: Option<EmbeddingJob> =
            sqlx::query_as("SELECT * FROM embedding_jobs WHERE id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(job)
    }
}
