//! SQLite-backed job store

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{AppError, Result};
use crate::job::{Job, JobId, JobOutcome, JobParameters, JobStatus};
use crate::store::JobStore;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS queue (
        uid TEXT PRIMARY KEY NOT NULL,
        status TEXT NOT NULL,
        prompt TEXT NOT NULL,
        neg_prompt TEXT NOT NULL,
        steps INTEGER NOT NULL,
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        guidance_scale REAL NOT NULL,
        sampler TEXT NOT NULL,
        result TEXT NOT NULL,
        created_at TEXT NOT NULL,
        completed_at TEXT
    )
"#;

/// Row as stored in the `queue` table
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    uid: String,
    status: String,
    prompt: String,
    neg_prompt: String,
    steps: i64,
    width: i64,
    height: i64,
    guidance_scale: f64,
    sampler: String,
    result: String,
    created_at: String,
    completed_at: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = AppError;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(Job {
            id: JobId::from(row.uid),
            status: row.status.parse()?,
            parameters: JobParameters {
                prompt: row.prompt,
                negative_prompt: row.neg_prompt,
                width: to_u32("width", row.width)?,
                height: to_u32("height", row.height)?,
                guidance_scale: row.guidance_scale as f32,
                steps: to_u32("steps", row.steps)?,
                sampler: row.sampler,
            },
            result: row.result,
            created_at: parse_timestamp(&row.created_at)?,
            completed_at: row
                .completed_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
        })
    }
}

fn to_u32(column: &str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| AppError::Internal(format!("Column {} out of range: {}", column, value)))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("Invalid timestamp '{}': {}", value, e)))
}

/// Job store persisted in a SQLite database file
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Open (creating if needed) the database described by the configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                debug!(path = ?parent, "Created database directory");
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.init_schema().await?;
        info!(url = %config.url, "Job store ready");
        Ok(store)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `queue` table if it does not exist yet
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, job: &Job) -> Result<()> {
        let params = &job.parameters;
        let inserted = sqlx::query(
            r#"
            INSERT INTO queue (
                uid, status, prompt, neg_prompt, steps, width, height,
                guidance_scale, sampler, result, created_at, completed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.as_str())
        .bind(job.status.as_str())
        .bind(&params.prompt)
        .bind(&params.negative_prompt)
        .bind(i64::from(params.steps))
        .bind(i64::from(params.width))
        .bind(i64::from(params.height))
        .bind(f64::from(params.guidance_scale))
        .bind(&params.sampler)
        .bind(&job.result)
        .bind(job.created_at.to_rfc3339())
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(AppError::DuplicateId(job.id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_terminal(&self, id: &JobId, outcome: &JobOutcome) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE queue SET status = ?, result = ?, completed_at = ? WHERE uid = ? AND status = ?",
        )
        .bind(outcome.status().as_str())
        .bind(outcome.result())
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .bind(JobStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            return Ok(());
        }

        let exists: Option<String> = sqlx::query_scalar("SELECT status FROM queue WHERE uid = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Err(AppError::AlreadyTerminal(id.to_string())),
            None => Err(AppError::NotFound(id.to_string())),
        }
    }

    async fn get(&self, id: &JobId) -> Result<Job> {
        sqlx::query_as::<_, JobRow>("SELECT * FROM queue WHERE uid = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(id.to_string()))?
            .try_into()
    }

    async fn count_pending(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue WHERE status = ?")
            .bind(JobStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
