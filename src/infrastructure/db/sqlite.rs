use crate::domain::error::{AppError, Result};
use crate::domain::processing_job::{JobStatus, JobType, JobUpdate, ProcessingJob};
use crate::domain::test_case::{
    ExecutionStatus, NewTestCase, Priority, TestCase, TestCaseSource,
};
use crate::infrastructure::storage::{now_millis, Storage};
use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../../resources/schema.sql");

const JOB_COLUMNS: &str =
    "id, document_id, job_type, status, progress, result_json, error_message, created_at, completed_at";

const TEST_CASE_COLUMNS: &str = "id, document_id, title, description, category, priority, preconditions, steps_json, expected_result, tags_json, source, confidence_score, context_used_json, execution_status, created_at";

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn connect(db_path: &Path, max_connections: u32) -> Result<Self> {
        let db_url = db_path_to_url(db_path)?;
        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(|e| AppError::DatabaseError(format!("Failed to parse DB URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect DB: {e}")))?;

        Self::from_pool(pool).await
    }

    /// Single-connection in-memory database; every connection would otherwise
    /// see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open in-memory DB: {e}")))?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        apply_schema(&pool).await?;
        Ok(Self { pool })
    }
}

fn db_path_to_url(db_path: &Path) -> Result<String> {
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| AppError::DatabaseError("Database path is not valid UTF-8".to_string()))?;
    Ok(format!("sqlite://{}", db_path_str.replace('\\', "/")))
}

async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA.split(';') {
        let stmt = statement.trim();
        if stmt.is_empty() {
            continue;
        }
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to apply schema statement: {e}")))?;
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Internal(format!("Failed to serialize column: {e}")))
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_job(&self, job: &ProcessingJob) -> Result<()> {
        let result_json = job.result.as_ref().map(to_json).transpose()?;
        sqlx::query(&format!(
            "INSERT INTO processing_jobs ({JOB_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&job.id)
        .bind(&job.document_id)
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(job.progress as i64)
        .bind(result_json)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert job: {e}")))?;

        Ok(())
    }

    async fn update_job(&self, id: &str, update: &JobUpdate) -> Result<ProcessingJob> {
        let result_json = update.result.as_ref().map(to_json).transpose()?;
        let outcome = sqlx::query(
            "UPDATE processing_jobs SET
                status = COALESCE(?, status),
                progress = MAX(progress, COALESCE(?, progress)),
                result_json = COALESCE(?, result_json),
                error_message = COALESCE(?, error_message),
                completed_at = COALESCE(?, completed_at)
             WHERE id = ? AND status NOT IN ('completed', 'failed')",
        )
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.progress.map(|p| p as i64))
        .bind(result_json)
        .bind(&update.error_message)
        .bind(update.completed_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update job: {e}")))?;

        let job = self.get_job(id).await?;
        if outcome.rows_affected() == 0 {
            return Err(AppError::InvalidState(format!(
                "Job {} is already {}",
                id,
                job.status.as_str()
            )));
        }
        Ok(job)
    }

    async fn get_job(&self, id: &str) -> Result<ProcessingJob> {
        let job = sqlx::query_as::<_, JobEntity>(&format!(
            "SELECT {JOB_COLUMNS} FROM processing_jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch job: {e}")))?;

        match job {
            Some(job) => job.try_into(),
            None => Err(AppError::NotFound(format!("Job not found: {}", id))),
        }
    }

    async fn create_test_case(&self, new_case: NewTestCase) -> Result<TestCase> {
        let test_case = new_case.into_test_case(Uuid::new_v4().to_string(), now_millis());
        self.save_test_case(&test_case).await?;
        Ok(test_case)
    }

    async fn create_test_cases(&self, new_cases: Vec<NewTestCase>) -> Result<Vec<TestCase>> {
        let created_at = now_millis();
        let created: Vec<TestCase> = new_cases
            .into_iter()
            .map(|new_case| new_case.into_test_case(Uuid::new_v4().to_string(), created_at))
            .collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open transaction: {e}")))?;
        for case in &created {
            upsert_test_case(&mut tx, case).await?;
        }
        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit test cases: {e}")))?;
        Ok(created)
    }

    async fn get_test_cases(&self, document_id: Option<&str>) -> Result<Vec<TestCase>> {
        let rows = match document_id {
            Some(document_id) => {
                sqlx::query_as::<_, TestCaseEntity>(&format!(
                    "SELECT {TEST_CASE_COLUMNS} FROM test_cases WHERE document_id = ? ORDER BY created_at ASC, rowid ASC"
                ))
                .bind(document_id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, TestCaseEntity>(&format!(
                    "SELECT {TEST_CASE_COLUMNS} FROM test_cases ORDER BY created_at ASC, rowid ASC"
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| AppError::DatabaseError(format!("Failed to list test cases: {e}")))?;

        rows.into_iter().map(TestCase::try_from).collect()
    }

    async fn save_test_case(&self, test_case: &TestCase) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to acquire connection: {e}")))?;
        upsert_test_case(&mut conn, test_case).await
    }

    async fn delete_test_cases(&self, ids: &[String]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open transaction: {e}")))?;
        for id in ids {
            delete_test_case(&mut tx, id).await?;
        }
        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit delete: {e}")))?;
        Ok(())
    }

    async fn replace_test_cases(&self, dropped: &[String], cases: &[TestCase]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open transaction: {e}")))?;
        for id in dropped {
            delete_test_case(&mut tx, id).await?;
        }
        for case in cases {
            upsert_test_case(&mut tx, case).await?;
        }
        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit replacement: {e}")))?;
        Ok(())
    }
}

async fn delete_test_case(conn: &mut SqliteConnection, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM test_cases WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to delete test case: {e}")))?;
    Ok(())
}

async fn upsert_test_case(conn: &mut SqliteConnection, test_case: &TestCase) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO test_cases ({TEST_CASE_COLUMNS})
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            document_id = excluded.document_id,
            title = excluded.title,
            description = excluded.description,
            category = excluded.category,
            priority = excluded.priority,
            preconditions = excluded.preconditions,
            steps_json = excluded.steps_json,
            expected_result = excluded.expected_result,
            tags_json = excluded.tags_json,
            source = excluded.source,
            confidence_score = excluded.confidence_score,
            context_used_json = excluded.context_used_json,
            execution_status = excluded.execution_status"
    ))
    .bind(&test_case.id)
    .bind(&test_case.document_id)
    .bind(&test_case.title)
    .bind(&test_case.description)
    .bind(&test_case.category)
    .bind(test_case.priority.as_str())
    .bind(&test_case.preconditions)
    .bind(to_json(&test_case.steps)?)
    .bind(&test_case.expected_result)
    .bind(to_json(&test_case.tags)?)
    .bind(test_case.source.as_str())
    .bind(test_case.confidence_score.map(|v| v as f64))
    .bind(to_json(&test_case.context_used)?)
    .bind(test_case.execution_status.as_str())
    .bind(test_case.created_at)
    .execute(conn)
    .await
    .map_err(|e| AppError::DatabaseError(format!("Failed to save test case: {e}")))?;

    Ok(())
}

#[derive(sqlx::FromRow)]
struct JobEntity {
    id: String,
    document_id: String,
    job_type: String,
    status: String,
    progress: i64,
    result_json: Option<String>,
    error_message: Option<String>,
    created_at: i64,
    completed_at: Option<i64>,
}

impl TryFrom<JobEntity> for ProcessingJob {
    type Error = AppError;

    fn try_from(entity: JobEntity) -> Result<Self> {
        let job_type = JobType::parse(&entity.job_type).ok_or_else(|| {
            AppError::DatabaseError(format!("Unknown job type: {}", entity.job_type))
        })?;
        let status = JobStatus::parse(&entity.status).ok_or_else(|| {
            AppError::DatabaseError(format!("Unknown job status: {}", entity.status))
        })?;
        let result = entity
            .result_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::DatabaseError(format!("Corrupt job result: {e}")))?;

        Ok(Self {
            id: entity.id,
            document_id: entity.document_id,
            job_type,
            status,
            progress: entity.progress.clamp(0, 100) as u8,
            result,
            error_message: entity.error_message,
            created_at: entity.created_at,
            completed_at: entity.completed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TestCaseEntity {
    id: String,
    document_id: Option<String>,
    title: String,
    description: String,
    category: String,
    priority: String,
    preconditions: Option<String>,
    steps_json: String,
    expected_result: Option<String>,
    tags_json: String,
    source: String,
    confidence_score: Option<f64>,
    context_used_json: String,
    execution_status: String,
    created_at: i64,
}

impl TryFrom<TestCaseEntity> for TestCase {
    type Error = AppError;

    fn try_from(entity: TestCaseEntity) -> Result<Self> {
        let corrupt = |column: &str, e: serde_json::Error| {
            AppError::DatabaseError(format!("Corrupt {} for test case {}: {}", column, entity.id, e))
        };
        let steps = serde_json::from_str(&entity.steps_json).map_err(|e| corrupt("steps", e))?;
        let tags = serde_json::from_str(&entity.tags_json).map_err(|e| corrupt("tags", e))?;
        let context_used = serde_json::from_str(&entity.context_used_json)
            .map_err(|e| corrupt("context", e))?;

        Ok(Self {
            priority: Priority::parse(&entity.priority).unwrap_or_default(),
            source: TestCaseSource::parse(&entity.source).ok_or_else(|| {
                AppError::DatabaseError(format!("Unknown test case source: {}", entity.source))
            })?,
            execution_status: ExecutionStatus::parse(&entity.execution_status).unwrap_or_default(),
            confidence_score: entity.confidence_score.map(|v| v as f32),
            steps,
            tags,
            context_used,
            id: entity.id,
            document_id: entity.document_id,
            title: entity.title,
            description: entity.description,
            category: entity.category,
            preconditions: entity.preconditions,
            expected_result: entity.expected_result,
            created_at: entity.created_at,
        })
    }
}
