use crate::domain::error::{AppError, Result};
use crate::domain::processing_job::{JobUpdate, ProcessingJob};
use crate::domain::test_case::{NewTestCase, TestCase};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Persistence capability the pipeline writes through.
///
/// `update_job` must apply all fields of one update atomically and must refuse
/// to touch a job that is already terminal; progress is merged as a maximum.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_job(&self, job: &ProcessingJob) -> Result<()>;
    async fn update_job(&self, id: &str, update: &JobUpdate) -> Result<ProcessingJob>;
    async fn get_job(&self, id: &str) -> Result<ProcessingJob>;
    async fn create_test_case(&self, new_case: NewTestCase) -> Result<TestCase>;
    /// Inserts every case or none of them.
    async fn create_test_cases(&self, new_cases: Vec<NewTestCase>) -> Result<Vec<TestCase>>;
    async fn get_test_cases(&self, document_id: Option<&str>) -> Result<Vec<TestCase>>;
    /// Insert or replace by id.
    async fn save_test_case(&self, test_case: &TestCase) -> Result<()>;
    async fn delete_test_cases(&self, ids: &[String]) -> Result<()>;
    /// Deletes `dropped` and upserts `cases` as one unit.
    async fn replace_test_cases(&self, dropped: &[String], cases: &[TestCase]) -> Result<()>;
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Process-local storage, used in tests and when no database is configured.
#[derive(Default)]
pub struct MemoryStorage {
    jobs: RwLock<HashMap<String, ProcessingJob>>,
    test_cases: RwLock<Vec<TestCase>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> AppError {
    AppError::Internal("Storage lock poisoned".to_string())
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_job(&self, job: &ProcessingJob) -> Result<()> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(AppError::ValidationError(format!(
                "Job already exists: {}",
                job.id
            )));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn update_job(&self, id: &str, update: &JobUpdate) -> Result<ProcessingJob> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Job not found: {}", id)))?;
        if job.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Job {} is already {}",
                id,
                job.status.as_str()
            )));
        }

        let mut next = job.clone();
        next.apply(update);
        next.progress = next.progress.max(job.progress);
        *job = next.clone();
        Ok(next)
    }

    async fn get_job(&self, id: &str) -> Result<ProcessingJob> {
        self.jobs
            .read()
            .map_err(poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Job not found: {}", id)))
    }

    async fn create_test_case(&self, new_case: NewTestCase) -> Result<TestCase> {
        let test_case = new_case.into_test_case(Uuid::new_v4().to_string(), now_millis());
        self.test_cases
            .write()
            .map_err(poisoned)?
            .push(test_case.clone());
        Ok(test_case)
    }

    async fn create_test_cases(&self, new_cases: Vec<NewTestCase>) -> Result<Vec<TestCase>> {
        let created_at = now_millis();
        let created: Vec<TestCase> = new_cases
            .into_iter()
            .map(|new_case| new_case.into_test_case(Uuid::new_v4().to_string(), created_at))
            .collect();
        self.test_cases
            .write()
            .map_err(poisoned)?
            .extend(created.iter().cloned());
        Ok(created)
    }

    async fn get_test_cases(&self, document_id: Option<&str>) -> Result<Vec<TestCase>> {
        let cases = self.test_cases.read().map_err(poisoned)?;
        Ok(cases
            .iter()
            .filter(|case| match document_id {
                Some(id) => case.document_id.as_deref() == Some(id),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn save_test_case(&self, test_case: &TestCase) -> Result<()> {
        let mut cases = self.test_cases.write().map_err(poisoned)?;
        upsert(&mut cases, test_case);
        Ok(())
    }

    async fn delete_test_cases(&self, ids: &[String]) -> Result<()> {
        let mut cases = self.test_cases.write().map_err(poisoned)?;
        cases.retain(|case| !ids.contains(&case.id));
        Ok(())
    }

    async fn replace_test_cases(&self, dropped: &[String], cases: &[TestCase]) -> Result<()> {
        let mut stored = self.test_cases.write().map_err(poisoned)?;
        stored.retain(|case| !dropped.contains(&case.id));
        for case in cases {
            upsert(&mut stored, case);
        }
        Ok(())
    }
}

fn upsert(cases: &mut Vec<TestCase>, test_case: &TestCase) {
    match cases.iter_mut().find(|case| case.id == test_case.id) {
        Some(existing) => *existing = test_case.clone(),
        None => cases.push(test_case.clone()),
    }
}
