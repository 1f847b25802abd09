use crate::domain::error::{AppError, Result};
use crate::domain::processing_job::{JobStatusView, JobTransition, JobType, ProcessingJob};
use crate::infrastructure::storage::{now_millis, Storage};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Owns job records. Each transition is validated against the stored job and
/// written as one storage update, so pollers see whole snapshots only.
pub struct JobTracker {
    storage: Arc<dyn Storage>,
}

impl JobTracker {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn create_job(&self, document_id: &str, job_type: JobType) -> Result<ProcessingJob> {
        let document_id = document_id.trim();
        if document_id.is_empty() {
            return Err(AppError::ValidationError(
                "Document id is required.".to_string(),
            ));
        }

        let job = ProcessingJob::new(
            Uuid::new_v4().to_string(),
            document_id.to_string(),
            job_type,
            now_millis(),
        );
        self.storage.create_job(&job).await?;
        info!(job_id = %job.id, document_id = %job.document_id, "Created processing job");
        Ok(job)
    }

    /// `pending -> processing`. A no-op when already processing.
    pub async fn start(&self, job_id: &str) -> Result<ProcessingJob> {
        self.transition(job_id, JobTransition::Start).await
    }

    /// Raises progress; lower or equal values are ignored.
    pub async fn report_progress(&self, job_id: &str, progress: u8) -> Result<ProcessingJob> {
        self.transition(job_id, JobTransition::Progress(progress))
            .await
    }

    pub async fn complete(&self, job_id: &str, result: serde_json::Value) -> Result<ProcessingJob> {
        self.transition(job_id, JobTransition::Complete(result))
            .await
    }

    /// Records the failure; progress keeps its last value.
    pub async fn fail(&self, job_id: &str, message: impl Into<String>) -> Result<ProcessingJob> {
        self.transition(job_id, JobTransition::Fail(message.into()))
            .await
    }

    pub async fn get_job(&self, job_id: &str) -> Result<ProcessingJob> {
        self.storage.get_job(job_id).await
    }

    pub async fn status(&self, job_id: &str) -> Result<JobStatusView> {
        Ok(self.storage.get_job(job_id).await?.into())
    }

    async fn transition(&self, job_id: &str, transition: JobTransition) -> Result<ProcessingJob> {
        let job = self.storage.get_job(job_id).await?;
        let label = transition_label(&transition);

        let update = match job.plan(transition, now_millis()) {
            Ok(Some(update)) => update,
            Ok(None) => return Ok(job),
            Err(err) => {
                warn!(job_id = %job_id, transition = label, "Rejected job transition: {}", err);
                return Err(err);
            }
        };

        let updated = self.storage.update_job(job_id, &update).await?;
        if update.status.is_some() {
            info!(
                job_id = %job_id,
                status = updated.status.as_str(),
                progress = updated.progress,
                "Job transitioned"
            );
        }
        Ok(updated)
    }
}

fn transition_label(transition: &JobTransition) -> &'static str {
    match transition {
        JobTransition::Start => "start",
        JobTransition::Progress(_) => "progress",
        JobTransition::Complete(_) => "complete",
        JobTransition::Fail(_) => "fail",
    }
}
