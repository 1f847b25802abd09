use crate::domain::error::{AppError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    TestCaseGeneration,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::TestCaseGeneration => "test_case_generation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "test_case_generation" => Some(JobType::TestCaseGeneration),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingJob {
    pub id: String,
    pub document_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: u8,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl ProcessingJob {
    pub fn new(id: String, document_id: String, job_type: JobType, created_at: i64) -> Self {
        Self {
            id,
            document_id,
            job_type,
            status: JobStatus::Pending,
            progress: 0,
            result: None,
            error_message: None,
            created_at,
            completed_at: None,
        }
    }

    /// Computes the field changes a transition implies. `Ok(None)` means the
    /// transition is a no-op for the current state.
    pub fn plan(&self, transition: JobTransition, now: i64) -> Result<Option<JobUpdate>> {
        if self.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Job {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }

        match transition {
            JobTransition::Start => match self.status {
                JobStatus::Pending => Ok(Some(JobUpdate {
                    status: Some(JobStatus::Processing),
                    ..JobUpdate::default()
                })),
                _ => Ok(None),
            },
            JobTransition::Progress(value) => {
                self.require_processing("report progress")?;
                let next = value.min(100);
                if next <= self.progress {
                    return Ok(None);
                }
                Ok(Some(JobUpdate {
                    progress: Some(next),
                    ..JobUpdate::default()
                }))
            }
            JobTransition::Complete(result) => {
                self.require_processing("complete")?;
                Ok(Some(JobUpdate {
                    status: Some(JobStatus::Completed),
                    progress: Some(100),
                    result: Some(result),
                    completed_at: Some(now),
                    ..JobUpdate::default()
                }))
            }
            JobTransition::Fail(message) => Ok(Some(JobUpdate {
                status: Some(JobStatus::Failed),
                error_message: Some(message),
                completed_at: Some(now),
                ..JobUpdate::default()
            })),
        }
    }

    pub fn apply(&mut self, update: &JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(result) = update.result.as_ref() {
            self.result = Some(result.clone());
        }
        if let Some(message) = update.error_message.as_ref() {
            self.error_message = Some(message.clone());
        }
        if let Some(completed_at) = update.completed_at {
            self.completed_at = Some(completed_at);
        }
    }

    fn require_processing(&self, action: &str) -> Result<()> {
        if self.status != JobStatus::Processing {
            return Err(AppError::InvalidState(format!(
                "Cannot {} job {} while {}",
                action,
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    Start,
    Progress(u8),
    Complete(serde_json::Value),
    /// Progress is left at its last reported value.
    Fail(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub completed_at: Option<i64>,
}

/// Shape returned to pollers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub id: String,
    pub document_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

impl From<ProcessingJob> for JobStatusView {
    fn from(job: ProcessingJob) -> Self {
        Self {
            id: job.id,
            document_id: job.document_id,
            status: job.status,
            progress: job.progress,
            result: job.result,
            error_message: job.error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ProcessingJob {
        ProcessingJob::new(
            "job-1".to_string(),
            "doc-1".to_string(),
            JobType::TestCaseGeneration,
            0,
        )
    }

    #[test]
    fn start_is_idempotent() {
        let mut job = job();
        let update = job.plan(JobTransition::Start, 1).unwrap().unwrap();
        job.apply(&update);
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.plan(JobTransition::Start, 2).unwrap(), None);
    }

    #[test]
    fn progress_never_decreases() {
        let mut job = job();
        job.status = JobStatus::Processing;
        job.progress = 40;
        assert_eq!(job.plan(JobTransition::Progress(20), 1).unwrap(), None);
        let update = job.plan(JobTransition::Progress(250), 1).unwrap().unwrap();
        assert_eq!(update.progress, Some(100));
    }

    #[test]
    fn progress_requires_processing() {
        let job = job();
        assert!(matches!(
            job.plan(JobTransition::Progress(10), 1),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let mut job = job();
        job.status = JobStatus::Failed;
        assert!(job.plan(JobTransition::Start, 1).is_err());
        assert!(job.plan(JobTransition::Fail("again".into()), 1).is_err());
        job.status = JobStatus::Completed;
        assert!(job
            .plan(JobTransition::Complete(serde_json::json!({})), 1)
            .is_err());
    }

    #[test]
    fn failure_keeps_progress() {
        let mut job = job();
        job.status = JobStatus::Processing;
        job.progress = 50;
        let update = job.plan(JobTransition::Fail("boom".into()), 9).unwrap().unwrap();
        job.apply(&update);
        assert_eq!(job.progress, 50);
        assert_eq!(job.completed_at, Some(9));
        assert_eq!(job.error_message.as_deref(), Some("boom"));
    }
}
