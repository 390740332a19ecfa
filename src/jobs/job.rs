use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::pipeline::types::report::AnalysisReport;

#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Processing,
    Done(Box<AnalysisReport>),
    Error(String),
}

impl JobState {
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Processing => "processing",
            JobState::Done(_) => "done",
            JobState::Error(_) => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Processing)
    }
}

/// One submitted analysis. Leaves `Processing` exactly once.
#[derive(Debug, Clone)]
pub struct Job {
    id: Uuid,
    state: JobState,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: JobState::Processing,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn complete(&mut self, report: AnalysisReport) -> Result<(), AppError> {
        self.finish(JobState::Done(Box::new(report)))
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), AppError> {
        self.finish(JobState::Error(message.into()))
    }

    fn finish(&mut self, next: JobState) -> Result<(), AppError> {
        if self.state.is_terminal() {
            return Err(AppError::InvalidTransition {
                job_id: self.id,
                state: self.state.name(),
            });
        }
        self.state = next;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn status(&self) -> JobStatusResponse {
        let job_id = self.id;
        let submitted_at = self.submitted_at;
        match (&self.state, self.finished_at) {
            (JobState::Done(report), Some(finished_at)) => JobStatusResponse::Done {
                job_id,
                submitted_at,
                finished_at,
                report: report.clone(),
            },
            (JobState::Error(message), Some(finished_at)) => JobStatusResponse::Error {
                job_id,
                submitted_at,
                finished_at,
                message: message.clone(),
            },
            _ => JobStatusResponse::Processing {
                job_id,
                submitted_at,
            },
        }
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll response, serialized with a `status` tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatusResponse {
    Processing {
        job_id: Uuid,
        submitted_at: DateTime<Utc>,
    },
    Done {
        job_id: Uuid,
        submitted_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        #[serde(flatten)]
        report: Box<AnalysisReport>,
    },
    Error {
        job_id: Uuid,
        submitted_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        message: String,
    },
}

impl JobStatusResponse {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobStatusResponse::Processing { job_id, .. }
            | JobStatusResponse::Done { job_id, .. }
            | JobStatusResponse::Error { job_id, .. } => *job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatusResponse::Processing { .. })
    }
}

/// Returned by submit before any work starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitResponse {
    pub status: &'static str,
    pub job_id: Uuid,
}

impl SubmitResponse {
    pub fn processing(job_id: Uuid) -> Self {
        Self {
            status: "processing",
            job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_processing() {
        let job = Job::new();
        assert_eq!(job.state(), &JobState::Processing);
        assert!(job.finished_at().is_none());

        let json = serde_json::to_value(job.status()).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["job_id"], job.id().to_string());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut job = Job::new();
        job.fail("decoder exploded").unwrap();
        let finished = job.finished_at();

        let again = job.fail("second failure");
        assert!(matches!(
            again,
            Err(AppError::InvalidTransition { state: "error", .. })
        ));
        assert_eq!(job.state(), &JobState::Error("decoder exploded".to_string()));
        assert_eq!(job.finished_at(), finished);

        let json = serde_json::to_value(job.status()).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "decoder exploded");
    }

    #[test]
    fn test_submit_response_shape() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(SubmitResponse::processing(id)).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["job_id"], id.to_string());
    }
}
