use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

use super::job::{Job, JobStatusResponse};
use crate::error::AppError;
use crate::pipeline::types::report::AnalysisReport;

/// In-memory job table. The map lock is only held to insert or look up an
/// entry; each job has its own lock so unrelated jobs never contend.
///
/// Entries are never evicted: finished jobs stay pollable for the life of the
/// process, so memory grows with the number of submissions.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, Arc<Mutex<Job>>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh job in the processing state.
    pub async fn create(&self) -> Uuid {
        let job = Job::new();
        let id = job.id();
        self.jobs.write().await.insert(id, Arc::new(Mutex::new(job)));
        id
    }

    async fn entry(&self, job_id: Uuid) -> Result<Arc<Mutex<Job>>, AppError> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(AppError::NotFound(job_id))
    }

    pub async fn status(&self, job_id: Uuid) -> Result<JobStatusResponse, AppError> {
        let entry = self.entry(job_id).await?;
        let job = entry.lock().await;
        Ok(job.status())
    }

    /// Publish the job's outcome. Fails if the job already finished.
    pub async fn finish(
        &self,
        job_id: Uuid,
        outcome: Result<AnalysisReport, String>,
    ) -> Result<(), AppError> {
        let entry = self.entry(job_id).await?;
        let mut job = entry.lock().await;
        let result = match outcome {
            Ok(report) => job.complete(report),
            Err(message) => job.fail(message),
        };
        if let Err(e) = &result {
            warn!("Rejected transition: {}", e);
        }
        result
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let registry = JobRegistry::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            registry.status(id).await,
            Err(AppError::NotFound(missing)) if missing == id
        ));
        assert!(matches!(
            registry.finish(id, Err("nope".to_string())).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_first_outcome_wins() {
        let registry = JobRegistry::new();
        let id = registry.create().await;
        assert!(!registry.status(id).await.unwrap().is_terminal());

        registry.finish(id, Err("timed out".to_string())).await.unwrap();
        let late = registry.finish(id, Err("late worker".to_string())).await;
        assert!(matches!(late, Err(AppError::InvalidTransition { .. })));

        match registry.status(id).await.unwrap() {
            JobStatusResponse::Error { message, job_id, .. } => {
                assert_eq!(message, "timed out");
                assert_eq!(job_id, id);
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_jobs_are_independent() {
        let registry = JobRegistry::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let id = registry.create().await;
                registry.finish(id, Err(format!("job {}", i))).await.unwrap();
                id
            }));
        }
        for handle in handles {
            let id = handle.await.unwrap();
            assert!(registry.status(id).await.unwrap().is_terminal());
        }
        assert_eq!(registry.len().await, 16);
    }
}
