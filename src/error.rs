use thiserror::Error;
use uuid::Uuid;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InputValidation(String),
    #[error("Job {0} not found")]
    NotFound(Uuid),
    #[error("Pipeline Error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Configuration Error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Job {job_id} is already {state} and cannot transition again")]
    InvalidTransition { job_id: Uuid, state: &'static str },
}

// Errors raised inside a single analysis job. These never reach the submitter
// directly; the orchestrator turns them into the job's `error` state.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error("Region segmentation failed: {0}")]
    Segmentation(String),
    #[error("{stage} failed: {message}")]
    Processing {
        stage: &'static str,
        message: String,
    },
    #[error("Lesion model error: {0}")]
    Model(String),
    #[error("Failed to write overlay {path}: {message}")]
    Overlay { path: String, message: String },
}

impl PipelineError {
    pub fn processing(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Processing {
            stage,
            message: message.into(),
        }
    }
}
