pub mod job;
pub mod registry;

pub use job::{Job, JobState, JobStatusResponse, SubmitResponse};
pub use registry::JobRegistry;
