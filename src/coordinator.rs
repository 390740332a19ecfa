use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::Configuration;
use crate::error::{AppError, PipelineError};
use crate::jobs::{JobRegistry, JobStatusResponse, SubmitResponse};
use crate::pipeline::services::image::analysis::{AcneDetector, AnalysisConfig, LesionModel};
use crate::pipeline::types::landmarks::LandmarkSet;
use crate::pipeline::types::report::AnalysisReport;
use crate::pipeline::AnalysisPipeline;

/// Accepts analysis requests and runs each one on its own worker.
///
/// Submission validates input and returns at once; results are read back
/// with [`JobOrchestrator::poll`].
#[derive(Debug, Clone)]
pub struct JobOrchestrator {
    pipeline: Arc<AnalysisPipeline>,
    registry: JobRegistry,
    run_dir: PathBuf,
    timeout: Option<Duration>,
}

impl JobOrchestrator {
    pub fn builder(configuration: Configuration) -> OrchestratorBuilder {
        OrchestratorBuilder::new(configuration)
    }

    /// Validate the landmarks, register a job and start it in the background.
    pub async fn submit(
        &self,
        image_bytes: Vec<u8>,
        landmarks: Vec<Vec<f32>>,
    ) -> Result<SubmitResponse, AppError> {
        let landmarks = LandmarkSet::from_rows(&landmarks)?;
        let job_id = self.registry.create().await;
        info!(
            "Submitted job {} ({} bytes, {} landmarks)",
            job_id,
            image_bytes.len(),
            landmarks.len()
        );

        let orchestrator = self.clone();
        tokio::spawn(async move {
            let outcome = orchestrator.execute(job_id, image_bytes, landmarks).await;
            match &outcome {
                Ok(report) => info!("Job {} done: overall {}", job_id, report.scores.overall),
                Err(message) => error!("Job {} failed: {}", job_id, message),
            }
            // The registry warns on a rejected transition; nothing else to do here.
            if let Err(e) = orchestrator.registry.finish(job_id, outcome).await {
                debug!("Outcome for job {} not recorded: {}", job_id, e);
            }
        });

        Ok(SubmitResponse::processing(job_id))
    }

    pub async fn poll(&self, job_id: Uuid) -> Result<JobStatusResponse, AppError> {
        self.registry.status(job_id).await
    }

    pub async fn job_count(&self) -> usize {
        self.registry.len().await
    }

    pub fn acne_backend(&self) -> &'static str {
        self.pipeline.acne_backend()
    }

    /// Run the pipeline off the async runtime. Every failure becomes a message.
    async fn execute(
        &self,
        job_id: Uuid,
        image_bytes: Vec<u8>,
        landmarks: LandmarkSet,
    ) -> Result<AnalysisReport, String> {
        let pipeline = Arc::clone(&self.pipeline);
        let job_dir = self.run_dir.join(job_id.to_string());
        let worker = tokio::task::spawn_blocking(move || {
            pipeline.run(&image_bytes, &landmarks, &job_dir)
        });

        let joined = match self.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, worker).await {
                Ok(joined) => joined,
                // The blocking worker cannot be interrupted; its late result is dropped.
                Err(_) => {
                    return Err(format!(
                        "analysis exceeded deadline of {}s",
                        deadline.as_secs_f64()
                    ))
                }
            },
            None => worker.await,
        };
        flatten_outcome(joined)
    }
}

fn flatten_outcome(
    joined: Result<Result<AnalysisReport, PipelineError>, JoinError>,
) -> Result<AnalysisReport, String> {
    match joined {
        Ok(Ok(report)) => Ok(report),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) if e.is_panic() => Err("analysis worker panicked".to_string()),
        Err(e) => Err(format!("analysis worker stopped: {}", e)),
    }
}

pub struct OrchestratorBuilder {
    configuration: Configuration,
    timeout: Option<Duration>,
    lesion_model: Option<Box<dyn LesionModel>>,
}

impl OrchestratorBuilder {
    pub fn new(configuration: Configuration) -> Self {
        let timeout = configuration.job_timeout();
        Self {
            configuration,
            timeout,
            lesion_model: None,
        }
    }

    // Sets the parent directory for overlays, this will override the default configuration.
    pub fn run_dir(mut self, run_dir: impl Into<PathBuf>) -> Self {
        self.configuration.run_dir = run_dir.into();
        self
    }

    // Sets the lesion model artifact, this will override the default configuration.
    pub fn acne_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.configuration.acne_model_path = Some(path.into());
        self
    }

    // Sets or clears the per-job deadline, this will override the default configuration.
    pub fn job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn analysis(mut self, analysis: AnalysisConfig) -> Self {
        self.configuration.analysis = analysis;
        self
    }

    // Uses an in-process lesion model, this takes precedence over the configured artifact.
    pub fn lesion_model(mut self, model: Box<dyn LesionModel>) -> Self {
        self.lesion_model = Some(model);
        self
    }

    pub fn build(self) -> Result<JobOrchestrator, AppError> {
        let OrchestratorBuilder {
            configuration,
            timeout,
            lesion_model,
        } = self;
        configuration
            .analysis
            .validate()
            .map_err(|e| AppError::InputValidation(format!("Invalid analysis config: {}", e)))?;

        let pipeline = match lesion_model {
            Some(model) => AnalysisPipeline::with_acne_detector(
                &configuration.analysis,
                AcneDetector::with_model(model, &configuration.analysis),
            ),
            None => AnalysisPipeline::new(
                &configuration.analysis,
                configuration.acne_model_path.as_deref(),
            ),
        };
        info!(
            "Orchestrator ready: run dir {}, acne backend {}",
            configuration.run_dir.display(),
            pipeline.acne_backend()
        );

        Ok(JobOrchestrator {
            pipeline: Arc::new(pipeline),
            registry: JobRegistry::new(),
            timeout,
            run_dir: configuration.run_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::pipeline::services::image::analysis::core::fixtures::{
        png_bytes, square_landmarks, GreenFaultModel,
    };
    use crate::pipeline::types::region::Region;

    fn landmark_rows(count: usize) -> Vec<Vec<f32>> {
        square_landmarks(10.0, 10.0, 300.0)
            .points()
            .iter()
            .take(count)
            .map(|p| vec![p.x, p.y, p.z])
            .collect()
    }

    fn run_dir() -> PathBuf {
        std::env::temp_dir().join(format!("skinscan-jobs-{}", Uuid::new_v4()))
    }

    fn orchestrator(timeout: Option<Duration>) -> (JobOrchestrator, PathBuf) {
        let run_dir = run_dir();
        let orchestrator = JobOrchestrator::builder(Configuration::default())
            .run_dir(&run_dir)
            .job_timeout(timeout)
            .build()
            .expect("Failed to build orchestrator");
        (orchestrator, run_dir)
    }

    fn faulty_orchestrator(model: GreenFaultModel) -> (JobOrchestrator, PathBuf) {
        let run_dir = run_dir();
        let orchestrator = JobOrchestrator::builder(Configuration::default())
            .run_dir(&run_dir)
            .lesion_model(Box::new(model))
            .build()
            .expect("Failed to build orchestrator");
        (orchestrator, run_dir)
    }

    fn uniform_png(value: [u8; 3]) -> Vec<u8> {
        png_bytes(&RgbImage::from_pixel(320, 320, Rgb(value)))
    }

    /// Submits a green and a gray face together; only the green one trips the model.
    async fn green_fails_gray_completes(model: GreenFaultModel) -> String {
        let (orchestrator, run_dir) = faulty_orchestrator(model);
        assert_eq!(orchestrator.acne_backend(), "green_fault");

        let (green, gray) = tokio::join!(
            orchestrator.submit(uniform_png([0, 200, 0]), landmark_rows(468)),
            orchestrator.submit(uniform_png([128, 128, 128]), landmark_rows(468)),
        );
        let (green, gray) = (green.unwrap(), gray.unwrap());

        let (green_status, gray_status) = tokio::join!(
            wait_for_terminal(&orchestrator, green.job_id),
            wait_for_terminal(&orchestrator, gray.job_id),
        );
        match gray_status {
            JobStatusResponse::Done { job_id, report, .. } => {
                assert_eq!(job_id, gray.job_id);
                assert_eq!(report.scores.acne, 100.0);
            }
            other => panic!("unexpected status {:?}", other),
        }
        let message = match green_status {
            JobStatusResponse::Error {
                job_id, message, ..
            } => {
                assert_eq!(job_id, green.job_id);
                message
            }
            other => panic!("unexpected status {:?}", other),
        };

        // The orchestrator keeps serving after the fault.
        let later = orchestrator
            .submit(uniform_png([140, 140, 140]), landmark_rows(468))
            .await
            .unwrap();
        assert!(matches!(
            wait_for_terminal(&orchestrator, later.job_id).await,
            JobStatusResponse::Done { .. }
        ));
        std::fs::remove_dir_all(&run_dir).ok();
        message
    }

    async fn wait_for_terminal(orchestrator: &JobOrchestrator, job_id: Uuid) -> JobStatusResponse {
        for _ in 0..600 {
            let status = orchestrator.poll(job_id).await.unwrap();
            if status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("job {} never finished", job_id);
    }

    #[tokio::test]
    async fn test_uniform_gray_face_completes_clean() {
        let (orchestrator, run_dir) = orchestrator(None);
        let image = RgbImage::from_pixel(320, 320, Rgb([128, 128, 128]));

        let submitted = orchestrator
            .submit(png_bytes(&image), landmark_rows(468))
            .await
            .unwrap();
        assert_eq!(submitted.status, "processing");

        match wait_for_terminal(&orchestrator, submitted.job_id).await {
            JobStatusResponse::Done { report, job_id, .. } => {
                assert_eq!(job_id, submitted.job_id);
                assert_eq!(report.scores.acne, 100.0);
                for region in Region::ALL {
                    assert_eq!(report.regions[&region].acne_count, 0);
                }
                assert!(std::path::Path::new(&report.overlays.acne).exists());
                assert!(report.overlays.pigmentation.contains(&job_id.to_string()));
            }
            other => panic!("unexpected status {:?}", other),
        }

        let status = orchestrator.poll(submitted.job_id).await.unwrap();
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["status"], "done");
        assert_eq!(json["scores"]["acne"], 100.0);
        assert!(json["regions"]["cheek_left"]["pig_area_pct"].is_number());
        assert!(json["overlays"]["wrinkles"].is_string());

        std::fs::remove_dir_all(&run_dir).ok();
    }

    #[tokio::test]
    async fn test_corrupt_image_ends_in_error() {
        let (orchestrator, run_dir) = orchestrator(None);
        let submitted = orchestrator
            .submit(b"\x89PNG broken".to_vec(), landmark_rows(468))
            .await
            .unwrap();

        match wait_for_terminal(&orchestrator, submitted.job_id).await {
            JobStatusResponse::Error { message, .. } => assert!(!message.is_empty()),
            other => panic!("unexpected status {:?}", other),
        }
        std::fs::remove_dir_all(&run_dir).ok();
    }

    #[tokio::test]
    async fn test_unknown_job_id_is_not_found() {
        let (orchestrator, _) = orchestrator(None);
        let result = orchestrator.poll(Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_short_landmark_set_is_rejected_before_job_creation() {
        let (orchestrator, _) = orchestrator(None);
        let result = orchestrator.submit(Vec::new(), landmark_rows(199)).await;
        assert!(matches!(result, Err(AppError::InputValidation(_))));
        assert_eq!(orchestrator.job_count().await, 0);
    }

    #[tokio::test]
    async fn test_deadline_turns_job_into_error() {
        let (orchestrator, run_dir) = orchestrator(Some(Duration::from_millis(1)));
        let image = RgbImage::from_pixel(320, 320, Rgb([128, 128, 128]));
        let submitted = orchestrator
            .submit(png_bytes(&image), landmark_rows(468))
            .await
            .unwrap();

        let status = wait_for_terminal(&orchestrator, submitted.job_id).await;
        match &status {
            JobStatusResponse::Error { message, .. } => assert!(message.contains("deadline")),
            other => panic!("unexpected status {:?}", other),
        }

        // The terminal state never changes afterwards.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(orchestrator.poll(submitted.job_id).await.unwrap(), status);
        std::fs::remove_dir_all(&run_dir).ok();
    }

    #[tokio::test]
    async fn test_model_error_fails_only_its_own_job() {
        let message = green_fails_gray_completes(GreenFaultModel::NonFinite).await;
        assert!(message.contains("non-finite"));
    }

    #[tokio::test]
    async fn test_worker_panic_fails_only_its_own_job() {
        let message = green_fails_gray_completes(GreenFaultModel::Panics).await;
        assert_eq!(message, "analysis worker panicked");
    }

    #[tokio::test]
    async fn test_concurrent_jobs_keep_their_own_reports() {
        let (orchestrator, run_dir) = orchestrator(None);
        let shades = [90u8, 128, 170, 210];

        let (a, b, c, d) = tokio::join!(
            orchestrator.submit(uniform_png([shades[0]; 3]), landmark_rows(468)),
            orchestrator.submit(uniform_png([shades[1]; 3]), landmark_rows(468)),
            orchestrator.submit(uniform_png([shades[2]; 3]), landmark_rows(468)),
            orchestrator.submit(uniform_png([shades[3]; 3]), landmark_rows(468)),
        );
        let submitted = [a.unwrap(), b.unwrap(), c.unwrap(), d.unwrap()];
        assert_eq!(orchestrator.job_count().await, 4);

        for (shade, job) in shades.iter().zip(&submitted) {
            match wait_for_terminal(&orchestrator, job.job_id).await {
                JobStatusResponse::Done { job_id, report, .. } => {
                    assert_eq!(job_id, job.job_id);
                    assert!(report.overlays.acne.contains(&job.job_id.to_string()));
                    // Overlays are drawn on the job's own decoded image.
                    let overlay = image::open(&report.overlays.acne).unwrap().to_rgb8();
                    assert_eq!(overlay.get_pixel(2, 2), &Rgb([*shade; 3]));
                }
                other => panic!("unexpected status {:?}", other),
            }
        }
        std::fs::remove_dir_all(&run_dir).ok();
    }
}
