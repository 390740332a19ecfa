use std::path::PathBuf;
use std::time::Duration;

use skinscan::{AppError, Configuration, JobOrchestrator, JobStatusResponse};
use tracing::{error, info, Level};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn init_logging() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
}

fn usage() -> AppError {
    AppError::InputValidation("usage: skinscan <image> <landmarks.json> [config-file]".to_string())
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    init_logging();

    let mut args = std::env::args_os().skip(1).map(PathBuf::from);
    let image_path = args.next().ok_or_else(usage)?;
    let landmarks_path = args.next().ok_or_else(usage)?;
    let config_path = args.next();

    let configuration = Configuration::load(config_path.as_deref())?;
    let orchestrator = JobOrchestrator::builder(configuration).build()?;

    let image_bytes = std::fs::read(&image_path)?;
    let landmarks: Vec<Vec<f32>> = serde_json::from_str(&std::fs::read_to_string(&landmarks_path)?)
        .map_err(|e| AppError::InputValidation(format!("Invalid landmarks file: {}", e)))?;

    let submitted = orchestrator.submit(image_bytes, landmarks).await?;
    info!("Waiting for job {}", submitted.job_id);

    let status = loop {
        let status = orchestrator.poll(submitted.job_id).await?;
        if status.is_terminal() {
            break status;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    println!("{}", serde_json::to_string_pretty(&status)?);

    if let JobStatusResponse::Error { message, .. } = status {
        error!("Analysis failed: {}", message);
        std::process::exit(1);
    }
    Ok(())
}
