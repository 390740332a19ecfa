use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::pipeline::services::image::analysis::AnalysisConfig;

/// Runtime configuration for the analysis service.
///
/// Values come from `Configuration::default()`, optionally overridden by a
/// config file and then by `SKINSCAN_*` environment variables (nested keys
/// use `__`, e.g. `SKINSCAN_ANALYSIS__PIGMENTATION_TAU`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Parent directory for per-job overlay artifacts.
    pub run_dir: PathBuf,
    /// Optional lesion model artifact; absent or unloadable means classical acne detection.
    pub acne_model_path: Option<PathBuf>,
    /// Per-job deadline. `None` lets a stuck job run forever.
    pub job_timeout_secs: Option<u64>,
    pub analysis: AnalysisConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            run_dir: PathBuf::from("./runs"),
            acne_model_path: None,
            job_timeout_secs: Some(120),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Configuration {
    /// Load configuration from an optional file plus the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, AppError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let configuration: Configuration = builder
            .add_source(
                config::Environment::with_prefix("SKINSCAN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        configuration
            .analysis
            .validate()
            .map_err(|e| AppError::InputValidation(format!("Invalid analysis config: {}", e)))?;
        Ok(configuration)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let configuration = Configuration::default();
        assert_eq!(configuration.run_dir, PathBuf::from("./runs"));
        assert!(configuration.acne_model_path.is_none());
        assert_eq!(configuration.job_timeout(), Some(Duration::from_secs(120)));
        assert!(configuration.analysis.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("skinscan-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("skinscan.json");
        std::fs::write(
            &path,
            r#"{ "run_dir": "/tmp/skinscan-runs", "job_timeout_secs": 30, "analysis": { "wrinkle_threshold": 0.5 } }"#,
        )
        .unwrap();

        let configuration = Configuration::load(Some(&path)).unwrap();
        assert_eq!(configuration.run_dir, PathBuf::from("/tmp/skinscan-runs"));
        assert_eq!(configuration.job_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(configuration.analysis.wrinkle_threshold, 0.5);
        assert_eq!(configuration.analysis.pigmentation_tau, 8.0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
