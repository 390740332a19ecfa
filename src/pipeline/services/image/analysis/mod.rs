pub mod acne;
pub mod config;
pub mod core;
pub mod hydration;
pub mod pigmentation;
pub mod pores;
pub mod uv_damage;
pub mod wrinkles;

pub use acne::{AcneBackend, AcneDetector, AcneFindings, LesionModel, LinearPixelModel};
pub use config::AnalysisConfig;
pub use core::{AnalysisContext, ModalityAnalyzer};
pub use hydration::{HydrationAnalyzer, HydrationFindings, HydrationLevel, HydrationMetrics};
pub use pigmentation::{PigmentationAnalyzer, PigmentationFindings};
pub use pores::{PoreAnalyzer, PoreFindings, PoreHealthLevel, PoreMetrics};
pub use uv_damage::{UvDamageDetector, UvDamageFindings, UvDamageLevel, UvDamageMetrics};
pub use wrinkles::{GaborBank, WrinkleAnalyzer, WrinkleFindings};
