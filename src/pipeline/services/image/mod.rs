pub mod analysis;
pub mod binary;
pub mod color;
pub mod float_map;

pub use analysis::{AnalysisConfig, AnalysisContext, ModalityAnalyzer};
pub use float_map::{FloatMap, Kernel};
