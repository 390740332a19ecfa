pub mod image;
pub mod overlay;
pub mod preprocessing;
pub mod scoring;
pub mod segmentation;

pub use overlay::OverlayRenderer;
pub use preprocessing::{Preprocessed, Preprocessor};
pub use scoring::{ScoreAggregator, ScoreInputs};
pub use segmentation::{RegionSegmenter, Segmentation};
