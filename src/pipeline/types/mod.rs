pub mod detection;
pub mod landmarks;
pub mod region;
pub mod report;

pub use detection::{BoundingBox, Detection};
pub use landmarks::{Landmark, LandmarkSet};
pub use region::{PixelRect, Region, RegionMask, SkinMask};
pub use report::{AnalysisReport, ModalityReport, Overlays, RegionMetrics, Scores};
