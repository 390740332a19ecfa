//! Converts raw modality metrics into bounded scores.
use serde::{Deserialize, Serialize};

use crate::pipeline::services::image::analysis::core::round_to;
use crate::pipeline::types::report::Scores;

const ACNE_COUNT_SCALE: f64 = 30.0;
const ACNE_AREA_SCALE: f64 = 0.12;
const ACNE_COUNT_WEIGHT: f64 = 0.6;
const ACNE_AREA_WEIGHT: f64 = 0.4;
const PIGMENTATION_AREA_SCALE: f64 = 25.0;
const WRINKLE_DENSITY_SCALE: f64 = 0.08;
/// Acne, pigmentation, wrinkles.
pub const OVERALL_WEIGHTS: [f64; 3] = [0.45, 0.35, 0.20];

/// `value / scale`, clamped to `[0, 1]`.
fn ratio(value: f64, scale: f64) -> f64 {
    (value / scale).clamp(0.0, 1.0)
}

fn finish(score: f64) -> f64 {
    round_to(score, 2).clamp(0.0, 100.0)
}

pub fn acne_score(count: u32, lesion_area_norm: f64) -> f64 {
    let penalty = ACNE_COUNT_WEIGHT * ratio(count as f64, ACNE_COUNT_SCALE)
        + ACNE_AREA_WEIGHT * ratio(lesion_area_norm, ACNE_AREA_SCALE);
    finish(100.0 * (1.0 - penalty))
}

pub fn pigmentation_score(area_pct: f64) -> f64 {
    finish(100.0 * (1.0 - ratio(area_pct, PIGMENTATION_AREA_SCALE)))
}

pub fn wrinkle_score(mean_density: f64) -> f64 {
    finish(100.0 * (1.0 - ratio(mean_density, WRINKLE_DENSITY_SCALE)))
}

/// Weighted combination of the already rounded modality scores.
pub fn overall_score(acne: f64, pigmentation: f64, wrinkles: f64) -> f64 {
    let [w_acne, w_pig, w_wrinkle] = OVERALL_WEIGHTS;
    finish(w_acne * acne + w_pig * pigmentation + w_wrinkle * wrinkles)
}

/// Raw metrics the scores are derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreInputs {
    pub acne_count: u32,
    /// Lesion area over skin area.
    pub lesion_area_norm: f64,
    pub pig_area_pct: f64,
    /// Wrinkle density averaged over regions.
    pub mean_wrinkle_density: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ScoreAggregator;

impl ScoreAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(&self, inputs: &ScoreInputs) -> Scores {
        let acne = acne_score(inputs.acne_count, inputs.lesion_area_norm);
        let pigmentation = pigmentation_score(inputs.pig_area_pct);
        let wrinkles = wrinkle_score(inputs.mean_wrinkle_density);
        Scores {
            acne,
            pigmentation,
            wrinkles,
            overall: overall_score(acne, pigmentation, wrinkles),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn test_clean_face_scores_full_marks() {
        let scores = ScoreAggregator::new().aggregate(&ScoreInputs::default());
        assert_eq!(scores.acne, 100.0);
        assert_eq!(scores.pigmentation, 100.0);
        assert_eq!(scores.wrinkles, 100.0);
        assert_eq!(scores.overall, 100.0);
    }

    #[test]
    fn test_formulas() {
        // 0.6 * 15/30 + 0.4 * 0.06/0.12 = 0.5
        assert_eq!(acne_score(15, 0.06), 50.0);
        assert_eq!(acne_score(90, 1.0), 0.0);
        assert_eq!(pigmentation_score(5.0), 80.0);
        assert_eq!(pigmentation_score(40.0), 0.0);
        assert_eq!(wrinkle_score(0.02), 75.0);
        assert_eq!(overall_score(50.0, 80.0, 75.0), 65.5);
    }

    #[test]
    fn test_rounding_to_two_places() {
        // 100 * (1 - 0.6 * 1/30) = 98.0, area 0.001 / 0.12 * 0.4 = 0.00333..
        assert_eq!(acne_score(1, 0.001), 97.67);
    }

    #[test]
    fn test_scores_bounded_and_deterministic() {
        let mut rng = StdRng::seed_from_u64(7);
        let aggregator = ScoreAggregator::new();
        for _ in 0..500 {
            let inputs = ScoreInputs {
                acne_count: rng.random_range(0..200),
                lesion_area_norm: rng.random_range(0.0..2.0),
                pig_area_pct: rng.random_range(0.0..100.0),
                mean_wrinkle_density: rng.random_range(0.0..1.0),
            };
            let scores = aggregator.aggregate(&inputs);
            for value in [scores.acne, scores.pigmentation, scores.wrinkles, scores.overall] {
                assert!((0.0..=100.0).contains(&value));
            }
            assert_eq!(aggregator.aggregate(&inputs), scores);

            let expected = round_to(
                0.45 * scores.acne + 0.35 * scores.pigmentation + 0.20 * scores.wrinkles,
                2,
            );
            assert_eq!(scores.overall, expected);
        }
    }
}
