use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Fewest landmarks accepted at submission.
pub const MIN_LANDMARKS: usize = 200;

/// Landmark count produced by a full face mesh.
pub const NOMINAL_LANDMARKS: usize = 468;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Ordered face landmarks in image pixel space. Always holds at least
/// [`MIN_LANDMARKS`] finite points.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Result<Self, AppError> {
        if points.len() < MIN_LANDMARKS {
            return Err(AppError::InputValidation(format!(
                "expected at least {} landmarks (nominal {}), got {}",
                MIN_LANDMARKS,
                NOMINAL_LANDMARKS,
                points.len()
            )));
        }
        if let Some(index) = points
            .iter()
            .position(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
        {
            return Err(AppError::InputValidation(format!(
                "landmark {} has a non-finite coordinate",
                index
            )));
        }
        Ok(Self { points })
    }

    /// Validate raw rows as delivered by a collaborator, e.g. a parsed JSON array.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, AppError> {
        let points = rows
            .iter()
            .enumerate()
            .map(|(index, row)| match row.as_slice() {
                [x, y, z] => Ok(Landmark::new(*x, *y, *z)),
                _ => Err(AppError::InputValidation(format!(
                    "landmark {} has {} components, expected 3",
                    index,
                    row.len()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(points)
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Axis-aligned `(min_x, min_y, max_x, max_y)` over all points.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        self.points.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(min_x, min_y, max_x, max_y), p| {
                (min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(count: usize) -> Vec<Vec<f32>> {
        (0..count)
            .map(|i| vec![10.0 + i as f32, 20.0 + i as f32, 0.0])
            .collect()
    }

    #[test]
    fn test_rejects_short_sets() {
        let result = LandmarkSet::from_rows(&rows(199));
        assert!(matches!(result, Err(AppError::InputValidation(_))));
        assert!(LandmarkSet::from_rows(&rows(200)).is_ok());
    }

    #[test]
    fn test_rejects_malformed_rows() {
        let mut data = rows(NOMINAL_LANDMARKS);
        data[17] = vec![1.0, 2.0];
        let err = LandmarkSet::from_rows(&data).unwrap_err();
        assert!(err.to_string().contains("landmark 17"));

        let mut data = rows(NOMINAL_LANDMARKS);
        data[3][1] = f32::NAN;
        assert!(LandmarkSet::from_rows(&data).is_err());
    }

    #[test]
    fn test_bounds() {
        let set = LandmarkSet::from_rows(&rows(NOMINAL_LANDMARKS)).unwrap();
        assert_eq!(set.len(), NOMINAL_LANDMARKS);
        assert_eq!(set.bounds(), (10.0, 20.0, 477.0, 487.0));
    }
}
