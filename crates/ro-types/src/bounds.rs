//! Box constraints on the parameter space.

use serde::{Deserialize, Serialize};

use crate::errors::{OptError, OptResult};

/// Axis-aligned box `[lower[i], upper[i]]` per dimension.
///
/// Serialized as a list of `[low, high]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> OptResult<Self> {
        if lower.len() != upper.len() {
            return Err(crate::config_error!(
                "lower bounds have {} dimensions, upper bounds have {}",
                lower.len(),
                upper.len()
            ));
        }
        if lower.is_empty() {
            return Err(crate::config_error!("bounds must have at least one dimension"));
        }
        for (i, (lo, hi)) in lower.iter().zip(&upper).enumerate() {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(crate::config_error!("bounds for dimension {i} are not finite"));
            }
            if lo > hi {
                return Err(crate::config_error!(
                    "lower bound {lo} exceeds upper bound {hi} in dimension {i}"
                ));
            }
        }
        Ok(Self { lower, upper })
    }

    pub fn from_pairs(pairs: &[[f64; 2]]) -> OptResult<Self> {
        Self::new(
            pairs.iter().map(|p| p[0]).collect(),
            pairs.iter().map(|p| p[1]).collect(),
        )
    }

    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.dim()
            && point
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(x, (lo, hi))| x >= lo && x <= hi)
    }

    /// Clamp `point` into the box in place. Returns whether anything moved.
    pub fn clamp(&self, point: &mut [f64]) -> bool {
        let mut moved = false;
        for (x, (lo, hi)) in point.iter_mut().zip(self.lower.iter().zip(&self.upper)) {
            let clamped = x.clamp(*lo, *hi);
            if clamped != *x {
                *x = clamped;
                moved = true;
            }
        }
        moved
    }

    pub fn widths(&self) -> Vec<f64> {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(lo, hi)| hi - lo)
            .collect()
    }
}

impl TryFrom<Vec<[f64; 2]>> for Bounds {
    type Error = OptError;

    fn try_from(pairs: Vec<[f64; 2]>) -> Result<Self, Self::Error> {
        Self::from_pairs(&pairs)
    }
}

impl From<Bounds> for Vec<[f64; 2]> {
    fn from(bounds: Bounds) -> Self {
        bounds
            .lower
            .into_iter()
            .zip(bounds.upper)
            .map(|(lo, hi)| [lo, hi])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_bounds() {
        let err = Bounds::new(vec![0.0, 2.0], vec![1.0, 1.0]).unwrap_err();
        assert!(err.to_string().contains("dimension 1"));
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        assert!(Bounds::new(vec![0.0], vec![1.0, 2.0]).is_err());
        assert!(Bounds::new(vec![], vec![]).is_err());
    }

    #[test]
    fn clamp_moves_only_outside_coordinates() {
        let bounds = Bounds::from_pairs(&[[-1.0, 1.0], [0.0, 5.0]]).unwrap();
        let mut inside = vec![0.5, 4.0];
        assert!(!bounds.clamp(&mut inside));
        let mut outside = vec![-3.0, 4.0];
        assert!(bounds.clamp(&mut outside));
        assert_eq!(outside, vec![-1.0, 4.0]);
        assert!(bounds.contains(&outside));
    }

    #[test]
    fn json_pairs_round_trip() {
        let bounds: Bounds = serde_json::from_str("[[3.7, 4.2], [0, 1]]").unwrap();
        assert_eq!(bounds.lower(), &[3.7, 0.0]);
        assert_eq!(bounds.upper(), &[4.2, 1.0]);
        assert_eq!(serde_json::to_string(&bounds).unwrap(), "[[3.7,4.2],[0.0,1.0]]");

        let bad: Result<Bounds, _> = serde_json::from_str("[[1, 0]]");
        assert!(bad.is_err());
    }
}
