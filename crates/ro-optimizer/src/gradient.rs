//! Forward-difference gradient estimation.

use ro_types::{config_error, internal_error, OptResult, ParameterVector};

use crate::config::GradientSettings;
use crate::linalg;

/// Objective value and numerical gradient at one point.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientEstimate {
    pub value: f64,
    pub gradient: Vec<f64>,
    pub norm: f64,
    /// `‖gradient‖₂ < tolerance`
    pub converged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientEstimator {
    delta: f64,
    tolerance: f64,
}

impl GradientEstimator {
    pub fn new(delta: f64, tolerance: f64) -> Self {
        Self { delta, tolerance }
    }

    pub fn from_settings(settings: &GradientSettings) -> Self {
        Self::new(settings.delta, settings.tolerance)
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// `p` followed by `p + δ·e_i` for every dimension `i`.
    pub fn targets(&self, parameters: &[f64]) -> OptResult<Vec<ParameterVector>> {
        if parameters.is_empty() {
            return Err(config_error!("cannot estimate a gradient in zero dimensions"));
        }
        let mut targets = Vec::with_capacity(parameters.len() + 1);
        targets.push(parameters.to_vec());
        for i in 0..parameters.len() {
            let mut perturbed = parameters.to_vec();
            perturbed[i] += self.delta;
            targets.push(perturbed);
        }
        Ok(targets)
    }

    /// Turn the `n + 1` scalars for [`Self::targets`] into a gradient.
    pub fn estimate(&self, values: &[f64]) -> OptResult<GradientEstimate> {
        let Some((&f0, perturbed)) = values.split_first() else {
            return Err(internal_error!("gradient estimate needs at least the base value"));
        };
        if perturbed.is_empty() {
            return Err(internal_error!("gradient estimate needs one perturbed value per dimension"));
        }
        let gradient: Vec<f64> = perturbed.iter().map(|fi| (fi - f0) / self.delta).collect();
        let norm = linalg::norm(&gradient);
        Ok(GradientEstimate {
            value: f0,
            converged: norm < self.tolerance,
            gradient,
            norm,
        })
    }
}
