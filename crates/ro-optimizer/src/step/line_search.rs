//! Backtracking line search with the Armijo sufficient-decrease test.

use ro_types::OptResult;
use tracing::{debug, warn};

use crate::evaluator::Evaluator;
use crate::linalg;

/// Step-size multiplier used when no trial satisfies the Armijo condition.
const FALLBACK_FACTOR: f64 = 1e-3;

/// `f(p + α·d) ≤ f0 + σ·α·(gᵀd)`
pub fn armijo_satisfied(f0: f64, slope: f64, sigma: f64, alpha: f64, trial_value: f64) -> bool {
    trial_value <= f0 + sigma * alpha * slope
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearchResult {
    pub alpha: f64,
    /// Objective at the accepted step; `None` for the fallback.
    pub value: Option<f64>,
    pub trials: usize,
    pub satisfied: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktrackingLineSearch {
    alpha: f64,
    beta: f64,
    sigma: f64,
    max_trials: usize,
}

impl BacktrackingLineSearch {
    pub fn new(alpha: f64, beta: f64, sigma: f64, max_trials: usize) -> Self {
        Self {
            alpha,
            beta,
            sigma,
            max_trials,
        }
    }

    /// Shrink `α` by `β` until the Armijo condition holds.
    ///
    /// Each trial point is its own single-element batch. After `max_trials`
    /// failures returns `α0·1e-3` so the run still makes progress.
    pub async fn search(
        &self,
        evaluator: &mut Evaluator,
        parameters: &[f64],
        f0: f64,
        gradient: &[f64],
        direction: &[f64],
    ) -> OptResult<LineSearchResult> {
        let slope = linalg::dot(gradient, direction);
        let mut alpha = self.alpha;

        for trial in 1..=self.max_trials {
            let point = linalg::add_scaled(parameters, alpha, direction);
            let batch = evaluator.evaluate(vec![point]).await?;
            let Some(evaluation) = batch.evaluations.first() else {
                break;
            };
            if armijo_satisfied(f0, slope, self.sigma, alpha, evaluation.value) {
                debug!(alpha, trial, value = evaluation.value, "line search accepted step");
                return Ok(LineSearchResult {
                    alpha,
                    value: Some(evaluation.value),
                    trials: trial,
                    satisfied: true,
                });
            }
            alpha *= self.beta;
        }

        let fallback = self.alpha * FALLBACK_FACTOR;
        warn!(
            max_trials = self.max_trials,
            alpha = fallback,
            "line search exhausted without sufficient decrease, using fallback step"
        );
        Ok(LineSearchResult {
            alpha: fallback,
            value: None,
            trials: self.max_trials,
            satisfied: false,
        })
    }
}
