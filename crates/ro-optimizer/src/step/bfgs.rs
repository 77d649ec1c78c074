use async_trait::async_trait;
use ro_types::{OptResult, ParameterVector};
use tracing::debug;

use super::line_search::BacktrackingLineSearch;
use super::{GradientPoint, StepDecision, StepRule};
use crate::config::BfgsSettings;
use crate::evaluator::Evaluator;
use crate::linalg::{self, SquareMatrix};
use crate::termination::RunStatus;

/// Quasi-Newton with a BFGS inverse-Hessian approximation.
pub struct Bfgs {
    inverse_hessian: SquareMatrix,
    previous: Option<(ParameterVector, Vec<f64>)>,
    line_search: BacktrackingLineSearch,
    epsilon: f64,
}

impl Bfgs {
    pub fn new(settings: &BfgsSettings, dimension: usize) -> Self {
        Self {
            inverse_hessian: SquareMatrix::identity(dimension),
            previous: None,
            line_search: BacktrackingLineSearch::new(
                settings.alpha,
                settings.beta,
                settings.sigma,
                settings.linesearch_max_iter,
            ),
            epsilon: settings.gradient.epsilon,
        }
    }

    pub fn inverse_hessian(&self) -> &SquareMatrix {
        &self.inverse_hessian
    }

    /// Fold the latest secant pair into `H` and return `-H g`.
    ///
    /// The update is skipped when `yᵀs ≤ ε`, which would break positive
    /// definiteness.
    pub fn direction(&mut self, parameters: &[f64], gradient: &[f64]) -> Vec<f64> {
        if let Some((previous_parameters, previous_gradient)) = &self.previous {
            let s = linalg::sub(parameters, previous_parameters);
            let y = linalg::sub(gradient, previous_gradient);
            let curvature = linalg::dot(&y, &s);
            if curvature > self.epsilon {
                self.inverse_hessian.bfgs_inverse_update(&s, &y);
            } else {
                debug!(curvature, "skipping BFGS update, curvature condition not met");
            }
        }
        self.previous = Some((parameters.to_vec(), gradient.to_vec()));
        linalg::scale(&self.inverse_hessian.mul_vec(gradient), -1.0)
    }
}

#[async_trait]
impl StepRule for Bfgs {
    async fn step(
        &mut self,
        point: GradientPoint<'_>,
        evaluator: &mut Evaluator,
    ) -> OptResult<StepDecision> {
        let gradient = &point.estimate.gradient;
        let direction = self.direction(point.parameters, gradient);
        if !linalg::all_finite(&direction) {
            tracing::warn!("aborting: invalid step (NaN/Inf detected)");
            return Ok(StepDecision::Stop(RunStatus::InvalidStep));
        }

        let search = self
            .line_search
            .search(evaluator, point.parameters, point.estimate.value, gradient, &direction)
            .await?;
        let next = linalg::add_scaled(point.parameters, search.alpha, &direction);
        if !linalg::all_finite(&next) {
            tracing::warn!("aborting: invalid step (NaN/Inf detected)");
            return Ok(StepDecision::Stop(RunStatus::InvalidStep));
        }
        Ok(StepDecision::Move(next))
    }

    fn name(&self) -> &str {
        "bfgs"
    }
}
