//! Update strategies for the finite-difference gradient family.

mod adam;
mod bfgs;
mod conjugate;
mod line_search;
mod rmsprop;

use async_trait::async_trait;
use ro_types::{OptResult, ParameterVector};

use crate::config::AlgorithmConfig;
use crate::evaluator::Evaluator;
use crate::gradient::GradientEstimate;
use crate::termination::RunStatus;

pub use adam::Adam;
pub use bfgs::Bfgs;
pub use conjugate::ConjugateGradient;
pub use line_search::{armijo_satisfied, BacktrackingLineSearch, LineSearchResult};
pub use rmsprop::RmsProp;

/// The evaluated state a step rule works from.
#[derive(Debug, Clone, Copy)]
pub struct GradientPoint<'a> {
    /// 1-based iteration number.
    pub iteration: usize,
    pub parameters: &'a [f64],
    pub estimate: &'a GradientEstimate,
}

/// What the loop should do after a step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepDecision {
    /// Evaluate this point next.
    Move(ParameterVector),
    /// End the run with this status.
    Stop(RunStatus),
}

/// Common trait for all step rules.
///
/// Rules own their algorithm state and mutate it once per call. Rules that
/// need extra evaluations (line searches) issue them through `evaluator`.
#[async_trait]
pub trait StepRule: Send {
    async fn step(
        &mut self,
        point: GradientPoint<'_>,
        evaluator: &mut Evaluator,
    ) -> OptResult<StepDecision>;

    /// Human-readable rule name.
    fn name(&self) -> &str;
}

/// Resolve the configured algorithm to a step rule.
///
/// Returns `None` for algorithms outside the gradient family.
pub fn build_step_rule(
    algorithm: &AlgorithmConfig,
    dimension: usize,
    seed: Option<u64>,
) -> Option<Box<dyn StepRule>> {
    match algorithm {
        AlgorithmConfig::RmsProp(settings) => Some(Box::new(RmsProp::new(settings, dimension))),
        AlgorithmConfig::Adam(settings) => Some(Box::new(Adam::new(settings, dimension))),
        AlgorithmConfig::ConjugateGradient(settings) => {
            Some(Box::new(ConjugateGradient::new(settings.clone(), seed)))
        }
        AlgorithmConfig::Bfgs(settings) => Some(Box::new(Bfgs::new(settings, dimension))),
        AlgorithmConfig::Direct(_) | AlgorithmConfig::Population(_) => None,
    }
}

/// `parameters - step`, or `InvalidStep` if the step is not finite.
pub(crate) fn descend(parameters: &[f64], step: &[f64]) -> StepDecision {
    if !crate::linalg::all_finite(step) {
        tracing::warn!("aborting: invalid step (NaN/Inf detected)");
        return StepDecision::Stop(RunStatus::InvalidStep);
    }
    StepDecision::Move(parameters.iter().zip(step).map(|(p, s)| p - s).collect())
}
