use async_trait::async_trait;
use ro_types::OptResult;

use super::{descend, GradientPoint, StepDecision, StepRule};
use crate::config::RmsPropSettings;
use crate::evaluator::Evaluator;

/// RMSProp: scale the gradient by a running RMS of its history.
#[derive(Debug, Clone)]
pub struct RmsProp {
    learning_rate: f64,
    rho: f64,
    epsilon: f64,
    accumulated_grad_sq: Vec<f64>,
}

impl RmsProp {
    pub fn new(settings: &RmsPropSettings, dimension: usize) -> Self {
        Self {
            learning_rate: settings.learning_rate,
            rho: settings.rho,
            epsilon: settings.gradient.epsilon,
            accumulated_grad_sq: vec![0.0; dimension],
        }
    }

    /// Update the accumulator and return the step to subtract.
    pub fn compute_step(&mut self, gradient: &[f64]) -> Vec<f64> {
        self.accumulated_grad_sq
            .iter_mut()
            .zip(gradient)
            .map(|(acc, g)| {
                *acc = self.rho * *acc + (1.0 - self.rho) * g * g;
                self.learning_rate * g / (*acc + self.epsilon).sqrt()
            })
            .collect()
    }
}

#[async_trait]
impl StepRule for RmsProp {
    async fn step(
        &mut self,
        point: GradientPoint<'_>,
        _evaluator: &mut Evaluator,
    ) -> OptResult<StepDecision> {
        let step = self.compute_step(&point.estimate.gradient);
        Ok(descend(point.parameters, &step))
    }

    fn name(&self) -> &str {
        "rmsprop"
    }
}
