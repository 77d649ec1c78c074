use async_trait::async_trait;
use ro_types::OptResult;

use super::{descend, GradientPoint, StepDecision, StepRule};
use crate::config::AdamSettings;
use crate::evaluator::Evaluator;

/// Adam with bias-corrected first and second moment estimates.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    m: Vec<f64>,
    v: Vec<f64>,
    /// Number of updates applied so far.
    t: i32,
}

impl Adam {
    pub fn new(settings: &AdamSettings, dimension: usize) -> Self {
        Self {
            learning_rate: settings.learning_rate,
            beta1: settings.beta1,
            beta2: settings.beta2,
            epsilon: settings.gradient.epsilon,
            m: vec![0.0; dimension],
            v: vec![0.0; dimension],
            t: 0,
        }
    }

    pub fn updates(&self) -> i32 {
        self.t
    }

    /// Update the moments and return the step to subtract.
    pub fn compute_step(&mut self, gradient: &[f64]) -> Vec<f64> {
        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);

        self.m
            .iter_mut()
            .zip(self.v.iter_mut())
            .zip(gradient)
            .map(|((m, v), g)| {
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                let mut denominator = v_hat.sqrt() + self.epsilon;
                if denominator <= 0.0 {
                    denominator = self.epsilon;
                }
                self.learning_rate * m_hat / denominator
            })
            .collect()
    }
}

#[async_trait]
impl StepRule for Adam {
    async fn step(
        &mut self,
        point: GradientPoint<'_>,
        _evaluator: &mut Evaluator,
    ) -> OptResult<StepDecision> {
        let step = self.compute_step(&point.estimate.gradient);
        Ok(descend(point.parameters, &step))
    }

    fn name(&self) -> &str {
        "adam"
    }
}
