//! Nonlinear conjugate gradient with an adaptive learning rate.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::Rng;
use ro_types::{OptResult, ParameterVector};
use tracing::{debug, info, warn};

use super::{GradientPoint, StepDecision, StepRule};
use crate::config::ConjugateGradientSettings;
use crate::evaluator::Evaluator;
use crate::linalg;
use crate::sampling::make_rng;
use crate::termination::RunStatus;

/// The last point whose value was accepted.
#[derive(Debug, Clone)]
struct Anchor {
    parameters: ParameterVector,
    value: f64,
    gradient: Vec<f64>,
}

/// Polak-Ribière conjugate gradient.
///
/// Each proposed step is validated on the next iteration: if the new value is
/// not strictly lower than the anchor's, the step is rejected, the learning
/// rate shrinks and the search retries from the anchor. Repeated rejections
/// restart the direction, then either jump to a random nearby point or stop.
pub struct ConjugateGradient {
    settings: ConjugateGradientSettings,
    learning_rate: f64,
    stuck: usize,
    jumps: usize,
    anchor: Option<Anchor>,
    previous_gradient: Option<Vec<f64>>,
    direction: Option<Vec<f64>>,
    rng: StdRng,
}

impl ConjugateGradient {
    pub fn new(settings: ConjugateGradientSettings, seed: Option<u64>) -> Self {
        Self {
            learning_rate: settings.learning_rate,
            settings,
            stuck: 0,
            jumps: 0,
            anchor: None,
            previous_gradient: None,
            direction: None,
            rng: make_rng(seed),
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Direction used for the most recent step.
    pub fn direction(&self) -> Option<&[f64]> {
        self.direction.as_deref()
    }

    pub fn jumps(&self) -> usize {
        self.jumps
    }

    /// Validate the pending step and propose the next point.
    pub fn advance(&mut self, iteration: usize, parameters: &[f64], value: f64, gradient: &[f64]) -> StepDecision {
        let rejected = matches!(&self.anchor, Some(anchor) if !(value < anchor.value));
        let mut restart = self.direction.is_none()
            || (self.settings.restart_interval > 0 && iteration % self.settings.restart_interval == 0);

        let (base, base_gradient) = if rejected {
            self.learning_rate = (self.learning_rate * self.settings.lr_decrease).max(self.settings.lr_min);
            self.stuck += 1;
            debug!(
                iteration,
                stuck = self.stuck,
                learning_rate = self.learning_rate,
                "step rejected, retrying from last accepted point"
            );

            let Some(anchor) = self.anchor.clone() else {
                return StepDecision::Stop(RunStatus::InvalidStep);
            };

            if self.stuck > self.settings.allowed_stuck + 1 {
                if self.settings.allow_jumps && self.jumps < self.settings.max_jumps {
                    return self.jump(&anchor.parameters);
                }
                warn!(iteration, stuck = self.stuck, "aborting: stuck for too long");
                return StepDecision::Stop(RunStatus::Stuck);
            }
            if self.learning_rate <= self.settings.lr_min {
                warn!(iteration, "aborting: learning rate pinned at its floor");
                return StepDecision::Stop(RunStatus::Stuck);
            }
            if self.stuck >= self.settings.allowed_stuck {
                restart = true;
            }
            (anchor.parameters, anchor.gradient)
        } else {
            if self.anchor.is_some() {
                self.learning_rate = (self.learning_rate * self.settings.lr_increase).min(self.settings.lr_max);
                self.stuck = 0;
            }
            self.previous_gradient = self.anchor.take().map(|a| a.gradient);
            self.anchor = Some(Anchor {
                parameters: parameters.to_vec(),
                value,
                gradient: gradient.to_vec(),
            });
            (parameters.to_vec(), gradient.to_vec())
        };

        let direction = match (&self.direction, &self.previous_gradient) {
            _ if restart => linalg::scale(&base_gradient, -1.0),
            (Some(previous_direction), _) if rejected => previous_direction.clone(),
            (Some(previous_direction), Some(previous_gradient)) => {
                let beta = polak_ribiere(&base_gradient, previous_gradient);
                linalg::add_scaled(&linalg::scale(&base_gradient, -1.0), beta, previous_direction)
            }
            _ => linalg::scale(&base_gradient, -1.0),
        };

        let step = linalg::scale(&direction, self.learning_rate);
        if !linalg::all_finite(&step) {
            warn!(iteration, "aborting: invalid step (NaN/Inf detected)");
            return StepDecision::Stop(RunStatus::InvalidStep);
        }
        self.direction = Some(direction);
        StepDecision::Move(linalg::add_scaled(&base, 1.0, &step))
    }

    fn jump(&mut self, from: &[f64]) -> StepDecision {
        let scale = self.settings.jump_scale;
        let jumped: ParameterVector = from
            .iter()
            .map(|x| x + self.rng.random_range(-scale..=scale))
            .collect();
        self.jumps += 1;
        self.stuck = 0;
        self.learning_rate = self.settings.learning_rate;
        self.anchor = None;
        self.previous_gradient = None;
        self.direction = None;
        info!(jumps = self.jumps, max_jumps = self.settings.max_jumps, "stuck, jumping to a perturbed point");
        StepDecision::Move(jumped)
    }
}

/// `max(0, gᵀ(g − g_prev) / (g_prevᵀ g_prev))`
fn polak_ribiere(gradient: &[f64], previous: &[f64]) -> f64 {
    let denominator = linalg::dot(previous, previous);
    if denominator <= f64::EPSILON {
        return 0.0;
    }
    let numerator = linalg::dot(gradient, &linalg::sub(gradient, previous));
    (numerator / denominator).max(0.0)
}

#[async_trait]
impl StepRule for ConjugateGradient {
    async fn step(
        &mut self,
        point: GradientPoint<'_>,
        _evaluator: &mut Evaluator,
    ) -> OptResult<StepDecision> {
        Ok(self.advance(
            point.iteration,
            point.parameters,
            point.estimate.value,
            &point.estimate.gradient,
        ))
    }

    fn name(&self) -> &str {
        "conjugate_gradient"
    }
}
