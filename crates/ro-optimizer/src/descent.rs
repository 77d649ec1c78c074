//! The iteration loop shared by the gradient-based algorithms.

use ro_types::{OptResult, ParameterVector};
use tracing::{debug, info, warn};

use crate::evaluator::Evaluator;
use crate::gradient::GradientEstimator;
use crate::history::{History, HistoryEntry};
use crate::linalg;
use crate::step::{GradientPoint, StepDecision, StepRule};
use crate::termination::{backend_failure, IterationBudget, RunOutcome, RunStatus};

/// Finite-difference descent driven by a [`StepRule`].
///
/// Every iteration submits `p` and its `n` perturbations as one batch,
/// records the base value, and either stops on convergence or asks the rule
/// for the next point.
pub struct GradientDescent {
    rule: Box<dyn StepRule>,
    estimator: GradientEstimator,
    budget: IterationBudget,
    parameters: ParameterVector,
}

impl GradientDescent {
    pub fn new(
        rule: Box<dyn StepRule>,
        estimator: GradientEstimator,
        budget: IterationBudget,
        initial_parameters: ParameterVector,
    ) -> Self {
        Self {
            rule,
            estimator,
            budget,
            parameters: initial_parameters,
        }
    }

    pub fn rule_name(&self) -> &str {
        self.rule.name()
    }

    pub async fn run(mut self, evaluator: &mut Evaluator) -> OptResult<RunOutcome> {
        let mut history = History::new();
        let mut iteration = 1;

        while self.budget.allows(iteration) {
            let targets = self.estimator.targets(&self.parameters)?;
            let batch = match evaluator.evaluate(targets).await {
                Ok(batch) => batch,
                Err(err) => {
                    let message = backend_failure(err)?;
                    return Ok(self.finish(RunStatus::BackendFailure, history).with_message(message));
                }
            };

            let estimate = self.estimator.estimate(&batch.values())?;
            let reference = batch.evaluations.first().and_then(|e| e.reference.clone());
            history.record(
                HistoryEntry::new(iteration, &self.parameters, estimate.value)
                    .with_gradient_norm(estimate.norm)
                    .with_reference(reference),
            );
            debug!(
                iteration,
                value = estimate.value,
                gradient_norm = estimate.norm,
                "iteration evaluated"
            );

            if batch.failures() == batch.len() {
                warn!(iteration, failures = batch.failures(), "aborting: every evaluation failed");
                return Ok(self.finish(RunStatus::EvaluationsFailed, history));
            }
            if !linalg::all_finite(&estimate.gradient) {
                warn!(iteration, "aborting: non-finite gradient");
                return Ok(self.finish(RunStatus::InvalidStep, history));
            }
            if estimate.converged {
                info!(iteration, gradient_norm = estimate.norm, "converged");
                return Ok(self.finish(RunStatus::Converged, history));
            }

            let point = GradientPoint {
                iteration,
                parameters: &self.parameters,
                estimate: &estimate,
            };
            match self.rule.step(point, evaluator).await {
                Ok(StepDecision::Move(next)) => self.parameters = next,
                Ok(StepDecision::Stop(status)) => return Ok(self.finish(status, history)),
                Err(err) => {
                    let message = backend_failure(err)?;
                    return Ok(self.finish(RunStatus::BackendFailure, history).with_message(message));
                }
            }
            iteration += 1;
        }

        info!(itmax = self.budget.itmax(), "max iterations reached without convergence");
        Ok(self.finish(RunStatus::MaxIterations, history))
    }

    fn finish(self, status: RunStatus, history: History) -> RunOutcome {
        RunOutcome::new(status, history, self.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{sphere, RecordingBackend};
    use crate::config::{AdamSettings, RmsPropSettings};
    use crate::extract::ValueExtractor;
    use crate::step::{Adam, RmsProp};
    use ro_types::{BackendError, BackendResult, EvaluationOutcome, EvaluationRequest};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn evaluator<F>(objective: F) -> Evaluator
    where
        F: Fn(&[f64]) -> Option<f64> + Send + Sync + 'static,
    {
        Evaluator::new(Box::new(RecordingBackend::new(objective)), Box::new(ValueExtractor), 1e10)
    }

    #[tokio::test]
    async fn batches_hold_base_and_perturbations() {
        let mut evaluator = evaluator(sphere);
        let descent = GradientDescent::new(
            Box::new(RmsProp::new(&RmsPropSettings::default(), 3)),
            GradientEstimator::new(1e-6, 1e-3),
            IterationBudget::new(2),
            vec![1.0, 2.0, 3.0],
        );
        let outcome = descent.run(&mut evaluator).await.unwrap();
        assert_eq!(outcome.status, RunStatus::MaxIterations);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(evaluator.batches(), 2);
        assert_eq!(evaluator.evaluations(), 8);
        assert_eq!(outcome.history.entries()[0].value, 14.0);
        assert_eq!(outcome.history.entries()[0].reference.as_deref(), Some("eval-0"));
    }

    #[tokio::test]
    async fn stops_when_already_converged() {
        let mut evaluator = evaluator(|_: &[f64]| Some(3.0));
        let descent = GradientDescent::new(
            Box::new(Adam::new(&AdamSettings::default(), 2)),
            GradientEstimator::new(1e-6, 1e-3),
            IterationBudget::new(50),
            vec![0.5, 0.5],
        );
        let outcome = descent.run(&mut evaluator).await.unwrap();
        assert_eq!(outcome.status, RunStatus::Converged);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.final_parameters, vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn all_penalised_iteration_is_not_convergence() {
        let mut evaluator = evaluator(|_: &[f64]| None);
        let descent = GradientDescent::new(
            Box::new(Adam::new(&AdamSettings::default(), 2)),
            GradientEstimator::new(1e-6, 1e-3),
            IterationBudget::new(50),
            vec![0.5, 0.5],
        );
        let outcome = descent.run(&mut evaluator).await.unwrap();
        assert_eq!(outcome.status, RunStatus::EvaluationsFailed);
        assert!(!outcome.status.is_success());
        assert_eq!(outcome.iterations, 1);
        assert_eq!(evaluator.failures(), 3);
    }

    struct FailsOnSecondBatch(AtomicUsize);

    #[async_trait::async_trait]
    impl crate::backend::EvaluationBackend for FailsOnSecondBatch {
        async fn submit(&self, batch: Vec<EvaluationRequest>) -> BackendResult<Vec<EvaluationOutcome>> {
            if self.0.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(BackendError::SubmissionFailed {
                    message: "queue rejected batch".into(),
                });
            }
            Ok(batch
                .iter()
                .map(|r| EvaluationOutcome::ok(r.parameters.iter().map(|x| x * x).sum()))
                .collect())
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn backend_error_ends_the_run() {
        let mut evaluator = Evaluator::new(
            Box::new(FailsOnSecondBatch(AtomicUsize::new(0))),
            Box::new(ValueExtractor),
            1e10,
        );
        let descent = GradientDescent::new(
            Box::new(Adam::new(&AdamSettings::default(), 1)),
            GradientEstimator::new(1e-6, 1e-3),
            IterationBudget::new(10),
            vec![2.0],
        );
        let outcome = descent.run(&mut evaluator).await.unwrap();
        assert_eq!(outcome.status, RunStatus::BackendFailure);
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.message.unwrap().contains("queue rejected batch"));
    }
}
