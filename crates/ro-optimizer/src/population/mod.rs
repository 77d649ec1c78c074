//! Population algorithms driven through an ask/tell interface.
//!
//! The adapter owns the loop: each iteration asks the algorithm for a
//! generation, clamps it into the bounds, evaluates it as one batch and
//! tells the algorithm the scalars. Custom algorithms plug in through
//! [`AskTell`]; the built-ins are looked up by name with [`build_algorithm`].

mod de;
mod pso;
mod random;

use ro_types::{config_error, validation_error, Bounds, OptResult, ParameterVector};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::evaluator::Evaluator;
use crate::history::{History, HistoryEntry};
use crate::solution::{BestSolution, BestTracker};
use crate::termination::{backend_failure, IterationBudget, RunOutcome, RunStatus};

pub use de::{DeSettings, DifferentialEvolution};
pub use pso::{ParticleSwarm, PsoSettings};
pub use random::{RandomSampling, RandomSettings};

/// Population size used when the settings do not name one.
pub const DEFAULT_POP_SIZE: usize = 100;

/// Names accepted by [`build_algorithm`].
pub const REGISTERED_ALGORITHMS: &[&str] = &["PSO", "DE", "RANDOM"];

/// Core interface for population algorithms.
pub trait AskTell: Send {
    /// Candidates for the next generation.
    fn ask(&mut self) -> Vec<ParameterVector>;

    /// Fitness values for the last `ask`, in the same order.
    fn tell(&mut self, fitness: &[f64]) -> OptResult<()>;

    /// Best point and value the algorithm knows of.
    fn result(&self) -> Option<(ParameterVector, f64)>;

    /// Human-readable algorithm name.
    fn name(&self) -> &str;
}

// ---- Registry ----

/// Instantiate a built-in algorithm by name.
///
/// Names are case-insensitive. Unknown names and unknown setting keys are
/// configuration errors.
pub fn build_algorithm(
    name: &str,
    settings: &Map<String, Value>,
    bounds: &Bounds,
    seed: Option<u64>,
) -> OptResult<Box<dyn AskTell>> {
    match name.to_ascii_uppercase().as_str() {
        "PSO" => Ok(Box::new(ParticleSwarm::new(
            parse_settings(name, settings)?,
            bounds.clone(),
            seed,
        )?)),
        "DE" => Ok(Box::new(DifferentialEvolution::new(
            parse_settings(name, settings)?,
            bounds.clone(),
            seed,
        )?)),
        "RANDOM" => Ok(Box::new(RandomSampling::new(
            parse_settings(name, settings)?,
            bounds.clone(),
            seed,
        )?)),
        _ => Err(config_error!(
            "unknown population algorithm '{name}', expected one of {}",
            REGISTERED_ALGORITHMS.join(", ")
        )),
    }
}

fn parse_settings<T: DeserializeOwned>(algorithm: &str, settings: &Map<String, Value>) -> OptResult<T> {
    serde_json::from_value(Value::Object(settings.clone()))
        .map_err(|err| config_error!("invalid settings for {algorithm}: {err}"))
}

pub(crate) fn check_pop_size(algorithm: &str, pop_size: usize, minimum: usize) -> OptResult<()> {
    if pop_size < minimum {
        return Err(config_error!(
            "{algorithm} needs pop_size >= {minimum}, got {pop_size}"
        ));
    }
    Ok(())
}

pub(crate) fn check_finite(algorithm: &str, setting: &str, value: f64) -> OptResult<()> {
    if !value.is_finite() {
        return Err(config_error!("{algorithm} needs a finite {setting}, got {value}"));
    }
    Ok(())
}

pub(crate) fn check_fitness_len(algorithm: &str, expected: usize, fitness: &[f64]) -> OptResult<()> {
    if fitness.len() != expected {
        return Err(validation_error!(
            "{algorithm} asked for {expected} evaluations but was told {}",
            fitness.len()
        ));
    }
    Ok(())
}

// ---- Adapter ----

/// Runs an [`AskTell`] algorithm for a fixed number of generations.
pub struct PopulationAdapter {
    algorithm: Box<dyn AskTell>,
    bounds: Bounds,
    budget: IterationBudget,
}

impl PopulationAdapter {
    pub fn new(algorithm: Box<dyn AskTell>, bounds: Bounds, budget: IterationBudget) -> Self {
        Self {
            algorithm,
            bounds,
            budget,
        }
    }

    pub fn algorithm_name(&self) -> &str {
        self.algorithm.name()
    }

    pub async fn run(mut self, evaluator: &mut Evaluator) -> OptResult<RunOutcome> {
        let mut history = History::new();
        let mut observed = BestTracker::new();
        let mut final_parameters = Vec::new();

        for iteration in 1..=self.budget.itmax() {
            let mut candidates = self.algorithm.ask();
            if candidates.is_empty() {
                warn!(iteration, algorithm = self.algorithm.name(), "algorithm proposed no candidates, stopping");
                break;
            }

            let mut clamped = 0;
            for candidate in &mut candidates {
                if candidate.len() != self.bounds.dim() {
                    return Err(validation_error!(
                        "{} proposed a {}-dimensional candidate for a {}-dimensional problem",
                        self.algorithm.name(),
                        candidate.len(),
                        self.bounds.dim()
                    ));
                }
                if self.bounds.clamp(candidate) {
                    clamped += 1;
                }
            }
            if clamped > 0 {
                debug!(iteration, clamped, "clamped out-of-bounds candidates");
            }

            let batch = match evaluator.evaluate(candidates).await {
                Ok(batch) => batch,
                Err(err) => {
                    let message = backend_failure(err)?;
                    let reported = self.reported(&observed);
                    return Ok(RunOutcome::new(RunStatus::BackendFailure, history, final_parameters)
                        .with_message(message)
                        .with_reported(reported));
                }
            };
            self.algorithm.tell(&batch.values())?;

            if let Some(best) = batch.best() {
                observed.offer(&best.parameters, best.value, best.reference.as_deref());
                final_parameters = best.parameters.clone();
                history.record(
                    HistoryEntry::new(iteration, &best.parameters, best.value)
                        .with_reference(best.reference.clone()),
                );
                debug!(iteration, best_value = best.value, failures = batch.failures(), "generation evaluated");
            }
        }

        info!(
            algorithm = self.algorithm.name(),
            generations = history.len(),
            "population run completed"
        );
        let reported = self.reported(&observed);
        Ok(RunOutcome::new(RunStatus::Completed, history, final_parameters).with_reported(reported))
    }

    /// The algorithm's own result, with the reference of the matching evaluation.
    ///
    /// A result outside the bounds was never evaluated as such, so the best
    /// observed evaluation is reported instead.
    fn reported(&self, observed: &BestTracker) -> Option<BestSolution> {
        let Some((parameters, value)) = self.algorithm.result() else {
            return observed.get().cloned();
        };
        if !self.bounds.contains(&parameters) {
            warn!(
                algorithm = self.algorithm.name(),
                "algorithm result lies outside the bounds, reporting the best evaluated point"
            );
            return observed.get().cloned();
        }
        let reference = observed
            .get()
            .filter(|best| best.parameters == parameters)
            .and_then(|best| best.reference.clone());
        Some(BestSolution {
            parameters,
            value,
            reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{sphere, RecordingBackend};
    use crate::extract::ValueExtractor;
    use std::sync::{Arc, Mutex};

    /// Always proposes the same fixed generation and records what it is told.
    struct Scripted {
        generation: Vec<ParameterVector>,
        told: Arc<Mutex<Vec<Vec<f64>>>>,
        claim: Option<(ParameterVector, f64)>,
    }

    impl Scripted {
        fn new(generation: Vec<ParameterVector>) -> Self {
            Self {
                generation,
                told: Arc::new(Mutex::new(Vec::new())),
                claim: None,
            }
        }
    }

    impl AskTell for Scripted {
        fn ask(&mut self) -> Vec<ParameterVector> {
            self.generation.clone()
        }

        fn tell(&mut self, fitness: &[f64]) -> OptResult<()> {
            self.told.lock().unwrap().push(fitness.to_vec());
            Ok(())
        }

        fn result(&self) -> Option<(ParameterVector, f64)> {
            self.claim.clone()
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn bounds() -> Bounds {
        Bounds::from_pairs(&[[-1.0, 1.0], [-1.0, 1.0]]).unwrap()
    }

    #[tokio::test]
    async fn one_iteration_is_one_batch_and_one_tell() {
        let told = Arc::new(Mutex::new(Vec::new()));
        let algorithm = Scripted {
            told: told.clone(),
            ..Scripted::new(vec![vec![0.5, 0.5], vec![0.0, 0.1], vec![-0.2, 0.0]])
        };
        let mut evaluator = Evaluator::new(Box::new(RecordingBackend::new(sphere)), Box::new(ValueExtractor), 1e10);

        let outcome = PopulationAdapter::new(Box::new(algorithm), bounds(), IterationBudget::new(1))
            .run(&mut evaluator)
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(evaluator.batches(), 1);
        let told = told.lock().unwrap();
        assert_eq!(told.len(), 1);
        assert_eq!(told[0].len(), 3);
        assert_eq!(outcome.final_parameters, vec![0.0, 0.1]);
    }

    #[tokio::test]
    async fn out_of_bounds_candidates_are_clamped() {
        let algorithm = Scripted::new(vec![vec![5.0, -3.0]]);
        let backend = Arc::new(RecordingBackend::new(sphere));
        let mut evaluator = Evaluator::new(
            Box::new(crate::backend::testing::Shared(backend.clone())),
            Box::new(ValueExtractor),
            1e10,
        );
        PopulationAdapter::new(Box::new(algorithm), bounds(), IterationBudget::new(2))
            .run(&mut evaluator)
            .await
            .unwrap();
        let batches = backend.batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0][0], vec![1.0, -1.0]);
    }

    #[tokio::test]
    async fn out_of_bounds_result_falls_back_to_the_evaluated_point() {
        let algorithm = Scripted {
            claim: Some((vec![5.0, -3.0], 2.0)),
            ..Scripted::new(vec![vec![5.0, -3.0], vec![0.5, 0.0]])
        };
        let mut evaluator = Evaluator::new(Box::new(RecordingBackend::new(sphere)), Box::new(ValueExtractor), 1e10);

        let outcome = PopulationAdapter::new(Box::new(algorithm), bounds(), IterationBudget::new(1))
            .run(&mut evaluator)
            .await
            .unwrap();

        let reported = outcome.reported.unwrap();
        assert!(bounds().contains(&reported.parameters));
        assert_eq!(reported.parameters, vec![0.5, 0.0]);
        assert_eq!(reported.value, 0.25);
        assert_eq!(reported.reference.as_deref(), Some("eval-1"));
    }

    #[tokio::test]
    async fn in_bounds_result_is_reported_as_is() {
        let algorithm = Scripted {
            claim: Some((vec![0.5, 0.0], 0.25)),
            ..Scripted::new(vec![vec![5.0, -3.0], vec![0.5, 0.0]])
        };
        let mut evaluator = Evaluator::new(Box::new(RecordingBackend::new(sphere)), Box::new(ValueExtractor), 1e10);

        let outcome = PopulationAdapter::new(Box::new(algorithm), bounds(), IterationBudget::new(1))
            .run(&mut evaluator)
            .await
            .unwrap();

        let reported = outcome.reported.unwrap();
        assert_eq!(reported.parameters, vec![0.5, 0.0]);
        assert_eq!(reported.reference.as_deref(), Some("eval-1"));
    }

    #[tokio::test]
    async fn wrong_dimension_is_an_error() {
        let algorithm = Scripted::new(vec![vec![0.0, 0.0, 0.0]]);
        let mut evaluator = Evaluator::new(Box::new(RecordingBackend::new(sphere)), Box::new(ValueExtractor), 1e10);
        let err = PopulationAdapter::new(Box::new(algorithm), bounds(), IterationBudget::new(1))
            .run(&mut evaluator)
            .await
            .unwrap_err();
        assert!(matches!(err, ro_types::OptError::Validation(_)));
        assert_eq!(evaluator.batches(), 0);
    }

    #[test]
    fn registry_rejects_unknown_names_and_keys() {
        let empty = Map::new();
        assert!(build_algorithm("pso", &empty, &bounds(), Some(1)).is_ok());
        assert_eq!(build_algorithm("DE", &empty, &bounds(), Some(1)).unwrap().name(), "DE");
        assert!(build_algorithm("NSGA2", &empty, &bounds(), None).is_err());

        let mut bad = Map::new();
        bad.insert("popsize".into(), Value::from(10));
        let err = build_algorithm("RANDOM", &bad, &bounds(), None).err().unwrap();
        assert!(err.to_string().contains("popsize"));
    }

    #[test]
    fn registry_rejects_unusable_coefficients() {
        let cases = [
            ("PSO", "max_velocity_rate", Value::from(-0.1)),
            ("PSO", "max_velocity_rate", Value::from(0.0)),
            ("DE", "cr", Value::from(1.5)),
            ("DE", "cr", Value::from(-0.1)),
        ];
        for (name, key, value) in cases {
            let mut settings = Map::new();
            settings.insert("pop_size".into(), Value::from(4));
            settings.insert(key.into(), value.clone());
            let result = build_algorithm(name, &settings, &bounds(), Some(3));
            assert!(
                matches!(result, Err(ro_types::OptError::Config(_))),
                "{name} {key}={value}"
            );
        }
    }

    #[tokio::test]
    async fn built_in_algorithms_improve_on_the_sphere() {
        for name in REGISTERED_ALGORITHMS {
            let mut settings = Map::new();
            settings.insert("pop_size".into(), Value::from(20));
            let algorithm = build_algorithm(name, &settings, &bounds(), Some(42)).unwrap();
            let mut evaluator = Evaluator::new(Box::new(RecordingBackend::new(sphere)), Box::new(ValueExtractor), 1e10);

            let outcome = PopulationAdapter::new(algorithm, bounds(), IterationBudget::new(30))
                .run(&mut evaluator)
                .await
                .unwrap();

            assert_eq!(outcome.iterations, 30, "{name}");
            assert_eq!(evaluator.evaluations(), 600, "{name}");
            let reported = outcome.reported.unwrap();
            assert!(reported.value < 0.05, "{name}: {}", reported.value);
            assert!(bounds().contains(&reported.parameters));
            assert_eq!(reported.reference.as_deref().map(|r| r.starts_with("eval-")), Some(true));
        }
    }
}
