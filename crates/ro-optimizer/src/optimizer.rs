//! Run assembly and reporting.

use chrono::{DateTime, Utc};
use ro_types::{config_error, internal_error, OptResult, ParameterVector};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::EvaluationBackend;
use crate::config::{AlgorithmConfig, RunConfig, RunId};
use crate::descent::GradientDescent;
use crate::direct::DirectSearch;
use crate::evaluator::Evaluator;
use crate::extract::{Extractor, ValueExtractor};
use crate::gradient::GradientEstimator;
use crate::history::History;
use crate::population::{build_algorithm, AskTell, PopulationAdapter};
use crate::solution::BestSolution;
use crate::step::build_step_rule;
use crate::termination::{IterationBudget, RunOutcome, RunStatus};

/// Everything known about a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub id: RunId,
    pub name: String,
    pub algorithm: String,
    pub backend: String,
    pub status: RunStatus,
    pub message: String,

    /// Best point observed during the run.
    pub optimized_parameters: ParameterVector,
    pub final_value: f64,
    /// Backend reference of the best evaluation, when `get_best` is set.
    pub best_reference: Option<String>,

    /// Where the algorithm itself stopped.
    pub final_parameters: ParameterVector,
    pub iterations: usize,
    pub evaluations: usize,
    pub failed_evaluations: usize,
    pub history: History,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OptimizationReport {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn to_json(&self) -> OptResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Configures an [`Optimizer`].
///
/// ```ignore
/// let report = OptimizerBuilder::new(config)
///     .backend(LocalBackend::new(|x: &[f64]| Some(x.iter().map(|v| v * v).sum())))
///     .build()?
///     .run()
///     .await?;
/// ```
pub struct OptimizerBuilder {
    config: RunConfig,
    backend: Option<Box<dyn EvaluationBackend>>,
    extractor: Option<Box<dyn Extractor>>,
    population_algorithm: Option<Box<dyn AskTell>>,
}

impl OptimizerBuilder {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            backend: None,
            extractor: None,
            population_algorithm: None,
        }
    }

    pub fn backend<B: EvaluationBackend + 'static>(mut self, backend: B) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Defaults to [`ValueExtractor`].
    pub fn extractor<E: Extractor + 'static>(mut self, extractor: E) -> Self {
        self.extractor = Some(Box::new(extractor));
        self
    }

    /// Use a custom ask/tell algorithm instead of a registered one.
    pub fn population_algorithm<A: AskTell + 'static>(mut self, algorithm: A) -> Self {
        self.population_algorithm = Some(Box::new(algorithm));
        self
    }

    pub fn build(self) -> OptResult<Optimizer> {
        let Self {
            config,
            backend,
            extractor,
            population_algorithm,
        } = self;
        config.validate()?;

        let backend = backend.ok_or_else(|| config_error!("no evaluation backend configured"))?;
        let extractor: Box<dyn Extractor> = extractor.unwrap_or_else(|| Box::new(ValueExtractor));
        let budget = IterationBudget::new(config.itmax);

        if population_algorithm.is_some() && !matches!(config.algorithm, AlgorithmConfig::Population(_)) {
            return Err(config_error!(
                "a population algorithm was supplied but the run is configured for {}",
                config.algorithm.name()
            ));
        }

        let driver = match &config.algorithm {
            AlgorithmConfig::Direct(settings) => {
                let bounds = config.bounds.clone().ok_or_else(|| config_error!("direct requires bounds"))?;
                Driver::Direct(DirectSearch::new(settings.clone(), bounds, budget))
            }
            AlgorithmConfig::Population(settings) => {
                let bounds = config
                    .bounds
                    .clone()
                    .ok_or_else(|| config_error!("population algorithms require bounds"))?;
                let algorithm = match population_algorithm {
                    Some(algorithm) => algorithm,
                    None => build_algorithm(
                        &settings.algorithm_name,
                        &settings.algorithm_settings,
                        &bounds,
                        config.seed,
                    )?,
                };
                Driver::Population(PopulationAdapter::new(algorithm, bounds, budget))
            }
            gradient_family => {
                let initial = config
                    .initial_parameters
                    .clone()
                    .ok_or_else(|| config_error!("{} requires initial_parameters", gradient_family.name()))?;
                let settings = gradient_family
                    .gradient_settings()
                    .ok_or_else(|| internal_error!("{} has no gradient settings", gradient_family.name()))?;
                let rule = build_step_rule(gradient_family, initial.len(), config.seed)
                    .ok_or_else(|| internal_error!("{} has no step rule", gradient_family.name()))?;
                Driver::Descent(GradientDescent::new(
                    rule,
                    GradientEstimator::from_settings(settings),
                    budget,
                    initial,
                ))
            }
        };

        let evaluator = Evaluator::new(backend, extractor, config.penalty);
        Ok(Optimizer {
            config,
            evaluator,
            driver,
        })
    }
}

enum Driver {
    Descent(GradientDescent),
    Direct(DirectSearch),
    Population(PopulationAdapter),
}

impl Driver {
    fn name(&self) -> &str {
        match self {
            Self::Descent(descent) => descent.rule_name(),
            Self::Direct(_) => "direct",
            Self::Population(adapter) => adapter.algorithm_name(),
        }
    }

    async fn run(self, evaluator: &mut Evaluator) -> OptResult<RunOutcome> {
        match self {
            Self::Descent(descent) => descent.run(evaluator).await,
            Self::Direct(direct) => direct.run(evaluator).await,
            Self::Population(adapter) => adapter.run(evaluator).await,
        }
    }
}

/// A configured run, ready to start.
pub struct Optimizer {
    config: RunConfig,
    evaluator: Evaluator,
    driver: Driver,
}

impl Optimizer {
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn algorithm_name(&self) -> &str {
        self.driver.name()
    }

    /// Drive the run to completion.
    ///
    /// Algorithm-level endings (max iterations, stuck, backend failure) are
    /// reported through [`OptimizationReport::status`]; `Err` is reserved for
    /// misconfiguration and internal faults.
    pub async fn run(self) -> OptResult<OptimizationReport> {
        let Self {
            config,
            mut evaluator,
            driver,
        } = self;
        let started_at = Utc::now();
        let algorithm = driver.name().to_string();
        let backend = evaluator.backend_name().to_string();

        info!(
            run_id = %config.id,
            name = %config.name,
            algorithm = %algorithm,
            backend = %backend,
            itmax = config.itmax,
            "starting optimization run"
        );

        let outcome = driver.run(&mut evaluator).await?;
        let best = outcome
            .reported
            .clone()
            .or_else(|| evaluator.best().cloned())
            .unwrap_or_else(|| BestSolution {
                parameters: outcome.final_parameters.clone(),
                value: outcome.final_value.unwrap_or(config.penalty),
                reference: None,
            });

        if evaluator.evaluations() > 0 && evaluator.failures() == evaluator.evaluations() {
            warn!(
                run_id = %config.id,
                evaluations = evaluator.evaluations(),
                "no evaluation succeeded, the reported value is the penalty"
            );
        }

        let message = outcome
            .message
            .clone()
            .unwrap_or_else(|| outcome.status.to_string());
        if outcome.status.is_success() {
            info!(
                run_id = %config.id,
                status = %outcome.status,
                best_value = best.value,
                iterations = outcome.iterations,
                evaluations = evaluator.evaluations(),
                "optimization run finished"
            );
        } else {
            warn!(
                run_id = %config.id,
                status = %outcome.status,
                message = %message,
                best_value = best.value,
                iterations = outcome.iterations,
                "optimization run ended without success"
            );
        }

        Ok(OptimizationReport {
            id: config.id,
            name: config.name,
            algorithm,
            backend,
            status: outcome.status,
            message,
            optimized_parameters: best.parameters,
            final_value: best.value,
            best_reference: if config.get_best { best.reference } else { None },
            final_parameters: outcome.final_parameters,
            iterations: outcome.iterations,
            evaluations: evaluator.evaluations(),
            failed_evaluations: evaluator.failures(),
            history: outcome.history,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{sphere, RecordingBackend};
    use crate::config::{
        AdamSettings, BfgsSettings, ConjugateGradientSettings, DirectSettings, PopulationSettings,
        RmsPropSettings,
    };
    use ro_types::{BackendError, BackendResult, Bounds, EvaluationOutcome, EvaluationRequest, OptError};

    fn gradient_config(algorithm: AlgorithmConfig, itmax: usize) -> RunConfig {
        RunConfig::new("sphere", algorithm)
            .with_initial_parameters(vec![1.5, -0.8])
            .with_itmax(itmax)
    }

    async fn run_sphere(config: RunConfig) -> OptimizationReport {
        OptimizerBuilder::new(config)
            .backend(RecordingBackend::new(sphere))
            .build()
            .unwrap()
            .run()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn bfgs_converges_on_the_sphere() {
        let report = run_sphere(gradient_config(AlgorithmConfig::Bfgs(BfgsSettings::default()), 50)).await;
        assert_eq!(report.status, RunStatus::Converged);
        assert!(report.final_value < 1e-6);
        assert!(report.optimized_parameters.iter().all(|x| x.abs() < 1e-3));

        // every accepted step satisfies the sufficient-decrease condition
        let values = report.history.values();
        assert!(values.windows(2).all(|w| w[1] <= w[0]), "{values:?}");
    }

    #[tokio::test]
    async fn conjugate_gradient_converges_on_the_sphere() {
        let report = run_sphere(gradient_config(
            AlgorithmConfig::ConjugateGradient(ConjugateGradientSettings::default()),
            100,
        ))
        .await;
        assert_eq!(report.status, RunStatus::Converged);
        assert!(report.final_value < 1e-6);
    }

    #[tokio::test]
    async fn adaptive_rates_converge_on_the_sphere() {
        let rmsprop = RmsPropSettings {
            learning_rate: 0.05,
            ..Default::default()
        };
        for algorithm in [AlgorithmConfig::RmsProp(rmsprop), AlgorithmConfig::Adam(AdamSettings::default())] {
            let name = algorithm.name().to_string();
            let report = run_sphere(gradient_config(algorithm, 200)).await;
            assert_eq!(report.status, RunStatus::Converged, "{name}");
            assert!(report.final_value < 1e-6, "{name}: {}", report.final_value);
            assert!(
                report.optimized_parameters.iter().all(|x| x.abs() < 1e-3),
                "{name}: {:?}",
                report.optimized_parameters
            );
            assert_eq!(report.history.entries()[0].iteration, 1);
            let values = report.history.values();
            assert!(values.last().unwrap() < &values[0], "{name}");
        }
    }

    #[tokio::test]
    async fn reports_best_reference_when_requested() {
        let bounds = Bounds::from_pairs(&[[-1.0, 2.0], [-2.0, 1.0]]).unwrap();
        let config = RunConfig::new("direct", AlgorithmConfig::Direct(DirectSettings::default()))
            .with_bounds(bounds)
            .with_itmax(10)
            .with_get_best(true);
        let report = run_sphere(config.clone()).await;
        assert!(report.best_reference.unwrap().starts_with("eval-"));
        assert_eq!(report.iterations, 10);
        assert_eq!(report.status, RunStatus::MaxIterations);

        let report = run_sphere(config.with_get_best(false)).await;
        assert_eq!(report.best_reference, None);
    }

    #[tokio::test]
    async fn all_failures_fall_back_to_the_penalty() {
        let config = RunConfig::new(
            "broken",
            AlgorithmConfig::Population(PopulationSettings {
                algorithm_name: "RANDOM".into(),
                algorithm_settings: serde_json::from_str(r#"{"pop_size": 5}"#).unwrap(),
            }),
        )
        .with_bounds(Bounds::from_pairs(&[[0.0, 1.0]]).unwrap())
        .with_itmax(3)
        .with_penalty(1e6);

        let report = OptimizerBuilder::new(config)
            .backend(RecordingBackend::new(|_: &[f64]| None))
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.final_value, 1e6);
        assert_eq!(report.evaluations, 15);
        assert_eq!(report.failed_evaluations, 15);
        assert_eq!(report.optimized_parameters.len(), 1);
    }

    struct Offline;

    #[async_trait::async_trait]
    impl EvaluationBackend for Offline {
        async fn submit(&self, _batch: Vec<EvaluationRequest>) -> BackendResult<Vec<EvaluationOutcome>> {
            Err(BackendError::Unavailable {
                message: "no workers".into(),
            })
        }

        fn name(&self) -> &str {
            "offline"
        }
    }

    #[tokio::test]
    async fn backend_failure_is_reported_not_raised() {
        let config = gradient_config(AlgorithmConfig::Adam(AdamSettings::default()), 10);
        let report = OptimizerBuilder::new(config)
            .backend(Offline)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::BackendFailure);
        assert!(report.message.contains("no workers"));
        assert_eq!(report.iterations, 0);
        assert_eq!(report.final_value, 1e10);
        assert_eq!(report.optimized_parameters, vec![1.5, -0.8]);
    }

    #[test]
    fn build_rejects_incomplete_setups() {
        let config = gradient_config(AlgorithmConfig::Adam(AdamSettings::default()), 10);
        assert!(matches!(
            OptimizerBuilder::new(config.clone()).build().err(),
            Some(OptError::Config(_))
        ));

        let err = OptimizerBuilder::new(config)
            .backend(Offline)
            .population_algorithm(crate::population::RandomSampling::new(
                Default::default(),
                Bounds::from_pairs(&[[0.0, 1.0], [0.0, 1.0]]).unwrap(),
                None,
            )
            .unwrap())
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("adam"));
    }

    #[tokio::test]
    async fn report_serializes() {
        let report = run_sphere(gradient_config(AlgorithmConfig::Bfgs(BfgsSettings::default()), 5)).await;
        let json = report.to_json().unwrap();
        let back: OptimizationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, report.status);
        assert_eq!(back.history.len(), report.history.len());
    }
}
