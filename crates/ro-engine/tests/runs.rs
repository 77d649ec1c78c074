use std::sync::Arc;

use ro_engine::{run_job, CommandConfig, JobSpec, ObjectiveSpec, TaskPoolBackend, TaskPoolConfig};
use ro_optimizer::{
    AlgorithmConfig, BfgsSettings, ConjugateGradientSettings, DirectSettings, OptimizerBuilder,
    PopulationSettings, RunConfig, RunStatus,
};
use ro_types::Bounds;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

fn job(run: RunConfig, benchmark: &str) -> JobSpec {
    JobSpec {
        run,
        objective: ObjectiveSpec::Benchmark(benchmark.into()),
        pool: TaskPoolConfig { max_concurrent_tasks: 4 },
        value_pointer: None,
    }
}

#[tokio::test]
async fn bfgs_on_the_task_pool() {
    init_tracing();
    let run = RunConfig::new("bfgs-sphere", AlgorithmConfig::Bfgs(BfgsSettings::default()))
        .with_initial_parameters(vec![2.0, -1.0, 0.5])
        .with_itmax(20)
        .with_get_best(true);

    let report = run_job(job(run, "sphere")).await.unwrap();
    assert_eq!(report.status, RunStatus::Converged);
    assert_eq!(report.backend, "task-pool");
    assert!(report.final_value < 1e-6);
    assert!(report.best_reference.unwrap().starts_with("task-"));
    assert_eq!(report.failed_evaluations, 0);
}

#[tokio::test]
async fn conjugate_gradient_through_the_builder() {
    init_tracing();
    let config = RunConfig::new(
        "cg-sphere",
        AlgorithmConfig::ConjugateGradient(ConjugateGradientSettings::default()),
    )
    .with_initial_parameters(vec![1.0, 1.0])
    .with_itmax(100);
    let backend = TaskPoolBackend::new(Arc::new(ro_engine::Sphere), TaskPoolConfig::default());

    let report = OptimizerBuilder::new(config)
        .backend(backend)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();
    assert!(report.is_success());
    // n + 1 evaluations per iteration
    assert_eq!(report.evaluations, 3 * report.iterations);
}

#[tokio::test]
async fn direct_finds_the_rastrigin_basin() {
    init_tracing();
    let run = RunConfig::new("direct-rastrigin", AlgorithmConfig::Direct(DirectSettings::default()))
        .with_bounds(Bounds::from_pairs(&[[-5.12, 4.0], [-3.0, 5.12]]).unwrap())
        .with_itmax(60);

    let report = run_job(job(run, "rastrigin")).await.unwrap();
    assert_eq!(report.status, RunStatus::MaxIterations);
    assert_eq!(report.history.len(), 60);
    // greedy refinement settles in the basin next to the global minimum
    assert!(report.final_value < 2.5, "value {}", report.final_value);
    let values = report.history.values();
    assert!(values.windows(2).all(|w| w[1] <= w[0]));
}

#[tokio::test]
async fn particle_swarm_on_ackley() {
    init_tracing();
    let run = RunConfig::new(
        "pso-ackley",
        AlgorithmConfig::Population(PopulationSettings {
            algorithm_name: "PSO".into(),
            algorithm_settings: serde_json::from_str(r#"{"pop_size": 30}"#).unwrap(),
        }),
    )
    .with_bounds(Bounds::from_pairs(&[[-5.0, 5.0], [-5.0, 5.0]]).unwrap())
    .with_itmax(60)
    .with_seed(11);

    let report = run_job(job(run, "ackley")).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.evaluations, 30 * 60);
    assert!(report.final_value < 0.5, "value {}", report.final_value);
    assert!(report.optimized_parameters.iter().all(|x| x.abs() <= 5.0));
}

#[cfg(unix)]
#[tokio::test]
async fn command_backend_runs_a_shell_objective() {
    init_tracing();
    let run = RunConfig::new(
        "random-command",
        AlgorithmConfig::Population(PopulationSettings {
            algorithm_name: "RANDOM".into(),
            algorithm_settings: serde_json::from_str(r#"{"pop_size": 3}"#).unwrap(),
        }),
    )
    .with_bounds(Bounds::from_pairs(&[[0.0, 1.0]]).unwrap())
    .with_itmax(2)
    .with_penalty(1e3);

    // ignores its input and reports the configured constant under a nested key
    let command = CommandConfig::new("sh")
        .with_args(["-c", r#"cat > /dev/null; echo "{\"result\": {\"energy\": $ENERGY}}""#])
        .with_env("ENERGY", "-2.5");
    let spec = JobSpec {
        run,
        objective: ObjectiveSpec::Command(command),
        pool: TaskPoolConfig { max_concurrent_tasks: 2 },
        value_pointer: Some("/result/energy".into()),
    };

    let report = run_job(spec).await.unwrap();
    assert_eq!(report.evaluations, 6);
    assert_eq!(report.failed_evaluations, 0);
    assert_eq!(report.final_value, -2.5);
}

#[cfg(unix)]
#[tokio::test]
async fn failing_and_slow_commands_are_penalised() {
    init_tracing();
    let run = RunConfig::new("bfgs-command", AlgorithmConfig::Bfgs(BfgsSettings::default()))
        .with_initial_parameters(vec![0.0])
        .with_itmax(1)
        .with_penalty(42.0);

    let command = CommandConfig::new("sh")
        .with_args(["-c", "sleep 5"])
        .with_timeout(std::time::Duration::from_millis(100));
    let spec = JobSpec {
        run,
        objective: ObjectiveSpec::Command(command),
        pool: TaskPoolConfig::default(),
        value_pointer: None,
    };

    let report = run_job(spec).await.unwrap();
    assert_eq!(report.status, RunStatus::EvaluationsFailed);
    assert!(!report.is_success());
    assert_eq!(report.evaluations, 2);
    assert_eq!(report.failed_evaluations, 2);
    assert_eq!(report.final_value, 42.0);
}
