//! A complete run description: optimizer config plus where to evaluate.

use ro_optimizer::{JsonPointerExtractor, OptimizationReport, OptimizerBuilder, RunConfig};
use ro_types::{config_error, OptResult};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::command::{CommandBackend, CommandConfig};
use crate::pool::{TaskPoolBackend, TaskPoolConfig};
use crate::problems;

/// Where evaluations run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveSpec {
    /// A built-in benchmark evaluated on the task pool.
    Benchmark(String),
    /// An external program, one process per request.
    Command(CommandConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub run: RunConfig,
    pub objective: ObjectiveSpec,
    #[serde(default)]
    pub pool: TaskPoolConfig,
    /// JSON pointer into the raw output; defaults to the outcome's `value`.
    #[serde(default)]
    pub value_pointer: Option<String>,
}

impl JobSpec {
    pub fn from_json(json: &str) -> OptResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Build the backend for `spec` and drive the run to completion.
pub async fn run_job(spec: JobSpec) -> OptResult<OptimizationReport> {
    let JobSpec {
        run,
        objective,
        pool,
        value_pointer,
    } = spec;
    info!(
        run = %run.name,
        algorithm = run.algorithm.name(),
        max_concurrent_tasks = pool.max_concurrent_tasks,
        "preparing job"
    );

    let builder = OptimizerBuilder::new(run);
    let builder = match objective {
        ObjectiveSpec::Benchmark(name) => {
            let problem = problems::by_name(&name)
                .ok_or_else(|| config_error!("unknown benchmark '{name}', expected sphere, ackley or rastrigin"))?;
            builder.backend(TaskPoolBackend::new(problem, pool))
        }
        ObjectiveSpec::Command(command) => builder.backend(CommandBackend::new(command, pool)),
    };
    let builder = match value_pointer {
        Some(pointer) => builder.extractor(JsonPointerExtractor::new(pointer)),
        None => builder,
    };

    builder.build()?.run().await
}
