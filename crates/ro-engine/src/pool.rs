//! In-process task pool backend.

use std::sync::Arc;

use async_trait::async_trait;
use ro_optimizer::EvaluationBackend;
use ro_types::{BackendError, BackendResult, EvaluationOutcome, EvaluationRequest};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::problems::Objective;

/// Worker limits for the task pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPoolConfig {
    /// Maximum number of evaluations running at once.
    pub max_concurrent_tasks: usize,
}

impl Default for TaskPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
        }
    }
}

/// Runs every request of a batch on the blocking thread pool.
///
/// At most `max_concurrent_tasks` evaluations run at once; `submit`
/// resolves only when the whole batch is done.
pub struct TaskPoolBackend {
    objective: Arc<dyn Objective>,
    permits: Arc<Semaphore>,
    config: TaskPoolConfig,
}

impl TaskPoolBackend {
    pub fn new(objective: Arc<dyn Objective>, config: TaskPoolConfig) -> Self {
        let limit = config.max_concurrent_tasks.max(1);
        Self {
            objective,
            permits: Arc::new(Semaphore::new(limit)),
            config,
        }
    }

    pub fn config(&self) -> &TaskPoolConfig {
        &self.config
    }
}

#[async_trait]
impl EvaluationBackend for TaskPoolBackend {
    async fn submit(&self, batch: Vec<EvaluationRequest>) -> BackendResult<Vec<EvaluationOutcome>> {
        debug!(
            objective = self.objective.name(),
            batch_size = batch.len(),
            max_concurrent_tasks = self.config.max_concurrent_tasks,
            "dispatching batch to task pool"
        );

        let mut handles = Vec::with_capacity(batch.len());
        for request in batch {
            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|err| BackendError::Internal {
                    message: format!("task pool closed: {err}"),
                })?;
            let objective = Arc::clone(&self.objective);
            let (id, index) = (request.id, request.index);
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                objective.evaluate(&request.parameters)
            });
            handles.push((id, index, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (id, index, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(value)) => EvaluationOutcome::ok(value),
                Ok(Err(message)) => EvaluationOutcome::failed(message),
                Err(err) => {
                    warn!(index, error = %err, "evaluation task did not complete");
                    EvaluationOutcome::failed(format!("evaluation task failed: {err}"))
                }
            };
            let mut outcome = outcome.with_reference(format!("task-{index}"));
            outcome.request_id = Some(id);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn name(&self) -> &str {
        "task-pool"
    }
}
