//! Evaluation backend abstraction.

use async_trait::async_trait;
use ro_types::{BackendResult, EvaluationOutcome, EvaluationRequest};

/// Core evaluation interface.
///
/// A backend receives a whole batch and resolves it as a unit: the returned
/// future completes only when every request has an outcome. Outcomes either
/// carry the `request_id` they answer or are returned in request order.
/// Individual failures are reported as failed outcomes; an `Err` means the
/// batch as a whole could not be processed.
#[async_trait]
pub trait EvaluationBackend: Send + Sync {
    async fn submit(&self, batch: Vec<EvaluationRequest>) -> BackendResult<Vec<EvaluationOutcome>>;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}

/// Evaluates each request in-process, one after the other.
///
/// Useful for cheap objectives and for exercising the algorithms; expensive
/// objectives belong in a backend that dispatches the batch concurrently.
pub struct LocalBackend<F> {
    objective: F,
}

impl<F> LocalBackend<F>
where
    F: Fn(&[f64]) -> Option<f64> + Send + Sync,
{
    /// `objective` returns `None` for a failed evaluation.
    pub fn new(objective: F) -> Self {
        Self { objective }
    }
}

#[async_trait]
impl<F> EvaluationBackend for LocalBackend<F>
where
    F: Fn(&[f64]) -> Option<f64> + Send + Sync,
{
    async fn submit(&self, batch: Vec<EvaluationRequest>) -> BackendResult<Vec<EvaluationOutcome>> {
        Ok(batch
            .iter()
            .map(|request| {
                let outcome = match (self.objective)(&request.parameters) {
                    Some(value) => EvaluationOutcome::ok(value),
                    None => EvaluationOutcome::failed("objective returned no value"),
                };
                outcome.for_request(request)
            })
            .collect())
    }

    fn name(&self) -> &str {
        "local"
    }
}
