//! Batched, failure-tolerant evaluation.

use std::collections::HashMap;

use ro_types::{
    BackendError, EvaluationOutcome, EvaluationRequest, OptResult, ParameterVector, RequestId,
};
use tracing::{debug, warn};

use crate::backend::EvaluationBackend;
use crate::extract::{Extracted, Extractor, PenaltyPolicy};
use crate::solution::{BestSolution, BestTracker};

/// One evaluated candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub parameters: ParameterVector,
    pub value: f64,
    pub succeeded: bool,
    pub reference: Option<String>,
}

/// The scalars for one batch, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluatedBatch {
    pub evaluations: Vec<Evaluation>,
}

impl EvaluatedBatch {
    pub fn len(&self) -> usize {
        self.evaluations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluations.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.evaluations.iter().map(|e| e.value).collect()
    }

    pub fn failures(&self) -> usize {
        self.evaluations.iter().filter(|e| !e.succeeded).count()
    }

    /// Lowest-valued member; earliest index wins ties.
    pub fn best(&self) -> Option<&Evaluation> {
        self.evaluations
            .iter()
            .fold(None, |best: Option<&Evaluation>, e| match best {
                Some(b) if b.value <= e.value => Some(b),
                _ => Some(e),
            })
    }
}

/// Submits batches to a backend and turns the outcomes into scalars.
///
/// Every successfully evaluated point is offered to the run's best-so-far
/// tracker, so line-search probes and population members count as well.
pub struct Evaluator {
    backend: Box<dyn EvaluationBackend>,
    policy: PenaltyPolicy,
    best: BestTracker,
    batches: usize,
    evaluations: usize,
    failures: usize,
}

impl Evaluator {
    pub fn new(backend: Box<dyn EvaluationBackend>, extractor: Box<dyn Extractor>, penalty: f64) -> Self {
        Self {
            backend,
            policy: PenaltyPolicy::new(extractor, penalty),
            best: BestTracker::new(),
            batches: 0,
            evaluations: 0,
            failures: 0,
        }
    }

    pub fn penalty(&self) -> f64 {
        self.policy.penalty()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Evaluate `points` as a single batch and wait for all of them.
    pub async fn evaluate(&mut self, points: Vec<ParameterVector>) -> OptResult<EvaluatedBatch> {
        if points.is_empty() {
            return Ok(EvaluatedBatch::default());
        }

        let requests = EvaluationRequest::batch(points);
        debug!(
            backend = self.backend.name(),
            batch_size = requests.len(),
            "submitting evaluation batch"
        );
        let outcomes = self.backend.submit(requests.clone()).await?;
        let ordered = correlate(&requests, outcomes)?;
        let extracted = self.policy.apply_batch(&ordered);

        let evaluations: Vec<Evaluation> = requests
            .into_iter()
            .zip(extracted)
            .map(|(request, Extracted { value, succeeded, reference })| Evaluation {
                parameters: request.parameters,
                value,
                succeeded,
                reference,
            })
            .collect();

        for evaluation in evaluations.iter().filter(|e| e.succeeded) {
            self.best.offer(
                &evaluation.parameters,
                evaluation.value,
                evaluation.reference.as_deref(),
            );
        }

        let batch = EvaluatedBatch { evaluations };
        self.batches += 1;
        self.evaluations += batch.len();
        self.failures += batch.failures();
        Ok(batch)
    }

    pub fn best(&self) -> Option<&BestSolution> {
        self.best.get()
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn failures(&self) -> usize {
        self.failures
    }
}

/// Put outcomes back into request order.
///
/// Outcomes tagged with a request id go to that request. Untagged outcomes
/// fill the slot at their own position. Requests left without an outcome
/// stay `None` and are penalised downstream.
fn correlate(
    requests: &[EvaluationRequest],
    outcomes: Vec<EvaluationOutcome>,
) -> Result<Vec<Option<EvaluationOutcome>>, BackendError> {
    if outcomes.len() > requests.len() {
        return Err(BackendError::BatchSizeMismatch {
            expected: requests.len(),
            returned: outcomes.len(),
        });
    }

    let slots: HashMap<RequestId, usize> = requests.iter().map(|r| (r.id, r.index)).collect();
    let mut ordered: Vec<Option<EvaluationOutcome>> = vec![None; requests.len()];
    let mut untagged = Vec::new();

    for (position, outcome) in outcomes.into_iter().enumerate() {
        match outcome.request_id {
            Some(id) => match slots.get(&id) {
                Some(&slot) if ordered[slot].is_none() => ordered[slot] = Some(outcome),
                Some(&slot) => warn!(slot, "duplicate outcome for request, ignoring"),
                None => warn!(request_id = %id, "outcome for unknown request, ignoring"),
            },
            None => untagged.push((position, outcome)),
        }
    }

    for (position, outcome) in untagged {
        if ordered[position].is_none() {
            ordered[position] = Some(outcome);
        } else {
            warn!(position, "untagged outcome collides with a tagged one, ignoring");
        }
    }

    Ok(ordered)
}
