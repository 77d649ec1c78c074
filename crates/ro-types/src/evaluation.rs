//! Evaluation requests and outcomes exchanged with an evaluation backend.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An ordered point in parameter space. The dimension is fixed for one run.
pub type ParameterVector = Vec<f64>;

/// Unique evaluation request identifier.
pub type RequestId = Uuid;

/// A single point handed to the evaluation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub id: RequestId,
    /// Position of this request inside its batch.
    pub index: usize,
    pub parameters: ParameterVector,
}

impl EvaluationRequest {
    pub fn new(index: usize, parameters: ParameterVector) -> Self {
        Self {
            id: Uuid::new_v4(),
            index,
            parameters,
        }
    }

    /// Build a batch of requests, indexed in candidate order.
    pub fn batch(points: Vec<ParameterVector>) -> Vec<Self> {
        points
            .into_iter()
            .enumerate()
            .map(|(index, parameters)| Self::new(index, parameters))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Ok,
    Failed,
}

/// What the backend reports for one request.
///
/// `value` is the scalar when the backend already knows it; `output` holds
/// whatever raw payload the backend produced so an extractor can dig the
/// objective out of it. `reference` is an opaque handle to the backend's own
/// record of the evaluation (a job id, a database key, a file path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    /// Request this outcome answers. `None` means "same position as the request".
    #[serde(default)]
    pub request_id: Option<RequestId>,
    pub status: EvaluationStatus,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl EvaluationOutcome {
    pub fn ok(value: f64) -> Self {
        Self {
            request_id: None,
            status: EvaluationStatus::Ok,
            value: Some(value),
            output: serde_json::Value::Null,
            reference: None,
            message: None,
        }
    }

    /// A successful evaluation whose scalar still has to be extracted from `output`.
    pub fn ok_output(output: serde_json::Value) -> Self {
        Self {
            request_id: None,
            status: EvaluationStatus::Ok,
            value: None,
            output,
            reference: None,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            request_id: None,
            status: EvaluationStatus::Failed,
            value: None,
            output: serde_json::Value::Null,
            reference: None,
            message: Some(message.into()),
        }
    }

    pub fn for_request(mut self, request: &EvaluationRequest) -> Self {
        self.request_id = Some(request.id);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == EvaluationStatus::Ok
    }
}
