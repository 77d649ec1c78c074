//! Turning raw evaluation outcomes into usable scalars.

use ro_types::{EvaluationOutcome, ExtractionError};
use tracing::warn;

/// Maps one outcome to the objective value.
///
/// Any error is treated exactly like a failed evaluation: the caller
/// substitutes the configured penalty.
pub trait Extractor: Send + Sync {
    fn extract(&self, outcome: &EvaluationOutcome) -> Result<f64, ExtractionError>;
}

/// Reads `outcome.value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueExtractor;

impl Extractor for ValueExtractor {
    fn extract(&self, outcome: &EvaluationOutcome) -> Result<f64, ExtractionError> {
        outcome.value.ok_or(ExtractionError::MissingValue)
    }
}

/// Reads a number out of the raw `output` payload using a JSON pointer,
/// e.g. `/output_parameters/energy`.
#[derive(Debug, Clone)]
pub struct JsonPointerExtractor {
    pointer: String,
}

impl JsonPointerExtractor {
    pub fn new(pointer: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
        }
    }
}

impl Extractor for JsonPointerExtractor {
    fn extract(&self, outcome: &EvaluationOutcome) -> Result<f64, ExtractionError> {
        let field = outcome
            .output
            .pointer(&self.pointer)
            .ok_or_else(|| ExtractionError::FieldNotFound {
                pointer: self.pointer.clone(),
            })?;
        field.as_f64().ok_or_else(|| ExtractionError::NotANumber {
            pointer: self.pointer.clone(),
        })
    }
}

/// Wraps a closure over the raw outcome.
pub struct FnExtractor<F>(pub F);

impl<F> Extractor for FnExtractor<F>
where
    F: Fn(&EvaluationOutcome) -> Result<f64, ExtractionError> + Send + Sync,
{
    fn extract(&self, outcome: &EvaluationOutcome) -> Result<f64, ExtractionError> {
        (self.0)(outcome)
    }
}

/// A scalar produced for one request, plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub value: f64,
    /// `false` when the penalty was substituted.
    pub succeeded: bool,
    pub reference: Option<String>,
}

/// Applies an [`Extractor`] and substitutes the penalty for failures.
pub struct PenaltyPolicy {
    extractor: Box<dyn Extractor>,
    penalty: f64,
}

impl PenaltyPolicy {
    pub fn new(extractor: Box<dyn Extractor>, penalty: f64) -> Self {
        Self { extractor, penalty }
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    /// Extract one outcome. `None` stands for an outcome that never arrived.
    pub fn apply(&self, index: usize, outcome: Option<&EvaluationOutcome>) -> Extracted {
        let Some(outcome) = outcome else {
            warn!(index, penalty = self.penalty, "evaluation outcome missing, applying penalty");
            return self.penalised(None);
        };

        let result = if outcome.is_ok() {
            self.extractor.extract(outcome).and_then(|value| {
                if value.is_nan() {
                    Err(ExtractionError::NonFinite { value })
                } else {
                    Ok(value)
                }
            })
        } else {
            Err(ExtractionError::EvaluationFailed {
                message: outcome.message.clone().unwrap_or_default(),
            })
        };

        match result {
            Ok(value) => Extracted {
                value,
                succeeded: true,
                reference: outcome.reference.clone(),
            },
            Err(err) => {
                warn!(index, penalty = self.penalty, error = %err, "evaluation penalised");
                self.penalised(outcome.reference.clone())
            }
        }
    }

    /// Extract a whole batch; output length always equals input length.
    pub fn apply_batch(&self, outcomes: &[Option<EvaluationOutcome>]) -> Vec<Extracted> {
        outcomes
            .iter()
            .enumerate()
            .map(|(index, outcome)| self.apply(index, outcome.as_ref()))
            .collect()
    }

    fn penalised(&self, reference: Option<String>) -> Extracted {
        Extracted {
            value: self.penalty,
            succeeded: false,
            reference,
        }
    }
}
