//! Best-so-far tracking.

use ro_types::ParameterVector;
use serde::{Deserialize, Serialize};

/// The best successfully evaluated point observed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestSolution {
    pub parameters: ParameterVector,
    pub value: f64,
    pub reference: Option<String>,
}

/// Holds the incumbent and replaces it only on strict improvement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BestTracker {
    best: Option<BestSolution>,
}

impl BestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a candidate. Returns `true` if it became the new best.
    pub fn offer(&mut self, parameters: &[f64], value: f64, reference: Option<&str>) -> bool {
        let improves = match &self.best {
            None => !value.is_nan(),
            Some(current) => value < current.value,
        };
        if improves {
            self.best = Some(BestSolution {
                parameters: parameters.to_vec(),
                value,
                reference: reference.map(str::to_owned),
            });
        }
        improves
    }

    pub fn get(&self) -> Option<&BestSolution> {
        self.best.as_ref()
    }

    pub fn into_inner(self) -> Option<BestSolution> {
        self.best
    }
}
