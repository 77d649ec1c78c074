//! Run statuses and the iteration budget.

use ro_types::{OptError, OptResult, ParameterVector};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::history::History;
use crate::solution::BestSolution;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Gradient norm fell below the tolerance.
    Converged,
    /// DIRECT: every remaining rectangle is smaller than `epsilon`.
    PartitionResolved,
    /// The population algorithm ran its full budget.
    Completed,
    MaxIterations,
    Stuck,
    InvalidStep,
    BackendFailure,
    /// Every evaluation of an iteration failed, so the gradient carries no information.
    EvaluationsFailed,
}

impl RunStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Converged | Self::PartitionResolved | Self::Completed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Self::Converged => "converged",
            Self::PartitionResolved => "partition resolved below epsilon",
            Self::Completed => "completed",
            Self::MaxIterations => "max iterations reached without convergence",
            Self::Stuck => "stuck for too long",
            Self::InvalidStep => "invalid step",
            Self::BackendFailure => "evaluation backend failed",
            Self::EvaluationsFailed => "every evaluation of the iteration failed",
        };
        f.write_str(message)
    }
}

/// Iteration cap. Iterations are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationBudget {
    itmax: usize,
}

impl IterationBudget {
    pub fn new(itmax: usize) -> Self {
        Self { itmax }
    }

    pub fn itmax(&self) -> usize {
        self.itmax
    }

    /// Whether iteration number `iteration` may still run.
    pub fn allows(&self, iteration: usize) -> bool {
        iteration <= self.itmax
    }
}

/// What a driver hands back once its loop ends.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Detail for failures, e.g. the backend error.
    pub message: Option<String>,
    pub iterations: usize,
    pub history: History,
    /// The point the algorithm was at when it stopped.
    pub final_parameters: ParameterVector,
    pub final_value: Option<f64>,
    /// Result reported by the algorithm itself, if it keeps one.
    pub reported: Option<BestSolution>,
}

impl RunOutcome {
    pub fn new(status: RunStatus, history: History, final_parameters: ParameterVector) -> Self {
        Self {
            status,
            message: None,
            iterations: history.len(),
            final_value: history.last().map(|entry| entry.value),
            history,
            final_parameters,
            reported: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_reported(mut self, reported: Option<BestSolution>) -> Self {
        self.reported = reported;
        self
    }
}

/// Backend errors end the run with [`RunStatus::BackendFailure`]; anything
/// else is propagated.
pub(crate) fn backend_failure(err: OptError) -> OptResult<String> {
    match err {
        OptError::Backend(err) => {
            error!(error = %err, "evaluation backend failed, aborting run");
            Ok(err.to_string())
        }
        other => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_inclusive() {
        let budget = IterationBudget::new(3);
        assert!(budget.allows(1));
        assert!(budget.allows(3));
        assert!(!budget.allows(4));
    }

    #[test]
    fn exit_signals() {
        assert_eq!(
            RunStatus::MaxIterations.to_string(),
            "max iterations reached without convergence"
        );
        assert_eq!(RunStatus::Stuck.to_string(), "stuck for too long");
        assert_eq!(RunStatus::InvalidStep.to_string(), "invalid step");
        assert!(RunStatus::Converged.is_success());
        assert!(!RunStatus::InvalidStep.is_success());
    }

    #[test]
    fn only_backend_errors_become_a_status() {
        let err = OptError::Backend(ro_types::BackendError::Unavailable {
            message: "down".into(),
        });
        assert!(backend_failure(err).unwrap().contains("down"));
        assert!(backend_failure(ro_types::internal_error!("boom")).is_err());
    }
}
