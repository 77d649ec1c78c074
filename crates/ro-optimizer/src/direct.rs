//! DIRECT: global search by recursive trisection of the bounding box.

use ro_types::{Bounds, OptResult, ParameterVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DirectSettings;
use crate::evaluator::Evaluator;
use crate::history::{History, HistoryEntry};
use crate::solution::BestTracker;
use crate::termination::{backend_failure, IterationBudget, RunOutcome, RunStatus};

/// Relative tolerance for "largest edge" ties among candidates.
const EDGE_TIE_TOLERANCE: f64 = 1e-12;

/// One cell of the partition, judged by the objective at its center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperRectangle {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub center: ParameterVector,
    /// `None` until the center has been evaluated.
    pub value: Option<f64>,
    pub reference: Option<String>,
}

impl HyperRectangle {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        let center = lower.iter().zip(&upper).map(|(l, u)| 0.5 * (l + u)).collect();
        Self {
            lower,
            upper,
            center,
            value: None,
            reference: None,
        }
    }

    pub fn from_bounds(bounds: &Bounds) -> Self {
        Self::new(bounds.lower().to_vec(), bounds.upper().to_vec())
    }

    pub fn edges(&self) -> impl Iterator<Item = f64> + '_ {
        self.lower.iter().zip(&self.upper).map(|(l, u)| u - l)
    }

    pub fn max_edge(&self) -> f64 {
        self.edges().fold(0.0, f64::max)
    }

    /// First dimension with the longest edge.
    pub fn longest_dimension(&self) -> usize {
        let max = self.max_edge();
        self.edges().position(|edge| edge == max).unwrap_or(0)
    }

    /// Split into thirds along the longest dimension.
    ///
    /// Children share their cut faces exactly, so their union is the parent.
    pub fn trisect(&self) -> [HyperRectangle; 3] {
        let dim = self.longest_dimension();
        let (lo, hi) = (self.lower[dim], self.upper[dim]);
        let third = (hi - lo) / 3.0;
        let cuts = [lo, lo + third, lo + 2.0 * third, hi];

        std::array::from_fn(|k| {
            let mut lower = self.lower.clone();
            let mut upper = self.upper.clone();
            lower[dim] = cuts[k];
            upper[dim] = cuts[k + 1];
            HyperRectangle::new(lower, upper)
        })
    }

    fn score(&self, penalty: f64) -> f64 {
        self.value.unwrap_or(penalty)
    }
}

/// The current set of rectangles covering the search box.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    rectangles: Vec<HyperRectangle>,
}

impl Partition {
    pub fn new(root: HyperRectangle) -> Self {
        Self {
            rectangles: vec![root],
        }
    }

    pub fn rectangles(&self) -> &[HyperRectangle] {
        &self.rectangles
    }

    pub fn len(&self) -> usize {
        self.rectangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rectangles.is_empty()
    }

    pub fn largest_extent(&self) -> f64 {
        self.rectangles.iter().map(HyperRectangle::max_edge).fold(0.0, f64::max)
    }

    /// Index of the rectangle to subdivide next.
    ///
    /// Candidates are within `value_tolerance·|m|` of the lowest value `m`.
    /// Among them the one with the largest edge wins, then the lower value,
    /// then the older rectangle. Unevaluated rectangles score as `penalty`.
    pub fn select_potentially_optimal(&self, penalty: f64, value_tolerance: f64) -> Option<usize> {
        let scores: Vec<f64> = self.rectangles.iter().map(|r| r.score(penalty)).collect();
        let min = scores.iter().copied().reduce(f64::min)?;
        let threshold = if min.is_finite() {
            min + value_tolerance * min.abs()
        } else {
            min
        };
        let candidates: Vec<usize> = (0..scores.len()).filter(|&i| scores[i] <= threshold).collect();
        let widest = candidates
            .iter()
            .map(|&i| self.rectangles[i].max_edge())
            .fold(0.0, f64::max);
        candidates
            .into_iter()
            .filter(|&i| self.rectangles[i].max_edge() >= widest * (1.0 - EDGE_TIE_TOLERANCE))
            .min_by(|&a, &b| scores[a].total_cmp(&scores[b]).then(a.cmp(&b)))
    }

    fn remove(&mut self, index: usize) -> HyperRectangle {
        self.rectangles.remove(index)
    }

    fn extend(&mut self, children: impl IntoIterator<Item = HyperRectangle>) {
        self.rectangles.extend(children);
    }
}

/// Runs DIRECT over a bounded box.
#[derive(Debug, Clone)]
pub struct DirectSearch {
    settings: DirectSettings,
    bounds: Bounds,
    budget: IterationBudget,
}

impl DirectSearch {
    pub fn new(settings: DirectSettings, bounds: Bounds, budget: IterationBudget) -> Self {
        Self {
            settings,
            bounds,
            budget,
        }
    }

    pub async fn run(self, evaluator: &mut Evaluator) -> OptResult<RunOutcome> {
        let root = HyperRectangle::from_bounds(&self.bounds);
        let mut final_parameters = root.center.clone();
        let mut partition = Partition::new(root);
        let mut incumbent = BestTracker::new();
        let mut history = History::new();
        let mut iteration = 1;

        let status = loop {
            if !self.budget.allows(iteration) {
                info!(itmax = self.budget.itmax(), "max iterations reached");
                break RunStatus::MaxIterations;
            }
            if partition.largest_extent() < self.settings.epsilon {
                info!(iteration, rectangles = partition.len(), "partition resolved below epsilon");
                break RunStatus::PartitionResolved;
            }

            let Some(selected) =
                partition.select_potentially_optimal(evaluator.penalty(), self.settings.value_tolerance)
            else {
                break RunStatus::PartitionResolved;
            };
            let parent = partition.remove(selected);
            let mut children = parent.trisect();

            let centers = children.iter().map(|c| c.center.clone()).collect();
            let batch = match evaluator.evaluate(centers).await {
                Ok(batch) => batch,
                Err(err) => {
                    let message = backend_failure(err)?;
                    return Ok(RunOutcome::new(RunStatus::BackendFailure, history, final_parameters)
                        .with_message(message));
                }
            };
            for (child, evaluation) in children.iter_mut().zip(batch.evaluations) {
                incumbent.offer(&child.center, evaluation.value, evaluation.reference.as_deref());
                child.value = Some(evaluation.value);
                child.reference = evaluation.reference;
            }
            partition.extend(children);

            if let Some(best) = incumbent.get() {
                final_parameters = best.parameters.clone();
                history.record(
                    HistoryEntry::new(iteration, &best.parameters, best.value)
                        .with_reference(best.reference.clone()),
                );
            }
            debug!(
                iteration,
                split_extent = parent.max_edge(),
                rectangles = partition.len(),
                largest_extent = partition.largest_extent(),
                "partition refined"
            );
            iteration += 1;
        };

        Ok(RunOutcome::new(status, history, final_parameters))
    }
}
