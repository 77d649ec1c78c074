//! # ro-optimizer
//!
//! Batched, failure-tolerant optimization for expensive objectives.
//!
//! Each iteration turns into one batch of evaluation requests submitted to an
//! [`EvaluationBackend`]. Failed or unreadable results are replaced by a
//! penalty value so the algorithms always see a full batch. Provides the
//! finite-difference gradient family (RMSProp, Adam, conjugate gradient,
//! BFGS), the DIRECT partitioning search, and an ask/tell adapter for
//! population algorithms.

mod backend;
mod config;
mod descent;
mod direct;
mod evaluator;
mod extract;
mod gradient;
mod history;
mod linalg;
mod optimizer;
mod population;
mod sampling;
mod solution;
mod step;
mod termination;

pub use backend::{EvaluationBackend, LocalBackend};
pub use config::{
    AdamSettings, AlgorithmConfig, BfgsSettings, ConjugateGradientSettings, DirectSettings,
    GradientSettings, PopulationSettings, RmsPropSettings, RunConfig, RunId,
};
pub use descent::GradientDescent;
pub use direct::{DirectSearch, HyperRectangle, Partition};
pub use evaluator::{EvaluatedBatch, Evaluation, Evaluator};
pub use extract::{Extracted, Extractor, FnExtractor, JsonPointerExtractor, PenaltyPolicy, ValueExtractor};
pub use gradient::{GradientEstimate, GradientEstimator};
pub use history::{History, HistoryEntry};
pub use linalg::SquareMatrix;
pub use optimizer::{OptimizationReport, Optimizer, OptimizerBuilder};
pub use population::{
    build_algorithm, AskTell, DeSettings, DifferentialEvolution, ParticleSwarm, PopulationAdapter,
    PsoSettings, RandomSampling, RandomSettings, DEFAULT_POP_SIZE, REGISTERED_ALGORITHMS,
};
pub use sampling::{make_rng, uniform_point};
pub use solution::{BestSolution, BestTracker};
pub use step::{
    armijo_satisfied, build_step_rule, Adam, BacktrackingLineSearch, Bfgs, ConjugateGradient,
    GradientPoint, LineSearchResult, RmsProp, StepDecision, StepRule,
};
pub use termination::{IterationBudget, RunOutcome, RunStatus};
