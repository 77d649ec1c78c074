//! # ro-engine
//!
//! Evaluation backends for reoptimize runs.
//!
//! Provides a tokio task pool for in-process objectives, a backend that runs
//! one external command per request, the benchmark problems, and job
//! descriptions used by the `ro-run` binary.

pub mod command;
pub mod job;
pub mod pool;
pub mod problems;

pub use command::{CommandBackend, CommandConfig};
pub use job::{run_job, JobSpec, ObjectiveSpec};
pub use pool::{TaskPoolBackend, TaskPoolConfig};
pub use problems::{Ackley, Objective, Rastrigin, Sphere};
