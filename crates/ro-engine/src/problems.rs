//! Benchmark objectives for exercising the optimizers in-process.

use std::f64::consts::{E, PI};
use std::sync::Arc;

/// An objective that can be evaluated on a worker thread.
///
/// `Err` marks a failed evaluation; the optimizer substitutes its penalty.
pub trait Objective: Send + Sync {
    fn evaluate(&self, parameters: &[f64]) -> Result<f64, String>;

    fn name(&self) -> &str;
}

/// Σ xᵢ², minimum 0 at the origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sphere;

impl Objective for Sphere {
    fn evaluate(&self, parameters: &[f64]) -> Result<f64, String> {
        Ok(parameters.iter().map(|x| x * x).sum())
    }

    fn name(&self) -> &str {
        "sphere"
    }
}

/// Ackley function, minimum 0 at the origin.
#[derive(Debug, Clone, Copy)]
pub struct Ackley {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for Ackley {
    fn default() -> Self {
        Self {
            a: 20.0,
            b: 0.2,
            c: 2.0 * PI,
        }
    }
}

impl Objective for Ackley {
    fn evaluate(&self, parameters: &[f64]) -> Result<f64, String> {
        if parameters.is_empty() {
            return Err("ackley needs at least one dimension".into());
        }
        let n = parameters.len() as f64;
        let square_mean = parameters.iter().map(|x| x * x).sum::<f64>() / n;
        let cos_mean = parameters.iter().map(|x| (self.c * x).cos()).sum::<f64>() / n;
        Ok(-self.a * (-self.b * square_mean.sqrt()).exp() - cos_mean.exp() + self.a + E)
    }

    fn name(&self) -> &str {
        "ackley"
    }
}

/// Rastrigin function, minimum 0 at the origin.
#[derive(Debug, Clone, Copy)]
pub struct Rastrigin {
    pub a: f64,
}

impl Default for Rastrigin {
    fn default() -> Self {
        Self { a: 10.0 }
    }
}

impl Objective for Rastrigin {
    fn evaluate(&self, parameters: &[f64]) -> Result<f64, String> {
        let n = parameters.len() as f64;
        Ok(self.a * n
            + parameters
                .iter()
                .map(|x| x * x - self.a * (2.0 * PI * x).cos())
                .sum::<f64>())
    }

    fn name(&self) -> &str {
        "rastrigin"
    }
}

/// Look up a benchmark by name.
pub fn by_name(name: &str) -> Option<Arc<dyn Objective>> {
    match name.to_ascii_lowercase().as_str() {
        "sphere" => Some(Arc::new(Sphere)),
        "ackley" => Some(Arc::new(Ackley::default())),
        "rastrigin" => Some(Arc::new(Rastrigin::default())),
        _ => None,
    }
}
