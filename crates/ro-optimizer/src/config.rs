//! Run configuration and per-algorithm settings.

use ro_types::{config_error, Bounds, OptResult, ParameterVector};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique optimization run identifier.
pub type RunId = Uuid;

/// Settings shared by every finite-difference based step rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientSettings {
    /// Gradient-norm threshold below which the run is converged.
    pub tolerance: f64,
    /// Forward-difference perturbation.
    pub delta: f64,
    /// Numerical floor used in denominators.
    pub epsilon: f64,
}

impl Default for GradientSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            delta: 1e-6,
            epsilon: 1e-10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RmsPropSettings {
    #[serde(flatten)]
    pub gradient: GradientSettings,
    pub learning_rate: f64,
    pub rho: f64,
}

impl Default for RmsPropSettings {
    fn default() -> Self {
        Self {
            gradient: GradientSettings::default(),
            learning_rate: 1e-3,
            rho: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamSettings {
    #[serde(flatten)]
    pub gradient: GradientSettings,
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
}

impl Default for AdamSettings {
    fn default() -> Self {
        Self {
            gradient: GradientSettings::default(),
            learning_rate: 5e-2,
            beta1: 0.5,
            beta2: 0.999,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConjugateGradientSettings {
    #[serde(flatten)]
    pub gradient: GradientSettings,
    pub learning_rate: f64,
    pub lr_min: f64,
    pub lr_max: f64,
    /// Multiplier applied to the learning rate after an improving step.
    pub lr_increase: f64,
    /// Multiplier applied to the learning rate after a rejected step.
    pub lr_decrease: f64,
    /// Reset the search direction to steepest descent every N iterations.
    pub restart_interval: usize,
    /// Consecutive rejected steps tolerated before the direction is restarted.
    pub allowed_stuck: usize,
    /// Escape with a random perturbation instead of stopping when stuck.
    pub allow_jumps: bool,
    /// Half-width of the uniform perturbation applied on a jump.
    pub jump_scale: f64,
    pub max_jumps: usize,
}

impl Default for ConjugateGradientSettings {
    fn default() -> Self {
        Self {
            gradient: GradientSettings::default(),
            learning_rate: 1e-2,
            lr_min: 1e-6,
            lr_max: 1.0,
            lr_increase: 1.2,
            lr_decrease: 0.5,
            restart_interval: 10,
            allowed_stuck: 3,
            allow_jumps: false,
            jump_scale: 0.1,
            max_jumps: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BfgsSettings {
    #[serde(flatten)]
    pub gradient: GradientSettings,
    /// Initial line-search step size.
    pub alpha: f64,
    /// Backtracking shrink factor.
    pub beta: f64,
    /// Armijo sufficient-decrease constant.
    pub sigma: f64,
    pub linesearch_max_iter: usize,
}

impl Default for BfgsSettings {
    fn default() -> Self {
        Self {
            gradient: GradientSettings::default(),
            alpha: 1.0,
            beta: 0.5,
            sigma: 1e-4,
            linesearch_max_iter: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectSettings {
    /// Stop once the largest rectangle edge is below this extent.
    pub epsilon: f64,
    /// Relative tolerance when comparing rectangle values.
    pub value_tolerance: f64,
}

impl Default for DirectSettings {
    fn default() -> Self {
        Self {
            epsilon: 1e-8,
            value_tolerance: 1e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSettings {
    /// Registered algorithm name, e.g. "PSO", "DE" or "RANDOM".
    pub algorithm_name: String,
    #[serde(default)]
    pub algorithm_settings: serde_json::Map<String, serde_json::Value>,
}

/// Which algorithm drives the run, with its hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum AlgorithmConfig {
    #[serde(rename = "rmsprop")]
    RmsProp(RmsPropSettings),
    #[serde(rename = "adam")]
    Adam(AdamSettings),
    #[serde(rename = "conjugate_gradient")]
    ConjugateGradient(ConjugateGradientSettings),
    #[serde(rename = "bfgs")]
    Bfgs(BfgsSettings),
    #[serde(rename = "direct")]
    Direct(DirectSettings),
    #[serde(rename = "population")]
    Population(PopulationSettings),
}

impl AlgorithmConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::RmsProp(_) => "rmsprop",
            Self::Adam(_) => "adam",
            Self::ConjugateGradient(_) => "conjugate_gradient",
            Self::Bfgs(_) => "bfgs",
            Self::Direct(_) => "direct",
            Self::Population(settings) => &settings.algorithm_name,
        }
    }

    /// Gradient settings for the finite-difference family, `None` otherwise.
    pub fn gradient_settings(&self) -> Option<&GradientSettings> {
        match self {
            Self::RmsProp(s) => Some(&s.gradient),
            Self::Adam(s) => Some(&s.gradient),
            Self::ConjugateGradient(s) => Some(&s.gradient),
            Self::Bfgs(s) => Some(&s.gradient),
            Self::Direct(_) | Self::Population(_) => None,
        }
    }
}

/// Top-level configuration for an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "Uuid::new_v4")]
    pub id: RunId,
    #[serde(default)]
    pub name: String,

    /// Starting point for the gradient family.
    #[serde(default)]
    pub initial_parameters: Option<ParameterVector>,

    /// Search box for DIRECT and population algorithms.
    #[serde(default)]
    pub bounds: Option<Bounds>,

    /// Iteration cap.
    #[serde(default = "default_itmax")]
    pub itmax: usize,

    /// Scalar substituted for failed or unextractable evaluations.
    #[serde(default = "default_penalty")]
    pub penalty: f64,

    /// Report the backend reference of the best evaluation.
    #[serde(default)]
    pub get_best: bool,

    /// Seed for the stochastic parts (jumps, population algorithms).
    #[serde(default)]
    pub seed: Option<u64>,

    pub algorithm: AlgorithmConfig,
}

fn default_itmax() -> usize {
    100
}

fn default_penalty() -> f64 {
    1e10
}

impl RunConfig {
    pub fn new(name: impl Into<String>, algorithm: AlgorithmConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            initial_parameters: None,
            bounds: None,
            itmax: default_itmax(),
            penalty: default_penalty(),
            get_best: false,
            seed: None,
            algorithm,
        }
    }

    pub fn from_json(json: &str) -> OptResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_initial_parameters(mut self, parameters: ParameterVector) -> Self {
        self.initial_parameters = Some(parameters);
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_itmax(mut self, itmax: usize) -> Self {
        self.itmax = itmax;
        self
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_get_best(mut self, get_best: bool) -> Self {
        self.get_best = get_best;
        self
    }

    /// Problem dimension implied by the configuration.
    pub fn dimension(&self) -> Option<usize> {
        match &self.algorithm {
            AlgorithmConfig::Direct(_) | AlgorithmConfig::Population(_) => {
                self.bounds.as_ref().map(Bounds::dim)
            }
            _ => self.initial_parameters.as_ref().map(Vec::len),
        }
    }

    /// Check everything that can be checked before the first evaluation.
    pub fn validate(&self) -> OptResult<()> {
        if self.itmax == 0 {
            return Err(config_error!("itmax must be at least 1"));
        }
        if !self.penalty.is_finite() {
            return Err(config_error!("penalty must be finite, got {}", self.penalty));
        }

        if let Some(gradient) = self.algorithm.gradient_settings() {
            let initial = self.initial_parameters.as_ref().ok_or_else(|| {
                config_error!("{} requires initial_parameters", self.algorithm.name())
            })?;
            if initial.is_empty() {
                return Err(config_error!("initial_parameters must not be empty"));
            }
            if initial.iter().any(|x| !x.is_finite()) {
                return Err(config_error!("initial_parameters must be finite"));
            }
            if let Some(bounds) = &self.bounds {
                if bounds.dim() != initial.len() {
                    return Err(config_error!(
                        "bounds have {} dimensions but initial_parameters has {}",
                        bounds.dim(),
                        initial.len()
                    ));
                }
            }
            validate_gradient(gradient)?;
        }

        match &self.algorithm {
            AlgorithmConfig::RmsProp(s) => {
                positive("learning_rate", s.learning_rate)?;
                unit_interval("rho", s.rho)?;
            }
            AlgorithmConfig::Adam(s) => {
                positive("learning_rate", s.learning_rate)?;
                unit_interval("beta1", s.beta1)?;
                unit_interval("beta2", s.beta2)?;
            }
            AlgorithmConfig::ConjugateGradient(s) => {
                positive("learning_rate", s.learning_rate)?;
                positive("lr_min", s.lr_min)?;
                if s.lr_min > s.lr_max {
                    return Err(config_error!(
                        "lr_min ({}) exceeds lr_max ({})",
                        s.lr_min,
                        s.lr_max
                    ));
                }
                if !(s.lr_increase >= 1.0) {
                    return Err(config_error!("lr_increase must be >= 1, got {}", s.lr_increase));
                }
                if !(s.lr_decrease > 0.0 && s.lr_decrease < 1.0) {
                    return Err(config_error!(
                        "lr_decrease must lie in (0, 1), got {}",
                        s.lr_decrease
                    ));
                }
                if s.restart_interval == 0 {
                    return Err(config_error!("restart_interval must be at least 1"));
                }
                if s.allow_jumps {
                    positive("jump_scale", s.jump_scale)?;
                }
            }
            AlgorithmConfig::Bfgs(s) => {
                positive("alpha", s.alpha)?;
                if !(s.beta > 0.0 && s.beta < 1.0) {
                    return Err(config_error!("beta must lie in (0, 1), got {}", s.beta));
                }
                if !(s.sigma > 0.0 && s.sigma < 1.0) {
                    return Err(config_error!("sigma must lie in (0, 1), got {}", s.sigma));
                }
                if s.linesearch_max_iter == 0 {
                    return Err(config_error!("linesearch_max_iter must be at least 1"));
                }
            }
            AlgorithmConfig::Direct(s) => {
                if self.bounds.is_none() {
                    return Err(config_error!("direct requires bounds"));
                }
                positive("epsilon", s.epsilon)?;
                if !(s.value_tolerance >= 0.0) {
                    return Err(config_error!("value_tolerance must be non-negative"));
                }
            }
            AlgorithmConfig::Population(s) => {
                if self.bounds.is_none() {
                    return Err(config_error!("population algorithms require bounds"));
                }
                if s.algorithm_name.trim().is_empty() {
                    return Err(config_error!("algorithm_name must not be empty"));
                }
            }
        }

        Ok(())
    }
}

fn validate_gradient(settings: &GradientSettings) -> OptResult<()> {
    positive("delta", settings.delta)?;
    positive("epsilon", settings.epsilon)?;
    if !(settings.tolerance >= 0.0) {
        return Err(config_error!("tolerance must be non-negative"));
    }
    Ok(())
}

fn positive(name: &str, value: f64) -> OptResult<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(config_error!("{name} must be positive and finite, got {value}"))
    }
}

fn unit_interval(name: &str, value: f64) -> OptResult<()> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(config_error!("{name} must lie in [0, 1), got {value}"))
    }
}
