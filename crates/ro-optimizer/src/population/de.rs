use rand::rngs::StdRng;
use rand::Rng;
use ro_types::{config_error, Bounds, OptResult, ParameterVector};
use serde::{Deserialize, Serialize};

use super::{check_finite, check_fitness_len, check_pop_size, AskTell, DEFAULT_POP_SIZE};
use crate::sampling::{make_rng, uniform_point};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeSettings {
    pub pop_size: usize,
    /// Differential weight.
    pub f: f64,
    /// Crossover probability.
    pub cr: f64,
}

impl Default for DeSettings {
    fn default() -> Self {
        Self {
            pop_size: DEFAULT_POP_SIZE,
            f: 0.8,
            cr: 0.9,
        }
    }
}

/// Differential evolution, `rand/1/bin` scheme.
pub struct DifferentialEvolution {
    settings: DeSettings,
    bounds: Bounds,
    rng: StdRng,
    population: Vec<ParameterVector>,
    /// Empty until the initial population has been evaluated.
    fitness: Vec<f64>,
    trials: Vec<ParameterVector>,
}

impl DifferentialEvolution {
    pub fn new(settings: DeSettings, bounds: Bounds, seed: Option<u64>) -> OptResult<Self> {
        check_pop_size("DE", settings.pop_size, 4)?;
        check_finite("DE", "f", settings.f)?;
        if !(0.0..=1.0).contains(&settings.cr) {
            return Err(config_error!("DE needs cr in [0, 1], got {}", settings.cr));
        }
        let mut rng = make_rng(seed);
        let population = (0..settings.pop_size)
            .map(|_| uniform_point(&bounds, &mut rng))
            .collect();
        Ok(Self {
            settings,
            bounds,
            rng,
            population,
            fitness: Vec::new(),
            trials: Vec::new(),
        })
    }

    /// Three distinct members, none equal to `target`.
    fn pick_donors(&mut self, target: usize) -> [usize; 3] {
        let n = self.population.len();
        let mut picks = [0; 3];
        let mut chosen = 0;
        while chosen < 3 {
            let candidate = self.rng.random_range(0..n);
            if candidate != target && !picks[..chosen].contains(&candidate) {
                picks[chosen] = candidate;
                chosen += 1;
            }
        }
        picks
    }

    fn trial(&mut self, target: usize) -> ParameterVector {
        let [a, b, c] = self.pick_donors(target);
        let dim = self.bounds.dim();
        let forced = self.rng.random_range(0..dim);
        let mut trial: ParameterVector = (0..dim)
            .map(|j| {
                if j == forced || self.rng.random::<f64>() < self.settings.cr {
                    self.population[a][j] + self.settings.f * (self.population[b][j] - self.population[c][j])
                } else {
                    self.population[target][j]
                }
            })
            .collect();
        self.bounds.clamp(&mut trial);
        trial
    }
}

impl AskTell for DifferentialEvolution {
    fn ask(&mut self) -> Vec<ParameterVector> {
        self.trials = if self.fitness.is_empty() {
            self.population.clone()
        } else {
            (0..self.population.len()).map(|i| self.trial(i)).collect()
        };
        self.trials.clone()
    }

    fn tell(&mut self, fitness: &[f64]) -> OptResult<()> {
        check_fitness_len("DE", self.trials.len(), fitness)?;
        if self.fitness.is_empty() {
            self.fitness = fitness.to_vec();
            return Ok(());
        }
        for (i, (trial, &value)) in self.trials.iter().zip(fitness).enumerate() {
            if value <= self.fitness[i] {
                self.population[i] = trial.clone();
                self.fitness[i] = value;
            }
        }
        Ok(())
    }

    fn result(&self) -> Option<(ParameterVector, f64)> {
        let (index, value) = self
            .fitness
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))?;
        Some((self.population[index].clone(), value))
    }

    fn name(&self) -> &str {
        "DE"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Bounds {
        Bounds::from_pairs(&[[-2.0, 2.0], [-2.0, 2.0], [-2.0, 2.0]]).unwrap()
    }

    #[test]
    fn selection_never_worsens_a_member() {
        let mut de = DifferentialEvolution::new(DeSettings { pop_size: 6, ..Default::default() }, bounds(), Some(9)).unwrap();
        let f = |p: &ParameterVector| p.iter().map(|x| x * x).sum::<f64>();
        let mut previous: Option<Vec<f64>> = None;
        for _ in 0..15 {
            let generation = de.ask();
            assert!(generation.iter().all(|p| bounds().contains(p)));
            de.tell(&generation.iter().map(f).collect::<Vec<_>>()).unwrap();
            if let Some(previous) = &previous {
                assert!(de.fitness.iter().zip(previous).all(|(now, before)| now <= before));
            }
            previous = Some(de.fitness.clone());
        }
        let (best, value) = de.result().unwrap();
        assert_eq!(f(&best), value);
    }

    #[test]
    fn donors_are_distinct() {
        let mut de = DifferentialEvolution::new(DeSettings { pop_size: 4, ..Default::default() }, bounds(), Some(1)).unwrap();
        for target in 0..4 {
            let [a, b, c] = de.pick_donors(target);
            assert!(a != b && b != c && a != c);
            assert!(![a, b, c].contains(&target));
        }
    }

    #[test]
    fn needs_four_members() {
        let settings = DeSettings { pop_size: 3, ..Default::default() };
        assert!(DifferentialEvolution::new(settings, bounds(), None).is_err());
    }

    #[test]
    fn rejects_unusable_coefficients() {
        for settings in [
            DeSettings { cr: 1.5, ..Default::default() },
            DeSettings { cr: f64::NAN, ..Default::default() },
            DeSettings { f: f64::INFINITY, ..Default::default() },
        ] {
            let err = DifferentialEvolution::new(settings.clone(), bounds(), None).err().unwrap();
            assert!(matches!(err, ro_types::OptError::Config(_)), "{settings:?}");
        }
    }
}
