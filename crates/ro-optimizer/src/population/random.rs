use rand::rngs::StdRng;
use ro_types::{Bounds, OptResult, ParameterVector};
use serde::{Deserialize, Serialize};

use super::{check_fitness_len, check_pop_size, AskTell, DEFAULT_POP_SIZE};
use crate::sampling::{make_rng, uniform_point};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomSettings {
    pub pop_size: usize,
}

impl Default for RandomSettings {
    fn default() -> Self {
        Self {
            pop_size: DEFAULT_POP_SIZE,
        }
    }
}

/// Uniform random sampling over the bounds; a baseline for the others.
pub struct RandomSampling {
    settings: RandomSettings,
    bounds: Bounds,
    rng: StdRng,
    pending: Vec<ParameterVector>,
    best: Option<(ParameterVector, f64)>,
}

impl RandomSampling {
    pub fn new(settings: RandomSettings, bounds: Bounds, seed: Option<u64>) -> OptResult<Self> {
        check_pop_size("RANDOM", settings.pop_size, 1)?;
        Ok(Self {
            settings,
            bounds,
            rng: make_rng(seed),
            pending: Vec::new(),
            best: None,
        })
    }
}

impl AskTell for RandomSampling {
    fn ask(&mut self) -> Vec<ParameterVector> {
        self.pending = (0..self.settings.pop_size)
            .map(|_| uniform_point(&self.bounds, &mut self.rng))
            .collect();
        self.pending.clone()
    }

    fn tell(&mut self, fitness: &[f64]) -> OptResult<()> {
        check_fitness_len("RANDOM", self.pending.len(), fitness)?;
        for (point, &value) in self.pending.iter().zip(fitness) {
            if self.best.as_ref().map_or(true, |(_, best)| value < *best) {
                self.best = Some((point.clone(), value));
            }
        }
        Ok(())
    }

    fn result(&self) -> Option<(ParameterVector, f64)> {
        self.best.clone()
    }

    fn name(&self) -> &str {
        "RANDOM"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_lowest_value() {
        let bounds = Bounds::from_pairs(&[[0.0, 1.0]]).unwrap();
        let mut sampler = RandomSampling::new(RandomSettings { pop_size: 5 }, bounds, Some(3)).unwrap();
        let generation = sampler.ask();
        let fitness: Vec<f64> = generation.iter().map(|p| p[0]).collect();
        sampler.tell(&fitness).unwrap();

        let lowest = fitness.iter().copied().fold(f64::INFINITY, f64::min);
        assert_eq!(sampler.result().unwrap().1, lowest);
        assert!(sampler.tell(&[0.0]).is_err());
    }
}
