use rand::rngs::StdRng;
use rand::Rng;
use ro_types::{config_error, Bounds, OptResult, ParameterVector};
use serde::{Deserialize, Serialize};

use super::{check_finite, check_fitness_len, check_pop_size, AskTell, DEFAULT_POP_SIZE};
use crate::sampling::{make_rng, uniform_point};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PsoSettings {
    pub pop_size: usize,
    /// Inertia weight.
    pub w: f64,
    /// Pull towards each particle's own best.
    pub c1: f64,
    /// Pull towards the swarm's best.
    pub c2: f64,
    /// Velocity cap as a fraction of each dimension's width.
    pub max_velocity_rate: f64,
}

impl Default for PsoSettings {
    fn default() -> Self {
        Self {
            pop_size: DEFAULT_POP_SIZE,
            w: 0.7,
            c1: 1.5,
            c2: 1.5,
            max_velocity_rate: 0.2,
        }
    }
}

/// Particle swarm optimization.
pub struct ParticleSwarm {
    settings: PsoSettings,
    bounds: Bounds,
    rng: StdRng,
    positions: Vec<ParameterVector>,
    velocities: Vec<Vec<f64>>,
    personal_best: Vec<(ParameterVector, f64)>,
    global_best: Option<(ParameterVector, f64)>,
}

impl ParticleSwarm {
    pub fn new(settings: PsoSettings, bounds: Bounds, seed: Option<u64>) -> OptResult<Self> {
        check_pop_size("PSO", settings.pop_size, 1)?;
        check_finite("PSO", "w", settings.w)?;
        check_finite("PSO", "c1", settings.c1)?;
        check_finite("PSO", "c2", settings.c2)?;
        if !(settings.max_velocity_rate.is_finite() && settings.max_velocity_rate > 0.0) {
            return Err(config_error!(
                "PSO needs a positive max_velocity_rate, got {}",
                settings.max_velocity_rate
            ));
        }
        let mut rng = make_rng(seed);
        let positions: Vec<ParameterVector> = (0..settings.pop_size)
            .map(|_| uniform_point(&bounds, &mut rng))
            .collect();
        let velocities = vec![vec![0.0; bounds.dim()]; settings.pop_size];
        let personal_best = positions.iter().map(|p| (p.clone(), f64::INFINITY)).collect();
        Ok(Self {
            settings,
            bounds,
            rng,
            positions,
            velocities,
            personal_best,
            global_best: None,
        })
    }

    fn move_particles(&mut self) {
        let Some((global, _)) = &self.global_best else {
            return;
        };
        let PsoSettings { w, c1, c2, max_velocity_rate, .. } = self.settings;
        let limits: Vec<f64> = self.bounds.widths().iter().map(|width| width * max_velocity_rate).collect();

        for ((position, velocity), (own_best, _)) in self
            .positions
            .iter_mut()
            .zip(self.velocities.iter_mut())
            .zip(&self.personal_best)
        {
            for d in 0..position.len() {
                let r1: f64 = self.rng.random();
                let r2: f64 = self.rng.random();
                let v = w * velocity[d]
                    + c1 * r1 * (own_best[d] - position[d])
                    + c2 * r2 * (global[d] - position[d]);
                velocity[d] = v.clamp(-limits[d], limits[d]);
                position[d] += velocity[d];
            }
            self.bounds.clamp(position);
        }
    }
}

impl AskTell for ParticleSwarm {
    fn ask(&mut self) -> Vec<ParameterVector> {
        self.positions.clone()
    }

    fn tell(&mut self, fitness: &[f64]) -> OptResult<()> {
        check_fitness_len("PSO", self.positions.len(), fitness)?;
        for ((position, &value), own_best) in self.positions.iter().zip(fitness).zip(self.personal_best.iter_mut()) {
            if value < own_best.1 {
                *own_best = (position.clone(), value);
            }
            if self.global_best.as_ref().map_or(true, |(_, best)| value < *best) {
                self.global_best = Some((position.clone(), value));
            }
        }
        self.move_particles();
        Ok(())
    }

    fn result(&self) -> Option<(ParameterVector, f64)> {
        self.global_best.clone()
    }

    fn name(&self) -> &str {
        "PSO"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Bounds {
        Bounds::from_pairs(&[[0.0, 1.0], [-5.0, 5.0]]).unwrap()
    }

    #[test]
    fn particles_start_and_stay_in_bounds() {
        let mut swarm = ParticleSwarm::new(PsoSettings { pop_size: 8, ..Default::default() }, bounds(), Some(5)).unwrap();
        for _ in 0..10 {
            let generation = swarm.ask();
            assert_eq!(generation.len(), 8);
            assert!(generation.iter().all(|p| bounds().contains(p)));
            let fitness: Vec<f64> = generation.iter().map(|p| p[0] + p[1]).collect();
            swarm.tell(&fitness).unwrap();
        }
        let (best, value) = swarm.result().unwrap();
        assert_eq!(best[0] + best[1], value);
    }

    #[test]
    fn rejects_wrong_fitness_length() {
        let mut swarm = ParticleSwarm::new(PsoSettings { pop_size: 4, ..Default::default() }, bounds(), None).unwrap();
        swarm.ask();
        assert!(swarm.tell(&[1.0, 2.0]).is_err());
        assert!(ParticleSwarm::new(PsoSettings { pop_size: 0, ..Default::default() }, bounds(), None).is_err());
    }

    #[test]
    fn rejects_unusable_coefficients() {
        for settings in [
            PsoSettings { max_velocity_rate: -0.1, ..Default::default() },
            PsoSettings { max_velocity_rate: f64::INFINITY, ..Default::default() },
            PsoSettings { w: f64::NAN, ..Default::default() },
            PsoSettings { c2: f64::INFINITY, ..Default::default() },
        ] {
            let err = ParticleSwarm::new(settings.clone(), bounds(), None).err().unwrap();
            assert!(matches!(err, ro_types::OptError::Config(_)), "{settings:?}");
        }
    }
}
