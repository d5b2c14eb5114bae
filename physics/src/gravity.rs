//! Pairwise Newtonian gravity.

use glam::Vec2;
use rayon::prelude::*;

use crate::particle::{ParticleId, ParticleStore};

/// Softening added to every squared distance so coincident particles do not
/// produce unbounded forces.
const SOFTENING: f32 = 1.0;

/// Accumulates `G * m_a * m_b / (|d|^2 + 1)` attraction impulses between
/// particles.
///
/// The self-interaction path is a parallel map over a scratch column (one
/// private slot per dense particle index) followed by a parallel reduce into
/// the shared impulse column, so no two tasks ever write the same slot. The
/// bipartite path applies each pair symmetrically and stays sequential.
#[derive(Clone)]
pub struct NewtonianGravity {
    /// Gravitational constant. Zero disables the solver entirely.
    pub g: f32,
    scratch: Vec<Vec2>,
}

impl NewtonianGravity {
    pub fn new(g: f32, max_particles: usize) -> Self {
        Self {
            g,
            scratch: vec![Vec2::ZERO; max_particles],
        }
    }

    /// Attracts every live particle to every other live particle. `dt` is
    /// folded into the accumulated impulse here, matching the integrator's
    /// impulse convention.
    pub fn solve_self(&mut self, particles: &mut ParticleStore, dt: f32) {
        if self.g == 0.0 {
            return;
        }
        let n = particles.len();
        let g = self.g;
        {
            let position = &particles.position[..n];
            let mass = &particles.mass[..n];
            self.scratch[..n]
                .par_iter_mut()
                .enumerate()
                .for_each(|(a, slot)| {
                    let pos_a = position[a];
                    let mass_a = mass[a];
                    let mut sum = Vec2::ZERO;
                    for b in 0..n {
                        if b == a {
                            continue;
                        }
                        let delta = position[b] - pos_a;
                        let distance_squared = delta.length_squared();
                        if distance_squared <= 0.0 {
                            continue;
                        }
                        let force = g * mass_a * mass[b] / (distance_squared + SOFTENING);
                        sum += delta * (force / distance_squared.sqrt());
                    }
                    *slot = sum;
                });
        }
        let impulse = &mut particles.impulse[..n];
        let inv_mass = &particles.inv_mass[..n];
        (impulse, &self.scratch[..n], inv_mass)
            .into_par_iter()
            .for_each(|(impulse, &sum, &inv_mass)| {
                *impulse += sum * inv_mass * dt;
            });
    }

    /// Attracts the particles of `group_a` to the particles of `group_b`
    /// pair by pair. Ids that are not live are skipped.
    pub fn solve_bipartite(
        &self,
        particles: &mut ParticleStore,
        group_a: &[ParticleId],
        group_b: &[ParticleId],
        dt: f32,
    ) {
        if self.g == 0.0 {
            return;
        }
        for &a in group_a {
            let Some(index_a) = particles.index(a) else {
                continue;
            };
            for &b in group_b {
                if a == b {
                    continue;
                }
                let Some(index_b) = particles.index(b) else {
                    continue;
                };
                let delta = particles.position[index_b] - particles.position[index_a];
                let distance_squared = delta.length_squared();
                if distance_squared <= 0.0 {
                    continue;
                }
                let force = self.g * particles.mass[index_a] * particles.mass[index_b]
                    / (distance_squared + SOFTENING);
                let impulse = delta * (force / distance_squared.sqrt()) * dt;
                particles.impulse[index_a] += impulse * particles.inv_mass[index_a];
                particles.impulse[index_b] -= impulse * particles.inv_mass[index_b];
            }
        }
    }
}
