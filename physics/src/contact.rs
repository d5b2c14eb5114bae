//! Persistent particle-particle contacts.
//!
//! A contact is keyed by the packed pair key `(min_id << 32) | max_id` and
//! lives from the first tick the broadphase brings the pair within the
//! interaction margin until the pair separates beyond it again. Keeping the
//! record across ticks is what lets the accumulated impulse warm-start the
//! next tick's solve, which is where most of the stacking stability comes
//! from.

use std::collections::HashMap;

use glam::Vec2;
use rayon::prelude::*;

use crate::particle::{ParticleId, ParticleStore, CONTACT_MARGIN};
use crate::StoreError;

/// Canonical 64-bit key for an unordered particle pair.
#[inline]
pub fn pair_key(a: ParticleId, b: ParticleId) -> u64 {
    let (min, max) = if a < b { (a, b) } else { (b, a) };
    ((min as u64) << 32) | max as u64
}

const DEFAULT_STIFFNESS: f32 = 0.5;
const DEFAULT_DAMPING: f32 = 1.0;
const DEFAULT_WARM_START: f32 = 0.5;
const DEFAULT_CORRECTION: f32 = 0.2;

/// Flag value planted in the `reduced_mass` column by `compute_data` when a
/// pair has separated; `prune` deletes every flagged row.
const PRUNE_FLAG: f32 = -1.0;

#[derive(Clone)]
pub struct ContactStore {
    /// Pair key -> dense index.
    map: HashMap<u64, u32>,
    /// Dense index -> pair key, the contact analog of an id column.
    keys: Vec<u64>,
    /// Lower particle id of the pair.
    particle_a: Vec<ParticleId>,
    /// Higher particle id of the pair.
    particle_b: Vec<ParticleId>,
    stiffness: Vec<f32>,
    damping: Vec<f32>,
    warm_start: Vec<f32>,
    correction: Vec<f32>,
    reduced_mass: Vec<f32>,
    /// Signed separation: negative while penetrating, and a positive
    /// sentinel while the pair sits inside the margin without touching so
    /// the solver skips it.
    distance: Vec<f32>,
    rest_impulse: Vec<f32>,
    unit: Vec<Vec2>,
    accumulated_impulse: Vec<Vec2>,
    len: usize,
    capacity: usize,
}

impl ContactStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity * 2),
            keys: vec![0; capacity],
            particle_a: vec![0; capacity],
            particle_b: vec![0; capacity],
            stiffness: vec![0.0; capacity],
            damping: vec![0.0; capacity],
            warm_start: vec![0.0; capacity],
            correction: vec![0.0; capacity],
            reduced_mass: vec![0.0; capacity],
            distance: vec![0.0; capacity],
            rest_impulse: vec![0.0; capacity],
            unit: vec![Vec2::ZERO; capacity],
            accumulated_impulse: vec![Vec2::ZERO; capacity],
            len: 0,
            capacity,
        }
    }

    /// Registers a contact for the pair if one does not exist yet and the
    /// particles actually are within interaction range (the narrowphase
    /// check). Returns whether a contact was created; a pair that fails the
    /// range check or references dead particles is quietly rejected.
    pub fn create(
        &mut self,
        a: ParticleId,
        b: ParticleId,
        particles: &ParticleStore,
    ) -> Result<bool, StoreError> {
        let (min, max) = if a < b { (a, b) } else { (b, a) };
        let key = pair_key(min, max);
        if self.map.contains_key(&key) {
            return Err(StoreError::DuplicateContact);
        }
        if self.len == self.capacity {
            return Err(StoreError::Full);
        }
        let (Some(index_a), Some(index_b)) = (particles.index(min), particles.index(max)) else {
            return Ok(false);
        };
        let delta = particles.position[index_b] - particles.position[index_a];
        let reach =
            particles.radius[index_a] + particles.radius[index_b] + CONTACT_MARGIN;
        if delta.length_squared() > reach * reach {
            return Ok(false);
        }
        let inv_mass_sum = particles.inv_mass[index_a] + particles.inv_mass[index_b];
        let index = self.len;
        self.keys[index] = key;
        self.particle_a[index] = min;
        self.particle_b[index] = max;
        self.stiffness[index] = DEFAULT_STIFFNESS;
        self.damping[index] = DEFAULT_DAMPING;
        self.warm_start[index] = DEFAULT_WARM_START;
        self.correction[index] = DEFAULT_CORRECTION;
        self.reduced_mass[index] = if inv_mass_sum > 0.0 {
            1.0 / inv_mass_sum
        } else {
            0.0
        };
        self.distance[index] = 0.0;
        self.rest_impulse[index] = 0.0;
        self.unit[index] = Vec2::ZERO;
        self.accumulated_impulse[index] = Vec2::ZERO;
        self.map.insert(key, index as u32);
        self.len += 1;
        Ok(true)
    }

    /// Swap-deletes the contact for `key`.
    pub fn delete(&mut self, key: u64) -> bool {
        let Some(index) = self.map.remove(&key) else {
            return false;
        };
        let index = index as usize;
        let last = self.len - 1;
        if index != last {
            self.keys.swap(index, last);
            self.particle_a.swap(index, last);
            self.particle_b.swap(index, last);
            self.stiffness.swap(index, last);
            self.damping.swap(index, last);
            self.warm_start.swap(index, last);
            self.correction.swap(index, last);
            self.reduced_mass.swap(index, last);
            self.distance.swap(index, last);
            self.rest_impulse.swap(index, last);
            self.unit.swap(index, last);
            self.accumulated_impulse.swap(index, last);
            self.map.insert(self.keys[index], index as u32);
        }
        self.len -= 1;
        true
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.len = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, a: ParticleId, b: ParticleId) -> bool {
        self.map.contains_key(&pair_key(a, b))
    }

    /// Signed separation of the pair's contact, negative while penetrating.
    pub fn separation(&self, a: ParticleId, b: ParticleId) -> Option<f32> {
        let index = *self.map.get(&pair_key(a, b))? as usize;
        Some(self.distance[index])
    }

    /// Per-tick refresh. Each contact lands in one of three regimes:
    /// separated beyond the margin (flagged for pruning), inside the margin
    /// but not touching (parked with a positive distance sentinel), or
    /// penetrating (full rest-impulse computation).
    pub fn compute_data(&mut self, particles: &ParticleStore, inv_dt: f32) {
        let n = self.len;
        let Self {
            particle_a,
            particle_b,
            stiffness,
            damping,
            reduced_mass,
            distance,
            rest_impulse,
            unit,
            ..
        } = self;
        (
            &particle_a[..n],
            &particle_b[..n],
            &stiffness[..n],
            &damping[..n],
            &mut reduced_mass[..n],
            &mut distance[..n],
            &mut rest_impulse[..n],
            &mut unit[..n],
        )
            .into_par_iter()
            .for_each(
                |(&a, &b, &stiffness, &damping, reduced_mass, distance, rest_impulse, unit)| {
                    let (Some(index_a), Some(index_b)) =
                        (particles.index(a), particles.index(b))
                    else {
                        *reduced_mass = PRUNE_FLAG;
                        return;
                    };
                    let delta_pos =
                        particles.position[index_b] - particles.position[index_a];
                    let distance_squared = delta_pos.length_squared();
                    let sum_radii = particles.radius[index_a] + particles.radius[index_b];
                    let reach = sum_radii + CONTACT_MARGIN;
                    if distance_squared > reach * reach {
                        *reduced_mass = PRUNE_FLAG;
                        return;
                    }
                    if distance_squared > sum_radii * sum_radii {
                        // In range but not touching; park the contact so its
                        // accumulated impulse survives a grazing pass.
                        *rest_impulse = 0.0;
                        *distance = 1.0;
                        return;
                    }
                    let d = distance_squared.sqrt();
                    *distance = d - sum_radii;
                    *unit = if d > 0.0 { delta_pos / d } else { Vec2::X };
                    let delta_vel =
                        particles.velocity[index_b] - particles.velocity[index_a];
                    let velocity_error = unit.dot(delta_vel);
                    *rest_impulse =
                        -(*distance * stiffness * inv_dt + velocity_error * damping);
                },
            );
    }

    /// Deletes every contact flagged by `compute_data`. Walking the dense
    /// region backward keeps swap-delete from skipping rows.
    pub fn prune(&mut self) {
        for index in (0..self.len).rev() {
            if self.reduced_mass[index] == PRUNE_FLAG {
                self.delete(self.keys[index]);
            }
        }
    }

    /// Replays last tick's accumulated impulse along the fresh normal.
    pub fn apply_warm_start(&mut self, particles: &mut ParticleStore) {
        for i in 0..self.len {
            let projected = self.unit[i].dot(self.accumulated_impulse[i]);
            self.accumulated_impulse[i] = Vec2::ZERO;
            if projected < 0.0 {
                continue;
            }
            let (Some(index_a), Some(index_b)) = (
                particles.index(self.particle_a[i]),
                particles.index(self.particle_b[i]),
            ) else {
                continue;
            };
            let impulse = self.unit[i] * (projected * self.warm_start[i]);
            particles.impulse[index_a] -= impulse * particles.inv_mass[index_a];
            particles.impulse[index_b] += impulse * particles.inv_mass[index_b];
        }
    }

    /// Symmetric Gauss-Seidel sweep over the penetrating contacts.
    pub fn apply_corrective_impulse(&mut self, particles: &mut ParticleStore) {
        let n = self.len;
        for i in 0..n {
            self.solve_row(particles, i);
        }
        for i in (0..n).rev() {
            self.solve_row(particles, i);
        }
    }

    fn solve_row(&mut self, particles: &mut ParticleStore, i: usize) {
        if self.distance[i] > 0.0 {
            return;
        }
        let (Some(index_a), Some(index_b)) = (
            particles.index(self.particle_a[i]),
            particles.index(self.particle_b[i]),
        ) else {
            return;
        };
        let unit = self.unit[i];
        let delta_impulse = particles.impulse[index_b] - particles.impulse[index_a];
        let projected = unit.dot(delta_impulse);
        let error =
            (projected - self.rest_impulse[i]) * self.reduced_mass[i] * self.correction[i];
        let corrective = -unit * error;
        particles.impulse[index_a] -= corrective * particles.inv_mass[index_a];
        particles.impulse[index_b] += corrective * particles.inv_mass[index_b];
        self.accumulated_impulse[i] += corrective;
    }
}
