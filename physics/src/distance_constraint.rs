//! Distance constraints: spring-like links holding two particles at a rest
//! length.
//!
//! Solving happens in impulse space. `compute_data` linearizes each
//! constraint once per tick (unit axis, rest impulse, effective masses);
//! the warm start replays last tick's accumulated impulse along the new
//! axis; the corrective pass is a symmetric Gauss-Seidel relaxation that
//! reads the freshest particle impulses written by its neighbours, which is
//! what makes it converge and why it must stay sequential.

use glam::Vec2;
use rayon::prelude::*;

use crate::particle::{ParticleId, ParticleStore};
use crate::slot::SlotAllocator;
use crate::StoreError;

pub type DistanceConstraintId = u32;

#[derive(Clone)]
pub struct DistanceConstraintStore {
    slots: SlotAllocator,
    pub(crate) particle_a: Vec<ParticleId>,
    pub(crate) particle_b: Vec<ParticleId>,
    stiffness: Vec<f32>,
    damping: Vec<f32>,
    warm_start: Vec<f32>,
    correction: Vec<f32>,
    /// Visual thickness, carried for the caller's benefit only.
    radius: Vec<f32>,
    rest_length: Vec<f32>,
    /// Normalized axis from particle A to particle B, zero when the
    /// particles coincide. Recomputed every tick.
    pub(crate) unit: Vec<Vec2>,
    rest_impulse: Vec<f32>,
    pub(crate) reduced_mass: Vec<f32>,
    /// `1 / (|delta|^2 * reduced_mass)`, zero when degenerate. The angular
    /// constraint solver leans on this as the segment's effective inertia.
    pub(crate) inverse_inertia: Vec<f32>,
    /// Signed angular rate of the segment, consumed by angular constraints.
    pub(crate) angular_velocity: Vec<f32>,
    /// Warm-start seed: sum of corrective impulses applied last tick.
    accumulated_impulse: Vec<Vec2>,
}

impl DistanceConstraintStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotAllocator::with_capacity(capacity),
            particle_a: vec![0; capacity],
            particle_b: vec![0; capacity],
            stiffness: vec![0.0; capacity],
            damping: vec![0.0; capacity],
            warm_start: vec![0.0; capacity],
            correction: vec![0.0; capacity],
            radius: vec![0.0; capacity],
            rest_length: vec![0.0; capacity],
            unit: vec![Vec2::ZERO; capacity],
            rest_impulse: vec![0.0; capacity],
            reduced_mass: vec![0.0; capacity],
            inverse_inertia: vec![0.0; capacity],
            angular_velocity: vec![0.0; capacity],
            accumulated_impulse: vec![Vec2::ZERO; capacity],
        }
    }

    /// Links `a` and `b` with the given rest length. Only stable ids are
    /// recorded; dense indices are resolved on every access.
    pub fn create(
        &mut self,
        a: ParticleId,
        b: ParticleId,
        radius: f32,
        rest_length: f32,
    ) -> Result<DistanceConstraintId, StoreError> {
        let id = self.slots.alloc().ok_or(StoreError::Full)?;
        let index = self.slots.len() - 1;
        self.particle_a[index] = a;
        self.particle_b[index] = b;
        self.stiffness[index] = 1.0;
        self.damping[index] = 1.0;
        self.warm_start[index] = 1.0;
        self.correction[index] = 1.0;
        self.radius[index] = radius;
        self.rest_length[index] = rest_length;
        self.unit[index] = Vec2::ZERO;
        self.rest_impulse[index] = 0.0;
        self.reduced_mass[index] = 0.0;
        self.inverse_inertia[index] = 0.0;
        self.angular_velocity[index] = 0.0;
        self.accumulated_impulse[index] = Vec2::ZERO;
        Ok(id)
    }

    pub fn delete(&mut self, id: DistanceConstraintId) -> bool {
        let Some((index, last)) = self.slots.free(id) else {
            return false;
        };
        self.particle_a.swap(index, last);
        self.particle_b.swap(index, last);
        self.stiffness.swap(index, last);
        self.damping.swap(index, last);
        self.warm_start.swap(index, last);
        self.correction.swap(index, last);
        self.radius.swap(index, last);
        self.rest_length.swap(index, last);
        self.unit.swap(index, last);
        self.rest_impulse.swap(index, last);
        self.reduced_mass.swap(index, last);
        self.inverse_inertia.swap(index, last);
        self.angular_velocity.swap(index, last);
        self.accumulated_impulse.swap(index, last);
        true
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Dense index of a live constraint.
    #[inline]
    pub fn index(&self, id: DistanceConstraintId) -> Option<usize> {
        self.slots.index(id)
    }

    pub fn set_coefficients(
        &mut self,
        id: DistanceConstraintId,
        stiffness: f32,
        damping: f32,
        warm_start: f32,
        correction: f32,
    ) -> bool {
        let Some(index) = self.slots.index(id) else {
            return false;
        };
        self.stiffness[index] = stiffness;
        self.damping[index] = damping;
        self.warm_start[index] = warm_start;
        self.correction[index] = correction;
        true
    }

    pub fn set_rest_length(&mut self, id: DistanceConstraintId, rest_length: f32) -> bool {
        let Some(index) = self.slots.index(id) else {
            return false;
        };
        self.rest_length[index] = rest_length;
        true
    }

    pub fn particle_a_ids(&self) -> &[ParticleId] {
        &self.particle_a[..self.slots.len()]
    }

    pub fn particle_b_ids(&self) -> &[ParticleId] {
        &self.particle_b[..self.slots.len()]
    }

    pub fn radii(&self) -> &[f32] {
        &self.radius[..self.slots.len()]
    }

    /// Refreshes the per-tick linearization: axis, position/velocity errors
    /// folded into a rest impulse, and the effective masses. Each row writes
    /// only its own columns, so the loop fans out.
    pub fn compute_data(&mut self, particles: &ParticleStore, inv_dt: f32) {
        let n = self.slots.len();
        let Self {
            particle_a,
            particle_b,
            stiffness,
            damping,
            rest_length,
            unit,
            rest_impulse,
            reduced_mass,
            inverse_inertia,
            angular_velocity,
            ..
        } = self;
        (
            &particle_a[..n],
            &particle_b[..n],
            &stiffness[..n],
            &damping[..n],
            &rest_length[..n],
            &mut unit[..n],
            &mut rest_impulse[..n],
            &mut reduced_mass[..n],
            &mut inverse_inertia[..n],
            &mut angular_velocity[..n],
        )
            .into_par_iter()
            .for_each(
                |(
                    &a,
                    &b,
                    &stiffness,
                    &damping,
                    &rest_length,
                    unit,
                    rest_impulse,
                    reduced_mass,
                    inverse_inertia,
                    angular_velocity,
                )| {
                    let (Some(index_a), Some(index_b)) =
                        (particles.index(a), particles.index(b))
                    else {
                        *unit = Vec2::ZERO;
                        *rest_impulse = 0.0;
                        *reduced_mass = 0.0;
                        *inverse_inertia = 0.0;
                        *angular_velocity = 0.0;
                        return;
                    };
                    let delta_pos = particles.position[index_b] - particles.position[index_a];
                    let delta_vel = particles.velocity[index_b] - particles.velocity[index_a];
                    let distance = delta_pos.length();
                    *unit = if distance > 0.0 {
                        delta_pos / distance
                    } else {
                        Vec2::ZERO
                    };
                    let distance_error = unit.dot(delta_pos) - rest_length;
                    let velocity_error = unit.dot(delta_vel);
                    *rest_impulse = -(distance_error * stiffness * inv_dt
                        + velocity_error * damping);
                    let inv_mass_sum =
                        particles.inv_mass[index_a] + particles.inv_mass[index_b];
                    *reduced_mass = if inv_mass_sum > 0.0 {
                        1.0 / inv_mass_sum
                    } else {
                        0.0
                    };
                    let inertia = distance * distance * *reduced_mass;
                    *inverse_inertia = if inertia > 0.0 { 1.0 / inertia } else { 0.0 };
                    *angular_velocity =
                        delta_pos.perp_dot(delta_vel) * *reduced_mass * *inverse_inertia;
                },
            );
    }

    /// Replays last tick's accumulated impulse along the fresh axis, then
    /// resets the accumulator for this tick's sweeps. Impulses that would
    /// act against the axis are discarded rather than replayed.
    pub fn apply_warm_start(&mut self, particles: &mut ParticleStore) {
        let n = self.slots.len();
        for i in 0..n {
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

    /// One symmetric Gauss-Seidel relaxation: a forward sweep followed by a
    /// reverse sweep over all live constraints.
    pub fn apply_corrective_impulse(&mut self, particles: &mut ParticleStore) {
        let n = self.slots.len();
        for i in 0..n {
            self.solve_row(particles, i);
        }
        for i in (0..n).rev() {
            self.solve_row(particles, i);
        }
    }

    fn solve_row(&mut self, particles: &mut ParticleStore, i: usize) {
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
