//! Angular constraints: couples the orientations of two distance-constraint
//! segments.
//!
//! The angle between two segments is kept as `(cos, sin)` of the signed
//! angle from the first segment's axis to the second's, so the angle error
//! is a single 2D cross product and no trigonometry runs in the hot loop.
//! Corrective impulses are scalar angular impulses that get back-projected
//! into perpendicular linear impulses on the four endpoint particles.

use glam::Vec2;
use rayon::prelude::*;

use crate::distance_constraint::{DistanceConstraintId, DistanceConstraintStore};
use crate::particle::ParticleStore;
use crate::slot::SlotAllocator;
use crate::StoreError;

pub type AngularConstraintId = u32;

#[derive(Clone)]
pub struct AngularConstraintStore {
    slots: SlotAllocator,
    dc_a: Vec<DistanceConstraintId>,
    dc_b: Vec<DistanceConstraintId>,
    stiffness: Vec<f32>,
    damping: Vec<f32>,
    warm_start: Vec<f32>,
    correction: Vec<f32>,
    /// Current `(cos, sin)` of the angle from segment A to segment B.
    angle: Vec<Vec2>,
    /// Captured at creation, immutable afterwards.
    rest_angle: Vec<Vec2>,
    rest_impulse: Vec<f32>,
    reduced_inertia: Vec<f32>,
    accumulated_impulse: Vec<f32>,
}

/// `(cos, sin)` of the signed angle between two segment axes.
#[inline]
fn angle_between(unit_a: Vec2, unit_b: Vec2) -> Vec2 {
    Vec2::new(unit_a.dot(unit_b), unit_a.perp_dot(unit_b))
}

impl AngularConstraintStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotAllocator::with_capacity(capacity),
            dc_a: vec![0; capacity],
            dc_b: vec![0; capacity],
            stiffness: vec![0.0; capacity],
            damping: vec![0.0; capacity],
            warm_start: vec![0.0; capacity],
            correction: vec![0.0; capacity],
            angle: vec![Vec2::ZERO; capacity],
            rest_angle: vec![Vec2::ZERO; capacity],
            rest_impulse: vec![0.0; capacity],
            reduced_inertia: vec![0.0; capacity],
            accumulated_impulse: vec![0.0; capacity],
        }
    }

    /// Couples two distance constraints, freezing their current relative
    /// angle as the rest angle. The axes are derived from the endpoint
    /// particles' positions at the time of the call, so creation does not
    /// depend on the per-tick transient data being fresh.
    pub fn create(
        &mut self,
        dc_a: DistanceConstraintId,
        dc_b: DistanceConstraintId,
        constraints: &DistanceConstraintStore,
        particles: &ParticleStore,
    ) -> Result<AngularConstraintId, StoreError> {
        let id = self.slots.alloc().ok_or(StoreError::Full)?;
        let index = self.slots.len() - 1;
        let rest = angle_between(
            segment_axis(constraints, particles, dc_a),
            segment_axis(constraints, particles, dc_b),
        );
        self.dc_a[index] = dc_a;
        self.dc_b[index] = dc_b;
        self.stiffness[index] = 1.0;
        self.damping[index] = 1.0;
        self.warm_start[index] = 1.0;
        self.correction[index] = 1.0;
        self.angle[index] = rest;
        self.rest_angle[index] = rest;
        self.rest_impulse[index] = 0.0;
        self.reduced_inertia[index] = 0.0;
        self.accumulated_impulse[index] = 0.0;
        Ok(id)
    }

    pub fn delete(&mut self, id: AngularConstraintId) -> bool {
        let Some((index, last)) = self.slots.free(id) else {
            return false;
        };
        self.dc_a.swap(index, last);
        self.dc_b.swap(index, last);
        self.stiffness.swap(index, last);
        self.damping.swap(index, last);
        self.warm_start.swap(index, last);
        self.correction.swap(index, last);
        self.angle.swap(index, last);
        self.rest_angle.swap(index, last);
        self.rest_impulse.swap(index, last);
        self.reduced_inertia.swap(index, last);
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
    pub fn index(&self, id: AngularConstraintId) -> Option<usize> {
        self.slots.index(id)
    }

    pub fn set_coefficients(
        &mut self,
        id: AngularConstraintId,
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

    /// Refreshes the current angle, angle error and effective inertia from
    /// the parent constraints' per-tick data.
    pub fn compute_data(&mut self, constraints: &DistanceConstraintStore, inv_dt: f32) {
        let n = self.slots.len();
        let Self {
            dc_a,
            dc_b,
            stiffness,
            damping,
            angle,
            rest_angle,
            rest_impulse,
            reduced_inertia,
            ..
        } = self;
        (
            &dc_a[..n],
            &dc_b[..n],
            &stiffness[..n],
            &damping[..n],
            &rest_angle[..n],
            &mut angle[..n],
            &mut rest_impulse[..n],
            &mut reduced_inertia[..n],
        )
            .into_par_iter()
            .for_each(
                |(&dc_a, &dc_b, &stiffness, &damping, &rest_angle, angle, rest_impulse, reduced_inertia)| {
                    let (Some(index_a), Some(index_b)) =
                        (constraints.index(dc_a), constraints.index(dc_b))
                    else {
                        *rest_impulse = 0.0;
                        *reduced_inertia = 0.0;
                        return;
                    };
                    *angle = angle_between(
                        constraints.unit[index_a],
                        constraints.unit[index_b],
                    );
                    let angle_error = rest_angle.x * angle.y - rest_angle.y * angle.x;
                    let angular_velocity_error = constraints.angular_velocity[index_b]
                        - constraints.angular_velocity[index_a];
                    let inverse_inertia_sum = constraints.inverse_inertia[index_a]
                        + constraints.inverse_inertia[index_b];
                    *reduced_inertia = if inverse_inertia_sum > 0.0 {
                        1.0 / inverse_inertia_sum
                    } else {
                        0.0
                    };
                    *rest_impulse =
                        -(stiffness * angle_error * inv_dt + damping * angular_velocity_error);
                },
            );
    }

    /// Replays last tick's accumulated angular impulse and resets the
    /// accumulator.
    pub fn apply_warm_start(
        &mut self,
        constraints: &DistanceConstraintStore,
        particles: &mut ParticleStore,
    ) {
        let n = self.slots.len();
        for i in 0..n {
            let impulse = self.warm_start[i] * self.accumulated_impulse[i];
            self.accumulated_impulse[i] = 0.0;
            if impulse == 0.0 {
                continue;
            }
            apply_angular_impulse(constraints, particles, self.dc_a[i], self.dc_b[i], impulse);
        }
    }

    /// Symmetric Gauss-Seidel sweep over all live angular constraints.
    pub fn apply_corrective_impulse(
        &mut self,
        constraints: &DistanceConstraintStore,
        particles: &mut ParticleStore,
    ) {
        let n = self.slots.len();
        for i in 0..n {
            self.solve_row(constraints, particles, i);
        }
        for i in (0..n).rev() {
            self.solve_row(constraints, particles, i);
        }
    }

    fn solve_row(
        &mut self,
        constraints: &DistanceConstraintStore,
        particles: &mut ParticleStore,
        i: usize,
    ) {
        let Some(angular_a) = measure_side(constraints, particles, self.dc_a[i]) else {
            return;
        };
        let Some(angular_b) = measure_side(constraints, particles, self.dc_b[i]) else {
            return;
        };
        let delta = angular_b - angular_a;
        let error = delta - self.rest_impulse[i];
        let corrective = -error * self.reduced_inertia[i] * self.correction[i];
        apply_angular_impulse(constraints, particles, self.dc_a[i], self.dc_b[i], corrective);
        self.accumulated_impulse[i] += corrective;
    }
}

/// Current normalized axis of a distance constraint, straight from its
/// endpoint particles. Zero when either endpoint is gone or the segment is
/// degenerate.
fn segment_axis(
    constraints: &DistanceConstraintStore,
    particles: &ParticleStore,
    id: DistanceConstraintId,
) -> Vec2 {
    let Some(index) = constraints.index(id) else {
        return Vec2::ZERO;
    };
    let (Some(index_a), Some(index_b)) = (
        particles.index(constraints.particle_a[index]),
        particles.index(constraints.particle_b[index]),
    ) else {
        return Vec2::ZERO;
    };
    (particles.position[index_b] - particles.position[index_a]).normalize_or_zero()
}

/// Angular impulse currently stored in one segment's endpoint impulses:
/// the 2D cross of the segment with the relative impulse, taken through the
/// segment's reduced mass and inverse inertia.
fn measure_side(
    constraints: &DistanceConstraintStore,
    particles: &ParticleStore,
    id: DistanceConstraintId,
) -> Option<f32> {
    let index = constraints.index(id)?;
    let index_1 = particles.index(constraints.particle_a[index])?;
    let index_2 = particles.index(constraints.particle_b[index])?;
    let distance = particles.position[index_2] - particles.position[index_1];
    let impulse = particles.impulse[index_2] - particles.impulse[index_1];
    let local_impulse = distance.perp_dot(impulse) * constraints.reduced_mass[index];
    Some(local_impulse * constraints.inverse_inertia[index])
}

/// Back-projects a scalar angular impulse into perpendicular linear
/// impulses on the four endpoint particles: segment B receives the impulse,
/// segment A its reaction.
fn apply_angular_impulse(
    constraints: &DistanceConstraintStore,
    particles: &mut ParticleStore,
    dc_a: DistanceConstraintId,
    dc_b: DistanceConstraintId,
    impulse: f32,
) {
    apply_to_side(constraints, particles, dc_a, -impulse);
    apply_to_side(constraints, particles, dc_b, impulse);
}

fn apply_to_side(
    constraints: &DistanceConstraintStore,
    particles: &mut ParticleStore,
    id: DistanceConstraintId,
    impulse: f32,
) {
    let Some(index) = constraints.index(id) else {
        return;
    };
    let (Some(index_1), Some(index_2)) = (
        particles.index(constraints.particle_a[index]),
        particles.index(constraints.particle_b[index]),
    ) else {
        return;
    };
    let distance = particles.position[index_2] - particles.position[index_1];
    let linear = distance.perp()
        * (impulse * constraints.inverse_inertia[index] * constraints.reduced_mass[index]);
    particles.impulse[index_1] -= linear * particles.inv_mass[index_1];
    particles.impulse[index_2] += linear * particles.inv_mass[index_2];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color;
    use crate::particle::ObjectType;
    use glam::vec2;

    /// Three particles in an L: hub at the origin, one arm along +x, one
    /// along +y, linked hub->arm by two distance constraints.
    fn elbow() -> (
        ParticleStore,
        DistanceConstraintStore,
        DistanceConstraintId,
        DistanceConstraintId,
    ) {
        let mut particles = ParticleStore::with_capacity(8);
        let hub = particles
            .create(
                ObjectType::Particle,
                Vec2::ZERO,
                Vec2::ZERO,
                1.0,
                1.0,
                color::WHITE,
            )
            .unwrap();
        let arm_x = particles
            .create(
                ObjectType::Particle,
                vec2(10.0, 0.0),
                Vec2::ZERO,
                1.0,
                1.0,
                color::WHITE,
            )
            .unwrap();
        let arm_y = particles
            .create(
                ObjectType::Particle,
                vec2(0.0, 10.0),
                Vec2::ZERO,
                1.0,
                1.0,
                color::WHITE,
            )
            .unwrap();
        let mut constraints = DistanceConstraintStore::with_capacity(8);
        let dc_a = constraints.create(hub, arm_x, 1.0, 10.0).unwrap();
        let dc_b = constraints.create(hub, arm_y, 1.0, 10.0).unwrap();
        (particles, constraints, dc_a, dc_b)
    }

    #[test]
    fn rest_angle_is_captured_at_creation() {
        let (particles, constraints, dc_a, dc_b) = elbow();
        let mut angulars = AngularConstraintStore::with_capacity(4);
        let id = angulars
            .create(dc_a, dc_b, &constraints, &particles)
            .unwrap();
        let index = angulars.index(id).unwrap();
        // Right angle: cos ~ 0, sin ~ 1.
        assert!(angulars.rest_angle[index].x.abs() < 1e-6);
        assert!((angulars.rest_angle[index].y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unmoved_elbow_produces_no_impulse() {
        let (mut particles, mut constraints, dc_a, dc_b) = elbow();
        let mut angulars = AngularConstraintStore::with_capacity(4);
        angulars.create(dc_a, dc_b, &constraints, &particles).unwrap();
        constraints.compute_data(&particles, 100.0);
        angulars.compute_data(&constraints, 100.0);
        angulars.apply_corrective_impulse(&constraints, &mut particles);
        for index in 0..particles.len() {
            assert!(particles.impulse[index].length() < 1e-6);
        }
    }

    #[test]
    fn bent_elbow_is_pushed_back_toward_rest() {
        let (mut particles, mut constraints, dc_a, dc_b) = elbow();
        let mut angulars = AngularConstraintStore::with_capacity(4);
        angulars.create(dc_a, dc_b, &constraints, &particles).unwrap();
        // Close the right angle to 45 degrees by moving the y arm.
        let arm_y = constraints.particle_b_ids()[1];
        let index = particles.index(arm_y).unwrap();
        particles.position[index] = vec2(7.071, 7.071);
        constraints.compute_data(&particles, 100.0);
        angulars.compute_data(&constraints, 100.0);
        angulars.apply_corrective_impulse(&constraints, &mut particles);
        // The y arm should be pushed away from the x arm (counterclockwise).
        let impulse = particles.impulse[particles.index(arm_y).unwrap()];
        let tangent = vec2(-7.071, 7.071).normalize();
        assert!(
            impulse.dot(tangent) > 0.0,
            "expected a restoring push, got {impulse:?}"
        );
    }

    #[test]
    fn warm_start_resets_accumulator() {
        let (mut particles, mut constraints, dc_a, dc_b) = elbow();
        let mut angulars = AngularConstraintStore::with_capacity(4);
        let id = angulars
            .create(dc_a, dc_b, &constraints, &particles)
            .unwrap();
        constraints.compute_data(&particles, 100.0);
        angulars.compute_data(&constraints, 100.0);
        let index = angulars.index(id).unwrap();
        angulars.accumulated_impulse[index] = 3.0;
        angulars.apply_warm_start(&constraints, &mut particles);
        assert_eq!(angulars.accumulated_impulse[index], 0.0);
        // The back-projected impulses land somewhere on the four endpoints.
        let total: f32 = (0..particles.len())
            .map(|i| particles.impulse[i].length())
            .sum();
        assert!(total > 0.0);
    }
}
