//! Entity creation, deletion and read-only views on [`World`].
//!
//! This is deliberately a thin facade: all policy lives in the stores, the
//! world only wires them together and resolves the cross-store lookups a
//! caller would otherwise need mutable store access for.

use glam::Vec2;

use crate::angular_constraint::AngularConstraintId;
use crate::color::Color;
use crate::distance_constraint::DistanceConstraintId;
use crate::particle::{ObjectType, ParticleId};
use crate::{StoreError, World};

impl World {
    pub fn create_particle(
        &mut self,
        object_type: ObjectType,
        position: Vec2,
        velocity: Vec2,
        mass: f32,
        radius: f32,
        color: Color,
    ) -> Result<ParticleId, StoreError> {
        self.particles
            .create(object_type, position, velocity, mass, radius, color)
    }

    pub fn delete_particle(&mut self, id: ParticleId) -> bool {
        self.particles.delete(id)
    }

    /// Links two particles at their current distance. Callers that want a
    /// pre-tensioned link use [`World::create_distance_constraint_with_rest_length`].
    pub fn create_distance_constraint(
        &mut self,
        a: ParticleId,
        b: ParticleId,
        radius: f32,
    ) -> Result<DistanceConstraintId, StoreError> {
        let position_a = self.particles.position_of(a).unwrap_or(Vec2::ZERO);
        let position_b = self.particles.position_of(b).unwrap_or(Vec2::ZERO);
        let rest_length = (position_b - position_a).length();
        self.distance_constraints.create(a, b, radius, rest_length)
    }

    pub fn create_distance_constraint_with_rest_length(
        &mut self,
        a: ParticleId,
        b: ParticleId,
        radius: f32,
        rest_length: f32,
    ) -> Result<DistanceConstraintId, StoreError> {
        self.distance_constraints.create(a, b, radius, rest_length)
    }

    pub fn delete_distance_constraint(&mut self, id: DistanceConstraintId) -> bool {
        self.distance_constraints.delete(id)
    }

    /// Couples two distance constraints at their current relative angle.
    pub fn create_angular_constraint(
        &mut self,
        dc_a: DistanceConstraintId,
        dc_b: DistanceConstraintId,
    ) -> Result<AngularConstraintId, StoreError> {
        self.angular_constraints
            .create(dc_a, dc_b, &self.distance_constraints, &self.particles)
    }

    pub fn delete_angular_constraint(&mut self, id: AngularConstraintId) -> bool {
        self.angular_constraints.delete(id)
    }

    pub fn set_distance_constraint_coefficients(
        &mut self,
        id: DistanceConstraintId,
        stiffness: f32,
        damping: f32,
        warm_start: f32,
        correction: f32,
    ) -> bool {
        self.distance_constraints
            .set_coefficients(id, stiffness, damping, warm_start, correction)
    }

    pub fn set_angular_constraint_coefficients(
        &mut self,
        id: AngularConstraintId,
        stiffness: f32,
        damping: f32,
        warm_start: f32,
        correction: f32,
    ) -> bool {
        self.angular_constraints
            .set_coefficients(id, stiffness, damping, warm_start, correction)
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    pub fn num_distance_constraints(&self) -> usize {
        self.distance_constraints.len()
    }

    pub fn num_angular_constraints(&self) -> usize {
        self.angular_constraints.len()
    }

    pub fn num_contacts(&self) -> usize {
        self.contacts.len()
    }

    pub fn particle_capacity(&self) -> usize {
        self.particles.capacity()
    }

    pub fn distance_constraint_capacity(&self) -> usize {
        self.distance_constraints.capacity()
    }

    pub fn angular_constraint_capacity(&self) -> usize {
        self.angular_constraints.capacity()
    }

    pub fn contact_capacity(&self) -> usize {
        self.contacts.capacity()
    }

    /// Dense particle positions. Like all views, the slice is only valid
    /// until the next mutating call; a swap-delete reorders it.
    pub fn particle_positions(&self) -> &[Vec2] {
        self.particles.positions()
    }

    pub fn particle_colors(&self) -> &[Color] {
        self.particles.colors()
    }

    pub fn particle_radii(&self) -> &[f32] {
        self.particles.radii()
    }

    pub fn particle_velocities(&self) -> &[Vec2] {
        self.particles.velocities()
    }

    /// Position of a particle by stable id; zero for stale or out-of-range
    /// ids.
    pub fn particle_position_by_id(&self, id: ParticleId) -> Vec2 {
        self.particles.position_of(id).unwrap_or(Vec2::ZERO)
    }

    pub fn particle_velocity_by_id(&self, id: ParticleId) -> Vec2 {
        let Some(index) = self.particles.index(id) else {
            return Vec2::ZERO;
        };
        self.particles.velocities()[index]
    }

    pub fn distance_constraint_particle_a_ids(&self) -> &[ParticleId] {
        self.distance_constraints.particle_a_ids()
    }

    pub fn distance_constraint_particle_b_ids(&self) -> &[ParticleId] {
        self.distance_constraints.particle_b_ids()
    }

    pub fn distance_constraint_radii(&self) -> &[f32] {
        self.distance_constraints.radii()
    }

    /// Whether a live contact exists for the pair, in either order.
    pub fn has_contact(&self, a: ParticleId, b: ParticleId) -> bool {
        self.contacts.contains(a, b)
    }

    /// Signed separation of a live contact: negative while the particles
    /// overlap.
    pub fn contact_separation(&self, a: ParticleId, b: ParticleId) -> Option<f32> {
        self.contacts.separation(a, b)
    }
}
