//! Point-mass storage and the symplectic Euler integrator.

use glam::Vec2;
use rayon::prelude::*;

use crate::color::Color;
use crate::slot::SlotAllocator;
use crate::StoreError;

pub type ParticleId = u32;

/// Caller-facing classification of a particle. The core stores the tag
/// float-encoded and never branches on it; the discriminants are powers of
/// two so callers can treat combinations as a bitmask.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectType {
    Particle = 1,
    Wheel = 2,
    Constraint = 4,
    FixedConstraint = 8,
    FluidParticle = 16,
    SoftBody = 32,
    FixedConstraintParticle = 64,
}

impl ObjectType {
    #[inline]
    pub fn encode(self) -> f32 {
        self as u32 as f32
    }
}

/// Struct-of-arrays particle storage.
///
/// Live particles occupy the dense index range `[0, len)` of every column.
/// All cross-store references use the stable [`ParticleId`]; dense indices
/// are only ever resolved on the spot because a swap-delete may move a
/// particle between any two calls.
///
/// A particle with `mass == 0` is static: its `inv_mass` is zero, the
/// integrator never moves it, and every solver impulse applied to it is
/// scaled away.
#[derive(Clone)]
pub struct ParticleStore {
    slots: SlotAllocator,
    pub(crate) object_type: Vec<f32>,
    pub(crate) position: Vec<Vec2>,
    pub(crate) rest_position: Vec<Vec2>,
    pub(crate) velocity: Vec<Vec2>,
    /// Shared solver state: gravity, warm starts and the Gauss-Seidel sweeps
    /// all accumulate velocity deltas here; the integrator consumes and
    /// zeroes it at the end of each tick.
    pub(crate) impulse: Vec<Vec2>,
    pub(crate) mass: Vec<f32>,
    pub(crate) inv_mass: Vec<f32>,
    pub(crate) density: Vec<f32>,
    pub(crate) sum_distances: Vec<f32>,
    pub(crate) sum_velocities: Vec<f32>,
    pub(crate) num_constraints: Vec<u32>,
    pub(crate) radius: Vec<f32>,
    /// `radius + 0.5`; the margin inside which the broadphase keeps a pair
    /// as a candidate contact.
    pub(crate) interaction_radius: Vec<f32>,
    pub(crate) color: Vec<Color>,
}

/// Extra reach of a particle beyond its collision radius. Contacts are
/// created and kept alive while two particles are within the sum of their
/// radii plus this margin.
pub(crate) const CONTACT_MARGIN: f32 = 0.5;

impl ParticleStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotAllocator::with_capacity(capacity),
            object_type: vec![0.0; capacity],
            position: vec![Vec2::ZERO; capacity],
            rest_position: vec![Vec2::ZERO; capacity],
            velocity: vec![Vec2::ZERO; capacity],
            impulse: vec![Vec2::ZERO; capacity],
            mass: vec![0.0; capacity],
            inv_mass: vec![0.0; capacity],
            density: vec![0.0; capacity],
            sum_distances: vec![0.0; capacity],
            sum_velocities: vec![0.0; capacity],
            num_constraints: vec![0; capacity],
            radius: vec![0.0; capacity],
            interaction_radius: vec![0.0; capacity],
            color: vec![Color::default(); capacity],
        }
    }

    pub fn create(
        &mut self,
        object_type: ObjectType,
        position: Vec2,
        velocity: Vec2,
        mass: f32,
        radius: f32,
        color: Color,
    ) -> Result<ParticleId, StoreError> {
        let id = self.slots.alloc().ok_or(StoreError::Full)?;
        // Freshly allocated ids always land at the end of the dense region.
        let index = self.slots.len() - 1;
        self.object_type[index] = object_type.encode();
        self.position[index] = position;
        self.rest_position[index] = position;
        self.velocity[index] = velocity;
        self.impulse[index] = Vec2::ZERO;
        self.mass[index] = mass;
        self.inv_mass[index] = if mass > 0.0 { 1.0 / mass } else { 0.0 };
        self.density[index] = 0.0;
        self.sum_distances[index] = 0.0;
        self.sum_velocities[index] = 0.0;
        self.num_constraints[index] = 0;
        self.radius[index] = radius;
        self.interaction_radius[index] = radius + CONTACT_MARGIN;
        self.color[index] = color;
        Ok(id)
    }

    /// Swap-deletes `id`. Returns false for ids that are out of range or
    /// already freed.
    pub fn delete(&mut self, id: ParticleId) -> bool {
        let Some((index, last)) = self.slots.free(id) else {
            return false;
        };
        self.object_type.swap(index, last);
        self.position.swap(index, last);
        self.rest_position.swap(index, last);
        self.velocity.swap(index, last);
        self.impulse.swap(index, last);
        self.mass.swap(index, last);
        self.inv_mass.swap(index, last);
        self.density.swap(index, last);
        self.sum_distances.swap(index, last);
        self.sum_velocities.swap(index, last);
        self.num_constraints.swap(index, last);
        self.radius.swap(index, last);
        self.interaction_radius.swap(index, last);
        self.color.swap(index, last);
        true
    }

    /// Integrates one tick. The solvers have already folded `dt` into the
    /// accumulated impulses, so velocity picks them up unscaled and only the
    /// position update multiplies by `dt`. Scratch columns are zeroed for
    /// every particle, static ones included.
    pub fn step(&mut self, dt: f32) {
        let n = self.slots.len();
        let Self {
            position,
            velocity,
            impulse,
            inv_mass,
            density,
            sum_distances,
            sum_velocities,
            ..
        } = self;
        (
            &mut position[..n],
            &mut velocity[..n],
            &mut impulse[..n],
            &inv_mass[..n],
            &mut density[..n],
            &mut sum_distances[..n],
            &mut sum_velocities[..n],
        )
            .into_par_iter()
            .for_each(
                |(position, velocity, impulse, &inv_mass, density, sum_distances, sum_velocities)| {
                    if inv_mass > 0.0 {
                        *velocity += *impulse;
                        *position += *velocity * dt;
                    }
                    *impulse = Vec2::ZERO;
                    *density = 0.0;
                    *sum_distances = 0.0;
                    *sum_velocities = 0.0;
                },
            );
    }

    /// Empties the store; freed ids are restacked so creation starts over
    /// from the top of the id range.
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

    /// Live particle ids in dense order.
    #[inline]
    pub fn ids(&self) -> &[ParticleId] {
        self.slots.ids()
    }

    #[inline]
    pub fn index(&self, id: ParticleId) -> Option<usize> {
        self.slots.index(id)
    }

    pub fn position_of(&self, id: ParticleId) -> Option<Vec2> {
        self.index(id).map(|index| self.position[index])
    }

    pub fn positions(&self) -> &[Vec2] {
        &self.position[..self.slots.len()]
    }

    pub fn radii(&self) -> &[f32] {
        &self.radius[..self.slots.len()]
    }

    pub fn colors(&self) -> &[Color] {
        &self.color[..self.slots.len()]
    }

    pub fn velocities(&self) -> &[Vec2] {
        &self.velocity[..self.slots.len()]
    }
}
