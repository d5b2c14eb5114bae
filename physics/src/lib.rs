//! A real-time 2D particle physics engine solving distance, angular and
//! contact constraints by sequential impulse projection.
//!
//! The engine stores everything in dense struct-of-arrays stores addressed
//! by stable ids, discovers collision candidates through a uniform spatial
//! hash, and advances the simulation with a fixed pipeline per tick:
//! external forces, broadphase, contact refresh, warm starts, a configurable
//! number of Gauss-Seidel relaxation passes, and a symplectic Euler
//! integration. Independent per-row work fans out across worker threads;
//! the relaxation sweeps are intentionally sequential because each
//! constraint must observe the impulses written by its predecessors.

use glam::{vec2, Vec2};
use itertools::Itertools;
use rayon::prelude::*;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, instrument, trace_span};

pub mod angular_constraint;
pub mod color;
pub mod contact;
pub mod distance_constraint;
mod factory;
pub mod gravity;
pub mod particle;
mod slot;
pub mod spatial_hash;

pub use angular_constraint::AngularConstraintId;
pub use color::Color;
pub use distance_constraint::DistanceConstraintId;
pub use particle::{ObjectType, ParticleId};

use angular_constraint::AngularConstraintStore;
use contact::ContactStore;
use distance_constraint::DistanceConstraintStore;
use gravity::NewtonianGravity;
use particle::ParticleStore;
use spatial_hash::SpatialHashGrid;

/// Why a create call was refused. Creates never fail partially: a refused
/// call leaves every store untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store is at capacity")]
    Full,
    #[error("a contact for this particle pair already exists")]
    DuplicateContact,
}

/// World construction parameters. The capacities are fixed for the lifetime
/// of the world; everything else can also be adjusted afterwards through the
/// public fields of [`World`].
#[derive(Clone, Debug)]
pub struct WorldConfig {
    pub max_particles: usize,
    pub max_distance_constraints: usize,
    pub max_angular_constraints: usize,
    pub max_contacts: usize,
    /// Uniform acceleration applied to every dynamic particle, in units of
    /// distance per second squared.
    pub gravity: Vec2,
    /// Gauss-Seidel relaxation passes per tick.
    pub num_iterations: usize,
    pub grid_cell_size: f32,
    pub world_width: f32,
    pub world_height: f32,
    /// Gravitational constant for particle-particle attraction; zero keeps
    /// the N-body solver switched off.
    pub newton_g: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_particles: 10_000,
            max_distance_constraints: 10_000,
            max_angular_constraints: 10_000,
            max_contacts: 30_000,
            gravity: vec2(0.0, 98_200.0),
            num_iterations: 10,
            grid_cell_size: 12.0,
            world_width: 1280.0,
            world_height: 720.0,
            newton_g: 0.0,
        }
    }
}

/// The simulation. Owns all entity stores and drives the per-tick pipeline.
#[derive(Clone)]
pub struct World {
    pub gravity: Vec2,
    pub num_iterations: usize,
    /// N-body attraction; set `newtonian.g` to a non-zero constant to
    /// enable it.
    pub newtonian: NewtonianGravity,
    pub(crate) particles: ParticleStore,
    pub(crate) distance_constraints: DistanceConstraintStore,
    pub(crate) angular_constraints: AngularConstraintStore,
    pub(crate) contacts: ContactStore,
    grid: SpatialHashGrid,
    /// Pairs already offered to the contact store this tick. A pair of
    /// particles usually shares several grid cells, so the broadphase would
    /// report it more than once.
    seen_pairs: HashSet<u64>,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        Self {
            gravity: config.gravity,
            num_iterations: config.num_iterations,
            newtonian: NewtonianGravity::new(config.newton_g, config.max_particles),
            particles: ParticleStore::with_capacity(config.max_particles),
            distance_constraints: DistanceConstraintStore::with_capacity(
                config.max_distance_constraints,
            ),
            angular_constraints: AngularConstraintStore::with_capacity(
                config.max_angular_constraints,
            ),
            contacts: ContactStore::with_capacity(config.max_contacts),
            grid: SpatialHashGrid::new(
                config.world_width,
                config.world_height,
                config.grid_cell_size,
            ),
            seen_pairs: HashSet::new(),
        }
    }

    /// Advances the simulation by `dt` seconds.
    ///
    /// The phase order is fixed: constraint data must be fresh before the
    /// warm starts replay last tick's impulses, contacts must be refreshed
    /// before they are pruned, and the relaxation passes run angular,
    /// distance, contact so that contact resolution has the last word
    /// before integration.
    #[instrument(level = "trace", skip_all)]
    pub fn step(&mut self, dt: f32) {
        let inv_dt = 1.0 / dt;

        self.apply_gravity(dt);
        self.update_broadphase();
        self.update_contacts();

        self.distance_constraints.compute_data(&self.particles, inv_dt);
        self.angular_constraints
            .compute_data(&self.distance_constraints, inv_dt);
        self.contacts.compute_data(&self.particles, inv_dt);
        self.contacts.prune();

        self.distance_constraints.apply_warm_start(&mut self.particles);
        self.angular_constraints
            .apply_warm_start(&self.distance_constraints, &mut self.particles);
        self.contacts.apply_warm_start(&mut self.particles);

        for iter in 0..self.num_iterations {
            let span = trace_span!("Iteration", iter);
            let _enter = span.enter();
            self.angular_constraints
                .apply_corrective_impulse(&self.distance_constraints, &mut self.particles);
            self.distance_constraints
                .apply_corrective_impulse(&mut self.particles);
            self.contacts.apply_corrective_impulse(&mut self.particles);
        }

        self.particles.step(dt);
    }

    /// Removes every entity while keeping all allocations.
    pub fn clear(&mut self) {
        self.particles.clear();
        self.distance_constraints.clear();
        self.angular_constraints.clear();
        self.contacts.clear();
        self.grid.clear();
        self.seen_pairs.clear();
    }

    #[instrument(level = "trace", skip_all)]
    fn apply_gravity(&mut self, dt: f32) {
        if self.gravity != Vec2::ZERO {
            let impulse = self.gravity * dt;
            let n = self.particles.len();
            self.particles.impulse[..n]
                .par_iter_mut()
                .for_each(|slot| *slot += impulse);
        }
        self.newtonian.solve_self(&mut self.particles, dt);
    }

    /// Rebuilds the spatial hash. Cell membership tuples are produced in
    /// parallel; the buckets are then filled sequentially so they need no
    /// synchronization.
    #[instrument(level = "trace", skip_all)]
    fn update_broadphase(&mut self) {
        self.grid.clear();
        let n = self.particles.len();
        let grid = &self.grid;
        let tuples: Vec<(ParticleId, i64)> = (
            self.particles.ids(),
            &self.particles.position[..n],
            &self.particles.interaction_radius[..n],
        )
            .into_par_iter()
            .flat_map_iter(|(&id, &position, &radius)| {
                let (min_col, max_col, min_row, max_row) = grid.cell_range(position, radius);
                (min_row..=max_row).flat_map(move |row| {
                    (min_col..=max_col).map(move |col| (id, grid.hash(col, row)))
                })
            })
            .collect();
        for (id, hash) in tuples {
            if let Some(bucket) = self.grid.bucket_mut(hash) {
                bucket.push(id);
            }
        }
    }

    /// Offers every first-seen bucket pair to the contact store, which
    /// narrowphase-checks it and either opens a contact or rejects it.
    #[instrument(level = "trace", skip_all)]
    fn update_contacts(&mut self) {
        self.seen_pairs.clear();
        for bucket in self.grid.buckets() {
            if bucket.len() < 2 {
                continue;
            }
            for (&a, &b) in bucket.iter().tuple_combinations() {
                if !self.seen_pairs.insert(contact::pair_key(a, b)) {
                    continue;
                }
                match self.contacts.create(a, b, &self.particles) {
                    Ok(_) | Err(StoreError::DuplicateContact) => {}
                    Err(StoreError::Full) => {
                        debug!("contact store is full, dropping pair ({a}, {b})");
                    }
                }
            }
        }
    }
}
