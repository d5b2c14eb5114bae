use glam::{vec2, Vec2};
use physics::{color, ObjectType, StoreError, World, WorldConfig};

fn world_without_gravity(max_particles: usize) -> World {
    World::new(WorldConfig {
        max_particles,
        gravity: Vec2::ZERO,
        ..Default::default()
    })
}

fn spawn(world: &mut World, position: Vec2, velocity: Vec2, mass: f32, radius: f32) -> u32 {
    world
        .create_particle(
            ObjectType::Particle,
            position,
            velocity,
            mass,
            radius,
            color::WHITE,
        )
        .unwrap()
}

#[test]
fn free_fall_accelerates_by_gravity() {
    let mut world = World::new(WorldConfig {
        max_particles: 100,
        gravity: vec2(0.0, 100.0),
        ..Default::default()
    });
    let id = spawn(&mut world, Vec2::ZERO, Vec2::ZERO, 1.0, 1.0);
    world.step(1.0);
    let position = world.particle_position_by_id(id);
    let velocity = world.particle_velocity_by_id(id);
    assert!((position - vec2(0.0, 100.0)).length() < 1e-4, "{position}");
    assert!((velocity - vec2(0.0, 100.0)).length() < 1e-4, "{velocity}");
}

#[test]
fn impulses_do_not_leak_across_ticks() {
    let mut world = World::new(WorldConfig {
        max_particles: 100,
        gravity: vec2(0.0, 100.0),
        ..Default::default()
    });
    let id = spawn(&mut world, Vec2::ZERO, Vec2::ZERO, 1.0, 1.0);
    world.step(1.0);
    world.step(1.0);
    // A leaked impulse would double-apply: velocity must be exactly two
    // gravity impulses, position their sum.
    let velocity = world.particle_velocity_by_id(id);
    let position = world.particle_position_by_id(id);
    assert!((velocity - vec2(0.0, 200.0)).length() < 1e-3, "{velocity}");
    assert!((position - vec2(0.0, 300.0)).length() < 1e-3, "{position}");
}

#[test]
fn static_particle_ignores_gravity() {
    let mut world = World::new(WorldConfig {
        max_particles: 100,
        gravity: vec2(0.0, 100.0),
        ..Default::default()
    });
    let id = spawn(&mut world, Vec2::ZERO, Vec2::ZERO, 0.0, 1.0);
    world.step(1.0);
    assert_eq!(world.particle_position_by_id(id), Vec2::ZERO);
    assert_eq!(world.particle_velocity_by_id(id), Vec2::ZERO);
}

#[test]
fn create_returns_full_at_capacity() {
    let mut world = world_without_gravity(2);
    spawn(&mut world, vec2(1.0, 1.0), Vec2::ZERO, 1.0, 1.0);
    spawn(&mut world, vec2(2.0, 2.0), Vec2::ZERO, 1.0, 1.0);
    let third = world.create_particle(
        ObjectType::Particle,
        vec2(3.0, 3.0),
        Vec2::ZERO,
        1.0,
        1.0,
        color::WHITE,
    );
    assert_eq!(third, Err(StoreError::Full));
    assert_eq!(world.num_particles(), 2);
    assert_eq!(world.particle_capacity(), 2);
}

#[test]
fn delete_swaps_last_particle_into_hole() {
    let mut world = world_without_gravity(100);
    let first = spawn(&mut world, vec2(1.0, 1.0), Vec2::ZERO, 1.0, 1.0);
    let second = spawn(&mut world, vec2(2.0, 2.0), Vec2::ZERO, 1.0, 1.0);
    let third = spawn(&mut world, vec2(3.0, 3.0), Vec2::ZERO, 1.0, 1.0);
    assert!(world.delete_particle(second));
    assert_eq!(world.num_particles(), 2);
    assert_eq!(world.particle_position_by_id(third), vec2(3.0, 3.0));
    assert_eq!(world.particle_positions()[1], vec2(3.0, 3.0));
    assert_eq!(world.particle_position_by_id(first), vec2(1.0, 1.0));
    // A stale id reads as the zero vector.
    assert_eq!(world.particle_position_by_id(second), Vec2::ZERO);
    assert!(!world.delete_particle(second));
}

#[test]
fn freed_id_is_reused_first() {
    let mut world = world_without_gravity(2);
    let first = spawn(&mut world, vec2(1.0, 1.0), Vec2::ZERO, 1.0, 1.0);
    let _second = spawn(&mut world, vec2(2.0, 2.0), Vec2::ZERO, 1.0, 1.0);
    assert!(world.delete_particle(first));
    let reused = spawn(&mut world, vec2(9.0, 9.0), Vec2::ZERO, 1.0, 1.0);
    assert_eq!(reused, first);
}

#[test]
fn zero_gravity_motion_is_a_straight_line() {
    let mut world = world_without_gravity(100);
    let id = spawn(&mut world, vec2(100.0, 100.0), vec2(3.0, 4.0), 1.0, 1.0);
    for _ in 0..5 {
        world.step(0.1);
    }
    let position = world.particle_position_by_id(id);
    assert!((position - vec2(101.5, 102.0)).length() < 1e-4, "{position}");
}

#[test]
fn overlapping_particles_get_a_contact_and_separate() {
    let mut world = world_without_gravity(100);
    let a = spawn(&mut world, vec2(100.0, 100.0), Vec2::ZERO, 1.0, 1.0);
    let b = spawn(&mut world, vec2(101.5, 100.0), Vec2::ZERO, 1.0, 1.0);
    world.step(0.01);
    assert!(world.has_contact(a, b));
    let separation = world.contact_separation(a, b).unwrap();
    assert!(separation < 0.0, "expected penetration, got {separation}");
    let position_a = world.particle_position_by_id(a);
    let position_b = world.particle_position_by_id(b);
    assert!(position_a.x < 100.0, "{position_a}");
    assert!(position_b.x > 101.5, "{position_b}");
}

#[test]
fn contact_is_pruned_once_the_pair_separates() {
    let mut world = world_without_gravity(100);
    // In interaction range without touching; the pair is moving apart, so
    // the contact never applies an impulse and dies on the second tick.
    let a = spawn(&mut world, vec2(100.0, 100.0), vec2(-50.0, 0.0), 1.0, 1.0);
    let b = spawn(&mut world, vec2(102.2, 100.0), vec2(50.0, 0.0), 1.0, 1.0);
    world.step(0.01);
    assert!(world.has_contact(a, b));
    assert!(world.contact_separation(a, b).unwrap() > 0.0);
    world.step(0.01);
    assert!(!world.has_contact(a, b));
    assert_eq!(world.num_contacts(), 0);
    // The grazing contact never touched the velocities.
    assert_eq!(world.particle_velocity_by_id(a), vec2(-50.0, 0.0));
    assert_eq!(world.particle_velocity_by_id(b), vec2(50.0, 0.0));
}

#[test]
fn contact_involving_a_deleted_particle_is_pruned() {
    let mut world = world_without_gravity(100);
    let a = spawn(&mut world, vec2(100.0, 100.0), Vec2::ZERO, 1.0, 1.0);
    let b = spawn(&mut world, vec2(101.5, 100.0), Vec2::ZERO, 1.0, 1.0);
    world.step(0.01);
    assert!(world.has_contact(a, b));
    assert!(world.delete_particle(b));
    world.step(0.01);
    assert_eq!(world.num_contacts(), 0);
}

#[test]
fn distance_constraint_holds_its_rest_length() {
    let mut world = world_without_gravity(100);
    let a = spawn(&mut world, vec2(100.0, 100.0), Vec2::ZERO, 1.0, 1.0);
    let b = spawn(&mut world, vec2(130.0, 100.0), Vec2::ZERO, 1.0, 1.0);
    world.create_distance_constraint(a, b, 1.0).unwrap();
    for _ in 0..10 {
        world.step(0.01);
    }
    let distance =
        (world.particle_position_by_id(b) - world.particle_position_by_id(a)).length();
    assert!((distance - 30.0).abs() < 1e-3, "distance drifted to {distance}");
}

#[test]
fn stretched_constraint_contracts_toward_rest_length() {
    let mut world = world_without_gravity(100);
    let a = spawn(&mut world, vec2(100.0, 100.0), Vec2::ZERO, 1.0, 1.0);
    let b = spawn(&mut world, vec2(140.0, 100.0), Vec2::ZERO, 1.0, 1.0);
    world
        .create_distance_constraint_with_rest_length(a, b, 1.0, 30.0)
        .unwrap();
    let initial = 40.0;
    for _ in 0..20 {
        world.step(0.01);
    }
    let distance =
        (world.particle_position_by_id(b) - world.particle_position_by_id(a)).length();
    assert!(
        distance < initial,
        "constraint failed to contract: {distance}"
    );
    assert!((distance - 30.0).abs() < 2.0, "distance {distance}");
}

#[test]
fn angular_constraint_equalizes_segment_rotation() {
    let mut world = world_without_gravity(100);
    let hub = spawn(&mut world, vec2(200.0, 200.0), Vec2::ZERO, 0.0, 1.0);
    let arm_x = spawn(&mut world, vec2(210.0, 200.0), Vec2::ZERO, 1.0, 1.0);
    let arm_y = spawn(&mut world, vec2(200.0, 210.0), vec2(100.0, 0.0), 1.0, 1.0);
    let dc_a = world.create_distance_constraint(hub, arm_x, 1.0).unwrap();
    let dc_b = world.create_distance_constraint(hub, arm_y, 1.0).unwrap();
    world.create_angular_constraint(dc_a, dc_b).unwrap();
    world.step(0.01);
    // The damping term should spread the tangential motion across both
    // segments until they rotate together.
    let hub_position = world.particle_position_by_id(hub);
    let spin = |id: u32| {
        let r = world.particle_position_by_id(id) - hub_position;
        let v = world.particle_velocity_by_id(id);
        r.perp_dot(v) / r.length_squared()
    };
    let spin_x = spin(arm_x);
    let spin_y = spin(arm_y);
    assert!(
        (spin_x - spin_y).abs() < 0.5,
        "segments rotate apart: {spin_x} vs {spin_y}"
    );
    let speed_y = world.particle_velocity_by_id(arm_y).length();
    assert!(speed_y < 100.0, "perturbation was not damped: {speed_y}");
}

#[test]
fn clear_resets_the_world() {
    let mut world = world_without_gravity(100);
    let a = spawn(&mut world, vec2(100.0, 100.0), Vec2::ZERO, 1.0, 1.0);
    let b = spawn(&mut world, vec2(101.5, 100.0), Vec2::ZERO, 1.0, 1.0);
    world.create_distance_constraint(a, b, 1.0).unwrap();
    world.step(0.01);
    world.clear();
    assert_eq!(world.num_particles(), 0);
    assert_eq!(world.num_distance_constraints(), 0);
    assert_eq!(world.num_contacts(), 0);
    // Id allocation starts over from the top of the range.
    let reused = spawn(&mut world, Vec2::ZERO, Vec2::ZERO, 1.0, 1.0);
    assert_eq!(reused, 99);
}
