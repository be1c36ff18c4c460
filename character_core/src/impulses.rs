//! Deferred impulses onto other bodies.
//!
//! Impulses are queued during a character's solve and flushed in a separate
//! serialized phase after all characters finish, which is what keeps shared
//! dynamic-body state race-free under parallel solves.

use physics_rapier::PhysicsWorld;
use rapier3d::math::{Real, Vector};
use rapier3d::prelude::{Point, RigidBodyHandle};

use sim_core::logging;

/// A queued correction for one dynamic body. Velocity deltas are resolved at
/// queue time from the target's mass properties; application is a plain add.
#[derive(Clone, Copy, Debug)]
pub struct DeferredImpulse {
    pub body: RigidBodyHandle,
    pub linear_velocity_change: Vector<Real>,
    pub angular_velocity_change: Vector<Real>,
    pub position_displacement: Vector<Real>,
}

/// Converts a world-space impulse at a contact point into velocity deltas on
/// the target body. Returns `None` when the target is missing or not
/// dynamic.
pub fn impulse_on_body(
    world: &PhysicsWorld,
    target: RigidBodyHandle,
    impulse: Vector<Real>,
    point: Point<Real>,
) -> Option<DeferredImpulse> {
    let rb = world.body(target)?;
    if !rb.is_dynamic() {
        return None;
    }
    let mprops = rb.mass_properties();
    let linear = impulse.component_mul(&mprops.effective_inv_mass);
    let lever = point - mprops.world_com;
    let torque = lever.cross(&impulse);
    let inv_inertia_sqrt = mprops.effective_world_inv_inertia_sqrt;
    let angular = inv_inertia_sqrt * (inv_inertia_sqrt * torque);
    Some(DeferredImpulse {
        body: target,
        linear_velocity_change: linear,
        angular_velocity_change: angular,
        position_displacement: Vector::zeros(),
    })
}

/// Normal-only impulse exchange between a character and a dynamic body at a
/// contact point. Mass-weighted by both bodies; no friction or restitution
/// terms. Returns the deferred impulse for the hit body, or `None` when the
/// bodies are separating or the exchange is disabled by a zero mass.
pub fn solve_collision_impulses(
    world: &PhysicsWorld,
    target: RigidBodyHandle,
    contact_point: Point<Real>,
    normal: Vector<Real>,
    character_velocity: Vector<Real>,
    character_mass: Real,
    other_mass: Real,
) -> Option<DeferredImpulse> {
    if character_mass <= 0.0 || other_mass <= 0.0 {
        return None;
    }
    let rb = world.body(target)?;
    if !rb.is_dynamic() {
        return None;
    }
    let other_velocity = rb.velocity_at_point(&contact_point);
    // `normal` points toward the character; a negative relative normal speed
    // means the character is driving into the body.
    let approach = (character_velocity - other_velocity).dot(&normal);
    if approach >= 0.0 {
        return None;
    }
    let mass_ratio = character_mass * other_mass / (character_mass + other_mass);
    impulse_on_body(world, target, normal * (approach * mass_ratio), contact_point)
}

/// Applies queued impulses to the world. Impulses whose target no longer
/// exists are dropped. Returns the number dropped.
pub fn flush_deferred_impulses(world: &mut PhysicsWorld, impulses: &[DeferredImpulse]) -> usize {
    let mut dropped = 0;
    for impulse in impulses {
        let Some(rb) = world.body_mut(impulse.body) else {
            dropped += 1;
            continue;
        };
        let new_linvel = rb.linvel() + impulse.linear_velocity_change;
        rb.set_linvel(new_linvel, true);
        let new_angvel = rb.angvel() + impulse.angular_velocity_change;
        rb.set_angvel(new_angvel, true);
        if impulse.position_displacement.norm_squared() > 0.0 {
            let mut pose = *rb.position();
            pose.translation.vector += impulse.position_displacement;
            rb.set_position(pose, true);
        }
    }
    if dropped > 0 {
        logging::debug(format!("dropped {} impulses on missing bodies", dropped));
    }
    dropped
}
