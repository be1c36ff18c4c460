//! Mutable per-character state, partially re-derived every tick.

use rapier3d::math::{Isometry, Real, Vector};
use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::{Point, RigidBodyHandle};

use crate::hits::{CharacterHit, HitKey, StatefulHit};
use crate::impulses::DeferredImpulse;

/// Attachment to a moving body the character stands on. Holds weak handles
/// only; the parent may vanish between ticks.
#[derive(Clone, Copy, Debug)]
pub struct ParentAttachment {
    pub body: RigidBodyHandle,
    /// Anchor point in the parent's local space, captured at attach time.
    pub anchor_local: Point<Real>,
    /// Parent pose at the end of the previous carry step, used to derive the
    /// rigid-motion delta to apply this tick.
    pub previous_pose: Isometry<Real>,
}

#[derive(Clone, Debug)]
pub struct CharacterBody {
    pub is_grounded: bool,
    pub was_grounded_before_update: bool,
    /// Velocity relative to the attached parent, if any. Always finite.
    pub relative_velocity: Vector<Real>,
    /// Unit reference "up" for all slope and step math, recomputed each tick.
    pub grounding_up: Vector<Real>,
    /// Most recent grounding contact. Meaningful only while `is_grounded`.
    pub ground_hit: Option<crate::hits::BasicHit>,
    pub parent: Option<ParentAttachment>,
    pub previous_parent: Option<RigidBodyHandle>,
    /// Parent-induced velocity at the anchor, derived each tick.
    pub parent_velocity: Vector<Real>,
    /// Rotation the parent applied to the character this tick. Consumers
    /// interpolate this between fixed ticks rather than snapping.
    pub rotation_from_parent: UnitQuaternion<Real>,
    /// Set when the parent handle changed this tick; interpolating consumers
    /// are expected to skip one frame.
    pub parent_changed: bool,
    pub last_physics_update_dt: Real,
    /// Movement hits recorded this tick, in detection order.
    pub hits: Vec<CharacterHit>,
    /// Impulses queued for other bodies, flushed after the solve.
    pub deferred_impulses: Vec<DeferredImpulse>,
    /// Enter/Stay/Exit records diffed against the previous tick.
    pub stateful_hits: Vec<StatefulHit>,
    pub(crate) previous_hit_keys: Vec<HitKey>,
}

impl CharacterBody {
    pub fn new() -> Self {
        Self {
            is_grounded: false,
            was_grounded_before_update: false,
            relative_velocity: Vector::zeros(),
            grounding_up: Vector::y(),
            ground_hit: None,
            parent: None,
            previous_parent: None,
            parent_velocity: Vector::zeros(),
            rotation_from_parent: UnitQuaternion::identity(),
            parent_changed: false,
            last_physics_update_dt: 0.0,
            hits: Vec::new(),
            deferred_impulses: Vec::new(),
            stateful_hits: Vec::new(),
            previous_hit_keys: Vec::new(),
        }
    }

    pub fn has_become_grounded(&self) -> bool {
        self.is_grounded && !self.was_grounded_before_update
    }

    pub fn has_become_ungrounded(&self) -> bool {
        !self.is_grounded && self.was_grounded_before_update
    }

    /// Velocity in world space: relative velocity plus parent carry.
    pub fn world_velocity(&self) -> Vector<Real> {
        self.relative_velocity + self.parent_velocity
    }

    /// Rotation-only component of the parent carry, interpolated for
    /// variable-rate rendering between fixed ticks. `alpha` in [0, 1].
    pub fn interpolated_parent_rotation(&self, alpha: Real) -> UnitQuaternion<Real> {
        UnitQuaternion::identity().slerp(&self.rotation_from_parent, alpha.clamp(0.0, 1.0))
    }
}

impl Default for CharacterBody {
    fn default() -> Self {
        Self::new()
    }
}

/// Previous-tick snapshot of another character, read during parallel solves
/// instead of live state so processing order never matters.
#[derive(Clone, Copy, Debug)]
pub struct StoredCharacterData {
    pub relative_velocity: Vector<Real>,
    pub is_grounded: bool,
    pub mass: Real,
    pub simulate_dynamic_body: bool,
}
