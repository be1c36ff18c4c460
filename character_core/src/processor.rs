//! The per-archetype capability set the solver is generic over.

use std::collections::HashMap;

use character_query::CharacterQueryView;
use rapier3d::math::{Real, Vector};
use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::RigidBodyHandle;

use crate::body::{CharacterBody, StoredCharacterData};
use crate::grounding::{self, GroundingEvaluationKind};
use crate::hits::{BasicHit, CharacterHit, VelocityProjectionHit};
use crate::projection;
use crate::properties::{CharacterProperties, CharacterShape};

/// Previous-tick snapshots of all characters, keyed by their kinematic body.
pub type CharacterSnapshots = HashMap<RigidBodyHandle, StoredCharacterData>;

/// Everything a solve reads but never writes: the collision world view, the
/// character's configuration and shape, and the other characters' snapshots.
pub struct ProcessorContext<'a, 'w> {
    pub query: &'a CharacterQueryView<'w>,
    pub props: &'a CharacterProperties,
    pub shape: &'a CharacterShape,
    pub characters: &'a CharacterSnapshots,
    pub dt: Real,
}

/// Policy hooks a character archetype supplies. The solver loop is shared;
/// archetypes customize grounding, projection and collision response without
/// duplicating it. Every hook has the default policy as its default body.
pub trait CharacterProcessor {
    /// Per-hit collision veto, applied after query-level filtering.
    fn can_collide_with_hit(&self, _ctx: &ProcessorContext<'_, '_>, _hit: &BasicHit) -> bool {
        true
    }

    fn is_grounded_on_hit(
        &self,
        ctx: &ProcessorContext<'_, '_>,
        body: &CharacterBody,
        hit: &BasicHit,
        kind: GroundingEvaluationKind,
    ) -> bool {
        grounding::default_is_grounded_on_hit(ctx.query, ctx.props, &body.grounding_up, hit, kind)
    }

    /// Called after each movement hit has been recorded and folded into the
    /// velocity.
    fn on_movement_hit(
        &mut self,
        _ctx: &ProcessorContext<'_, '_>,
        _body: &mut CharacterBody,
        _hit: &CharacterHit,
    ) {
    }

    /// Adjusts the effective masses used when exchanging momentum with a
    /// dynamic body.
    fn override_dynamic_hit_masses(
        &self,
        _ctx: &ProcessorContext<'_, '_>,
        _hit: &BasicHit,
        _character_mass: &mut Real,
        _other_mass: &mut Real,
    ) {
    }

    #[allow(clippy::too_many_arguments)]
    fn project_velocity_on_hits(
        &self,
        ctx: &ProcessorContext<'_, '_>,
        velocity: &mut Vector<Real>,
        is_grounded: &mut bool,
        ground_hit: &mut Option<VelocityProjectionHit>,
        hits: &[VelocityProjectionHit],
        original_velocity_direction: &Vector<Real>,
        grounding_up: &Vector<Real>,
    ) {
        projection::default_project_velocity_on_hits(
            ctx.props,
            velocity,
            is_grounded,
            ground_hit,
            hits,
            original_velocity_direction,
            grounding_up,
        );
    }

    /// Recomputes the reference up vector from the character's rotation.
    /// States that reorient the character (spherical gravity and the like)
    /// override this.
    fn update_grounding_up(
        &self,
        _ctx: &ProcessorContext<'_, '_>,
        body: &mut CharacterBody,
        rotation: &UnitQuaternion<Real>,
    ) {
        body.grounding_up = rotation * Vector::y();
    }
}

/// The basic archetype: default policies all the way down. AI walkers and
/// other simple characters use this directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultProcessor;

impl CharacterProcessor for DefaultProcessor {}
