//! Grounding classification: is a given contact walkable ground?

use character_query::CharacterQueryView;
use rapier3d::math::{Real, Vector};

use crate::hits::BasicHit;
use crate::math;
use crate::properties::CharacterProperties;

/// Context in which a hit is being evaluated for grounding. Some contexts
/// apply extra rules (a step-up probe runs against a narrowed capsule, for
/// example), and processors may branch on the kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroundingEvaluationKind {
    Default,
    GroundProbing,
    OverlapDecollision,
    InitialOverlaps,
    MovementHit,
    StepUpHit,
}

/// Per-hit step-handling override, threaded through hit resolution as a
/// parameter. The "ignore step handling" tag disables stepping for a single
/// hit without touching the character's shared configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepHandlingMode {
    Enabled,
    DisabledForHit,
}

/// Slope test against the stored cosine threshold: ground iff
/// `cos(angle(normal, up)) >= cos(max_slope)`.
pub fn slope_is_walkable(props: &CharacterProperties, up: &Vector<Real>, normal: &Vector<Real>) -> bool {
    let dot = up.dot(normal);
    dot.is_finite() && dot >= props.max_grounded_slope_cos
}

/// Default grounding policy: per-hit tag overrides first, then the slope
/// angle test. Processors wrap or replace this per archetype.
pub fn default_is_grounded_on_hit(
    query: &CharacterQueryView<'_>,
    props: &CharacterProperties,
    grounding_up: &Vector<Real>,
    hit: &BasicHit,
    _kind: GroundingEvaluationKind,
) -> bool {
    if !props.evaluate_grounding {
        return false;
    }
    if query.grounding_ignored(hit.collider) {
        return false;
    }
    slope_is_walkable(props, grounding_up, &hit.normal)
}

/// Detects whether the slope ahead of the character drops away more sharply
/// than `max_downward_slope_change_cos` allows. Returns true when grounding
/// should be suppressed this tick.
pub fn future_slope_change_exceeds_limit(
    query: &CharacterQueryView<'_>,
    props: &CharacterProperties,
    grounding_up: &Vector<Real>,
    ground_normal: &Vector<Real>,
    foot_point: rapier3d::prelude::Point<Real>,
    velocity: &Vector<Real>,
    dt: Real,
    probe_reach: Real,
) -> bool {
    let horizontal = math::project_on_plane(velocity, grounding_up);
    let move_dir = math::normalize_or_zero(&horizontal);
    if move_dir.norm_squared() <= math::VECTOR_EPSILON_SQ {
        return false;
    }
    let ahead = probe_reach + horizontal.norm() * dt;
    let probe_origin = foot_point + move_dir * ahead + grounding_up * probe_reach;
    let probe_depth = probe_reach * 2.0 + props.ground_snapping_distance;
    let Some(next) = query.cast_ray(probe_origin, -grounding_up, probe_depth) else {
        // Nothing ahead at all: a ledge, not a slope change. Grounding loss
        // happens naturally when the character walks off.
        return false;
    };
    let change_cos = ground_normal.dot(&next.normal).clamp(-1.0, 1.0);
    if change_cos >= props.step_and_slope.max_downward_slope_change_cos {
        return false;
    }
    // Only a change tilting toward the movement direction is a downward one.
    next.normal.dot(&move_dir) > ground_normal.dot(&move_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::CharacterProperties;
    use rapier3d::prelude::vector;

    #[test]
    fn grounding_threshold_matches_cosine_comparison() {
        let mut props = CharacterProperties::default();
        props.set_max_grounded_slope_degrees(60.0);
        let up = vector![0.0, 1.0, 0.0];

        for degrees in 0..=180 {
            let theta = (degrees as f32).to_radians();
            let normal = vector![theta.sin(), theta.cos(), 0.0];
            let expected = theta.cos() >= 60.0_f32.to_radians().cos();
            assert_eq!(
                slope_is_walkable(&props, &up, &normal),
                expected,
                "angle {} degrees",
                degrees
            );
        }
    }

    #[test]
    fn degenerate_normal_is_never_ground() {
        let props = CharacterProperties::default();
        let up = vector![0.0, 1.0, 0.0];
        assert!(!slope_is_walkable(&props, &up, &vector![0.0, 0.0, 0.0]));
        assert!(!slope_is_walkable(&props, &up, &vector![0.0, f32::NAN, 0.0]));
    }
}
