//! Velocity projection across the hits accumulated in one tick.
//!
//! Hits fold left-to-right: each call constrains the velocity against the
//! newest hit relative to the accumulated result of the earlier ones.

use rapier3d::math::{Real, Vector};

use crate::hits::VelocityProjectionHit;
use crate::math;
use crate::properties::CharacterProperties;

/// Default projection policy.
///
/// - A grounding hit projects velocity onto its tangent plane and records it
///   as the tick's ground hit.
/// - An obstruction while grounded constrains velocity to the crease between
///   the ground plane and the obstruction plane.
/// - An obstruction in the air is a plain plane slide.
/// - Earlier obstruction planes the result re-enters fold in as additional
///   creases; a third simultaneous plane stops the velocity dead (a corner).
///
/// Archetypes may replace this wholesale through
/// [`crate::processor::CharacterProcessor::project_velocity_on_hits`].
pub fn default_project_velocity_on_hits(
    props: &CharacterProperties,
    velocity: &mut Vector<Real>,
    is_grounded: &mut bool,
    ground_hit: &mut Option<VelocityProjectionHit>,
    hits: &[VelocityProjectionHit],
    original_velocity_direction: &Vector<Real>,
    grounding_up: &Vector<Real>,
) {
    if !math::is_finite(velocity) {
        *velocity = Vector::zeros();
        return;
    }
    let Some(latest) = hits.last() else {
        return;
    };
    if latest.normal.norm_squared() <= math::VECTOR_EPSILON_SQ {
        return;
    }

    if latest.grounded_on_hit && props.evaluate_grounding {
        // Walkable surface: slide on its tangent plane. Marks grounding when
        // this is the first ground contact of the tick.
        *velocity = math::project_on_plane(velocity, &latest.normal);
        *is_grounded = true;
        *ground_hit = Some(*latest);
    } else if *is_grounded {
        let ground_normal = ground_hit.map(|hit| hit.normal).unwrap_or(*grounding_up);
        constrain_to_crease(
            props,
            velocity,
            &ground_normal,
            &latest.normal,
            original_velocity_direction,
        );
    } else {
        *velocity = math::project_on_plane(velocity, &latest.normal);
    }

    // The adjusted velocity may re-enter an earlier obstruction plane; fold
    // those in as creases against the newest plane. Three simultaneous
    // planes form a corner that stops movement.
    let earlier = &hits[..hits.len() - 1];
    for first in earlier.iter().filter(|hit| !hit.grounded_on_hit) {
        if velocity.dot(&first.normal) >= -1.0e-6 {
            continue;
        }
        constrain_to_crease(
            props,
            velocity,
            &first.normal,
            &latest.normal,
            original_velocity_direction,
        );
        for second in earlier.iter().filter(|hit| !hit.grounded_on_hit) {
            if std::ptr::eq(first, second) {
                continue;
            }
            if velocity.dot(&second.normal) < -1.0e-6 {
                *velocity = Vector::zeros();
                return;
            }
        }
    }

    if props.constrain_velocity_to_ground_plane && *is_grounded {
        if let Some(ground) = ground_hit {
            *velocity = math::project_on_plane(velocity, &ground.normal);
        }
    }
}

/// Constrains `velocity` to the intersection line of two planes, oriented
/// along the original movement direction. Antiparallel planes have no
/// intersection line; the velocity is then projected onto both in turn.
fn constrain_to_crease(
    props: &CharacterProperties,
    velocity: &mut Vector<Real>,
    first_normal: &Vector<Real>,
    second_normal: &Vector<Real>,
    original_velocity_direction: &Vector<Real>,
) {
    let crease = first_normal.cross(second_normal);
    let crease_dir = math::normalize_or_zero(&crease);
    if crease_dir.norm_squared() <= math::VECTOR_EPSILON_SQ {
        let slid = math::project_on_plane(velocity, second_normal);
        *velocity = math::project_on_plane(&slid, first_normal);
        return;
    }
    let oriented = if crease_dir.dot(original_velocity_direction) < 0.0 {
        -crease_dir
    } else {
        crease_dir
    };
    let projected = oriented * velocity.dot(&oriented);
    let max_length = if props.max_crease_speed > 0.0 {
        props.max_crease_speed
    } else {
        Real::MAX
    };
    *velocity = math::reverse_project_on_vector(&projected, &oriented, max_length);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::prelude::{vector, Point};

    fn hit(normal: Vector<Real>, grounded: bool) -> VelocityProjectionHit {
        VelocityProjectionHit {
            normal,
            grounded_on_hit: grounded,
            point: Point::origin(),
            tags: Default::default(),
        }
    }

    fn props() -> CharacterProperties {
        CharacterProperties::default()
    }

    #[test]
    fn grounding_hit_projects_and_marks_grounded() {
        let mut velocity = vector![1.0, -2.0, 0.0];
        let mut is_grounded = false;
        let mut ground_hit = None;
        let hits = [hit(vector![0.0, 1.0, 0.0], true)];
        default_project_velocity_on_hits(
            &props(),
            &mut velocity,
            &mut is_grounded,
            &mut ground_hit,
            &hits,
            &vector![1.0, 0.0, 0.0],
            &vector![0.0, 1.0, 0.0],
        );
        assert!(is_grounded);
        assert!(ground_hit.is_some());
        assert!((velocity - vector![1.0, 0.0, 0.0]).norm() < 1.0e-5);
    }

    #[test]
    fn projection_is_idempotent_on_tangent_velocity() {
        let normal = vector![0.0, 1.0, 0.0];
        let mut velocity = vector![1.5, 0.0, -0.5];
        let expected = velocity;
        let mut is_grounded = true;
        let mut ground_hit = Some(hit(normal, true));
        let hits = [hit(normal, true)];
        for _ in 0..3 {
            default_project_velocity_on_hits(
                &props(),
                &mut velocity,
                &mut is_grounded,
                &mut ground_hit,
                &hits,
                &vector![1.0, 0.0, 0.0],
                &normal,
            );
            assert!((velocity - expected).norm() < 1.0e-5);
        }
    }

    #[test]
    fn wall_hit_in_air_slides_along_plane() {
        let mut velocity = vector![1.0, 0.0, 1.0];
        let mut is_grounded = false;
        let mut ground_hit = None;
        let hits = [hit(vector![-1.0, 0.0, 0.0], false)];
        default_project_velocity_on_hits(
            &props(),
            &mut velocity,
            &mut is_grounded,
            &mut ground_hit,
            &hits,
            &vector![1.0, 0.0, 1.0],
            &vector![0.0, 1.0, 0.0],
        );
        assert!(!is_grounded);
        assert!(velocity.x.abs() < 1.0e-5);
        assert!((velocity.z - 1.0).abs() < 1.0e-5);
    }

    #[test]
    fn floor_and_wall_constrain_velocity_to_the_crease() {
        let floor = hit(vector![0.0, 1.0, 0.0], true);
        let wall = hit(vector![-1.0, 0.0, 0.0], false);
        let mut velocity = vector![1.0, 0.0, 1.0];
        let original = velocity;
        let mut is_grounded = false;
        let mut ground_hit = None;

        let first = [floor];
        default_project_velocity_on_hits(
            &props(),
            &mut velocity,
            &mut is_grounded,
            &mut ground_hit,
            &first,
            &original,
            &vector![0.0, 1.0, 0.0],
        );
        let both = [floor, wall];
        default_project_velocity_on_hits(
            &props(),
            &mut velocity,
            &mut is_grounded,
            &mut ground_hit,
            &both,
            &original,
            &vector![0.0, 1.0, 0.0],
        );

        assert!(velocity.x <= 1.0e-5);
        assert!((velocity.z - 1.0).abs() < 1.0e-4);
        assert!(velocity.y.abs() < 1.0e-5);
    }

    #[test]
    fn degenerate_inputs_never_produce_nan() {
        let zero_cases = [
            (Vector::zeros(), Vector::zeros()),
            (vector![1.0, 0.0, 0.0], Vector::zeros()),
            (Vector::zeros(), vector![0.0, 1.0, 0.0]),
            (vector![f32::NAN, 0.0, 0.0], vector![0.0, 1.0, 0.0]),
        ];
        for (vel, normal) in zero_cases {
            let mut velocity = vel;
            let mut is_grounded = false;
            let mut ground_hit = None;
            let hits = [hit(normal, false)];
            default_project_velocity_on_hits(
                &props(),
                &mut velocity,
                &mut is_grounded,
                &mut ground_hit,
                &hits,
                &Vector::zeros(),
                &vector![0.0, 1.0, 0.0],
            );
            assert!(math::is_finite(&velocity), "vel {:?} normal {:?}", vel, normal);
        }
    }

    #[test]
    fn crease_speed_clamp_applies() {
        let mut tuned = props();
        tuned.max_crease_speed = 0.5;
        let floor = hit(vector![0.0, 1.0, 0.0], true);
        let wall = hit(vector![-1.0, 0.0, 0.0], false);
        let mut velocity = vector![5.0, 0.0, 5.0];
        let original = velocity;
        let mut is_grounded = true;
        let mut ground_hit = Some(floor);
        let both = [floor, wall];
        default_project_velocity_on_hits(
            &tuned,
            &mut velocity,
            &mut is_grounded,
            &mut ground_hit,
            &both,
            &original,
            &vector![0.0, 1.0, 0.0],
        );
        assert!(velocity.norm() <= 0.5 + 1.0e-4);
    }
}
