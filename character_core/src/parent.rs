//! Moving-platform attachment and carry.

use character_query::CharacterQueryView;
use rapier3d::math::{Isometry, Real, Vector};
use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::Point;

use sim_core::logging;

use crate::body::{CharacterBody, ParentAttachment};

/// Displaces the character by the rigid-motion delta its parent underwent
/// since last tick. Runs before grounding so the probes see the character at
/// its carried position. A vanished parent degrades to "no parent".
pub fn apply_parent_movement(
    query: &CharacterQueryView<'_>,
    body: &mut CharacterBody,
    pose: &mut Isometry<Real>,
    _dt: Real,
) {
    body.parent_velocity = Vector::zeros();
    body.rotation_from_parent = UnitQuaternion::identity();

    let Some(attachment) = body.parent.as_mut() else {
        return;
    };
    let Some(rb) = query.world().body(attachment.body) else {
        logging::debug("parent body no longer exists, detaching");
        body.previous_parent = Some(attachment.body);
        body.parent = None;
        body.parent_changed = true;
        return;
    };

    let current_pose = *rb.position();
    let delta = current_pose * attachment.previous_pose.inverse();
    *pose = delta * *pose;
    body.rotation_from_parent = delta.rotation;

    let anchor_world = current_pose * attachment.anchor_local;
    body.parent_velocity = rb.velocity_at_point(&anchor_world);
    attachment.previous_pose = current_pose;
}

/// After the final position is known, attaches the character to the moving
/// body it is standing on (or detaches). A parent change resets the rotation
/// smoothing state.
pub fn detect_moving_platform(
    query: &CharacterQueryView<'_>,
    body: &mut CharacterBody,
    pose: &Isometry<Real>,
) {
    let previous = body.parent.map(|attachment| attachment.body);
    body.previous_parent = previous;

    let new_parent = if body.is_grounded {
        body.ground_hit.and_then(|hit| hit.body).filter(|handle| {
            query
                .world()
                .body(*handle)
                .map(|rb| !rb.is_fixed())
                .unwrap_or(false)
        })
    } else {
        None
    };

    match (previous, new_parent) {
        (Some(old), Some(new)) if old == new => {
            // Same platform: refresh the anchor under the character's feet.
            if let Some(rb) = query.world().body(new) {
                let anchor_world = Point::from(pose.translation.vector);
                if let Some(attachment) = body.parent.as_mut() {
                    attachment.anchor_local = rb.position().inverse_transform_point(&anchor_world);
                }
            }
        }
        (_, Some(new)) => {
            let Some(rb) = query.world().body(new) else {
                return;
            };
            let parent_pose = *rb.position();
            let anchor_world = Point::from(pose.translation.vector);
            body.parent = Some(ParentAttachment {
                body: new,
                anchor_local: parent_pose.inverse_transform_point(&anchor_world),
                previous_pose: parent_pose,
            });
            body.parent_changed = true;
            body.rotation_from_parent = UnitQuaternion::identity();
        }
        (Some(_), None) => {
            body.parent = None;
            body.parent_changed = true;
        }
        (None, None) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use physics_rapier::PhysicsWorld;
    use rapier3d::prelude::*;

    #[test]
    fn carry_follows_platform_translation() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        let (platform, _) = world.insert_kinematic_body(
            RigidBodyBuilder::kinematic_velocity_based().translation(vector![0.0, 1.0, 0.0]),
            ColliderBuilder::cuboid(2.0, 0.1, 2.0),
        );
        world
            .body_mut(platform)
            .unwrap()
            .set_linvel(vector![1.0, 0.0, 0.0], true);
        world.refresh_queries();

        let mut body = CharacterBody::new();
        let mut pose = Isometry::translation(0.0, 2.0, 0.0);
        body.parent = Some(ParentAttachment {
            body: platform,
            anchor_local: Point::new(0.0, 1.0, 0.0),
            previous_pose: *world.body(platform).unwrap().position(),
        });

        // Platform advances one step; the carry must follow the delta.
        world.step(1.0 / 60.0);
        let view = CharacterQueryView::new(&world, None, None, &[]);
        apply_parent_movement(&view, &mut body, &mut pose, 1.0 / 60.0);

        assert!((pose.translation.x - 1.0 / 60.0).abs() < 1.0e-3);
        assert!(body.parent_velocity.x > 0.9);
    }

    #[test]
    fn missing_parent_detaches_without_fault() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        let (platform, _) = world.insert_kinematic_body(
            RigidBodyBuilder::kinematic_velocity_based(),
            ColliderBuilder::cuboid(2.0, 0.1, 2.0),
        );
        let previous_pose = *world.body(platform).unwrap().position();
        world.remove_body(platform);
        world.refresh_queries();

        let mut body = CharacterBody::new();
        let mut pose = Isometry::translation(0.0, 2.0, 0.0);
        body.parent = Some(ParentAttachment {
            body: platform,
            anchor_local: Point::origin(),
            previous_pose,
        });

        let view = CharacterQueryView::new(&world, None, None, &[]);
        apply_parent_movement(&view, &mut body, &mut pose, 1.0 / 60.0);
        assert!(body.parent.is_none());
        assert!(body.parent_changed);
        assert_eq!(body.previous_parent, Some(platform));
    }
}
