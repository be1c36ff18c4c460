//! Collision queries and per-hit filtering for character movement.
#![forbid(unsafe_code)]

use physics_rapier::PhysicsWorld;
use rapier3d::parry::query::{contact, ShapeCastOptions};
use rapier3d::prelude::{
    Capsule, Collider, ColliderHandle, Isometry, Point, QueryFilter, Ray, Real, RigidBodyHandle,
    Vector,
};

/// Upper bound on hits returned by a single capsule sweep. Complex geometry
/// beyond this is handled by the solver's own iteration loop.
const MAX_SWEEP_HITS: usize = 16;

/// Behavior tags carried in the low bits of a collider's `user_data`.
///
/// Tags are evaluated per hit so two characters can treat the same body
/// differently through their own ignore sets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollisionTags(u64);

impl CollisionTags {
    /// Never collide with characters, regardless of material response.
    pub const IGNORE_COLLISIONS: Self = Self(1 << 0);
    /// Collide, but never count as ground.
    pub const IGNORE_GROUNDING: Self = Self(1 << 1);
    /// Collide, but never allow step-up onto this body.
    pub const IGNORE_STEP_HANDLING: Self = Self(1 << 2);
    /// The collider belongs to a character body. Characters collide with each
    /// other even when their material response is trigger-only.
    pub const CHARACTER_BODY: Self = Self(1 << 3);

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Reserved bits for game-specific tags (surface flavors etc.).
    pub const fn custom(bit: u32) -> Self {
        Self(1 << (8 + bit))
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn from_user_data(user_data: u128) -> Self {
        Self(user_data as u64)
    }

    pub fn to_user_data(self) -> u128 {
        self.0 as u128
    }
}

/// One contact produced by a swept capsule cast.
#[derive(Clone, Copy, Debug)]
pub struct SweepHit {
    pub collider: ColliderHandle,
    pub body: Option<RigidBodyHandle>,
    /// Travel distance along the sweep direction before impact.
    pub distance: Real,
    /// `distance / max_distance`, in [0, 1].
    pub fraction: Real,
    pub point: Point<Real>,
    /// Surface normal at the contact, pointing from the obstacle toward the
    /// character.
    pub normal: Vector<Real>,
    pub tags: CollisionTags,
}

/// One contact produced by an overlap query.
#[derive(Clone, Copy, Debug)]
pub struct OverlapHit {
    pub collider: ColliderHandle,
    pub body: Option<RigidBodyHandle>,
    pub point: Point<Real>,
    /// Separating direction, pointing from the obstacle toward the character.
    pub normal: Vector<Real>,
    /// Penetration depth; positive when the shapes actually overlap.
    pub depth: Real,
    pub tags: CollisionTags,
}

#[derive(Clone, Copy, Debug)]
pub struct RayHit {
    pub collider: ColliderHandle,
    pub body: Option<RigidBodyHandle>,
    pub distance: Real,
    pub normal: Vector<Real>,
}

/// Surface point of a capsule in the given pose, furthest along
/// `direction`. Used as the contact point of sweep hits; exact for convex
/// contacts and independent of the narrow phase's witness conventions.
fn capsule_support_point(
    capsule: &Capsule,
    pose: &Isometry<Real>,
    direction: &Vector<Real>,
) -> Point<Real> {
    let a = pose * capsule.segment.a;
    let b = pose * capsule.segment.b;
    let endpoint = if (a - b).dot(direction) >= 0.0 { a } else { b };
    endpoint + direction * capsule.radius
}

/// Read-only query access scoped to one character: the character's own
/// collider and its per-character ignore set are filtered out of every query.
pub struct CharacterQueryView<'a> {
    world: &'a PhysicsWorld,
    self_body: Option<RigidBodyHandle>,
    self_collider: Option<ColliderHandle>,
    ignored_bodies: &'a [RigidBodyHandle],
}

impl<'a> CharacterQueryView<'a> {
    pub fn new(
        world: &'a PhysicsWorld,
        self_body: Option<RigidBodyHandle>,
        self_collider: Option<ColliderHandle>,
        ignored_bodies: &'a [RigidBodyHandle],
    ) -> Self {
        Self {
            world,
            self_body,
            self_collider,
            ignored_bodies,
        }
    }

    pub fn world(&self) -> &'a PhysicsWorld {
        self.world
    }

    pub fn gravity(&self) -> Vector<Real> {
        self.world.gravity
    }

    pub fn tags_of(&self, collider: ColliderHandle) -> CollisionTags {
        self.world
            .collider(collider)
            .map(|co| CollisionTags::from_user_data(co.user_data))
            .unwrap_or_default()
    }

    /// A hit is collidable iff its material declares a collide response (not
    /// a sensor) or the hit body is itself a character, unless a tag or the
    /// character's ignore set rules it out.
    pub fn is_collidable(&self, handle: ColliderHandle, collider: &Collider) -> bool {
        if Some(handle) == self.self_collider {
            return false;
        }
        if let Some(body) = collider.parent() {
            if Some(body) == self.self_body || self.ignored_bodies.contains(&body) {
                return false;
            }
        }
        let tags = CollisionTags::from_user_data(collider.user_data);
        if tags.contains(CollisionTags::IGNORE_COLLISIONS) {
            return false;
        }
        !collider.is_sensor() || tags.contains(CollisionTags::CHARACTER_BODY)
    }

    pub fn grounding_ignored(&self, collider: ColliderHandle) -> bool {
        self.tags_of(collider)
            .contains(CollisionTags::IGNORE_GROUNDING)
    }

    pub fn step_handling_ignored(&self, collider: ColliderHandle) -> bool {
        self.tags_of(collider)
            .contains(CollisionTags::IGNORE_STEP_HANDLING)
    }

    /// Earliest collidable hit along `direction` (unit length), within
    /// `max_distance`.
    pub fn cast_capsule(
        &self,
        capsule: &Capsule,
        pose: &Isometry<Real>,
        direction: &Vector<Real>,
        max_distance: Real,
    ) -> Option<SweepHit> {
        self.cast_capsule_excluding(capsule, pose, direction, max_distance, &[])
    }

    /// All collidable hits along the sweep, ordered by fraction. Bounded by
    /// `MAX_SWEEP_HITS`; the bound is far above what level geometry produces
    /// in one displacement.
    pub fn cast_capsule_all(
        &self,
        capsule: &Capsule,
        pose: &Isometry<Real>,
        direction: &Vector<Real>,
        max_distance: Real,
    ) -> Vec<SweepHit> {
        let mut hits = Vec::new();
        let mut excluded: Vec<ColliderHandle> = Vec::new();
        while hits.len() < MAX_SWEEP_HITS {
            match self.cast_capsule_excluding(capsule, pose, direction, max_distance, &excluded) {
                Some(hit) => {
                    excluded.push(hit.collider);
                    hits.push(hit);
                }
                None => break,
            }
        }
        hits.sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
        hits
    }

    fn cast_capsule_excluding(
        &self,
        capsule: &Capsule,
        pose: &Isometry<Real>,
        direction: &Vector<Real>,
        max_distance: Real,
        excluded: &[ColliderHandle],
    ) -> Option<SweepHit> {
        if max_distance <= 0.0 || direction.norm_squared() < 1.0e-12 {
            return None;
        }
        let predicate = |handle: ColliderHandle, collider: &Collider| {
            !excluded.contains(&handle) && self.is_collidable(handle, collider)
        };
        let filter = QueryFilter::default().predicate(&predicate);
        let options = ShapeCastOptions {
            max_time_of_impact: max_distance,
            target_distance: 0.0,
            stop_at_penetration: true,
            compute_impact_geometry_on_penetration: true,
        };
        let (handle, hit) = self.world.query_pipeline().cast_shape(
            self.world.bodies(),
            self.world.colliders(),
            pose,
            direction,
            capsule,
            options,
            filter,
        )?;
        let collider = self.world.collider(handle)?;
        let normal = hit.normal1.into_inner();
        let impact_pose =
            Isometry::from_parts((pose.translation.vector + direction * hit.time_of_impact).into(), pose.rotation);
        Some(SweepHit {
            collider: handle,
            body: collider.parent(),
            distance: hit.time_of_impact,
            fraction: if max_distance > 0.0 {
                (hit.time_of_impact / max_distance).clamp(0.0, 1.0)
            } else {
                0.0
            },
            point: capsule_support_point(capsule, &impact_pose, &(-normal)),
            normal,
            tags: CollisionTags::from_user_data(collider.user_data),
        })
    }

    /// All collidable contacts within `margin` of the capsule surface.
    /// No ordering guarantee.
    pub fn overlaps(
        &self,
        capsule: &Capsule,
        pose: &Isometry<Real>,
        margin: Real,
    ) -> Vec<OverlapHit> {
        let mut candidates: Vec<ColliderHandle> = Vec::new();
        let predicate =
            |handle: ColliderHandle, collider: &Collider| self.is_collidable(handle, collider);
        let filter = QueryFilter::default().predicate(&predicate);
        self.world.query_pipeline().intersections_with_shape(
            self.world.bodies(),
            self.world.colliders(),
            pose,
            capsule,
            filter,
            |handle| {
                candidates.push(handle);
                true
            },
        );

        let mut hits = Vec::new();
        for handle in candidates {
            let Some(collider) = self.world.collider(handle) else {
                continue;
            };
            let result = contact(
                collider.position(),
                collider.shape(),
                pose,
                capsule,
                margin.max(0.0),
            );
            let Ok(Some(found)) = result else {
                continue;
            };
            hits.push(OverlapHit {
                collider: handle,
                body: collider.parent(),
                point: found.point1,
                normal: found.normal1.into_inner(),
                depth: -found.dist,
                tags: CollisionTags::from_user_data(collider.user_data),
            });
        }
        hits
    }

    /// All collidable colliders intersecting a sphere around `center`.
    /// Unordered; used for area effects rather than movement.
    pub fn overlap_sphere(&self, center: Point<Real>, radius: Real) -> Vec<ColliderHandle> {
        let mut found = Vec::new();
        if radius <= 0.0 {
            return found;
        }
        let predicate =
            |handle: ColliderHandle, collider: &Collider| self.is_collidable(handle, collider);
        let filter = QueryFilter::default().predicate(&predicate);
        let sphere = rapier3d::prelude::Ball::new(radius);
        let pose = Isometry::translation(center.x, center.y, center.z);
        self.world.query_pipeline().intersections_with_shape(
            self.world.bodies(),
            self.world.colliders(),
            &pose,
            &sphere,
            filter,
            |handle| {
                found.push(handle);
                true
            },
        );
        found
    }

    pub fn cast_ray(
        &self,
        origin: Point<Real>,
        direction: Vector<Real>,
        max_distance: Real,
    ) -> Option<RayHit> {
        if max_distance <= 0.0 || direction.norm_squared() < 1.0e-12 {
            return None;
        }
        let predicate =
            |handle: ColliderHandle, collider: &Collider| self.is_collidable(handle, collider);
        let filter = QueryFilter::default().predicate(&predicate);
        let ray = Ray::new(origin, direction);
        let (handle, hit) = self.world.query_pipeline().cast_ray_and_get_normal(
            self.world.bodies(),
            self.world.colliders(),
            &ray,
            max_distance,
            true,
            filter,
        )?;
        let body = self.world.collider(handle).and_then(|co| co.parent());
        Some(RayHit {
            collider: handle,
            body,
            distance: hit.time_of_impact,
            normal: hit.normal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::prelude::*;

    fn build_world() -> PhysicsWorld {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        let floor = ColliderBuilder::cuboid(10.0, 0.1, 10.0)
            .translation(vector![0.0, -0.1, 0.0])
            .build();
        world.insert_static_collider(floor);
        world.refresh_queries();
        world
    }

    fn capsule() -> Capsule {
        Capsule::new_y(0.5, 0.5)
    }

    #[test]
    fn downward_cast_hits_floor() {
        let world = build_world();
        let view = CharacterQueryView::new(&world, None, None, &[]);
        let pose = Isometry::translation(0.0, 2.0, 0.0);
        let hit = view
            .cast_capsule(&capsule(), &pose, &vector![0.0, -1.0, 0.0], 5.0)
            .expect("floor hit");
        assert!((hit.distance - 1.0).abs() < 1.0e-3);
        assert!(hit.normal.y > 0.99);
    }

    #[test]
    fn ignore_collisions_tag_filters_hit() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        let wall = ColliderBuilder::cuboid(0.1, 2.0, 2.0)
            .translation(vector![2.0, 0.0, 0.0])
            .user_data(CollisionTags::IGNORE_COLLISIONS.to_user_data())
            .build();
        world.insert_static_collider(wall);
        world.refresh_queries();

        let view = CharacterQueryView::new(&world, None, None, &[]);
        let pose = Isometry::translation(0.0, 0.0, 0.0);
        let hit = view.cast_capsule(&capsule(), &pose, &vector![1.0, 0.0, 0.0], 5.0);
        assert!(hit.is_none());
    }

    #[test]
    fn sensor_collides_only_when_character_tagged() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        let trigger = ColliderBuilder::cuboid(0.1, 2.0, 2.0)
            .translation(vector![2.0, 0.0, 0.0])
            .sensor(true)
            .build();
        world.insert_static_collider(trigger);
        let character = ColliderBuilder::cuboid(0.1, 2.0, 2.0)
            .translation(vector![-2.0, 0.0, 0.0])
            .sensor(true)
            .user_data(CollisionTags::CHARACTER_BODY.to_user_data())
            .build();
        world.insert_static_collider(character);
        world.refresh_queries();

        let view = CharacterQueryView::new(&world, None, None, &[]);
        let pose = Isometry::translation(0.0, 0.0, 0.0);
        assert!(view
            .cast_capsule(&capsule(), &pose, &vector![1.0, 0.0, 0.0], 5.0)
            .is_none());
        let hit = view
            .cast_capsule(&capsule(), &pose, &vector![-1.0, 0.0, 0.0], 5.0)
            .expect("character-tagged sensor must collide");
        assert!(hit.tags.contains(CollisionTags::CHARACTER_BODY));
    }

    #[test]
    fn overlap_reports_penetration_depth() {
        let world = build_world();
        let view = CharacterQueryView::new(&world, None, None, &[]);
        // Capsule bottom sunk 0.2 into the floor surface.
        let pose = Isometry::translation(0.0, 0.8, 0.0);
        let hits = view.overlaps(&capsule(), &pose, 0.05);
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert!(hit.normal.y > 0.99);
        assert!((hit.depth - 0.2).abs() < 2.0e-2);
    }

    #[test]
    fn sweep_returns_all_hits_in_fraction_order() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        for (i, x) in [2.0, 4.0].iter().enumerate() {
            let wall = ColliderBuilder::cuboid(0.1, 2.0, 2.0)
                .translation(vector![*x, 0.0, 0.0])
                .user_data(CollisionTags::custom(i as u32).to_user_data())
                .build();
            world.insert_static_collider(wall);
        }
        world.refresh_queries();

        let view = CharacterQueryView::new(&world, None, None, &[]);
        let pose = Isometry::translation(0.0, 0.0, 0.0);
        let hits = view.cast_capsule_all(&capsule(), &pose, &vector![1.0, 0.0, 0.0], 10.0);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].distance < hits[1].distance);
    }
}
