//! Contact records at their three lifecycle stages: raw query results,
//! per-tick movement hits, and projection-only views.

use character_query::{CollisionTags, OverlapHit, SweepHit};
use rapier3d::prelude::{ColliderHandle, Point, Real, RigidBodyHandle, Vector};

/// Raw result of a single query. Discarded after the tick that produced it.
#[derive(Clone, Copy, Debug)]
pub struct BasicHit {
    pub body: Option<RigidBodyHandle>,
    pub collider: ColliderHandle,
    pub point: Point<Real>,
    /// Surface normal, pointing from the obstacle toward the character.
    pub normal: Vector<Real>,
    pub tags: CollisionTags,
}

impl BasicHit {
    pub fn from_sweep(hit: &SweepHit) -> Self {
        Self {
            body: hit.body,
            collider: hit.collider,
            point: hit.point,
            normal: hit.normal,
            tags: hit.tags,
        }
    }

    pub fn from_overlap(hit: &OverlapHit) -> Self {
        Self {
            body: hit.body,
            collider: hit.collider,
            point: hit.point,
            normal: hit.normal,
            tags: hit.tags,
        }
    }

    pub fn key(&self) -> HitKey {
        HitKey {
            body: self.body,
            collider: self.collider,
        }
    }
}

/// A movement hit enriched with grounding context and the velocity change it
/// caused. Appended to the character's per-tick hit sequence in detection
/// order.
#[derive(Clone, Copy, Debug)]
pub struct CharacterHit {
    pub hit: BasicHit,
    pub was_character_grounded: bool,
    pub grounded_on_hit: bool,
    pub velocity_before: Vector<Real>,
    pub velocity_after: Vector<Real>,
}

/// The subset of a hit the projection engine needs. Lives only within one
/// projection call chain. Tags ride along so projection overrides can react
/// to surface flavors without a collider lookup.
#[derive(Clone, Copy, Debug)]
pub struct VelocityProjectionHit {
    pub normal: Vector<Real>,
    pub grounded_on_hit: bool,
    pub point: Point<Real>,
    pub tags: CollisionTags,
}

impl VelocityProjectionHit {
    pub fn new(hit: &BasicHit, grounded_on_hit: bool) -> Self {
        Self {
            normal: hit.normal,
            grounded_on_hit,
            point: hit.point,
            tags: hit.tags,
        }
    }
}

/// Identity of a contact for cross-tick diffing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HitKey {
    pub body: Option<RigidBodyHandle>,
    pub collider: ColliderHandle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitPhase {
    Enter,
    Stay,
    Exit,
}

#[derive(Clone, Copy, Debug)]
pub struct StatefulHit {
    pub key: HitKey,
    pub phase: HitPhase,
}

/// Pure set-diff of contact keys: current keys become `Enter` or `Stay`,
/// previous keys missing from the current set become `Exit`. Output order is
/// current-set order followed by exits in previous-set order.
pub fn diff_stateful_hits(previous: &[HitKey], current: &[HitKey], out: &mut Vec<StatefulHit>) {
    out.clear();
    for key in current {
        let phase = if previous.contains(key) {
            HitPhase::Stay
        } else {
            HitPhase::Enter
        };
        out.push(StatefulHit { key: *key, phase });
    }
    for key in previous {
        if !current.contains(key) {
            out.push(StatefulHit {
                key: *key,
                phase: HitPhase::Exit,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::prelude::{ColliderSet, ColliderBuilder};

    fn keys(n: usize) -> Vec<HitKey> {
        let mut set = ColliderSet::new();
        (0..n)
            .map(|_| HitKey {
                body: None,
                collider: set.insert(ColliderBuilder::ball(0.5).build()),
            })
            .collect()
    }

    #[test]
    fn diff_emits_enter_stay_exit() {
        let all = keys(3);
        let previous = vec![all[0], all[1]];
        let current = vec![all[1], all[2]];
        let mut out = Vec::new();
        diff_stateful_hits(&previous, &current, &mut out);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].key, all[1]);
        assert_eq!(out[0].phase, HitPhase::Stay);
        assert_eq!(out[1].key, all[2]);
        assert_eq!(out[1].phase, HitPhase::Enter);
        assert_eq!(out[2].key, all[0]);
        assert_eq!(out[2].phase, HitPhase::Exit);
    }

    #[test]
    fn diff_with_empty_sets() {
        let all = keys(1);
        let mut out = Vec::new();
        diff_stateful_hits(&[], &all, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].phase, HitPhase::Enter);

        diff_stateful_hits(&all, &[], &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].phase, HitPhase::Exit);
    }
}
