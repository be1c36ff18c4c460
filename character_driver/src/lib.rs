//! Fixed-tick character scheduling.
//!
//! Each tick: snapshot every character, solve each character independently
//! against the read-only collision world (inline or across worker threads),
//! then flush deferred impulses in a single serialized phase. Characters
//! only ever read other characters' previous-tick snapshots, so results are
//! identical regardless of processing order or thread count.
#![forbid(unsafe_code)]

use std::fmt;

use character_core::{
    impulses, update_character, CharacterBody, CharacterProperties, CharacterShape,
    CharacterSnapshots, DefaultProcessor, ProcessorContext, StoredCharacterData,
};
use character_motor_fps::FpsProcessor;
use character_motor_platformer::PlatformerProcessor;
use character_query::CharacterQueryView;
use physics_rapier::PhysicsWorld;
use rapier3d::math::{Isometry, Real};
use rapier3d::prelude::{ColliderHandle, RigidBodyHandle};

use sim_core::logging;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CharacterId(u32);

/// Archetype selection, fixed at construction time. One tagged variant per
/// character flavor; dispatch is a single match, never a downcast.
pub enum ArchetypeProcessor {
    Basic(DefaultProcessor),
    Fps(FpsProcessor),
    Platformer(PlatformerProcessor),
}

impl ArchetypeProcessor {
    fn update(
        &mut self,
        ctx: &ProcessorContext<'_, '_>,
        pose: &mut Isometry<Real>,
        body: &mut CharacterBody,
    ) {
        match self {
            ArchetypeProcessor::Basic(processor) => update_character(processor, ctx, pose, body),
            ArchetypeProcessor::Fps(processor) => update_character(processor, ctx, pose, body),
            ArchetypeProcessor::Platformer(processor) => {
                update_character(processor, ctx, pose, body)
            }
        }
    }
}

pub struct CharacterSlot {
    pub id: CharacterId,
    pub pose: Isometry<Real>,
    pub body: CharacterBody,
    pub props: CharacterProperties,
    pub shape: CharacterShape,
    /// The character's own kinematic body and collider in the world, if it
    /// is mirrored there for other bodies to query against.
    pub world_body: Option<RigidBodyHandle>,
    pub world_collider: Option<ColliderHandle>,
    /// Bodies this character never collides with.
    pub ignored_bodies: Vec<RigidBodyHandle>,
    pub processor: ArchetypeProcessor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    Inline,
    Threaded,
}

#[derive(Clone, Copy, Debug)]
pub struct DriverConfig {
    pub mode: ExecMode,
    pub workers: usize,
}

impl DriverConfig {
    pub fn inline() -> Self {
        Self {
            mode: ExecMode::Inline,
            workers: 0,
        }
    }

    pub fn threaded(workers: usize) -> Self {
        Self {
            mode: ExecMode::Threaded,
            workers: workers.max(1),
        }
    }
}

#[derive(Debug)]
pub enum DriverError {
    UnknownCharacter(CharacterId),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::UnknownCharacter(id) => write!(f, "unknown character {:?}", id),
        }
    }
}

impl std::error::Error for DriverError {}

pub struct CharacterDriver {
    config: DriverConfig,
    slots: Vec<CharacterSlot>,
    next_id: u32,
}

impl CharacterDriver {
    pub fn new(config: DriverConfig) -> Self {
        if config.mode == ExecMode::Threaded {
            sim_core::observability::install_panic_hook();
        }
        Self {
            config,
            slots: Vec::new(),
            next_id: 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_character(
        &mut self,
        pose: Isometry<Real>,
        props: CharacterProperties,
        shape: CharacterShape,
        processor: ArchetypeProcessor,
        world_body: Option<RigidBodyHandle>,
        world_collider: Option<ColliderHandle>,
    ) -> CharacterId {
        let id = CharacterId(self.next_id);
        self.next_id += 1;
        self.slots.push(CharacterSlot {
            id,
            pose,
            body: CharacterBody::new(),
            props,
            shape,
            world_body,
            world_collider,
            ignored_bodies: Vec::new(),
            processor,
        });
        id
    }

    pub fn remove_character(&mut self, id: CharacterId) -> Result<CharacterSlot, DriverError> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.id == id)
            .ok_or(DriverError::UnknownCharacter(id))?;
        Ok(self.slots.remove(index))
    }

    pub fn character(&self, id: CharacterId) -> Result<&CharacterSlot, DriverError> {
        self.slots
            .iter()
            .find(|slot| slot.id == id)
            .ok_or(DriverError::UnknownCharacter(id))
    }

    pub fn character_mut(&mut self, id: CharacterId) -> Result<&mut CharacterSlot, DriverError> {
        self.slots
            .iter_mut()
            .find(|slot| slot.id == id)
            .ok_or(DriverError::UnknownCharacter(id))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Runs one fixed tick for every character.
    pub fn tick(&mut self, world: &mut PhysicsWorld, dt: Real) {
        if dt <= 0.0 {
            logging::warn("ignoring tick with non-positive dt");
            return;
        }

        // Mirror character poses into the world so this tick's queries see
        // every character where it ended last tick.
        self.sync_world_bodies(world);

        let snapshots = self.build_snapshots();

        // Solve phase: the world is read-only, each character writes only
        // its own slot.
        {
            let world_view: &PhysicsWorld = world;
            match self.config.mode {
                ExecMode::Inline => {
                    for slot in &mut self.slots {
                        solve_slot(world_view, &snapshots, slot, dt);
                    }
                }
                ExecMode::Threaded => {
                    let workers = self.config.workers.max(1);
                    let chunk_size = self.slots.len().div_ceil(workers).max(1);
                    std::thread::scope(|scope| {
                        for chunk in self.slots.chunks_mut(chunk_size) {
                            scope.spawn(|| {
                                for slot in chunk {
                                    solve_slot(world_view, &snapshots, slot, dt);
                                }
                            });
                        }
                    });
                }
            }
        }

        // Flush phase: serialized, in slot order, after every solve is done.
        for slot in &self.slots {
            impulses::flush_deferred_impulses(world, &slot.body.deferred_impulses);
        }

        self.sync_world_bodies(world);
    }

    fn build_snapshots(&self) -> CharacterSnapshots {
        let mut snapshots = CharacterSnapshots::new();
        for slot in &self.slots {
            let Some(handle) = slot.world_body else {
                continue;
            };
            snapshots.insert(
                handle,
                StoredCharacterData {
                    relative_velocity: slot.body.relative_velocity,
                    is_grounded: slot.body.is_grounded,
                    mass: slot.props.mass,
                    simulate_dynamic_body: slot.props.simulate_dynamic_body,
                },
            );
        }
        snapshots
    }

    fn sync_world_bodies(&self, world: &mut PhysicsWorld) {
        for slot in &self.slots {
            let Some(handle) = slot.world_body else {
                continue;
            };
            let Some(rb) = world.body_mut(handle) else {
                logging::debug("character world body is missing, skipping sync");
                continue;
            };
            rb.set_position(slot.pose, true);
            rb.set_linvel(slot.body.world_velocity(), true);
        }
    }
}

fn solve_slot(
    world: &PhysicsWorld,
    snapshots: &CharacterSnapshots,
    slot: &mut CharacterSlot,
    dt: Real,
) {
    let view = CharacterQueryView::new(
        world,
        slot.world_body,
        slot.world_collider,
        &slot.ignored_bodies,
    );
    let ctx = ProcessorContext {
        query: &view,
        props: &slot.props,
        shape: &slot.shape,
        characters: snapshots,
        dt,
    };
    slot.processor.update(&ctx, &mut slot.pose, &mut slot.body);
}
