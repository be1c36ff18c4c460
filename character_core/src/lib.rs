//! Kinematic character movement and collision resolution.
//!
//! The solver consumes a capsule shape, a collision query view and the
//! previous tick's character state, and produces an updated pose, velocity,
//! hit events and deferred impulses. It holds no state of its own; hosts
//! drive it once per character per fixed tick.
#![forbid(unsafe_code)]

pub mod body;
pub mod grounding;
pub mod hits;
pub mod impulses;
pub mod math;
pub mod parent;
pub mod processor;
pub mod projection;
pub mod properties;
pub mod solver;
pub mod tuning;

pub use body::{CharacterBody, ParentAttachment, StoredCharacterData};
pub use grounding::{GroundingEvaluationKind, StepHandlingMode};
pub use hits::{BasicHit, CharacterHit, HitKey, HitPhase, StatefulHit, VelocityProjectionHit};
pub use impulses::DeferredImpulse;
pub use processor::{CharacterProcessor, CharacterSnapshots, DefaultProcessor, ProcessorContext};
pub use properties::{CharacterProperties, CharacterShape, StepAndSlopeHandling};
pub use solver::update_character;
pub use tuning::{CharacterTuning, TuningValidation};
