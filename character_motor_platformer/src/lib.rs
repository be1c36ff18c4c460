//! Platformer archetype: movement state machine and processor overrides.
#![forbid(unsafe_code)]

use character_core::{
    math, CharacterBody, CharacterProcessor, ProcessorContext, VelocityProjectionHit,
};
use character_query::CollisionTags;
use rapier3d::math::Vector;
use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::Real;

/// Surfaces carrying this tag reflect the character instead of sliding it.
pub const BOUNCY_SURFACE: CollisionTags = CollisionTags::custom(0);

/// Movement states. Value-typed and serializable-friendly so networked
/// prediction can snapshot and replay them; dispatch is a single `match`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MovementState {
    #[default]
    Ground,
    Air,
    WallRun,
    Climb,
    Swim,
}

impl MovementState {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementState::Ground => "ground",
            MovementState::Air => "air",
            MovementState::WallRun => "wall_run",
            MovementState::Climb => "climb",
            MovementState::Swim => "swim",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ground" => Some(MovementState::Ground),
            "air" => Some(MovementState::Air),
            "wall_run" | "wallrun" => Some(MovementState::WallRun),
            "climb" => Some(MovementState::Climb),
            "swim" => Some(MovementState::Swim),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GroundParams {
    pub max_speed: Real,
    pub accel: Real,
    pub friction: Real,
}

#[derive(Clone, Copy, Debug)]
pub struct AirParams {
    pub max_speed: Real,
    pub accel: Real,
    pub gravity: Real,
}

#[derive(Clone, Copy, Debug)]
pub struct WallRunParams {
    pub min_speed: Real,
    pub gravity_scale: Real,
}

#[derive(Clone, Copy, Debug)]
pub struct ClimbParams {
    pub climb_speed: Real,
}

#[derive(Clone, Copy, Debug)]
pub struct SwimParams {
    pub max_speed: Real,
    pub accel: Real,
    pub buoyancy: Real,
    /// Up reference while swimming; gravity-well levels point this at the
    /// local surface.
    pub up: Vector<Real>,
}

#[derive(Clone, Copy, Debug)]
pub struct PlatformerConfig {
    pub ground: GroundParams,
    pub air: AirParams,
    pub wall_run: WallRunParams,
    pub climb: ClimbParams,
    pub swim: SwimParams,
    pub jump_speed: Real,
    /// Scale applied to the reflected speed off bouncy surfaces.
    pub bounce_restitution: Real,
}

impl Default for PlatformerConfig {
    fn default() -> Self {
        Self {
            ground: GroundParams {
                max_speed: 5.0,
                accel: 12.0,
                friction: 9.0,
            },
            air: AirParams {
                max_speed: 4.0,
                accel: 4.0,
                gravity: 9.81,
            },
            wall_run: WallRunParams {
                min_speed: 3.0,
                gravity_scale: 0.25,
            },
            climb: ClimbParams { climb_speed: 2.0 },
            swim: SwimParams {
                max_speed: 2.5,
                accel: 5.0,
                buoyancy: 2.0,
                up: Vector::y(),
            },
            jump_speed: 5.5,
            bounce_restitution: 0.8,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PlatformerInput {
    pub move_axis: [Real; 2],
    pub jump: bool,
    pub climb: bool,
    pub yaw: Real,
}

#[derive(Clone, Copy, Debug)]
pub struct PlatformerStatus {
    pub grounded: bool,
    pub ground_normal: Option<Vector<Real>>,
    pub wall_normal: Option<Vector<Real>>,
    pub in_water: bool,
}

/// The state machine driver: transitions, then per-state velocity update,
/// all through one dispatch point.
pub struct PlatformerMotor {
    config: PlatformerConfig,
    state: MovementState,
}

impl PlatformerMotor {
    pub fn new(config: PlatformerConfig) -> Self {
        Self {
            config,
            state: MovementState::Ground,
        }
    }

    pub fn state(&self) -> MovementState {
        self.state
    }

    pub fn config(&self) -> PlatformerConfig {
        self.config
    }

    pub fn config_mut(&mut self) -> &mut PlatformerConfig {
        &mut self.config
    }

    pub fn step(
        &mut self,
        input: PlatformerInput,
        status: PlatformerStatus,
        velocity: Vector<Real>,
        dt: Real,
    ) -> Vector<Real> {
        let dt = dt.max(0.0);
        self.state = self.next_state(&input, &status, &velocity);
        match self.state {
            MovementState::Ground => self.ground_update(&input, &status, velocity, dt),
            MovementState::Air => self.air_update(&input, velocity, dt),
            MovementState::WallRun => self.wall_run_update(&status, velocity, dt),
            MovementState::Climb => self.climb_update(&input, velocity, dt),
            MovementState::Swim => self.swim_update(&input, velocity, dt),
        }
    }

    fn next_state(
        &self,
        input: &PlatformerInput,
        status: &PlatformerStatus,
        velocity: &Vector<Real>,
    ) -> MovementState {
        if status.in_water {
            return MovementState::Swim;
        }
        if input.climb && status.wall_normal.is_some() {
            return MovementState::Climb;
        }
        if status.grounded {
            return MovementState::Ground;
        }
        let planar_speed = Vector::new(velocity.x, 0.0, velocity.z).norm();
        if status.wall_normal.is_some() && planar_speed >= self.config.wall_run.min_speed {
            return MovementState::WallRun;
        }
        MovementState::Air
    }

    fn ground_update(
        &self,
        input: &PlatformerInput,
        status: &PlatformerStatus,
        mut velocity: Vector<Real>,
        dt: Real,
    ) -> Vector<Real> {
        let params = self.config.ground;
        let intent = move_intent(input.yaw, input.move_axis, status.ground_normal);
        let mut planar = Vector::new(velocity.x, 0.0, velocity.z);
        planar = apply_friction(planar, params.friction, dt);
        planar = accelerate(planar, intent, params.max_speed, params.accel, dt);
        velocity.x = planar.x;
        velocity.z = planar.z;
        velocity.y = if input.jump { self.config.jump_speed } else { 0.0 };
        velocity
    }

    fn air_update(
        &self,
        input: &PlatformerInput,
        mut velocity: Vector<Real>,
        dt: Real,
    ) -> Vector<Real> {
        let params = self.config.air;
        let intent = move_intent(input.yaw, input.move_axis, None);
        let mut planar = Vector::new(velocity.x, 0.0, velocity.z);
        planar = accelerate(planar, intent, params.max_speed, params.accel, dt);
        velocity.x = planar.x;
        velocity.z = planar.z;
        velocity.y -= params.gravity * dt;
        velocity
    }

    fn wall_run_update(
        &self,
        status: &PlatformerStatus,
        mut velocity: Vector<Real>,
        dt: Real,
    ) -> Vector<Real> {
        let params = self.config.wall_run;
        if let Some(normal) = status.wall_normal {
            velocity = math::project_on_plane(&velocity, &normal);
        }
        velocity.y -= self.config.air.gravity * params.gravity_scale * dt;
        velocity
    }

    fn climb_update(
        &self,
        input: &PlatformerInput,
        mut velocity: Vector<Real>,
        _dt: Real,
    ) -> Vector<Real> {
        let params = self.config.climb;
        velocity.x = 0.0;
        velocity.z = 0.0;
        velocity.y = params.climb_speed * input.move_axis[1];
        velocity
    }

    fn swim_update(
        &self,
        input: &PlatformerInput,
        mut velocity: Vector<Real>,
        dt: Real,
    ) -> Vector<Real> {
        let params = self.config.swim;
        let intent = move_intent(input.yaw, input.move_axis, None);
        velocity = accelerate(velocity, intent, params.max_speed, params.accel, dt);
        velocity += params.up * (params.buoyancy * dt);
        let speed = velocity.norm();
        if speed > params.max_speed {
            velocity *= params.max_speed / speed;
        }
        velocity
    }
}

fn move_intent(
    yaw: Real,
    axis: [Real; 2],
    ground_normal: Option<Vector<Real>>,
) -> Vector<Real> {
    let forward = Vector::new(yaw.sin(), 0.0, -yaw.cos());
    let right = Vector::new(yaw.cos(), 0.0, yaw.sin());
    let mut intent = right * axis[0] + forward * axis[1];
    let magnitude = intent.norm();
    if magnitude > 1.0 {
        intent /= magnitude;
    }
    if let Some(normal) = ground_normal {
        let projected = math::project_on_plane(&intent, &normal);
        if projected.norm_squared() > 0.0 {
            return math::normalize_or_zero(&projected) * intent.norm();
        }
    }
    intent
}

fn accelerate(
    velocity: Vector<Real>,
    intent: Vector<Real>,
    max_speed: Real,
    accel: Real,
    dt: Real,
) -> Vector<Real> {
    let wish_dir = math::normalize_or_zero(&intent);
    let wish_speed = intent.norm().min(1.0) * max_speed;
    if wish_speed <= 0.0 {
        return velocity;
    }
    let current = velocity.dot(&wish_dir);
    let add = wish_speed - current;
    if add <= 0.0 {
        return velocity;
    }
    velocity + wish_dir * (accel * dt * wish_speed).min(add)
}

fn apply_friction(velocity: Vector<Real>, friction: Real, dt: Real) -> Vector<Real> {
    let speed = velocity.norm();
    if speed <= 0.0 || friction <= 0.0 {
        return velocity;
    }
    let new_speed = (speed - speed.max(1.0) * friction * dt).max(0.0);
    velocity * (new_speed / speed)
}

/// Processor for the platformer archetype: bouncy surfaces reflect instead
/// of sliding, and the swim state recomputes "up" from the configured swim
/// reference rather than the character rotation.
pub struct PlatformerProcessor {
    pub state: MovementState,
    pub swim_up: Vector<Real>,
    pub bounce_restitution: Real,
}

impl PlatformerProcessor {
    pub fn new(config: &PlatformerConfig) -> Self {
        Self {
            state: MovementState::Ground,
            swim_up: config.swim.up,
            bounce_restitution: config.bounce_restitution,
        }
    }

    pub fn sync_state(&mut self, state: MovementState) {
        self.state = state;
    }
}

impl CharacterProcessor for PlatformerProcessor {
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
        if let Some(latest) = hits.last() {
            if latest.tags.contains(BOUNCY_SURFACE) && latest.normal.norm_squared() > 0.0 {
                // Reflect-and-scale instead of the default projection.
                let into = velocity.dot(&latest.normal);
                if into < 0.0 {
                    *velocity -= latest.normal * (2.0 * into);
                    *velocity *= self.bounce_restitution.clamp(0.0, 1.0);
                }
                return;
            }
        }
        character_core::projection::default_project_velocity_on_hits(
            ctx.props,
            velocity,
            is_grounded,
            ground_hit,
            hits,
            original_velocity_direction,
            grounding_up,
        );
    }

    fn update_grounding_up(
        &self,
        _ctx: &ProcessorContext<'_, '_>,
        body: &mut CharacterBody,
        rotation: &UnitQuaternion<Real>,
    ) {
        body.grounding_up = match self.state {
            MovementState::Swim => math::normalize_or_zero(&self.swim_up),
            _ => rotation * Vector::y(),
        };
        if body.grounding_up.norm_squared() <= math::VECTOR_EPSILON_SQ {
            body.grounding_up = Vector::y();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_grounded() -> PlatformerStatus {
        PlatformerStatus {
            grounded: true,
            ground_normal: Some(Vector::y()),
            wall_normal: None,
            in_water: false,
        }
    }

    #[test]
    fn state_names_round_trip() {
        for state in [
            MovementState::Ground,
            MovementState::Air,
            MovementState::WallRun,
            MovementState::Climb,
            MovementState::Swim,
        ] {
            assert_eq!(MovementState::parse(state.as_str()), Some(state));
        }
        assert_eq!(MovementState::parse("flying"), None);
    }

    #[test]
    fn water_always_wins_the_transition() {
        let mut motor = PlatformerMotor::new(PlatformerConfig::default());
        let status = PlatformerStatus {
            in_water: true,
            ..status_grounded()
        };
        motor.step(PlatformerInput::default(), status, Vector::zeros(), 1.0 / 60.0);
        assert_eq!(motor.state(), MovementState::Swim);
    }

    #[test]
    fn airborne_with_wall_and_speed_wall_runs() {
        let mut motor = PlatformerMotor::new(PlatformerConfig::default());
        let status = PlatformerStatus {
            grounded: false,
            ground_normal: None,
            wall_normal: Some(Vector::x()),
            in_water: false,
        };
        motor.step(
            PlatformerInput::default(),
            status,
            Vector::new(0.0, 0.0, 4.0),
            1.0 / 60.0,
        );
        assert_eq!(motor.state(), MovementState::WallRun);

        // Too slow: falls instead.
        motor.step(
            PlatformerInput::default(),
            status,
            Vector::new(0.0, 0.0, 1.0),
            1.0 / 60.0,
        );
        assert_eq!(motor.state(), MovementState::Air);
    }

    #[test]
    fn wall_run_reduces_gravity_and_hugs_the_wall() {
        let mut motor = PlatformerMotor::new(PlatformerConfig::default());
        let status = PlatformerStatus {
            grounded: false,
            ground_normal: None,
            wall_normal: Some(Vector::x()),
            in_water: false,
        };
        let dt = 0.1;
        let velocity = motor.step(
            PlatformerInput::default(),
            status,
            Vector::new(1.0, 0.0, 4.0),
            dt,
        );
        assert!(velocity.x.abs() < 1.0e-5);
        let full_drop = 9.81 * dt;
        assert!(velocity.y.abs() < full_drop * 0.5);
    }

    #[test]
    fn climb_moves_vertically_from_input() {
        let mut motor = PlatformerMotor::new(PlatformerConfig::default());
        let status = PlatformerStatus {
            grounded: false,
            ground_normal: None,
            wall_normal: Some(Vector::x()),
            in_water: false,
        };
        let velocity = motor.step(
            PlatformerInput {
                climb: true,
                move_axis: [0.0, 1.0],
                ..Default::default()
            },
            status,
            Vector::zeros(),
            1.0 / 60.0,
        );
        assert_eq!(motor.state(), MovementState::Climb);
        assert!((velocity.y - 2.0).abs() < 1.0e-5);
        assert!(velocity.x.abs() < 1.0e-5 && velocity.z.abs() < 1.0e-5);
    }

    fn with_context<R>(run: impl FnOnce(&ProcessorContext<'_, '_>) -> R) -> R {
        use character_core::{CharacterProperties, CharacterShape, CharacterSnapshots};
        use physics_rapier::PhysicsWorld;
        use rapier3d::prelude::vector;

        let world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        let view = character_query::CharacterQueryView::new(&world, None, None, &[]);
        let props = CharacterProperties::default();
        let shape = CharacterShape::new(0.5, 0.5);
        let snapshots = CharacterSnapshots::new();
        let ctx = ProcessorContext {
            query: &view,
            props: &props,
            shape: &shape,
            characters: &snapshots,
            dt: 1.0 / 60.0,
        };
        run(&ctx)
    }

    #[test]
    fn swim_state_overrides_grounding_up() {
        let config = PlatformerConfig::default();
        let mut processor = PlatformerProcessor::new(&config);
        processor.swim_up = Vector::new(1.0, 0.0, 0.0);
        processor.sync_state(MovementState::Swim);

        let mut body = CharacterBody::new();
        let rotation = UnitQuaternion::identity();
        with_context(|ctx| {
            processor.update_grounding_up(ctx, &mut body, &rotation);
            assert!((body.grounding_up - Vector::new(1.0, 0.0, 0.0)).norm() < 1.0e-6);

            processor.sync_state(MovementState::Ground);
            processor.update_grounding_up(ctx, &mut body, &rotation);
            assert!((body.grounding_up - Vector::y()).norm() < 1.0e-6);
        });
    }

    #[test]
    fn bouncy_surface_reflects_instead_of_sliding() {
        use rapier3d::prelude::Point;

        let config = PlatformerConfig::default();
        let processor = PlatformerProcessor::new(&config);
        let bouncy_hit = VelocityProjectionHit {
            normal: Vector::y(),
            grounded_on_hit: true,
            point: Point::origin(),
            tags: BOUNCY_SURFACE,
        };

        with_context(|ctx| {
            let mut velocity = Vector::new(1.0, -4.0, 0.0);
            let mut is_grounded = false;
            let mut ground_hit = None;
            processor.project_velocity_on_hits(
                ctx,
                &mut velocity,
                &mut is_grounded,
                &mut ground_hit,
                &[bouncy_hit],
                &Vector::new(1.0, -4.0, 0.0),
                &Vector::y(),
            );
            // Reflected upward and scaled by restitution, not flattened.
            assert!(velocity.y > 0.0);
            assert!((velocity.y - 4.0 * 0.8).abs() < 1.0e-4);
        });
    }
}
