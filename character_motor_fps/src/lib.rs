//! Networked-FPS archetype: velocity-intent motor and processor.
#![forbid(unsafe_code)]

use character_core::{
    CharacterProcessor, ProcessorContext, VelocityProjectionHit,
};
use rapier3d::math::Vector;
use rapier3d::prelude::Real;

#[derive(Clone, Copy, Debug)]
pub struct FpsMotorConfig {
    pub max_speed_ground: Real,
    pub max_speed_air: Real,
    pub ground_accel: Real,
    pub air_accel: Real,
    pub friction: Real,
    pub stop_speed: Real,
    pub gravity: Real,
    pub jump_speed: Real,
    pub jump_buffer_window: Real,
    /// Hard cap on post-projection speed; keeps predicted and replayed
    /// movement from diverging against crease geometry.
    pub max_projected_speed: Real,
}

impl Default for FpsMotorConfig {
    fn default() -> Self {
        Self {
            max_speed_ground: 6.0,
            max_speed_air: 6.0,
            ground_accel: 14.0,
            air_accel: 2.0,
            friction: 8.0,
            stop_speed: 1.0,
            gravity: 9.81,
            jump_speed: 4.5,
            jump_buffer_window: 0.1,
            max_projected_speed: 40.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FpsMotorInput {
    pub move_axis: [Real; 2],
    pub jump: bool,
    pub yaw: Real,
}

#[derive(Clone, Copy, Debug)]
pub struct FpsMotorState {
    pub velocity: Vector<Real>,
    pub grounded: bool,
    pub ground_normal: Option<Vector<Real>>,
}

/// Velocity intent for one tick; collision resolution happens downstream in
/// the solver.
pub struct FpsMotor {
    config: FpsMotorConfig,
    jump_buffer_time: Real,
}

impl FpsMotor {
    pub fn new(config: FpsMotorConfig) -> Self {
        Self {
            config,
            jump_buffer_time: 0.0,
        }
    }

    pub fn config(&self) -> FpsMotorConfig {
        self.config
    }

    pub fn config_mut(&mut self) -> &mut FpsMotorConfig {
        &mut self.config
    }

    pub fn reset_state(&mut self) {
        self.jump_buffer_time = 0.0;
    }

    /// Produces the next relative velocity from input and grounding state.
    pub fn step(&mut self, input: FpsMotorInput, state: FpsMotorState, dt: Real) -> Vector<Real> {
        let dt = dt.max(0.0);
        let intent = build_move_intent(input.yaw, input.move_axis, state.ground_normal);

        if input.jump {
            self.jump_buffer_time = self.config.jump_buffer_window;
        } else if self.jump_buffer_time > 0.0 {
            self.jump_buffer_time = (self.jump_buffer_time - dt).max(0.0);
        }

        let mut velocity = state.velocity;
        let mut planar = Vector::new(velocity.x, 0.0, velocity.z);
        if state.grounded {
            planar = apply_friction(planar, self.config.friction, self.config.stop_speed, dt);
        }

        let max_speed = if state.grounded {
            self.config.max_speed_ground
        } else {
            self.config.max_speed_air
        };
        let wish_speed = intent.magnitude * max_speed;
        if wish_speed > 0.0 {
            let accel = if state.grounded {
                self.config.ground_accel
            } else {
                self.config.air_accel
            };
            planar = accelerate(planar, intent.direction, wish_speed, accel, dt);
        }

        let wants_jump = input.jump || self.jump_buffer_time > 0.0;
        if state.grounded {
            if wants_jump {
                velocity.y = self.config.jump_speed;
                self.jump_buffer_time = 0.0;
            } else {
                velocity.y = 0.0;
            }
        } else {
            velocity.y -= self.config.gravity * dt;
        }
        velocity.x = planar.x;
        velocity.z = planar.z;
        velocity
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MoveIntent {
    pub direction: Vector<Real>,
    pub magnitude: Real,
}

pub fn build_move_intent(
    yaw: Real,
    axis: [Real; 2],
    ground_normal: Option<Vector<Real>>,
) -> MoveIntent {
    let forward = Vector::new(yaw.sin(), 0.0, -yaw.cos());
    let right = Vector::new(yaw.cos(), 0.0, yaw.sin());
    let intent = right * axis[0] + forward * axis[1];
    let magnitude = intent.norm().min(1.0);
    if magnitude <= 0.0 {
        return MoveIntent {
            direction: Vector::zeros(),
            magnitude: 0.0,
        };
    }
    let mut direction = intent / magnitude;
    if let Some(normal) = ground_normal {
        let projected = direction - normal * direction.dot(&normal);
        if projected.norm_squared() > 0.0 {
            direction = projected.normalize();
        }
    }
    MoveIntent {
        direction,
        magnitude,
    }
}

fn accelerate(
    velocity: Vector<Real>,
    wish_dir: Vector<Real>,
    wish_speed: Real,
    accel: Real,
    dt: Real,
) -> Vector<Real> {
    if wish_speed <= 0.0 || accel <= 0.0 {
        return velocity;
    }
    let current_speed = velocity.dot(&wish_dir);
    let add_speed = wish_speed - current_speed;
    if add_speed <= 0.0 {
        return velocity;
    }
    let accel_speed = (accel * dt * wish_speed).min(add_speed);
    velocity + wish_dir * accel_speed
}

fn apply_friction(
    velocity: Vector<Real>,
    friction: Real,
    stop_speed: Real,
    dt: Real,
) -> Vector<Real> {
    let speed = velocity.norm();
    if speed <= 0.0 || friction <= 0.0 {
        return velocity;
    }
    let control = speed.max(stop_speed);
    let drop = control * friction * dt;
    let new_speed = (speed - drop).max(0.0);
    if new_speed == speed {
        return velocity;
    }
    velocity * (new_speed / speed)
}

/// Processor for the FPS archetype: default grounding and collision policy,
/// with the projected velocity clamped for prediction stability.
#[derive(Clone, Copy, Debug)]
pub struct FpsProcessor {
    pub max_projected_speed: Real,
}

impl FpsProcessor {
    pub fn new(config: &FpsMotorConfig) -> Self {
        Self {
            max_projected_speed: config.max_projected_speed,
        }
    }
}

impl CharacterProcessor for FpsProcessor {
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
        character_core::projection::default_project_velocity_on_hits(
            ctx.props,
            velocity,
            is_grounded,
            ground_hit,
            hits,
            original_velocity_direction,
            grounding_up,
        );
        let speed = velocity.norm();
        if self.max_projected_speed > 0.0 && speed > self.max_projected_speed {
            *velocity *= self.max_projected_speed / speed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grounded_state(velocity: Vector<Real>) -> FpsMotorState {
        FpsMotorState {
            velocity,
            grounded: true,
            ground_normal: Some(Vector::y()),
        }
    }

    #[test]
    fn accelerates_toward_intent_up_to_max_speed() {
        let mut motor = FpsMotor::new(FpsMotorConfig::default());
        let mut state = grounded_state(Vector::zeros());
        for _ in 0..240 {
            let velocity = motor.step(
                FpsMotorInput {
                    move_axis: [0.0, 1.0],
                    jump: false,
                    yaw: 0.0,
                },
                state,
                1.0 / 60.0,
            );
            state.velocity = velocity;
        }
        let planar = Vector::new(state.velocity.x, 0.0, state.velocity.z);
        assert!((planar.norm() - 6.0).abs() < 0.2);
        // Yaw 0 faces -z.
        assert!(state.velocity.z < 0.0);
    }

    #[test]
    fn friction_stops_a_coasting_character() {
        let mut motor = FpsMotor::new(FpsMotorConfig::default());
        let mut state = grounded_state(Vector::new(4.0, 0.0, 0.0));
        for _ in 0..240 {
            state.velocity = motor.step(FpsMotorInput::default(), state, 1.0 / 60.0);
        }
        assert!(state.velocity.norm() < 1.0e-3);
    }

    #[test]
    fn buffered_jump_fires_on_landing() {
        let mut motor = FpsMotor::new(FpsMotorConfig::default());
        let airborne = FpsMotorState {
            velocity: Vector::zeros(),
            grounded: false,
            ground_normal: None,
        };
        let velocity = motor.step(
            FpsMotorInput {
                jump: true,
                ..Default::default()
            },
            airborne,
            1.0 / 60.0,
        );
        assert!(velocity.y < 0.0);

        let landed = grounded_state(Vector::zeros());
        let velocity = motor.step(FpsMotorInput::default(), landed, 1.0 / 60.0);
        assert!((velocity.y - 4.5).abs() < 1.0e-5);
    }

    #[test]
    fn gravity_applies_in_the_air() {
        let mut motor = FpsMotor::new(FpsMotorConfig::default());
        let airborne = FpsMotorState {
            velocity: Vector::zeros(),
            grounded: false,
            ground_normal: None,
        };
        let velocity = motor.step(FpsMotorInput::default(), airborne, 0.1);
        assert!((velocity.y + 0.981).abs() < 1.0e-3);
    }
}
