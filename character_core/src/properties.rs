//! Per-character configuration and capsule geometry.

use rapier3d::prelude::{Capsule, Real};
use serde::{Deserialize, Serialize};

/// Step and slope-change handling parameters, consumed read-only by the
/// grounding evaluator and movement solver.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepAndSlopeHandling {
    pub handle_steps: bool,
    /// Tallest riser the character can be lifted over. Non-positive values
    /// disable step handling.
    pub max_step_height: Real,
    /// Width of the narrowed capsule used to probe whether the top of a step
    /// is walkable, and the forward clearance required on the step.
    pub character_width_for_step_grounding_check: Real,
    /// Suppress grounding for the tick when the slope ahead drops away more
    /// sharply than the configured limit, producing a controlled launch
    /// instead of snapping down the slope.
    pub prevent_grounding_from_future_slope_change: bool,
    /// Cosine of the maximum tolerated downward slope change angle.
    pub max_downward_slope_change_cos: Real,
}

impl Default for StepAndSlopeHandling {
    fn default() -> Self {
        Self {
            handle_steps: true,
            max_step_height: 0.3,
            character_width_for_step_grounding_check: 0.4,
            prevent_grounding_from_future_slope_change: false,
            max_downward_slope_change_cos: (60.0_f32).to_radians().cos(),
        }
    }
}

/// Immutable-per-tick character configuration. Game logic may mutate it
/// between ticks; the solver never does.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharacterProperties {
    pub evaluate_grounding: bool,
    /// Cosine of the maximum walkable slope angle. Stored as a dot-product
    /// threshold so the hot loop never calls `acos`.
    pub max_grounded_slope_cos: Real,
    pub snap_to_ground: bool,
    pub ground_snapping_distance: Real,
    pub detect_movement_collisions: bool,
    pub decollide_from_overlaps: bool,
    pub process_stateful_hits: bool,
    pub step_and_slope: StepAndSlopeHandling,
    pub max_continuous_collisions_iterations: u32,
    pub max_overlap_decollision_iterations: u32,
    /// When the sweep loop runs out of iterations: drop the unapplied
    /// remainder instead of applying it blindly.
    pub discard_movement_when_exceed_max_iterations: bool,
    /// When the sweep loop runs out of iterations: zero the velocity to stop
    /// jitter against pathological geometry.
    pub kill_velocity_when_exceed_max_iterations: bool,
    /// Exchange momentum with dynamic bodies. When false the character is
    /// massless against the world and only pushes through explicitly queued
    /// impulses.
    pub simulate_dynamic_body: bool,
    pub mass: Real,
    /// Re-project the final velocity onto the ground tangent after all hits
    /// fold, preventing numerical drift from lifting the character off
    /// slopes.
    pub constrain_velocity_to_ground_plane: bool,
    /// Clamp applied when velocity is re-derived along a crease direction.
    /// Non-positive means unclamped.
    pub max_crease_speed: Real,
    /// Skin distance preserved between the capsule and the environment.
    pub contact_offset: Real,
}

impl CharacterProperties {
    pub fn set_max_grounded_slope_degrees(&mut self, degrees: Real) {
        self.max_grounded_slope_cos = degrees.to_radians().cos();
    }

    /// Tuned for a networked FPS character: aggressive stepping and a
    /// clamped crease speed for prediction stability.
    pub fn fps_default() -> Self {
        let mut props = Self::default();
        props.step_and_slope.max_step_height = 0.45;
        props.max_crease_speed = 20.0;
        props
    }

    /// Tuned for a platformer character: shallow steps, slope-change launch
    /// guard enabled.
    pub fn platformer_default() -> Self {
        let mut props = Self::default();
        props.step_and_slope.max_step_height = 0.25;
        props.step_and_slope.prevent_grounding_from_future_slope_change = true;
        props
    }
}

impl Default for CharacterProperties {
    fn default() -> Self {
        Self {
            evaluate_grounding: true,
            max_grounded_slope_cos: (60.0_f32).to_radians().cos(),
            snap_to_ground: true,
            ground_snapping_distance: 0.3,
            detect_movement_collisions: true,
            decollide_from_overlaps: true,
            process_stateful_hits: true,
            step_and_slope: StepAndSlopeHandling::default(),
            max_continuous_collisions_iterations: 8,
            max_overlap_decollision_iterations: 2,
            discard_movement_when_exceed_max_iterations: true,
            kill_velocity_when_exceed_max_iterations: false,
            simulate_dynamic_body: true,
            mass: 70.0,
            constrain_velocity_to_ground_plane: true,
            max_crease_speed: 0.0,
            contact_offset: 0.02,
        }
    }
}

/// Capsule geometry descriptor: a radius and a cylinder section along the
/// character's local up axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharacterShape {
    pub radius: Real,
    /// Half-length of the cylinder section (distance from center to a sphere
    /// center).
    pub half_height: Real,
}

impl CharacterShape {
    pub fn new(radius: Real, half_height: Real) -> Self {
        Self {
            radius,
            half_height,
        }
    }

    pub fn to_capsule(&self) -> Capsule {
        Capsule::new_y(self.half_height, self.radius)
    }

    /// Narrowed capsule used for step-top walkability probes. The cylinder
    /// lengthens as the radius shrinks so the probe's lowest point matches
    /// the character's feet.
    pub fn step_probe_capsule(&self, probe_width: Real) -> Capsule {
        let radius = (probe_width * 0.5).clamp(0.01, self.radius);
        let half_height = self.half_height + (self.radius - radius);
        Capsule::new_y(half_height, radius)
    }

    /// Distance from the capsule center to its lowest point.
    pub fn bottom_offset(&self) -> Real {
        self.half_height + self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slope_limit_round_trips_through_degrees() {
        let mut props = CharacterProperties::default();
        props.set_max_grounded_slope_degrees(45.0);
        assert!((props.max_grounded_slope_cos - 45.0_f32.to_radians().cos()).abs() < 1.0e-6);
    }

    #[test]
    fn step_probe_capsule_keeps_foot_level() {
        let shape = CharacterShape::new(0.5, 0.5);
        let probe = shape.step_probe_capsule(2.0);
        assert!(probe.radius <= shape.radius);
        let narrow = shape.step_probe_capsule(0.2);
        assert!((narrow.radius - 0.1).abs() < 1.0e-6);
        let reach = narrow.segment.b.y + narrow.radius;
        assert!((reach - shape.bottom_offset()).abs() < 1.0e-6);
    }
}
