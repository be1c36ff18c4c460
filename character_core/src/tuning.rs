//! Data-driven character tuning: TOML profiles validated before use.

use rapier3d::math::Real;
use serde::{Deserialize, Serialize};

use crate::properties::{CharacterProperties, CharacterShape, StepAndSlopeHandling};

const CHARACTER_TUNING_VERSION: u32 = 1;

/// Human-editable tuning profile. Angles are degrees here; the runtime
/// properties store cosines.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharacterTuning {
    pub version: u32,
    pub capsule_radius: Real,
    /// Full cylinder-section height (distance between sphere centers).
    pub capsule_height: Real,
    pub max_slope_degrees: Real,
    pub ground_snap_distance: Real,
    pub step_height: Real,
    pub step_width_check: Real,
    pub prevent_grounding_from_future_slope_change: bool,
    pub max_downward_slope_change_degrees: Real,
    pub max_movement_iterations: u32,
    pub max_decollision_iterations: u32,
    pub discard_movement_when_exceed_max_iterations: bool,
    pub kill_velocity_when_exceed_max_iterations: bool,
    pub simulate_dynamic_body: bool,
    pub mass: Real,
    pub constrain_velocity_to_ground_plane: bool,
    pub max_crease_speed: Real,
    pub contact_offset: Real,
}

impl Default for CharacterTuning {
    fn default() -> Self {
        let props = CharacterProperties::default();
        Self {
            version: CHARACTER_TUNING_VERSION,
            capsule_radius: 0.4,
            capsule_height: 1.0,
            max_slope_degrees: 60.0,
            ground_snap_distance: props.ground_snapping_distance,
            step_height: props.step_and_slope.max_step_height,
            step_width_check: props.step_and_slope.character_width_for_step_grounding_check,
            prevent_grounding_from_future_slope_change: false,
            max_downward_slope_change_degrees: 60.0,
            max_movement_iterations: props.max_continuous_collisions_iterations,
            max_decollision_iterations: props.max_overlap_decollision_iterations,
            discard_movement_when_exceed_max_iterations: true,
            kill_velocity_when_exceed_max_iterations: false,
            simulate_dynamic_body: true,
            mass: props.mass,
            constrain_velocity_to_ground_plane: true,
            max_crease_speed: 0.0,
            contact_offset: props.contact_offset,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TuningValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl TuningValidation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl CharacterTuning {
    pub fn parse_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|err| err.to_string())
    }

    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string(self).map_err(|err| err.to_string())
    }

    pub fn validate(&self) -> TuningValidation {
        let mut validation = TuningValidation::default();

        if self.version != CHARACTER_TUNING_VERSION {
            validation
                .errors
                .push(format!("unsupported version {}", self.version));
        }
        if !self.capsule_radius.is_finite() || self.capsule_radius <= 0.0 {
            validation
                .errors
                .push("capsule_radius must be finite and > 0".to_string());
        }
        if !self.capsule_height.is_finite() || self.capsule_height < 0.0 {
            validation
                .errors
                .push("capsule_height must be finite and >= 0".to_string());
        }
        if !self.max_slope_degrees.is_finite()
            || self.max_slope_degrees <= 0.0
            || self.max_slope_degrees > 90.0
        {
            validation
                .errors
                .push("max_slope_degrees must be in (0, 90]".to_string());
        }
        if !self.mass.is_finite() || self.mass <= 0.0 {
            if self.simulate_dynamic_body {
                validation
                    .errors
                    .push("mass must be finite and > 0 when simulating a dynamic body".to_string());
            } else {
                validation
                    .warnings
                    .push("mass is non-positive; character will not push bodies".to_string());
            }
        }
        if self.step_height < 0.0 {
            validation
                .warnings
                .push("negative step_height disables step handling".to_string());
        }
        if self.step_height > self.capsule_height + self.capsule_radius {
            validation
                .warnings
                .push("step_height exceeds the capsule height".to_string());
        }
        if self.max_movement_iterations == 0 {
            validation
                .warnings
                .push("max_movement_iterations of 0 freezes movement".to_string());
        }
        if self.ground_snap_distance < 0.0 {
            validation
                .errors
                .push("ground_snap_distance must be >= 0".to_string());
        }
        if self.contact_offset < 0.0 || !self.contact_offset.is_finite() {
            validation
                .errors
                .push("contact_offset must be finite and >= 0".to_string());
        }

        validation
    }

    pub fn to_properties(&self) -> (CharacterProperties, CharacterShape) {
        let props = CharacterProperties {
            evaluate_grounding: true,
            max_grounded_slope_cos: self.max_slope_degrees.to_radians().cos(),
            snap_to_ground: self.ground_snap_distance > 0.0,
            ground_snapping_distance: self.ground_snap_distance.max(0.0),
            detect_movement_collisions: true,
            decollide_from_overlaps: true,
            process_stateful_hits: true,
            step_and_slope: StepAndSlopeHandling {
                handle_steps: self.step_height > 0.0,
                max_step_height: self.step_height.max(0.0),
                character_width_for_step_grounding_check: self.step_width_check,
                prevent_grounding_from_future_slope_change: self
                    .prevent_grounding_from_future_slope_change,
                max_downward_slope_change_cos: self
                    .max_downward_slope_change_degrees
                    .to_radians()
                    .cos(),
            },
            max_continuous_collisions_iterations: self.max_movement_iterations,
            max_overlap_decollision_iterations: self.max_decollision_iterations,
            discard_movement_when_exceed_max_iterations: self
                .discard_movement_when_exceed_max_iterations,
            kill_velocity_when_exceed_max_iterations: self
                .kill_velocity_when_exceed_max_iterations,
            simulate_dynamic_body: self.simulate_dynamic_body,
            mass: self.mass,
            constrain_velocity_to_ground_plane: self.constrain_velocity_to_ground_plane,
            max_crease_speed: self.max_crease_speed,
            contact_offset: self.contact_offset,
        };
        let shape = CharacterShape::new(self.capsule_radius, self.capsule_height * 0.5);
        (props, shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tuning_validates_clean() {
        let tuning = CharacterTuning::default();
        let validation = tuning.validate();
        assert!(validation.is_ok(), "errors: {:?}", validation.errors);
        assert!(validation.warnings.is_empty());
    }

    #[test]
    fn toml_round_trip_preserves_tuning() {
        let tuning = CharacterTuning {
            step_height: 0.45,
            max_slope_degrees: 50.0,
            ..CharacterTuning::default()
        };
        let text = tuning.to_toml().expect("serialize");
        let parsed = CharacterTuning::parse_toml(&text).expect("parse");
        assert_eq!(parsed, tuning);
    }

    #[test]
    fn invalid_fields_are_reported() {
        let tuning = CharacterTuning {
            capsule_radius: -1.0,
            max_slope_degrees: 120.0,
            version: 9,
            ..CharacterTuning::default()
        };
        let validation = tuning.validate();
        assert!(!validation.is_ok());
        assert_eq!(validation.errors.len(), 3);
    }

    #[test]
    fn contradictory_step_config_degrades_to_disabled() {
        let tuning = CharacterTuning {
            step_height: 0.0,
            ..CharacterTuning::default()
        };
        let (props, _) = tuning.to_properties();
        assert!(!props.step_and_slope.handle_steps);
    }

    #[test]
    fn parse_rejects_malformed_toml() {
        assert!(CharacterTuning::parse_toml("version = \"not a number\"").is_err());
    }
}
