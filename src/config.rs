// src/config.rs
//! Physics configuration: gravity, stepping policy, cache compaction cadence and
//! ground-contact tuning. Loadable from JSON; validated before a world is built.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, PhysicsResult};

/// How the scene turns a frame's elapsed time into solver steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    /// Bullet-style accumulator: up to `max_substeps` steps of `fixed_timestep`.
    Accumulated,
    /// Exactly one solver step of `elapsed * time_scale` per frame.
    /// Keeps perceived speed stable at low frame rates at the cost of solver stability.
    Decoupled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepPolicy {
    pub mode: StepMode,
    pub max_substeps: u32,
    /// Seconds.
    pub fixed_timestep: f32,
    pub time_scale: f32,
}

impl Default for StepPolicy {
    fn default() -> Self {
        Self {
            mode: StepMode::Accumulated,
            max_substeps: 1,
            fixed_timestep: 1.0 / 60.0,
            time_scale: 1.0,
        }
    }
}

impl StepPolicy {
    /// One solver step of `frame * time_scale` per frame, independent of frame rate.
    pub fn decoupled(time_scale: f32) -> Self {
        Self {
            mode: StepMode::Decoupled,
            max_substeps: 1,
            fixed_timestep: 1.0 / 60.0,
            time_scale,
        }
    }

    /// Arguments for `PhysicsWorld::step` given one frame's elapsed seconds:
    /// `(max_substeps, fixed_timestep, elapsed)`.
    pub fn step_args(&self, frame_secs: f32) -> (u32, f32, f32) {
        match self.mode {
            StepMode::Accumulated => (self.max_substeps, self.fixed_timestep, frame_secs * self.time_scale),
            // Zero substeps asks the world for one variable step of exactly `elapsed`.
            StepMode::Decoupled => (0, self.fixed_timestep, frame_secs * self.time_scale),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionPolicy {
    /// Seconds of scene time between shape-cache compactions.
    pub interval_secs: f32,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self { interval_secs: 5.0 }
    }
}

/// Configuration options for one physics world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: [f32; 3],
    pub step: StepPolicy,
    pub compaction: CompactionPolicy,
    /// Max contact distance that still counts as resting on something.
    pub ground_contact_epsilon: f32,
    /// Minimum upward component of the contact normal to count as ground.
    pub ground_normal_min_y: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.81, 0.0],
            step: StepPolicy::default(),
            compaction: CompactionPolicy::default(),
            ground_contact_epsilon: 0.05,
            ground_normal_min_y: 0.7,
        }
    }
}

impl PhysicsConfig {
    pub fn from_json_str(json: &str) -> PhysicsResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> PhysicsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        log::info!("Loaded physics config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> PhysicsResult<()> {
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(PhysicsError::invalid_config("gravity must be finite"));
        }
        if !(self.step.fixed_timestep.is_finite() && self.step.fixed_timestep > 0.0) {
            return Err(PhysicsError::invalid_config("fixed_timestep must be > 0"));
        }
        if !(self.step.time_scale.is_finite() && self.step.time_scale >= 0.0) {
            return Err(PhysicsError::invalid_config("time_scale must be >= 0"));
        }
        if !(self.compaction.interval_secs.is_finite() && self.compaction.interval_secs >= 0.0) {
            return Err(PhysicsError::invalid_config("compaction interval must be >= 0"));
        }
        if !(self.ground_contact_epsilon.is_finite() && self.ground_contact_epsilon > 0.0) {
            return Err(PhysicsError::invalid_config("ground_contact_epsilon must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.ground_normal_min_y) {
            return Err(PhysicsError::invalid_config("ground_normal_min_y must be in [0, 1]"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PhysicsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = PhysicsConfig::from_json_str(r#"{ "gravity": [0.0, -100.0, 0.0] }"#).unwrap();
        assert_eq!(cfg.gravity, [0.0, -100.0, 0.0]);
        assert_eq!(cfg.step, StepPolicy::default());
        assert_eq!(cfg.compaction.interval_secs, 5.0);
    }

    #[test]
    fn test_step_mode_from_json() {
        let cfg = PhysicsConfig::from_json_str(
            r#"{ "step": { "mode": "decoupled", "time_scale": 2.0 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.step.mode, StepMode::Decoupled);
        assert_eq!(cfg.step.time_scale, 2.0);
    }

    #[test]
    fn test_rejects_bad_timestep() {
        let err = PhysicsConfig::from_json_str(r#"{ "step": { "fixed_timestep": 0.0 } }"#).unwrap_err();
        assert!(matches!(err, PhysicsError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_nan_gravity() {
        let mut cfg = PhysicsConfig::default();
        cfg.gravity[1] = f32::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_decoupled_step_args() {
        let policy = StepPolicy::decoupled(2.0);
        let (substeps, fixed, elapsed) = policy.step_args(0.016);
        assert_eq!(substeps, 0);
        assert_eq!(fixed, 1.0 / 60.0);
        assert!((elapsed - 0.032).abs() < 1e-6);
    }

    #[test]
    fn test_accumulated_step_args_scale_elapsed() {
        let policy = StepPolicy { time_scale: 0.5, ..StepPolicy::default() };
        let (substeps, fixed, elapsed) = policy.step_args(0.1);
        assert_eq!(substeps, 1);
        assert_eq!(fixed, 1.0 / 60.0);
        assert!((elapsed - 0.05).abs() < 1e-6);
    }
}
