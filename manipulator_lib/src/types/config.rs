use crate::types::{JointVector, Pose};
use crate::utils::IkSettings;
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;

/// Robot and control-loop configuration.
///
/// Only obtainable through [`ManipulatorConfig::load_from_file`] or
/// [`ManipulatorConfig::from_toml_str`], both of which validate before returning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManipulatorConfig {
    pub robot: RobotConfig,
    pub kinematics: KinematicsConfig,
    pub control: ControlConfig,
    #[serde(default)]
    pub base_frame: BaseFrameConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Prefix of the feedback message type, e.g. `LBRiiwa7R800`.
    pub name: String,
    pub joint_names: Vec<String>,
    #[serde(default)]
    pub aux_joint_names: Vec<String>,
    /// `[right, left]`
    pub finger_joint_names: [String; 2],
    #[serde(default = "default_finger_offset")]
    pub finger_offset: f64,
    #[serde(default)]
    pub home: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KinematicsConfig {
    pub dh_parameters: Vec<DHParameter>,
    pub joint_limits: Vec<JointLimit>,
    #[serde(default)]
    pub base_offset: [f64; 3], // x, y, z
    #[serde(default)]
    pub tool_offset: f64, // along flange z
    #[serde(default)]
    pub ik: IkSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DHParameter {
    pub a: f64,     // link length
    pub alpha: f64, // link twist
    pub d: f64,     // link offset
    #[serde(default)]
    pub theta: f64, // joint angle offset
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JointLimit {
    pub min_angle: f64,
    pub max_angle: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    pub tick_ms: u64,
    pub arrival_tolerance: f64,
    #[serde(default = "default_playback_tolerance")]
    pub playback_tolerance: f64,
    /// Uniform per-joint speed ceiling used by the planner, deg/s.
    pub joint_speed_limit_deg: f64,
    #[serde(default = "default_speed_scale")]
    pub speed_scale: f64,
    #[serde(default = "default_grip_hold_s")]
    pub grip_hold_s: f64,
    /// Velocity of the simulated joint device, rad/s.
    #[serde(default = "default_device_velocity")]
    pub device_max_velocity: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseFrameConfig {
    #[serde(default)]
    pub translation: [f64; 3],
    #[serde(default)]
    pub rpy: [f64; 3],
}

fn default_finger_offset() -> f64 {
    0.01
}

fn default_playback_tolerance() -> f64 {
    0.01
}

fn default_speed_scale() -> f64 {
    0.5
}

fn default_grip_hold_s() -> f64 {
    0.2
}

fn default_device_velocity() -> f64 {
    2.0
}

impl ManipulatorConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config {}: {}", path, e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: ManipulatorConfig = toml::from_str(content)?;
        if config.robot.home.is_empty() {
            config.robot.home = vec![0.0; config.dof()];
        }
        config.validate()?;
        Ok(config)
    }

    pub fn dof(&self) -> usize {
        self.robot.joint_names.len()
    }

    pub fn dt(&self) -> f64 {
        self.control.tick_ms as f64 / 1000.0
    }

    pub fn joint_speed_limit(&self) -> f64 {
        self.control.joint_speed_limit_deg.to_radians()
    }

    pub fn home(&self) -> JointVector {
        JointVector::from(self.robot.home.clone())
    }

    pub fn base_pose(&self) -> Pose {
        Pose::new(self.base_frame.translation, self.base_frame.rpy)
    }

    pub fn feedback_type(&self) -> String {
        crate::types::current_pose_type(&self.robot.name)
    }

    fn validate(&self) -> Result<()> {
        let dof = self.dof();
        if dof == 0 {
            return Err(eyre::eyre!("No joints configured"));
        }

        let mut seen = HashSet::new();
        for name in self
            .robot
            .joint_names
            .iter()
            .chain(self.robot.aux_joint_names.iter())
            .chain(self.robot.finger_joint_names.iter())
        {
            if !seen.insert(name.as_str()) {
                return Err(eyre::eyre!("Joint name '{}' declared twice", name));
            }
        }

        if self.kinematics.dh_parameters.len() != dof {
            return Err(eyre::eyre!(
                "DH parameters count ({}) doesn't match DOF ({})",
                self.kinematics.dh_parameters.len(),
                dof
            ));
        }

        if self.kinematics.joint_limits.len() != dof {
            return Err(eyre::eyre!(
                "Joint limits count ({}) doesn't match DOF ({})",
                self.kinematics.joint_limits.len(),
                dof
            ));
        }

        for (i, limit) in self.kinematics.joint_limits.iter().enumerate() {
            if !(limit.min_angle < limit.max_angle) {
                return Err(eyre::eyre!(
                    "Joint {} limits are not ordered: [{:.3}, {:.3}]",
                    i,
                    limit.min_angle,
                    limit.max_angle
                ));
            }
        }

        if self.robot.home.len() != dof {
            return Err(eyre::eyre!(
                "Home vector has {} values, expected {}",
                self.robot.home.len(),
                dof
            ));
        }

        if self.control.tick_ms == 0 {
            return Err(eyre::eyre!("tick_ms must be positive"));
        }

        positive("arrival_tolerance", self.control.arrival_tolerance)?;
        positive("playback_tolerance", self.control.playback_tolerance)?;
        positive("joint_speed_limit_deg", self.control.joint_speed_limit_deg)?;
        positive("device_max_velocity", self.control.device_max_velocity)?;
        positive("finger_offset", self.robot.finger_offset)?;

        if !(self.control.speed_scale > 0.0 && self.control.speed_scale <= 1.0) {
            return Err(eyre::eyre!(
                "speed_scale {} outside (0, 1]",
                self.control.speed_scale
            ));
        }

        if !(self.control.grip_hold_s.is_finite() && self.control.grip_hold_s >= 0.0) {
            return Err(eyre::eyre!("grip_hold_s must not be negative"));
        }

        let ik = &self.kinematics.ik;
        if ik.max_iterations == 0 {
            return Err(eyre::eyre!("ik.max_iterations must be positive"));
        }
        positive("ik.position_tolerance", ik.position_tolerance)?;
        positive("ik.orientation_tolerance", ik.orientation_tolerance)?;
        positive("ik.max_step", ik.max_step)?;
        positive("ik.restart_step", ik.restart_step)?;
        if !(ik.damping.is_finite() && ik.damping >= 0.0) {
            return Err(eyre::eyre!("ik.damping must not be negative"));
        }

        Ok(())
    }
}

/// Rejects zero, negative, infinite and NaN values.
fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(eyre::eyre!("{} must be positive, got {}", name, value))
    }
}

#[cfg(test)]
pub(crate) const IIWA_TOML: &str = r#"
[robot]
name = "LBRiiwa7R800"
joint_names = ["lbr_A1", "lbr_A2", "lbr_A3", "lbr_A4", "lbr_A5", "lbr_A6", "lbr_A7"]
aux_joint_names = ["camera_motor"]
finger_joint_names = ["right_finger_joint", "left_finger_joint"]

[kinematics]
tool_offset = 0.23
joint_limits = [
    { min_angle = -2.9671, max_angle = 2.9671 },
    { min_angle = -2.0944, max_angle = 2.0944 },
    { min_angle = -2.9671, max_angle = 2.9671 },
    { min_angle = -2.0944, max_angle = 2.0944 },
    { min_angle = -2.9671, max_angle = 2.9671 },
    { min_angle = -2.0944, max_angle = 2.0944 },
    { min_angle = -3.0543, max_angle = 3.0543 },
]
dh_parameters = [
    { a = 0.0, alpha = -1.5707963267948966, d = 0.34 },
    { a = 0.0, alpha = 1.5707963267948966, d = 0.0 },
    { a = 0.0, alpha = 1.5707963267948966, d = 0.4 },
    { a = 0.0, alpha = -1.5707963267948966, d = 0.0 },
    { a = 0.0, alpha = -1.5707963267948966, d = 0.4 },
    { a = 0.0, alpha = 1.5707963267948966, d = 0.0 },
    { a = 0.0, alpha = 0.0, d = 0.126 },
]

[control]
tick_ms = 16
arrival_tolerance = 0.05
joint_speed_limit_deg = 98.0
"#;
