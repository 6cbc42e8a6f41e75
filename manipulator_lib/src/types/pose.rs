//! Cartesian pose and frame helpers.
//!
//! Orientation is roll-pitch-yaw with intrinsic x-y-z order everywhere in the system:
//! `R = Rx(roll) * Ry(pitch) * Rz(yaw)`. FK output, IK input and the task files all use
//! this single convention.

use nalgebra::{Isometry3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 6]", into = "[f64; 6]")]
pub struct Pose {
    pub xyz: [f64; 3],
    pub rpy: [f64; 3],
}

impl Pose {
    pub fn new(xyz: [f64; 3], rpy: [f64; 3]) -> Self {
        Self { xyz, rpy }
    }

    pub fn from_array(values: [f64; 6]) -> Self {
        Self {
            xyz: [values[0], values[1], values[2]],
            rpy: [values[3], values[4], values[5]],
        }
    }

    pub fn to_array(&self) -> [f64; 6] {
        let [x, y, z] = self.xyz;
        let [roll, pitch, yaw] = self.rpy;
        [x, y, z, roll, pitch, yaw]
    }

    pub fn x(&self) -> f64 {
        self.xyz[0]
    }

    pub fn y(&self) -> f64 {
        self.xyz[1]
    }

    pub fn z(&self) -> f64 {
        self.xyz[2]
    }

    /// Same pose with the height replaced.
    pub fn with_z(&self, z: f64) -> Self {
        Self {
            xyz: [self.xyz[0], self.xyz[1], z],
            rpy: self.rpy,
        }
    }

    pub fn rotation(&self) -> Rotation3<f64> {
        rotation_from_rpy(self.rpy)
    }

    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::new(self.xyz[0], self.xyz[1], self.xyz[2]),
            UnitQuaternion::from_rotation_matrix(&self.rotation()),
        )
    }

    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        let t = iso.translation.vector;
        Self {
            xyz: [t.x, t.y, t.z],
            rpy: rpy_from_rotation(&iso.rotation.to_rotation_matrix()),
        }
    }
}

impl From<[f64; 6]> for Pose {
    fn from(values: [f64; 6]) -> Self {
        Self::from_array(values)
    }
}

impl From<Pose> for [f64; 6] {
    fn from(pose: Pose) -> Self {
        pose.to_array()
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}]",
            self.xyz[0], self.xyz[1], self.xyz[2], self.rpy[0], self.rpy[1], self.rpy[2]
        )
    }
}

pub fn rotation_from_rpy(rpy: [f64; 3]) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::x_axis(), rpy[0])
        * Rotation3::from_axis_angle(&Vector3::y_axis(), rpy[1])
        * Rotation3::from_axis_angle(&Vector3::z_axis(), rpy[2])
}

/// Inverse of [`rotation_from_rpy`]. At pitch = ±pi/2 yaw is folded into roll.
pub fn rpy_from_rotation(rotation: &Rotation3<f64>) -> [f64; 3] {
    let m = rotation.matrix();
    let pitch = m[(0, 2)].clamp(-1.0, 1.0).asin();

    if pitch.cos().abs() > 1e-9 {
        let roll = (-m[(1, 2)]).atan2(m[(2, 2)]);
        let yaw = (-m[(0, 1)]).atan2(m[(0, 0)]);
        [roll, pitch, yaw]
    } else {
        let roll = m[(2, 1)].atan2(m[(1, 1)]);
        [roll, pitch, 0.0]
    }
}

/// Pose of the robot base in the world. Scene queries come back in world coordinates while
/// plans live in the robot base frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseFrame {
    base_in_world: Isometry3<f64>,
}

impl BaseFrame {
    pub fn new(base_pose: &Pose) -> Self {
        Self {
            base_in_world: base_pose.to_isometry(),
        }
    }

    pub fn identity() -> Self {
        Self {
            base_in_world: Isometry3::identity(),
        }
    }

    pub fn world_to_local(&self, world: [f64; 3]) -> [f64; 3] {
        let p = self
            .base_in_world
            .inverse_transform_point(&Point3::new(world[0], world[1], world[2]));
        [p.x, p.y, p.z]
    }

    pub fn local_to_world(&self, local: [f64; 3]) -> [f64; 3] {
        let p = self
            .base_in_world
            .transform_point(&Point3::new(local[0], local[1], local[2]));
        [p.x, p.y, p.z]
    }
}

impl Default for BaseFrame {
    fn default() -> Self {
        Self::identity()
    }
}
