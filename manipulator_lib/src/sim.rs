//! Kinematic stand-ins for the simulator: a rate-limited joint device and a scene that carries
//! grasped objects along with the tool.

use crate::control::JointDevice;
use crate::placement::SceneQuery;
use crate::types::{BaseFrame, Pose};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default)]
struct SimJoint {
    position: f64,
    target: f64,
}

/// Joints that slew toward their targets at a fixed velocity.
#[derive(Debug, Clone)]
pub struct SimulatedArm {
    joints: BTreeMap<String, SimJoint>,
    max_velocity: f64,
}

impl SimulatedArm {
    pub fn new<I, S>(names: I, max_velocity: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            joints: names
                .into_iter()
                .map(|name| (name.into(), SimJoint::default()))
                .collect(),
            max_velocity,
        }
    }

    /// Places a joint at `position` with no motion pending.
    pub fn set_position(&mut self, name: &str, position: f64) -> bool {
        match self.joints.get_mut(name) {
            Some(joint) => {
                joint.position = position;
                joint.target = position;
                true
            }
            None => false,
        }
    }

    pub fn target(&self, name: &str) -> Option<f64> {
        self.joints.get(name).map(|j| j.target)
    }

    /// Advances every joint by at most `max_velocity * dt` toward its target.
    pub fn step(&mut self, dt: f64) {
        let max_step = self.max_velocity * dt;
        for joint in self.joints.values_mut() {
            let error = joint.target - joint.position;
            if error.abs() <= max_step {
                joint.position = joint.target;
            } else {
                joint.position += max_step * error.signum();
            }
        }
    }
}

impl JointDevice for SimulatedArm {
    fn set_position_target(&mut self, name: &str, position: f64) -> bool {
        match self.joints.get_mut(name) {
            Some(joint) => {
                joint.target = position;
                true
            }
            None => false,
        }
    }

    fn position(&self, name: &str) -> Option<f64> {
        self.joints.get(name).map(|j| j.position)
    }
}

/// Object positions in world coordinates. Closing the gripper near an object attaches it to the
/// tool; opening drops it where it is.
#[derive(Debug, Clone)]
pub struct TrackedScene {
    objects: BTreeMap<String, [f64; 3]>,
    frame: BaseFrame,
    grasp_radius: f64,
    held: Option<(String, [f64; 3])>,
    gripper_open: bool,
}

impl TrackedScene {
    pub fn new(frame: BaseFrame, grasp_radius: f64) -> Self {
        Self {
            objects: BTreeMap::new(),
            frame,
            grasp_radius,
            held: None,
            gripper_open: true,
        }
    }

    pub fn insert(&mut self, id: impl Into<String>, world_xyz: [f64; 3]) {
        self.objects.insert(id.into(), world_xyz);
    }

    pub fn held(&self) -> Option<&str> {
        self.held.as_ref().map(|(id, _)| id.as_str())
    }

    fn nearest_within_reach(&self, tool: [f64; 3]) -> Option<(String, [f64; 3])> {
        self.objects
            .iter()
            .map(|(id, p)| {
                let offset = [p[0] - tool[0], p[1] - tool[1], p[2] - tool[2]];
                let dist = offset.iter().map(|v| v * v).sum::<f64>().sqrt();
                (id, offset, dist)
            })
            .filter(|(_, _, dist)| *dist <= self.grasp_radius)
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(id, offset, _)| (id.clone(), offset))
    }
}

impl SceneQuery for TrackedScene {
    fn world_position(&self, id: &str) -> Option<[f64; 3]> {
        self.objects.get(id).copied()
    }

    fn observe(&mut self, tool_pose: &Pose, gripper_open: bool) {
        let tool = self.frame.local_to_world(tool_pose.xyz);

        if self.gripper_open && !gripper_open && self.held.is_none() {
            self.held = self.nearest_within_reach(tool);
            match &self.held {
                Some((id, _)) => info!("Grasped '{}'", id),
                None => debug!("Gripper closed on nothing at {:?}", tool),
            }
        } else if !self.gripper_open && gripper_open {
            if let Some((id, _)) = self.held.take() {
                info!("Released '{}'", id);
            }
        }
        self.gripper_open = gripper_open;

        if let Some((id, offset)) = &self.held {
            if let Some(position) = self.objects.get_mut(id) {
                *position = [tool[0] + offset[0], tool[1] + offset[1], tool[2] + offset[2]];
            }
        }
    }
}
