use crate::error::InvalidArgument;
use crate::types::{CommandEnvelope, JointVector};
use std::collections::BTreeMap;

/// Holds the joint command the supervisor republishes every tick.
///
/// Clearing the target keeps the last joint values in the command, so the arm holds its pose.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    joint_names: Vec<String>,
    current_target: Option<JointVector>,
    command: CommandEnvelope,
}

impl CommandBuilder {
    /// Starts at zero for every chain joint, `aux_joints` at their given value, gripper open.
    pub fn new(joint_names: Vec<String>, aux_joints: &[(String, f64)]) -> Self {
        let mut joints: BTreeMap<String, f64> =
            joint_names.iter().map(|name| (name.clone(), 0.0)).collect();
        for (name, value) in aux_joints {
            joints.insert(name.clone(), *value);
        }

        Self {
            joint_names,
            current_target: None,
            command: CommandEnvelope {
                joints,
                gripper: true,
            },
        }
    }

    pub fn set_target(&mut self, q: JointVector) -> Result<(), InvalidArgument> {
        if q.len() != self.joint_names.len() {
            return Err(InvalidArgument::length_mismatch(
                "command target",
                self.joint_names.len(),
                q.len(),
            ));
        }

        for (name, value) in self.joint_names.iter().zip(q.iter()) {
            self.command.joints.insert(name.clone(), *value);
        }
        self.current_target = Some(q);
        Ok(())
    }

    pub fn clear_target(&mut self) {
        self.current_target = None;
    }

    pub fn has_target(&self) -> bool {
        self.current_target.is_some()
    }

    pub fn target(&self) -> Option<&JointVector> {
        self.current_target.as_ref()
    }

    /// `open = true` opens the gripper. Stored as-is.
    pub fn set_gripper(&mut self, open: bool) {
        self.command.gripper = open;
    }

    pub fn gripper_open(&self) -> bool {
        self.command.gripper
    }

    pub fn command(&self) -> &CommandEnvelope {
        &self.command
    }
}
