use crate::channel::{drain_latest, MessageChannel};
use crate::error::ChannelError;
use crate::types::{
    CommandEnvelope, JointStateReport, ManipulatorConfig, MessageEnvelope, ROBOT_POSITION,
};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Position-controlled joints of the device layer.
pub trait JointDevice {
    /// Returns false if the device has no joint called `name`.
    fn set_position_target(&mut self, name: &str, position: f64) -> bool;

    fn position(&self, name: &str) -> Option<f64>;
}

/// Finger position targets `(right, left)` for a gripper state.
///
/// This is the only place the open flag turns into geometry: open spreads the fingers
/// symmetrically by `offset`, closed brings both to zero.
pub fn finger_offsets(open: bool, offset: f64) -> (f64, f64) {
    if open {
        (-offset, offset)
    } else {
        (0.0, 0.0)
    }
}

#[derive(Debug, Clone)]
pub struct ActuatorSettings {
    pub source: String,
    pub feedback_type: String,
    /// Chain joints followed by auxiliary joints, all reported back.
    pub joint_names: Vec<String>,
    /// `[right, left]`
    pub finger_names: [String; 2],
    pub finger_offset: f64,
}

impl ActuatorSettings {
    pub fn from_config(config: &ManipulatorConfig, source: &str) -> Self {
        Self {
            source: source.to_string(),
            feedback_type: config.feedback_type(),
            joint_names: config
                .robot
                .joint_names
                .iter()
                .chain(&config.robot.aux_joint_names)
                .cloned()
                .collect(),
            finger_names: config.robot.finger_joint_names.clone(),
            finger_offset: config.robot.finger_offset,
        }
    }
}

/// Command/feedback proxy between the channel and the device. No arrival logic lives here.
pub struct Actuator {
    settings: ActuatorSettings,
    last_applied: Option<CommandEnvelope>,
    unknown_joints: HashSet<String>,
}

impl Actuator {
    pub fn new(settings: ActuatorSettings) -> Self {
        info!(
            "Actuator publishing '{}' for {} joints",
            settings.feedback_type,
            settings.joint_names.len()
        );
        Self {
            settings,
            last_applied: None,
            unknown_joints: HashSet::new(),
        }
    }

    pub fn last_applied(&self) -> Option<&CommandEnvelope> {
        self.last_applied.as_ref()
    }

    /// Applies the newest command received since the last tick, then publishes measured state.
    pub fn tick<C, D>(&mut self, channel: &mut C, device: &mut D) -> Result<JointStateReport, ChannelError>
    where
        C: MessageChannel + ?Sized,
        D: JointDevice + ?Sized,
    {
        if let Some(envelope) = drain_latest(channel, ROBOT_POSITION) {
            match envelope.payload::<CommandEnvelope>() {
                Ok(command) => {
                    self.apply(&command, device);
                    self.last_applied = Some(command);
                }
                Err(e) => warn!("Ignoring command: {}", e),
            }
        }

        let report = self.read_state(device);
        let message = MessageEnvelope::new(&self.settings.source, &self.settings.feedback_type, &report)?;
        channel.send(&message)?;
        Ok(report)
    }

    fn apply<D: JointDevice + ?Sized>(&mut self, command: &CommandEnvelope, device: &mut D) {
        for (name, angle) in &command.joints {
            if !device.set_position_target(name, *angle) && self.unknown_joints.insert(name.clone()) {
                warn!("Command names unknown joint '{}', ignoring it", name);
            }
        }

        let (right, left) = finger_offsets(command.gripper, self.settings.finger_offset);
        let [right_name, left_name] = &self.settings.finger_names;
        device.set_position_target(right_name, right);
        device.set_position_target(left_name, left);
        debug!("Applied command, gripper {}", if command.gripper { "open" } else { "closed" });
    }

    fn read_state<D: JointDevice + ?Sized>(&self, device: &D) -> JointStateReport {
        JointStateReport {
            joints: read_positions(device, &self.settings.joint_names),
            gripper: read_positions(device, &self.settings.finger_names),
        }
    }
}

fn read_positions<'a, D: JointDevice + ?Sized>(
    device: &D,
    names: impl IntoIterator<Item = &'a String>,
) -> BTreeMap<String, f64> {
    names
        .into_iter()
        .filter_map(|name| device.position(name).map(|p| (name.clone(), p)))
        .collect()
}
