//! Wire types exchanged between the supervisor and actuator nodes.
//!
//! Every message is a JSON object `{"source": .., "type": .., "data": ..}`. Types the control
//! loops do not understand (vision payloads and the like) pass through untouched.

use crate::error::ChannelError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Message type of the supervisor's joint command.
pub const ROBOT_POSITION: &str = "robot_position";

/// Message type the actuator uses for measured joint state of `robot`.
pub fn current_pose_type(robot: &str) -> String {
    format!("{robot}_current_pose")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

impl MessageEnvelope {
    pub fn new<T: Serialize>(
        source: impl Into<String>,
        kind: impl Into<String>,
        data: &T,
    ) -> Result<Self, ChannelError> {
        let data = serde_json::to_value(data)
            .map_err(|e| ChannelError::Send(format!("payload serialization failed: {e}")))?;
        Ok(Self {
            source: source.into(),
            kind: kind.into(),
            data,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        serde_json::to_vec(self).map_err(|e| ChannelError::Send(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ChannelError> {
        serde_json::from_slice(bytes).map_err(|e| ChannelError::MalformedMessage(e.to_string()))
    }

    /// Parses `data` into a typed payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ChannelError> {
        T::deserialize(&self.data).map_err(|e| {
            ChannelError::MalformedMessage(format!("'{}' from '{}': {e}", self.kind, self.source))
        })
    }
}

/// Joint command sent every tick. `gripper = true` means open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub joints: BTreeMap<String, f64>,
    pub gripper: bool,
}

/// Measured state published by the actuator: joint angles plus finger positions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointStateReport {
    pub joints: BTreeMap<String, f64>,
    #[serde(default)]
    pub gripper: BTreeMap<String, f64>,
}
