use crate::error::TaskError;
use crate::types::{JointVector, Pose};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A single high-level instruction before trajectory expansion.
///
/// On disk: `{"command": "move", "args": [x, y, z, roll, pitch, yaw]}` or
/// `{"command": "grab", "args": true}`. `grab(true)` grasps (closes the gripper),
/// `grab(false)` releases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "lowercase")]
pub enum Primitive {
    Move(Pose),
    Grab(bool),
}

impl Primitive {
    pub fn is_release(&self) -> bool {
        matches!(self, Primitive::Grab(false))
    }
}

/// One joint-space sample of the flattened trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub joints: JointVector,
    /// `Some(open)` switches the gripper while at this waypoint, `None` leaves it alone.
    pub gripper_action: Option<bool>,
}

impl Waypoint {
    pub fn motion(joints: JointVector) -> Self {
        Self {
            joints,
            gripper_action: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPlacementPlan {
    pub id: String,
    pub start_xyz: [f64; 3],
    pub end_xyz: [f64; 3],
}

/// Trajectory index at which an object is considered placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceMarker {
    pub trajectory_index: usize,
    pub object_index: usize,
}

/// Contiguous run of primitives that moves one object.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskItem {
    pub object_index: usize,
    pub primitives: Vec<Primitive>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemStatus {
    Completed,
    /// The item stopped at `primitive_index` (index inside the item) and the rest was skipped.
    Failed { primitive_index: usize, pose: Pose },
}

impl ItemStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, ItemStatus::Completed)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskFileLayout {
    Flat(Vec<Primitive>),
    Wrapped(Vec<Vec<Primitive>>),
}

/// Parses a task file body. The primitive array may be wrapped in an outer list.
pub fn parse_task(text: &str) -> Result<Vec<Primitive>, TaskError> {
    let layout: TaskFileLayout = serde_json::from_str(text).map_err(|_| {
        TaskError::TaskFile(
            "expected an array of {\"command\": \"move\"|\"grab\", \"args\": ...} objects".into(),
        )
    })?;

    match layout {
        TaskFileLayout::Flat(primitives) => Ok(primitives),
        TaskFileLayout::Wrapped(mut nested) => {
            if nested.len() > 1 {
                return Err(TaskError::TaskFile(format!(
                    "expected a single wrapped primitive list, found {}",
                    nested.len()
                )));
            }
            Ok(nested.pop().unwrap_or_default())
        }
    }
}

pub fn load_task_file(path: impl AsRef<Path>) -> Result<Vec<Primitive>, TaskError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| TaskError::TaskFile(format!("{}: {e}", path.display())))?;
    parse_task(&text)
}

/// Splits a flat primitive list into items. An item ends with the first move that follows a
/// release; anything left over forms a final item.
pub fn segment_items(primitives: &[Primitive]) -> Vec<TaskItem> {
    let mut items = Vec::new();
    let mut current = Vec::new();
    let mut released = false;

    for primitive in primitives {
        current.push(*primitive);
        match primitive {
            Primitive::Grab(false) => released = true,
            Primitive::Move(_) if released => {
                items.push(TaskItem {
                    object_index: items.len(),
                    primitives: std::mem::take(&mut current),
                });
                released = false;
            }
            _ => {}
        }
    }

    if !current.is_empty() {
        items.push(TaskItem {
            object_index: items.len(),
            primitives: current,
        });
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    const TASK: &str = r#"[
        {"command": "move", "args": [0.5, 0.0, 0.6, 3.14159, 0.0, 0.0]},
        {"command": "grab", "args": true},
        {"command": "move", "args": [0.0, 0.5, 0.6, 3.14159, 0.0, 0.0]},
        {"command": "grab", "args": false},
        {"command": "move", "args": [0.0, 0.5, 0.7, 3.14159, 0.0, 0.0]}
    ]"#;

    #[test]
    fn test_parse_flat_task() {
        let primitives = parse_task(TASK).unwrap();
        assert_eq!(primitives.len(), 5);
        assert_eq!(primitives[1], Primitive::Grab(true));
        match primitives[0] {
            Primitive::Move(pose) => {
                assert_eq!(pose.xyz, [0.5, 0.0, 0.6]);
                assert_eq!(pose.rpy, [3.14159, 0.0, 0.0]);
            }
            other => panic!("unexpected primitive {:?}", other),
        }
    }

    #[test]
    fn test_parse_wrapped_task() {
        let wrapped = format!("[{}]", TASK);
        assert_eq!(parse_task(&wrapped).unwrap(), parse_task(TASK).unwrap());
    }

    #[test]
    fn test_unknown_command_rejected() {
        let err = parse_task(r#"[{"command": "wave", "args": 1}]"#).unwrap_err();
        assert!(matches!(err, TaskError::TaskFile(_)));
    }

    #[test]
    fn test_short_pose_rejected() {
        let err = parse_task(r#"[{"command": "move", "args": [1.0, 2.0]}]"#).unwrap_err();
        assert!(matches!(err, TaskError::TaskFile(_)));
    }

    #[test]
    fn test_primitive_round_trips_through_json() {
        let text = serde_json::to_string(&Primitive::Grab(false)).unwrap();
        assert_eq!(text, r#"{"command":"grab","args":false}"#);
    }

    #[test]
    fn test_segment_items_ends_after_retreat() {
        let mut primitives = parse_task(TASK).unwrap();
        primitives.extend(parse_task(TASK).unwrap());
        primitives.push(Primitive::Grab(true));

        let items = segment_items(&primitives);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].primitives.len(), 5);
        assert_eq!(items[1].object_index, 1);
        assert_eq!(items[2].primitives, vec![Primitive::Grab(true)]);
    }
}
