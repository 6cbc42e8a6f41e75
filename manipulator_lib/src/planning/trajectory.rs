//! Flattens task items into the waypoint list the supervisor plays back.

use super::planner::{Goal, TrajectoryPlanner};
use crate::error::{InvalidArgument, PlanError, TaskError};
use crate::types::{ItemStatus, JointVector, PlaceMarker, Primitive, TaskItem, Waypoint};
use crate::utils::KinematicModel;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ItemReport {
    pub object_index: usize,
    pub status: ItemStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    pub waypoints: Vec<Waypoint>,
    pub markers: Vec<PlaceMarker>,
    pub report: Vec<ItemReport>,
}

impl Trajectory {
    pub fn from_waypoints(waypoints: Vec<Waypoint>) -> Self {
        Self {
            waypoints,
            ..Default::default()
        }
    }

    pub fn failed_items(&self) -> Vec<usize> {
        self.report
            .iter()
            .filter(|r| !r.status.is_completed())
            .map(|r| r.object_index)
            .collect()
    }
}

pub struct TrajectoryBuilder<'a, M> {
    planner: &'a TrajectoryPlanner<M>,
    dt: f64,
    speed_scale: f64,
    hold_ticks: usize,
}

impl<'a, M: KinematicModel> TrajectoryBuilder<'a, M> {
    /// A grab holds the arm still for `grip_hold_s` (at least one tick), switching the gripper
    /// halfway through.
    pub fn new(planner: &'a TrajectoryPlanner<M>, dt: f64, speed_scale: f64, grip_hold_s: f64) -> Self {
        let hold_ticks = if dt > 0.0 {
            ((grip_hold_s / dt).round() as usize).max(1)
        } else {
            1
        };
        Self {
            planner,
            dt,
            speed_scale,
            hold_ticks,
        }
    }

    pub fn hold_ticks(&self) -> usize {
        self.hold_ticks
    }

    /// Plans every item from `start`.
    ///
    /// An IK failure ends that item as `Failed` and skips its remaining primitives; the next
    /// item is planned from the last reachable configuration. A release is confirmed by a
    /// place marker on the last waypoint of the move that follows it, or on the end of the
    /// release hold when that move cannot be planned.
    pub fn build(&self, start: &JointVector, items: &[TaskItem]) -> Result<Trajectory, InvalidArgument> {
        let mut trajectory = Trajectory::default();
        let mut current = start.clone();

        for item in items {
            let mut pending_release = false;
            let mut status = ItemStatus::Completed;

            for (index, primitive) in item.primitives.iter().enumerate() {
                match primitive {
                    Primitive::Move(pose) => {
                        let points = match self.planner.plan(
                            &current,
                            &Goal::Cartesian(*pose),
                            self.dt,
                            self.speed_scale,
                        ) {
                            Ok(points) => points,
                            Err(PlanError::IkFailure { pose }) => {
                                warn!(
                                    "Object {} primitive {}: no IK solution for {}, skipping the rest of this object",
                                    item.object_index, index, pose
                                );
                                if pending_release {
                                    trajectory.markers.push(PlaceMarker {
                                        trajectory_index: trajectory.waypoints.len() - 1,
                                        object_index: item.object_index,
                                    });
                                }
                                status = ItemStatus::Failed {
                                    primitive_index: index,
                                    pose,
                                };
                                break;
                            }
                            Err(PlanError::InvalidArgument(e)) => return Err(e),
                        };

                        if let Some(last) = points.last() {
                            current = last.clone();
                        }
                        trajectory
                            .waypoints
                            .extend(points.into_iter().map(Waypoint::motion));

                        if pending_release {
                            trajectory.markers.push(PlaceMarker {
                                trajectory_index: trajectory.waypoints.len() - 1,
                                object_index: item.object_index,
                            });
                            pending_release = false;
                        }
                    }
                    Primitive::Grab(grasp) => {
                        if trajectory.waypoints.is_empty() {
                            warn!(
                                "Object {} primitive {}: grab({}) before any motion, skipped",
                                item.object_index, index, grasp
                            );
                            continue;
                        }

                        let open = !grasp;
                        let middle = self.hold_ticks / 2;
                        for tick in 0..self.hold_ticks {
                            trajectory.waypoints.push(Waypoint {
                                joints: current.clone(),
                                gripper_action: (tick == middle).then_some(open),
                            });
                        }

                        if primitive.is_release() {
                            pending_release = true;
                        }
                    }
                }
            }

            trajectory.report.push(ItemReport {
                object_index: item.object_index,
                status,
            });
        }

        info!(
            "Trajectory: {} waypoints, {} place markers, {} failed items",
            trajectory.waypoints.len(),
            trajectory.markers.len(),
            trajectory.failed_items().len()
        );

        Ok(trajectory)
    }
}

/// Parses joint rows, one waypoint per row. A non-numeric first line is taken as a header.
pub fn parse_joint_csv(text: &str, dof: usize) -> Result<Vec<Waypoint>, TaskError> {
    let mut waypoints = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Result<Vec<f64>, _> = line.split(',').map(|f| f.trim().parse::<f64>()).collect();
        let values = match fields {
            Ok(values) => values,
            Err(_) if line_no == 0 => continue,
            Err(e) => {
                return Err(TaskError::TaskFile(format!(
                    "line {}: {}",
                    line_no + 1,
                    e
                )))
            }
        };

        if values.len() != dof {
            return Err(TaskError::TaskFile(format!(
                "line {}: expected {} joint values, got {}",
                line_no + 1,
                dof,
                values.len()
            )));
        }
        waypoints.push(Waypoint::motion(JointVector::new(values)));
    }

    Ok(waypoints)
}

pub fn load_joint_csv(path: impl AsRef<Path>, dof: usize) -> Result<Vec<Waypoint>, TaskError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| TaskError::TaskFile(format!("{}: {e}", path.display())))?;
    parse_joint_csv(&text, dof)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::task_compiler::build_pick_place;
    use crate::types::{segment_items, Pose};
    use crate::utils::DirectCartesianModel;

    const DT: f64 = 0.02;

    fn planner(reach: f64) -> TrajectoryPlanner<DirectCartesianModel> {
        TrajectoryPlanner::new(DirectCartesianModel::with_reach(reach), 1.0).unwrap()
    }

    fn item(object_index: usize, primitives: Vec<Primitive>) -> TaskItem {
        TaskItem {
            object_index,
            primitives,
        }
    }

    fn pose(x: f64, y: f64, z: f64) -> Pose {
        Pose::new([x, y, z], [0.0, 0.0, 0.0])
    }

    #[test]
    fn test_grab_holds_with_action_in_the_middle() {
        let p = planner(10.0);
        let builder = TrajectoryBuilder::new(&p, DT, 1.0, 0.1);
        assert_eq!(builder.hold_ticks(), 5);

        let items = [item(0, vec![Primitive::Move(pose(0.1, 0.0, 0.0)), Primitive::Grab(true)])];
        let traj = builder.build(&JointVector::zeros(6), &items).unwrap();

        let hold = &traj.waypoints[traj.waypoints.len() - 5..];
        let actions: Vec<Option<bool>> = hold.iter().map(|w| w.gripper_action).collect();
        assert_eq!(actions, vec![None, None, Some(false), None, None]);
        assert!(hold.iter().all(|w| w.joints == hold[0].joints));
        assert!(traj.markers.is_empty());
    }

    #[test]
    fn test_marker_lands_on_retreat_end() {
        let p = planner(10.0);
        let builder = TrajectoryBuilder::new(&p, DT, 1.0, 0.04);
        let primitives = build_pick_place(&[pose(0.3, 0.0, 0.1)], &pose(0.0, 0.3, 0.0), 0.05, 0.05, 0.002);
        let items = segment_items(&primitives);
        let traj = builder.build(&JointVector::zeros(6), &items).unwrap();

        assert_eq!(traj.markers.len(), 1);
        let marker = traj.markers[0];
        assert_eq!(marker.object_index, 0);
        assert_eq!(marker.trajectory_index, traj.waypoints.len() - 1);
        let last = &traj.waypoints[marker.trajectory_index].joints;
        assert!((last[2] - 0.052).abs() < 1e-9);
        assert_eq!(traj.report[0].status, ItemStatus::Completed);
    }

    #[test]
    fn test_ik_failure_terminates_only_that_item() {
        let p = planner(1.0);
        let builder = TrajectoryBuilder::new(&p, DT, 1.0, 0.04);
        let unreachable = pose(5.0, 0.0, 0.0);
        let items = [
            item(0, vec![Primitive::Move(pose(0.2, 0.0, 0.0)), Primitive::Grab(true), Primitive::Move(unreachable), Primitive::Grab(false)]),
            item(1, vec![Primitive::Move(pose(0.0, 0.2, 0.0)), Primitive::Grab(false), Primitive::Move(pose(0.0, 0.2, 0.1))]),
        ];
        let traj = builder.build(&JointVector::zeros(6), &items).unwrap();

        assert_eq!(
            traj.report[0].status,
            ItemStatus::Failed {
                primitive_index: 2,
                pose: unreachable
            }
        );
        assert_eq!(traj.report[1].status, ItemStatus::Completed);
        assert_eq!(traj.failed_items(), vec![0]);
        // The skipped release of item 0 adds no hold; item 1 still gets its marker.
        assert_eq!(traj.markers.len(), 1);
        assert_eq!(traj.markers[0].object_index, 1);
    }

    #[test]
    fn test_release_is_logged_when_retreat_fails() {
        let p = planner(1.0);
        let builder = TrajectoryBuilder::new(&p, DT, 1.0, 0.04);
        let unreachable = pose(5.0, 0.0, 0.0);
        let items = [item(
            0,
            vec![
                Primitive::Move(pose(0.2, 0.0, 0.0)),
                Primitive::Grab(true),
                Primitive::Move(pose(0.0, 0.2, 0.0)),
                Primitive::Grab(false),
                Primitive::Move(unreachable),
            ],
        )];
        let traj = builder.build(&JointVector::zeros(6), &items).unwrap();

        assert_eq!(
            traj.report[0].status,
            ItemStatus::Failed {
                primitive_index: 4,
                pose: unreachable
            }
        );
        assert_eq!(traj.markers.len(), 1);
        let marker = traj.markers[0];
        assert_eq!(marker.object_index, 0);
        assert_eq!(marker.trajectory_index, traj.waypoints.len() - 1);
        assert_eq!(traj.waypoints[marker.trajectory_index].joints[1], 0.2);
    }

    #[test]
    fn test_leading_grab_is_skipped() {
        let p = planner(10.0);
        let builder = TrajectoryBuilder::new(&p, DT, 1.0, 0.1);
        let items = [item(0, vec![Primitive::Grab(true), Primitive::Move(pose(0.1, 0.0, 0.0))])];
        let traj = builder.build(&JointVector::zeros(6), &items).unwrap();
        assert!(traj.waypoints.iter().all(|w| w.gripper_action.is_none()));
    }

    #[test]
    fn test_csv_with_header() {
        let text = "a1,a2,a3\n0.0,0.1,0.2\n\n0.3, 0.4, 0.5\n";
        let waypoints = parse_joint_csv(text, 3).unwrap();
        assert_eq!(waypoints.len(), 2);
        assert_eq!(waypoints[1].joints.as_slice(), &[0.3, 0.4, 0.5]);
    }

    #[test]
    fn test_csv_rejects_wrong_width() {
        let err = parse_joint_csv("0.0,0.1\n", 3).unwrap_err();
        assert!(matches!(err, TaskError::TaskFile(_)));
    }
}
