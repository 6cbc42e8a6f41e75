//! Supervisor control loop.
//!
//! Owns the waypoint queue and the outgoing command. Every tick it takes the newest joint
//! feedback, advances to the next waypoint once the previous one is reached and republishes
//! the full command, whether or not anything changed.

use super::command_builder::CommandBuilder;
use super::motion::target_reached;
use crate::channel::{drain_latest, MessageChannel};
use crate::error::{ChannelError, InvalidArgument};
use crate::placement::{PlacementLogger, SceneQuery};
use crate::planning::{Goal, Trajectory, TrajectoryPlanner};
use crate::types::{
    JointStateReport, JointVector, ManipulatorConfig, MessageEnvelope, Waypoint, ROBOT_POSITION,
};
use crate::utils::KinematicModel;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub source: String,
    pub feedback_type: String,
    pub joint_names: Vec<String>,
    /// Joints commanded alongside the chain but never tracked, with their initial value.
    pub aux_joints: Vec<(String, f64)>,
    /// `[right, left]` finger joints in the feedback's gripper map. When both are reported the
    /// scene sees the measured gripper state, otherwise the commanded one.
    pub finger_names: Option<[String; 2]>,
    /// Finger travel from closed to open.
    pub finger_offset: f64,
    /// Targeted before anything else when set.
    pub home: Option<JointVector>,
    pub arrival_tolerance: f64,
    /// Used for CSV playback and lazily planned goals.
    pub playback_tolerance: f64,
    pub dt: f64,
    pub speed_scale: f64,
}

impl SupervisorSettings {
    pub fn from_config(config: &ManipulatorConfig, source: &str) -> Self {
        Self {
            source: source.to_string(),
            feedback_type: config.feedback_type(),
            joint_names: config.robot.joint_names.clone(),
            aux_joints: config
                .robot
                .aux_joint_names
                .iter()
                .map(|name| (name.clone(), 0.0))
                .collect(),
            finger_names: Some(config.robot.finger_joint_names.clone()),
            finger_offset: config.robot.finger_offset,
            home: Some(config.home()),
            arrival_tolerance: config.control.arrival_tolerance,
            playback_tolerance: config.control.playback_tolerance,
            dt: config.dt(),
            speed_scale: config.control.speed_scale,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Home,
    Trajectory(usize),
    Goal,
}

#[derive(Debug, Clone)]
struct Queued {
    waypoint: Waypoint,
    origin: Origin,
    tolerance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    Homing,
    /// `index` is the trajectory index, `None` for a planned goal.
    Tracking { index: Option<usize> },
    Idle,
}

pub struct Supervisor<M> {
    settings: SupervisorSettings,
    planner: TrajectoryPlanner<M>,
    builder: CommandBuilder,
    queue: VecDeque<Queued>,
    goals: VecDeque<Goal>,
    active: Option<Queued>,
    measured: Option<JointVector>,
    measured_gripper: Option<bool>,
    last_reached: Option<usize>,
    placement: Option<(PlacementLogger, Box<dyn SceneQuery>)>,
}

impl<M: KinematicModel> Supervisor<M> {
    pub fn new(settings: SupervisorSettings, planner: TrajectoryPlanner<M>) -> Result<Self, InvalidArgument> {
        let dof = planner.model().dof();
        if settings.joint_names.len() != dof {
            return Err(InvalidArgument::length_mismatch(
                "supervisor joint names",
                dof,
                settings.joint_names.len(),
            ));
        }

        let mut queue = VecDeque::new();
        if let Some(home) = &settings.home {
            if home.len() != dof {
                return Err(InvalidArgument::length_mismatch("home", dof, home.len()));
            }
            queue.push_back(Queued {
                waypoint: Waypoint::motion(home.clone()),
                origin: Origin::Home,
                tolerance: settings.arrival_tolerance,
            });
        }

        let builder = CommandBuilder::new(settings.joint_names.clone(), &settings.aux_joints);

        Ok(Self {
            settings,
            planner,
            builder,
            queue,
            goals: VecDeque::new(),
            active: None,
            measured: None,
            measured_gripper: None,
            last_reached: None,
            placement: None,
        })
    }

    /// Queues a flattened trajectory, tracked with the arrival tolerance.
    pub fn with_trajectory(mut self, trajectory: &Trajectory) -> Self {
        let tolerance = self.settings.arrival_tolerance;
        self.queue.extend(trajectory.waypoints.iter().enumerate().map(|(index, waypoint)| Queued {
            waypoint: waypoint.clone(),
            origin: Origin::Trajectory(index),
            tolerance,
        }));
        self
    }

    /// Queues recorded joint rows, tracked with the tighter playback tolerance.
    pub fn with_playback(mut self, waypoints: Vec<Waypoint>) -> Self {
        let tolerance = self.settings.playback_tolerance;
        self.queue.extend(waypoints.into_iter().enumerate().map(|(index, waypoint)| Queued {
            waypoint,
            origin: Origin::Trajectory(index),
            tolerance,
        }));
        self
    }

    pub fn with_placement(mut self, logger: PlacementLogger, scene: Box<dyn SceneQuery>) -> Self {
        self.placement = Some((logger, scene));
        self
    }

    /// Goals are planned from the measured joints once the queue runs dry.
    pub fn push_goal(&mut self, goal: Goal) {
        self.goals.push_back(goal);
    }

    pub fn phase(&self) -> SupervisorPhase {
        match self.active.as_ref().map(|a| a.origin) {
            Some(Origin::Home) => SupervisorPhase::Homing,
            Some(Origin::Trajectory(index)) => SupervisorPhase::Tracking { index: Some(index) },
            Some(Origin::Goal) => SupervisorPhase::Tracking { index: None },
            None => SupervisorPhase::Idle,
        }
    }

    /// Nothing active, queued or waiting to be planned.
    pub fn is_done(&self) -> bool {
        self.active.is_none() && self.queue.is_empty() && self.goals.is_empty()
    }

    pub fn remaining_waypoints(&self) -> usize {
        self.queue.len()
    }

    pub fn measured(&self) -> Option<&JointVector> {
        self.measured.as_ref()
    }

    /// Highest trajectory index reached so far.
    pub fn last_reached(&self) -> Option<usize> {
        self.last_reached
    }

    pub fn command_builder(&self) -> &CommandBuilder {
        &self.builder
    }

    pub fn placement_logger(&self) -> Option<&PlacementLogger> {
        self.placement.as_ref().map(|(logger, _)| logger)
    }

    pub fn scene(&self) -> Option<&dyn SceneQuery> {
        self.placement.as_ref().map(|(_, scene)| &**scene)
    }

    pub fn tick<C: MessageChannel + ?Sized>(&mut self, channel: &mut C) -> Result<(), ChannelError> {
        if let Some(envelope) = drain_latest(channel, &self.settings.feedback_type) {
            match self.parse_feedback(&envelope) {
                Ok((q, gripper)) => {
                    self.measured = Some(q);
                    self.measured_gripper = gripper;
                }
                Err(e) => warn!("Ignoring feedback: {}", e),
            }
        }

        if !self.builder.has_target() {
            self.advance();
        }

        self.observe_scene();

        let arrived = match (&self.active, &self.measured) {
            (Some(active), Some(measured)) => {
                target_reached(measured, &active.waypoint.joints, active.tolerance).unwrap_or_else(|e| {
                    warn!("Cannot compare feedback with target: {}", e);
                    false
                })
            }
            _ => false,
        };
        if arrived {
            self.on_arrival();
        }

        let message = MessageEnvelope::new(&self.settings.source, ROBOT_POSITION, self.builder.command())?;
        channel.send(&message)
    }

    /// Flushes the placement log. Call once at shutdown.
    pub fn finalize(&mut self) {
        if let Some((logger, _)) = &mut self.placement {
            logger.finalize();
        }
    }

    /// Measured chain joints and, when the fingers are reported, whether the gripper is open.
    fn parse_feedback(&self, envelope: &MessageEnvelope) -> Result<(JointVector, Option<bool>), ChannelError> {
        let report: JointStateReport = envelope.payload()?;
        let values = self
            .settings
            .joint_names
            .iter()
            .map(|name| {
                report.joints.get(name).copied().ok_or_else(|| {
                    ChannelError::MalformedMessage(format!(
                        "'{}' from '{}' has no joint '{}'",
                        envelope.kind, envelope.source, name
                    ))
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let gripper = self.settings.finger_names.as_ref().and_then(|[right, left]| {
            let right = report.gripper.get(right)?;
            let left = report.gripper.get(left)?;
            // open: right at -offset, left at +offset; closed: both at 0
            Some(left - right > self.settings.finger_offset)
        });
        Ok((JointVector::new(values), gripper))
    }

    fn advance(&mut self) {
        if self.queue.is_empty() {
            self.plan_next_goal();
        }

        let Some(next) = self.queue.pop_front() else {
            return;
        };

        if let Err(e) = self.builder.set_target(next.waypoint.joints.clone()) {
            warn!("Skipping waypoint {:?}: {}", next.origin, e);
            return;
        }
        if let Some(open) = next.waypoint.gripper_action {
            debug!("Gripper {}", if open { "open" } else { "close" });
            self.builder.set_gripper(open);
        }
        self.active = Some(next);
    }

    fn plan_next_goal(&mut self) {
        while let Some(goal) = self.goals.pop_front() {
            let Some(current) = self.measured.clone() else {
                debug!("Waiting for feedback before planning");
                self.goals.push_front(goal);
                return;
            };

            match self
                .planner
                .plan(&current, &goal, self.settings.dt, self.settings.speed_scale)
            {
                Ok(points) => {
                    debug!("Planned goal into {} waypoints", points.len());
                    let tolerance = self.settings.playback_tolerance;
                    self.queue.extend(points.into_iter().map(|joints| Queued {
                        waypoint: Waypoint::motion(joints),
                        origin: Origin::Goal,
                        tolerance,
                    }));
                    return;
                }
                Err(e) => warn!("Dropping goal {:?}: {}", goal, e),
            }
        }
    }

    fn observe_scene(&mut self) {
        let (Some((_, scene)), Some(measured)) = (&mut self.placement, &self.measured) else {
            return;
        };
        match self.planner.model().forward_kinematics(measured) {
            Ok(tool) => {
                let open = match self.measured_gripper {
                    Some(open) => open,
                    None => self.builder.gripper_open(),
                };
                scene.observe(&tool, open)
            }
            Err(e) => warn!("Forward kinematics failed: {}", e),
        }
    }

    fn on_arrival(&mut self) {
        self.builder.clear_target();
        let Some(reached) = self.active.take() else {
            return;
        };

        match reached.origin {
            Origin::Home => info!("Home reached, {} waypoints queued", self.queue.len()),
            Origin::Trajectory(index) => {
                self.last_reached = Some(index);
                if let Some((logger, scene)) = &mut self.placement {
                    logger.try_log(index, &**scene);
                }
                if self.queue.is_empty() {
                    info!("Trajectory finished at waypoint {}", index);
                }
            }
            Origin::Goal => {
                if self.queue.is_empty() {
                    debug!("Goal reached");
                }
            }
        }
    }
}
