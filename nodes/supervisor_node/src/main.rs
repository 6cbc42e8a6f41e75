use dora_node_api::{
    arrow::array::{Array, BinaryArray},
    DoraNode, Event,
};
use eyre::Result;
use manipulator_lib::{
    init_tracing, load_joint_csv, load_task_file, segment_items, write_objects_snapshot, BaseFrame,
    DhArm, DoraChannel, Goal, JointVector, ManipulatorConfig, MessageEnvelope,
    ObjectPlacementPlan, PlacementLogger, Pose, Supervisor, SupervisorSettings, TrackedScene,
    TrajectoryBuilder, TrajectoryPlanner,
};
use std::error::Error;
use std::path::Path;
use tracing::{debug, info, warn};

const OUTPUT: &str = "robot_position";
const SOURCE: &str = "supervisor";
/// Distance within which a closing gripper picks up a tracked object.
const GRASP_RADIUS: f64 = 0.03;

fn planner(config: &ManipulatorConfig) -> Result<TrajectoryPlanner<DhArm>> {
    let arm = DhArm::new(&config.kinematics)?;
    Ok(TrajectoryPlanner::new(arm, config.joint_speed_limit())?)
}

fn load_plans(path: &str) -> Result<Vec<ObjectPlacementPlan>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("Failed to read placement plan {}: {}", path, e))?;
    Ok(serde_json::from_str(&content)?)
}

/// Builds the supervisor for whichever mode the environment selects: a compiled task file,
/// a recorded joint CSV, or neither (goals only). With a placement plan the initial object
/// positions are written out before the logger starts.
fn build_supervisor(config: &ManipulatorConfig) -> Result<Supervisor<DhArm>> {
    let settings = SupervisorSettings::from_config(config, SOURCE);
    let supervisor = Supervisor::new(settings, planner(config)?)?;

    if let Ok(task_path) = std::env::var("TASK_FILE") {
        let primitives = load_task_file(&task_path)?;
        let items = segment_items(&primitives);
        info!("Loaded {} primitives ({} objects) from {}", primitives.len(), items.len(), task_path);

        let build_planner = planner(config)?;
        let trajectory = TrajectoryBuilder::new(
            &build_planner,
            config.dt(),
            config.control.speed_scale,
            config.control.grip_hold_s,
        )
        .build(&config.home(), &items)?;

        for failed in trajectory.failed_items() {
            warn!("Object {} will not be placed: IK failed while planning it", failed);
        }

        let supervisor = supervisor.with_trajectory(&trajectory);

        let Ok(plan_path) = std::env::var("PLACEMENT_PLAN") else {
            return Ok(supervisor);
        };
        let results_path = std::env::var("PLACEMENT_RESULTS")
            .unwrap_or_else(|_| "placement_results.json".to_string());

        let plans = load_plans(&plan_path)?;
        let frame = BaseFrame::new(&config.base_pose());
        let mut scene = TrackedScene::new(frame, GRASP_RADIUS);
        for plan in &plans {
            scene.insert(plan.id.clone(), frame.local_to_world(plan.start_xyz));
        }

        let snapshot_path =
            std::env::var("OBJECTS_SNAPSHOT").unwrap_or_else(|_| "objects_info.json".to_string());
        write_objects_snapshot(
            plans.iter().map(|plan| plan.id.as_str()),
            &scene,
            &frame,
            Path::new(&snapshot_path),
        )?;

        let logger = PlacementLogger::new(plans, trajectory.markers.clone(), frame, &results_path, &scene)?;
        info!("Logging placements to {}", logger.output_path().display());
        return Ok(supervisor.with_placement(logger, Box::new(scene)));
    }

    if let Ok(csv_path) = std::env::var("JOINT_TRAJECTORY_CSV") {
        let rows = load_joint_csv(&csv_path, config.dof())?;
        info!("Playing back {} joint rows from {}", rows.len(), csv_path);
        return Ok(supervisor.with_playback(rows));
    }

    info!("No task or trajectory configured, waiting for goals");
    Ok(supervisor)
}

fn parse_goal(data: &dyn Array) -> Result<Goal> {
    let array = data
        .as_any()
        .downcast_ref::<BinaryArray>()
        .ok_or_else(|| eyre::eyre!("goal input is not a binary array"))?;
    if array.is_empty() {
        return Err(eyre::eyre!("empty goal input"));
    }

    let envelope = MessageEnvelope::decode(array.value(0))?;
    match envelope.kind.as_str() {
        "goal_pose" => Ok(Goal::Cartesian(envelope.payload::<Pose>()?)),
        "joint_goal" => Ok(Goal::Joint(envelope.payload::<JointVector>()?)),
        other => Err(eyre::eyre!("unsupported goal type '{}'", other)),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let _guard = init_tracing();

    info!("Starting supervisor node");

    let config_path = std::env::var("MANIPULATOR_CONFIG")
        .unwrap_or_else(|_| "config/iiwa7_r800.toml".to_string());
    let config = ManipulatorConfig::load_from_file(&config_path)?;
    info!(
        "Loaded {} configuration with {} DOF, tick {} ms",
        config.robot.name,
        config.dof(),
        config.control.tick_ms
    );

    let mut supervisor = build_supervisor(&config)?;

    let (node, mut events) = DoraNode::init_from_env()?;
    let mut channel = DoraChannel::new(node, OUTPUT);
    let mut finished = false;

    while let Some(event) = events.recv() {
        match event {
            Event::Input {
                id,
                metadata: _,
                data,
            } => match id.as_str() {
                "tick" => {
                    if let Err(e) = supervisor.tick(&mut channel) {
                        warn!("Failed to publish command: {}", e);
                    }
                    if supervisor.is_done() != finished {
                        finished = supervisor.is_done();
                        if finished {
                            info!("All waypoints reached, holding pose");
                        }
                    }
                }
                "goal" => match parse_goal(&**data) {
                    Ok(goal) => {
                        debug!("Queued goal {:?}", goal);
                        supervisor.push_goal(goal);
                    }
                    Err(e) => warn!("Ignoring goal: {}", e),
                },
                other => channel.push_input(other, &**data),
            },

            Event::Stop(_) => {
                info!("Stop event received");
                break;
            }

            _ => {}
        }
    }

    supervisor.finalize();
    info!("Supervisor shutting down");
    Ok(())
}
