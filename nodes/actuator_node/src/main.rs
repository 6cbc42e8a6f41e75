use dora_node_api::{DoraNode, Event};
use manipulator_lib::{
    finger_offsets, init_tracing, Actuator, ActuatorSettings, DoraChannel, ManipulatorConfig, SimulatedArm,
};
use std::error::Error;
use tracing::{debug, info, warn};

const OUTPUT: &str = "current_pose";
const SOURCE: &str = "actuator";

/// Simulated arm parked at home with the gripper open.
fn simulated_arm(config: &ManipulatorConfig) -> SimulatedArm {
    let robot = &config.robot;
    let mut arm = SimulatedArm::new(
        robot
            .joint_names
            .iter()
            .chain(&robot.aux_joint_names)
            .chain(&robot.finger_joint_names)
            .cloned(),
        config.control.device_max_velocity,
    );
    for (name, value) in robot.joint_names.iter().zip(&robot.home) {
        arm.set_position(name, *value);
    }
    let (right, left) = finger_offsets(true, robot.finger_offset);
    let [right_name, left_name] = &robot.finger_joint_names;
    arm.set_position(right_name, right);
    arm.set_position(left_name, left);
    arm
}

fn main() -> Result<(), Box<dyn Error>> {
    let _guard = init_tracing();

    info!("Starting actuator node");

    let config_path = std::env::var("MANIPULATOR_CONFIG")
        .unwrap_or_else(|_| "config/iiwa7_r800.toml".to_string());
    let config = ManipulatorConfig::load_from_file(&config_path)?;

    let mut actuator = Actuator::new(ActuatorSettings::from_config(&config, SOURCE));
    let mut arm = simulated_arm(&config);
    let dt = config.dt();
    info!(
        "Simulated {} with joint velocity limit {} rad/s",
        config.robot.name, config.control.device_max_velocity
    );

    let (node, mut events) = DoraNode::init_from_env()?;
    let mut channel = DoraChannel::new(node, OUTPUT);

    while let Some(event) = events.recv() {
        match event {
            Event::Input {
                id,
                metadata: _,
                data,
            } => match id.as_str() {
                "tick" => {
                    arm.step(dt);
                    match actuator.tick(&mut channel, &mut arm) {
                        Ok(report) => debug!("Reported {} joints", report.joints.len()),
                        Err(e) => warn!("Failed to publish joint state: {}", e),
                    }
                }
                other => channel.push_input(other, &**data),
            },

            Event::Stop(_) => {
                info!("Stop event received");
                break;
            }

            _ => {}
        }
    }

    info!("Actuator shutting down");
    Ok(())
}
