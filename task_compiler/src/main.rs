use clap::Parser;
use eyre::Result;
use manipulator_lib::{
    compile_task, init_tracing, AxisOrder, CompiledTask, PalletSpec, Placement, Pose, SceneObject,
    StackParams,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "task_compiler")]
#[command(about = "Compile pick-and-place goals into a task file and a placement plan")]
struct Cli {
    /// JSON list of objects: `[{"id": "cube", "pose": [x, y, z, roll, pitch, yaw]}, ...]`
    #[arg(short, long)]
    objects: PathBuf,

    /// Place pose `x,y,z,roll,pitch,yaw`. Give it once to stack every object on it, or once per
    /// object to pair them in order.
    #[arg(short = 't', long = "target-pose", value_parser = parse_pose)]
    target_poses: Vec<Pose>,

    /// Approach and retreat clearance above pick and place poses (m)
    #[arg(long, default_value_t = 0.05)]
    delta_z: f64,

    /// Stack layer height (m)
    #[arg(long, default_value_t = 0.05)]
    place_step_z: f64,

    /// Extra clearance added to every stacked place height (m)
    #[arg(long, default_value_t = 0.002)]
    gap: f64,

    /// First pallet cell `x,y,z`. Enables pallet mode together with the counts and steps.
    #[arg(long, value_parser = parse_xyz)]
    pallet_origin: Option<[f64; 3]>,

    /// Orientation shared by every pallet cell `roll,pitch,yaw`
    #[arg(long, value_parser = parse_xyz, default_value = "0,0,0")]
    pallet_rpy: [f64; 3],

    #[arg(long)]
    pallet_nx: Option<usize>,

    #[arg(long)]
    pallet_ny: Option<usize>,

    #[arg(long, default_value_t = 1)]
    pallet_nz: usize,

    #[arg(long)]
    pallet_sx: Option<f64>,

    #[arg(long)]
    pallet_sy: Option<f64>,

    #[arg(long, default_value_t = 0.0)]
    pallet_sz: f64,

    /// Fill order, outermost axis first (xyz, xzy, yxz, yzx, zxy, zyx)
    #[arg(long, default_value = "zxy")]
    pallet_order: AxisOrder,

    #[arg(long, default_value = "pick_place_task.json")]
    task_out: PathBuf,

    #[arg(long, default_value = "placement_plan.json")]
    plan_out: PathBuf,
}

fn main() -> Result<()> {
    let _guard = init_tracing();
    let cli = Cli::parse();

    let task = run(&cli)?;

    info!(
        "Wrote {} primitives to {} and {} placement plans to {}",
        task.primitives().len(),
        cli.task_out.display(),
        task.plans.len(),
        cli.plan_out.display()
    );
    Ok(())
}

fn run(cli: &Cli) -> Result<CompiledTask> {
    let objects = load_objects(&cli.objects)?;
    info!("Loaded {} objects from {}", objects.len(), cli.objects.display());

    let placement = placement(cli, objects.len())?;
    let params = StackParams {
        delta_z: cli.delta_z,
        layer_step_z: cli.place_step_z,
        gap: cli.gap,
    };

    let task = compile_task(&objects, &placement, &params)?;
    if let Some(truncated) = task.truncated {
        warn!(
            "Only the first {} of {} objects will be moved",
            truncated.available, truncated.requested
        );
    }

    write_json(&cli.task_out, &serde_json::to_value(task.primitives())?)?;
    write_json(&cli.plan_out, &serde_json::to_value(&task.plans)?)?;
    Ok(task)
}

fn placement(cli: &Cli, object_count: usize) -> Result<Placement> {
    let pallet = (
        cli.pallet_origin,
        cli.pallet_nx,
        cli.pallet_ny,
        cli.pallet_sx,
        cli.pallet_sy,
    );

    match pallet {
        (Some(origin), Some(nx), Some(ny), Some(sx), Some(sy)) => {
            if !cli.target_poses.is_empty() {
                warn!("Pallet parameters given, ignoring {} target poses", cli.target_poses.len());
            }
            let spec = PalletSpec::new(
                origin,
                cli.pallet_rpy,
                [nx, ny, cli.pallet_nz],
                [sx, sy, cli.pallet_sz],
                cli.pallet_order,
            )?;
            info!("Pallet mode: {} cells, order {}", spec.capacity(), spec.order());
            Ok(Placement::Pallet(spec))
        }
        (None, None, None, None, None) => {
            if cli.target_poses.is_empty() {
                return Err(eyre::eyre!(
                    "No place target: pass --target-pose or the pallet parameters"
                ));
            }
            Ok(Placement::from_targets(cli.target_poses.clone(), object_count)?)
        }
        _ => Err(eyre::eyre!(
            "Pallet mode needs --pallet-origin, --pallet-nx, --pallet-ny, --pallet-sx and --pallet-sy"
        )),
    }
}

fn load_objects(path: &Path) -> Result<Vec<SceneObject>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("Failed to read objects {}: {}", path.display(), e))?;
    let objects: Vec<SceneObject> = serde_json::from_str(&content)
        .map_err(|e| eyre::eyre!("Invalid objects file {}: {}", path.display(), e))?;
    if objects.is_empty() {
        return Err(eyre::eyre!("{} lists no objects", path.display()));
    }
    Ok(objects)
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)
        .map_err(|e| eyre::eyre!("Failed to write {}: {}", path.display(), e))?;
    Ok(())
}

/// Accepts values separated by commas and/or spaces.
fn parse_values(s: &str, expected: usize) -> Result<Vec<f64>, String> {
    let values = s
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<f64>().map_err(|e| format!("'{part}': {e}")))
        .collect::<Result<Vec<f64>, String>>()?;

    if values.len() != expected {
        return Err(format!("expected {expected} numbers, got {}", values.len()));
    }
    Ok(values)
}

fn parse_pose(s: &str) -> Result<Pose, String> {
    let v = parse_values(s, 6)?;
    Ok(Pose::new([v[0], v[1], v[2]], [v[3], v[4], v[5]]))
}

fn parse_xyz(s: &str) -> Result<[f64; 3], String> {
    let v = parse_values(s, 3)?;
    Ok([v[0], v[1], v[2]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use manipulator_lib::{parse_task, segment_items, ObjectPlacementPlan, Primitive};

    const OBJECTS: &str = r#"[
        {"id": "a", "pose": [0.5, -0.2, 0.05, 3.14159, 0.0, 0.0]},
        {"id": "b", "pose": [0.5, 0.0, 0.05, 3.14159, 0.0, 0.0]},
        {"id": "c", "pose": [0.5, 0.2, 0.05, 3.14159, 0.0, 0.0]}
    ]"#;

    fn cli(dir: &Path, extra: &[&str]) -> Cli {
        let objects = dir.join("objects.json");
        std::fs::write(&objects, OBJECTS).unwrap();

        let mut args = vec![
            "task_compiler".to_string(),
            "--objects".to_string(),
            objects.display().to_string(),
            "--task-out".to_string(),
            dir.join("task.json").display().to_string(),
            "--plan-out".to_string(),
            dir.join("plan.json").display().to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_pose_accepts_commas_and_spaces() {
        let pose = parse_pose("0.1, 0.2 0.3,0,0,1.5").unwrap();
        assert_eq!(pose.to_array(), [0.1, 0.2, 0.3, 0.0, 0.0, 1.5]);
        assert!(parse_pose("0.1,0.2").is_err());
        assert!(parse_pose("0.1,0.2,x,0,0,0").is_err());
    }

    #[test]
    fn test_stack_writes_task_and_plan() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli(dir.path(), &["--target-pose", "0.3,0.4,0.0,3.14159,0,0"]);
        let task = run(&cli).unwrap();
        assert_eq!(task.items.len(), 3);

        let primitives = parse_task(&std::fs::read_to_string(&cli.task_out).unwrap()).unwrap();
        assert_eq!(primitives.len(), 24);
        assert_eq!(primitives[2], Primitive::Grab(true));
        assert_eq!(segment_items(&primitives).len(), 3);

        let plans: Vec<ObjectPlacementPlan> =
            serde_json::from_str(&std::fs::read_to_string(&cli.plan_out).unwrap()).unwrap();
        assert_eq!(plans.len(), 3);
        assert!((plans[2].end_xyz[2] - 0.102).abs() < 1e-9);
    }

    #[test]
    fn test_pallet_defaults_and_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli(
            dir.path(),
            &[
                "--pallet-origin", "0.4,0.3,0.05",
                "--pallet-nx", "2",
                "--pallet-ny", "1",
                "--pallet-sx", "0.1",
                "--pallet-sy", "0.1",
            ],
        );
        assert_eq!(cli.pallet_nz, 1);
        assert_eq!(cli.pallet_order, AxisOrder::Zxy);

        let task = run(&cli).unwrap();
        assert_eq!(task.plans.len(), 2);
        assert_eq!(task.truncated.map(|t| t.available), Some(2));
    }

    #[test]
    fn test_target_count_must_match() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli(
            dir.path(),
            &["-t", "0.3,0.4,0,0,0,0", "-t", "0.3,0.5,0,0,0,0"],
        );
        assert!(run(&cli).is_err());
    }

    #[test]
    fn test_partial_pallet_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli(dir.path(), &["--pallet-origin", "0.4,0.3,0.05", "--pallet-nx", "2"]);
        assert!(placement(&cli, 3).is_err());
    }
}
