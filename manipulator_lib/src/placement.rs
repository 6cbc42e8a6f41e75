//! Placement accuracy logging.
//!
//! When playback passes a place marker, the object's measured world position is brought into
//! the robot base frame and compared with where the plan put it. The whole result list is
//! rewritten to disk after every record, so a crash loses at most the record in flight.
//!
//! [`write_objects_snapshot`] records where every object started, before anything moves.

use crate::error::TaskError;
use crate::types::{BaseFrame, ObjectPlacementPlan, PlaceMarker, Pose};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// World-position lookups on the scene graph.
pub trait SceneQuery {
    fn world_position(&self, id: &str) -> Option<[f64; 3]>;

    /// Called by the supervisor every tick with the tool pose (base frame) computed from the
    /// measured joints. Scenes backed by a real simulator ignore it.
    fn observe(&mut self, _tool_pose: &Pose, _gripper_open: bool) {}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRecord {
    pub object: String,
    pub start_pose: [f64; 3],
    pub end_pose: [f64; 3],
    pub current_pose: [f64; 3],
    pub euclidian_error: f64,
}

/// Initial position of one scene object, in world and robot-base coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub id: String,
    pub world_xyz: [f64; 3],
    pub local_xyz: [f64; 3],
}

/// Looks every id up in the scene and writes the result as a JSON list to `output`.
///
/// Fails with `MissingReference` before writing anything if an id is not in the scene.
pub fn write_objects_snapshot<'a>(
    ids: impl IntoIterator<Item = &'a str>,
    scene: &dyn SceneQuery,
    frame: &BaseFrame,
    output: &Path,
) -> eyre::Result<Vec<ObjectSnapshot>> {
    let snapshot = ids
        .into_iter()
        .map(|id| {
            let world = scene
                .world_position(id)
                .ok_or_else(|| TaskError::MissingReference(id.to_string()))?;
            Ok(ObjectSnapshot {
                id: id.to_string(),
                world_xyz: world,
                local_xyz: frame.world_to_local(world),
            })
        })
        .collect::<Result<Vec<_>, TaskError>>()?;

    let mut writer = BufWriter::new(File::create(output)?);
    serde_json::to_writer_pretty(&mut writer, &snapshot)?;
    writer.flush()?;

    info!("Wrote initial positions of {} objects to {}", snapshot.len(), output.display());
    Ok(snapshot)
}

pub struct PlacementLogger {
    plans: Vec<ObjectPlacementPlan>,
    markers: Vec<PlaceMarker>,
    next_marker: usize,
    frame: BaseFrame,
    output: PathBuf,
    results: Vec<PlacementRecord>,
}

impl PlacementLogger {
    /// Fails with `MissingReference` if a planned object is not in the scene.
    pub fn new(
        plans: Vec<ObjectPlacementPlan>,
        mut markers: Vec<PlaceMarker>,
        frame: BaseFrame,
        output: impl Into<PathBuf>,
        scene: &dyn SceneQuery,
    ) -> Result<Self, TaskError> {
        if let Some(missing) = plans.iter().find(|p| scene.world_position(&p.id).is_none()) {
            return Err(TaskError::MissingReference(missing.id.clone()));
        }

        markers.sort_by_key(|m| m.trajectory_index);

        Ok(Self {
            plans,
            markers,
            next_marker: 0,
            frame,
            output: output.into(),
            results: Vec::new(),
        })
    }

    pub fn results(&self) -> &[PlacementRecord] {
        &self.results
    }

    pub fn pending_markers(&self) -> usize {
        self.markers.len() - self.next_marker
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Consumes every marker at or before `reached_index`, in order.
    pub fn try_log(&mut self, reached_index: usize, scene: &dyn SceneQuery) {
        while let Some(marker) = self.markers.get(self.next_marker).copied() {
            if marker.trajectory_index > reached_index {
                break;
            }
            self.next_marker += 1;

            let Some(plan) = self.plans.get(marker.object_index) else {
                warn!(
                    "Place marker at waypoint {} names object {} but only {} are planned, skipping",
                    marker.trajectory_index,
                    marker.object_index,
                    self.plans.len()
                );
                continue;
            };

            let Some(world) = scene.world_position(&plan.id) else {
                warn!("Object '{}' is no longer in the scene, skipping", plan.id);
                continue;
            };

            let current = self.frame.world_to_local(world);
            let error = distance(&current, &plan.end_xyz);
            info!(
                "Placed '{}': error {:.4} m (planned {:?}, measured {:?})",
                plan.id, error, plan.end_xyz, current
            );

            self.results.push(PlacementRecord {
                object: plan.id.clone(),
                start_pose: plan.start_xyz,
                end_pose: plan.end_xyz,
                current_pose: current,
                euclidian_error: error,
            });
            self.persist();
        }
    }

    pub fn finalize(&mut self) {
        self.persist();
        info!(
            "Placement log finalized: {} records in {}",
            self.results.len(),
            self.output.display()
        );
    }

    fn persist(&self) {
        if let Err(e) = self.write_results() {
            warn!("Failed to write {}: {}", self.output.display(), e);
        } else {
            debug!("Wrote {} placement records", self.results.len());
        }
    }

    fn write_results(&self) -> eyre::Result<()> {
        let file = File::create(&self.output)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.results)?;
        writer.flush()?;
        Ok(())
    }
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedScene(HashMap<String, [f64; 3]>);

    impl SceneQuery for FixedScene {
        fn world_position(&self, id: &str) -> Option<[f64; 3]> {
            self.0.get(id).copied()
        }
    }

    fn scene(entries: &[(&str, [f64; 3])]) -> FixedScene {
        FixedScene(entries.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    fn plan(id: &str, end: [f64; 3]) -> ObjectPlacementPlan {
        ObjectPlacementPlan {
            id: id.to_string(),
            start_xyz: [0.0, 0.0, 0.0],
            end_xyz: end,
        }
    }

    fn marker(trajectory_index: usize, object_index: usize) -> PlaceMarker {
        PlaceMarker {
            trajectory_index,
            object_index,
        }
    }

    #[test]
    fn test_logs_error_in_base_frame_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        // Base sits 1 m along world x.
        let frame = BaseFrame::new(&Pose::new([1.0, 0.0, 0.0], [0.0, 0.0, 0.0]));
        let world = scene(&[("box", [1.5, 0.0, 0.3])]);

        let mut logger = PlacementLogger::new(
            vec![plan("box", [0.5, 0.0, 0.0])],
            vec![marker(10, 0)],
            frame,
            &path,
            &world,
        )
        .unwrap();

        logger.try_log(9, &world);
        assert!(logger.results().is_empty());
        assert!(!path.exists());

        logger.try_log(12, &world);
        assert_eq!(logger.results().len(), 1);
        assert!((logger.results()[0].euclidian_error - 0.3).abs() < 1e-9);

        let written: Vec<PlacementRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, logger.results());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw[0].get("euclidian_error").is_some());
        assert_eq!(raw[0]["object"], "box");
    }

    #[test]
    fn test_out_of_range_object_advances_without_record() {
        let dir = tempfile::tempdir().unwrap();
        let world = scene(&[("a", [0.0, 0.0, 0.0])]);
        let mut logger = PlacementLogger::new(
            vec![plan("a", [0.0, 0.0, 0.0])],
            vec![marker(3, 7)],
            BaseFrame::identity(),
            dir.path().join("r.json"),
            &world,
        )
        .unwrap();

        logger.try_log(3, &world);
        assert!(logger.results().is_empty());
        assert_eq!(logger.pending_markers(), 0);
    }

    #[test]
    fn test_missing_object_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PlacementLogger::new(
            vec![plan("ghost", [0.0; 3])],
            vec![],
            BaseFrame::identity(),
            dir.path().join("r.json"),
            &scene(&[]),
        )
        .err()
        .unwrap();
        assert!(matches!(err, TaskError::MissingReference(id) if id == "ghost"));
    }

    #[test]
    fn test_vanished_object_is_skipped_at_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = PlacementLogger::new(
            vec![plan("a", [0.0; 3])],
            vec![marker(0, 0)],
            BaseFrame::identity(),
            dir.path().join("r.json"),
            &scene(&[("a", [0.0; 3])]),
        )
        .unwrap();

        logger.try_log(5, &scene(&[]));
        assert!(logger.results().is_empty());
        assert_eq!(logger.pending_markers(), 0);
    }

    #[test]
    fn test_markers_consumed_in_index_order() {
        let dir = tempfile::tempdir().unwrap();
        let world = scene(&[("a", [0.0; 3]), ("b", [1.0, 0.0, 0.0])]);
        let mut logger = PlacementLogger::new(
            vec![plan("a", [0.0; 3]), plan("b", [1.0, 0.0, 0.0])],
            vec![marker(20, 1), marker(5, 0)],
            BaseFrame::identity(),
            dir.path().join("r.json"),
            &world,
        )
        .unwrap();

        logger.try_log(25, &world);
        let order: Vec<&str> = logger.results().iter().map(|r| r.object.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_finalize_writes_even_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.json");
        let mut logger =
            PlacementLogger::new(vec![], vec![], BaseFrame::identity(), &path, &scene(&[])).unwrap();
        logger.finalize();
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "[]");
    }

    #[test]
    fn test_objects_snapshot_in_both_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objects_info.json");
        let frame = BaseFrame::new(&Pose::new([0.0, 0.0, 0.7], [0.0, 0.0, 0.0]));
        let world = scene(&[("a", [0.5, 0.1, 0.75]), ("b", [0.5, -0.1, 0.75])]);

        let snapshot = write_objects_snapshot(["b", "a"], &world, &frame, &path).unwrap();
        assert_eq!(snapshot[0].id, "b");
        assert!((snapshot[1].local_xyz[2] - 0.05).abs() < 1e-9);

        let written: Vec<ObjectSnapshot> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, snapshot);

        let missing = dir.path().join("missing.json");
        assert!(write_objects_snapshot(["ghost"], &world, &frame, &missing).is_err());
        assert!(!missing.exists());
    }
}
