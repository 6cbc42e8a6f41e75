//! Expands pick-and-place goals into ordered move/grab primitives.
//!
//! Every object produces the same eight primitives: approach above the pick, descend, grasp,
//! retreat, approach above the place, descend, release, retreat.

use super::pallet::PalletSpec;
use crate::error::{TaskError, TruncatedAllocation};
use crate::types::{ObjectPlacementPlan, Pose, Primitive, TaskItem};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Heights used when approaching and stacking, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackParams {
    /// Clearance above pick and place poses for approach and retreat.
    pub delta_z: f64,
    /// Height of one stacked layer.
    pub layer_step_z: f64,
    /// Extra clearance added to every stacked place height.
    pub gap: f64,
}

impl Default for StackParams {
    fn default() -> Self {
        Self {
            delta_z: 0.05,
            layer_step_z: 0.05,
            gap: 0.002,
        }
    }
}

fn above(pose: &Pose, delta_z: f64) -> Pose {
    pose.with_z(pose.z() + delta_z)
}

fn pick_and_place(pick: &Pose, place: &Pose, delta_z: f64) -> [Primitive; 8] {
    let pick_above = above(pick, delta_z);
    let place_above = above(place, delta_z);
    [
        Primitive::Move(pick_above),
        Primitive::Move(*pick),
        Primitive::Grab(true),
        Primitive::Move(pick_above),
        Primitive::Move(place_above),
        Primitive::Move(*place),
        Primitive::Grab(false),
        Primitive::Move(place_above),
    ]
}

/// Place pose of layer `index` when stacking on `place`.
pub fn stacked_place(place: &Pose, index: usize, layer_step_z: f64, gap: f64) -> Pose {
    place.with_z(place.z() + index as f64 * layer_step_z + gap)
}

/// Stacks every pick on `place`, one layer per object in pick order.
pub fn build_pick_place(
    picks: &[Pose],
    place: &Pose,
    delta_z: f64,
    layer_step_z: f64,
    gap: f64,
) -> Vec<Primitive> {
    picks
        .iter()
        .enumerate()
        .flat_map(|(index, pick)| {
            let target = stacked_place(place, index, layer_step_z, gap);
            pick_and_place(pick, &target, delta_z)
        })
        .collect()
}

/// Pairs each pick with its own place pose.
pub fn build_pick_place_pairwise(
    picks: &[Pose],
    places: &[Pose],
    delta_z: f64,
) -> Result<Vec<Primitive>, TaskError> {
    if picks.len() != places.len() {
        return Err(TaskError::ArityMismatch {
            picks: picks.len(),
            places: places.len(),
        });
    }

    Ok(picks
        .iter()
        .zip(places)
        .flat_map(|(pick, place)| pick_and_place(pick, place, delta_z))
        .collect())
}

/// An object to move, with the grasp pose in the robot base frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: String,
    pub pose: Pose,
}

/// Where objects go.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    Stack(Pose),
    Pairwise(Vec<Pose>),
    Pallet(PalletSpec),
}

impl Placement {
    /// One target stacks everything on it; one target per object pairs them up.
    pub fn from_targets(targets: Vec<Pose>, object_count: usize) -> Result<Self, TaskError> {
        match targets.len() {
            1 => Ok(Placement::Stack(targets[0])),
            n if n == object_count => Ok(Placement::Pairwise(targets)),
            n => Err(TaskError::ArityMismatch {
                picks: object_count,
                places: n,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTask {
    pub items: Vec<TaskItem>,
    pub plans: Vec<ObjectPlacementPlan>,
    pub truncated: Option<TruncatedAllocation>,
}

impl CompiledTask {
    pub fn primitives(&self) -> Vec<Primitive> {
        self.items
            .iter()
            .flat_map(|item| item.primitives.iter().copied())
            .collect()
    }
}

pub fn compile_task(
    objects: &[SceneObject],
    placement: &Placement,
    params: &StackParams,
) -> Result<CompiledTask, TaskError> {
    let mut truncated = None;

    let places: Vec<Pose> = match placement {
        Placement::Stack(place) => (0..objects.len())
            .map(|i| stacked_place(place, i, params.layer_step_z, params.gap))
            .collect(),
        Placement::Pairwise(places) => {
            if places.len() != objects.len() {
                return Err(TaskError::ArityMismatch {
                    picks: objects.len(),
                    places: places.len(),
                });
            }
            places.clone()
        }
        Placement::Pallet(pallet) => {
            let cells = pallet.poses(Some(objects.len()));
            if cells.len() < objects.len() {
                let warning = TruncatedAllocation {
                    requested: objects.len(),
                    available: cells.len(),
                };
                warn!("{}", warning);
                truncated = Some(warning);
            }
            cells
        }
    };

    let objects = &objects[..places.len().min(objects.len())];
    let picks: Vec<Pose> = objects.iter().map(|o| o.pose).collect();

    let primitives = match placement {
        Placement::Stack(place) => {
            build_pick_place(&picks, place, params.delta_z, params.layer_step_z, params.gap)
        }
        _ => build_pick_place_pairwise(&picks, &places, params.delta_z)?,
    };

    let items = primitives
        .chunks(8)
        .enumerate()
        .map(|(object_index, chunk)| TaskItem {
            object_index,
            primitives: chunk.to_vec(),
        })
        .collect();

    let plans = objects
        .iter()
        .zip(&places)
        .map(|(object, place)| ObjectPlacementPlan {
            id: object.id.clone(),
            start_xyz: object.pose.xyz,
            end_xyz: place.xyz,
        })
        .collect();

    info!(
        "Compiled {} objects into {} primitives",
        objects.len(),
        primitives.len()
    );

    Ok(CompiledTask {
        items,
        plans,
        truncated,
    })
}
