//! Speed-limited joint-space planner.
//!
//! Every move is a quintic blend `s(t) = 10t^3 - 15t^4 + 6t^5`, which has zero velocity and
//! acceleration at both ends, so consecutive moves chain without jerk spikes. The duration is
//! set by the joint that has to travel farthest, moving at a uniform speed ceiling.

use crate::error::{InvalidArgument, PlanError};
use crate::types::{JointVector, Pose};
use crate::utils::KinematicModel;
use tracing::debug;

/// Lower bound applied to `speed_scale`.
pub const MIN_SPEED_SCALE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub enum Goal {
    Cartesian(Pose),
    Joint(JointVector),
}

pub struct TrajectoryPlanner<M> {
    model: M,
    joint_speed_limit: f64,
}

impl<M: KinematicModel> TrajectoryPlanner<M> {
    /// `joint_speed_limit` in rad/s, applied to every joint.
    pub fn new(model: M, joint_speed_limit: f64) -> Result<Self, InvalidArgument> {
        if !(joint_speed_limit.is_finite() && joint_speed_limit > 0.0) {
            return Err(InvalidArgument::new(format!(
                "joint speed limit must be positive, got {joint_speed_limit}"
            )));
        }
        Ok(Self {
            model,
            joint_speed_limit,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn joint_speed_limit(&self) -> f64 {
        self.joint_speed_limit
    }

    /// Seconds needed for the largest joint delta at the scaled speed ceiling.
    pub fn move_time(&self, max_joint_delta: f64, speed_scale: f64) -> f64 {
        max_joint_delta / (self.joint_speed_limit * speed_scale.clamp(MIN_SPEED_SCALE, 1.0))
    }

    /// Joint-space target for `goal`, solving IK from `current` when needed.
    pub fn resolve(&self, current: &JointVector, goal: &Goal) -> Result<JointVector, PlanError> {
        let dof = self.model.dof();
        if current.len() != dof {
            return Err(InvalidArgument::length_mismatch("current joints", dof, current.len()).into());
        }

        match goal {
            Goal::Cartesian(pose) => self
                .model
                .solve_ik(current, pose)
                .filter(|q| q.len() == dof)
                .ok_or(PlanError::IkFailure { pose: *pose }),
            Goal::Joint(q) if q.len() == dof => Ok(q.clone()),
            Goal::Joint(q) => Err(InvalidArgument::length_mismatch("joint goal", dof, q.len()).into()),
        }
    }

    /// Samples a smooth move from `current` to `goal`.
    ///
    /// The result excludes `current`, ends exactly on the target and has at least two points.
    /// Nothing is returned on failure.
    pub fn plan(
        &self,
        current: &JointVector,
        goal: &Goal,
        dt: f64,
        speed_scale: f64,
    ) -> Result<Vec<JointVector>, PlanError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(InvalidArgument::new(format!("dt must be positive, got {dt}")).into());
        }

        let target = self.resolve(current, goal)?;
        let max_delta = current.max_abs_delta(&target);
        let move_time = self.move_time(max_delta, speed_scale);
        let steps = step_count(move_time, dt);

        debug!(
            "Planned move: max delta {:.4} rad, {:.3} s, {} steps",
            max_delta, move_time, steps
        );

        Ok(interpolate(current, &target, steps))
    }
}

pub fn step_count(move_time: f64, dt: f64) -> usize {
    let raw = (move_time / dt).round();
    if raw.is_finite() && raw > 2.0 {
        raw as usize
    } else {
        2
    }
}

pub fn quintic_blend(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * t * (10.0 + t * (-15.0 + 6.0 * t))
}

/// `steps` samples at `t = k/steps`, `k = 1..=steps`. The last sample is `end` itself.
pub fn interpolate(start: &JointVector, end: &JointVector, steps: usize) -> Vec<JointVector> {
    let steps = steps.max(1);
    let mut points = Vec::with_capacity(steps);

    for k in 1..steps {
        let s = quintic_blend(k as f64 / steps as f64);
        points.push(JointVector::new(
            start
                .iter()
                .zip(end.iter())
                .map(|(a, b)| a + (b - a) * s)
                .collect(),
        ));
    }
    points.push(end.clone());
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::DirectCartesianModel;
    use proptest::prelude::*;

    const DT: f64 = 0.016;

    fn planner() -> TrajectoryPlanner<DirectCartesianModel> {
        TrajectoryPlanner::new(DirectCartesianModel::with_reach(2.0), 98f64.to_radians()).unwrap()
    }

    #[test]
    fn test_step_count_uses_rounding_and_floor_of_two() {
        assert_eq!(step_count(0.0, DT), 2);
        assert_eq!(step_count(0.02, DT), 2);
        assert_eq!(step_count(0.1, 0.02), 5);
        assert_eq!(step_count(0.109, 0.02), 5);
        assert_eq!(step_count(0.111, 0.02), 6);
    }

    #[test]
    fn test_move_time_clamps_speed_scale() {
        let p = planner();
        let limit = p.joint_speed_limit();
        assert!((p.move_time(1.0, 5.0) - 1.0 / limit).abs() < 1e-12);
        assert!((p.move_time(1.0, 0.0) - 1.0 / (limit * MIN_SPEED_SCALE)).abs() < 1e-9);
    }

    #[test]
    fn test_quintic_boundaries() {
        assert_eq!(quintic_blend(0.0), 0.0);
        assert_eq!(quintic_blend(1.0), 1.0);
        assert!((quintic_blend(0.5) - 0.5).abs() < 1e-12);
        // Zero slope at both ends.
        let h = 1e-6;
        assert!(quintic_blend(h) / h < 1e-9);
        assert!((1.0 - quintic_blend(1.0 - h)) / h < 1e-9);
    }

    #[test]
    fn test_cartesian_goal_is_solved() {
        let p = planner();
        let current = JointVector::zeros(6);
        let pose = Pose::new([0.5, 0.0, 0.5], [0.0, 0.0, 0.0]);
        let points = p.plan(&current, &Goal::Cartesian(pose), DT, 1.0).unwrap();
        assert_eq!(points.last().unwrap().as_slice(), &pose.to_array());
    }

    #[test]
    fn test_unreachable_goal_is_ik_failure() {
        let p = planner();
        let pose = Pose::new([3.0, 0.0, 0.0], [0.0, 0.0, 0.0]);
        let err = p
            .plan(&JointVector::zeros(6), &Goal::Cartesian(pose), DT, 1.0)
            .unwrap_err();
        assert_eq!(err, PlanError::IkFailure { pose });
    }

    #[test]
    fn test_bad_dimensions_rejected() {
        let p = planner();
        let err = p
            .plan(&JointVector::zeros(5), &Goal::Joint(JointVector::zeros(6)), DT, 1.0)
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidArgument(_)));
        let err = p
            .plan(&JointVector::zeros(6), &Goal::Joint(JointVector::zeros(6)), 0.0, 1.0)
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidArgument(_)));
    }

    #[test]
    fn test_zero_length_move_still_has_two_points() {
        let p = planner();
        let q = JointVector::new(vec![0.1; 6]);
        let points = p.plan(&q, &Goal::Joint(q.clone()), DT, 0.5).unwrap();
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|point| point == &q));
    }

    #[test]
    fn test_step_count_follows_slowest_joint() {
        let p = planner();
        let current = JointVector::zeros(6);
        let goal = JointVector::new(vec![0.0, 1.0, 0.0, 0.2, 0.0, 0.0]);
        let points = p.plan(&current, &Goal::Joint(goal), DT, 0.5).unwrap();
        let expected = step_count(1.0 / (p.joint_speed_limit() * 0.5), DT);
        assert_eq!(points.len(), expected);
    }

    proptest! {
        #[test]
        fn prop_plan_shape(
            start in prop::collection::vec(-1.0f64..1.0, 6),
            delta in prop::collection::vec(0.01f64..1.0, 6),
            scale in 0.2f64..1.0,
        ) {
            let p = planner();
            let current = JointVector::new(start.clone());
            let target = JointVector::new(start.iter().zip(&delta).map(|(a, d)| a + d).collect());
            let points = p.plan(&current, &Goal::Joint(target.clone()), DT, scale).unwrap();

            prop_assert!(points.len() >= 2);
            prop_assert_eq!(points.last().unwrap(), &target);
            prop_assert!(points[0] != current);
        }

        #[test]
        fn prop_faster_scale_never_slower(delta in 0.0f64..6.0, scale in 0.001f64..0.5) {
            let p = planner();
            prop_assert!(p.move_time(delta, scale * 2.0) <= p.move_time(delta, scale));
        }
    }
}
