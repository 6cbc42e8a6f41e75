use crate::error::InvalidArgument;
use crate::types::{DHParameter, JointLimit, JointVector, KinematicsConfig, Pose};
use nalgebra::{DMatrix, DVector, Isometry3, Matrix4, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

/// The numerical solver seen by the planner.
///
/// `solve_ik` returns `None` when the solver does not converge. The planner never retries with
/// another seed; any restarts are the solver's own business.
pub trait KinematicModel {
    fn dof(&self) -> usize;

    fn solve_ik(&self, seed: &JointVector, target: &Pose) -> Option<JointVector>;

    fn forward_kinematics(&self, q: &JointVector) -> Result<Pose, InvalidArgument>;
}

impl<M: KinematicModel + ?Sized> KinematicModel for &M {
    fn dof(&self) -> usize {
        (**self).dof()
    }

    fn solve_ik(&self, seed: &JointVector, target: &Pose) -> Option<JointVector> {
        (**self).solve_ik(seed, target)
    }

    fn forward_kinematics(&self, q: &JointVector) -> Result<Pose, InvalidArgument> {
        (**self).forward_kinematics(q)
    }
}

impl<M: KinematicModel + ?Sized> KinematicModel for Box<M> {
    fn dof(&self) -> usize {
        (**self).dof()
    }

    fn solve_ik(&self, seed: &JointVector, target: &Pose) -> Option<JointVector> {
        (**self).solve_ik(seed, target)
    }

    fn forward_kinematics(&self, q: &JointVector) -> Result<Pose, InvalidArgument> {
        (**self).forward_kinematics(q)
    }
}

/// Damped-least-squares settings for [`DhArm::solve_ik`], read from `[kinematics.ik]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IkSettings {
    pub max_iterations: usize,
    pub position_tolerance: f64,
    pub orientation_tolerance: f64,
    pub damping: f64,
    /// Largest joint change per iteration, rad.
    pub max_step: f64,
    /// Extra attempts after the caller's seed fails, each with the base joint turned toward
    /// the target and offset by a multiple of `restart_step`.
    pub restarts: usize,
    pub restart_step: f64,
}

impl Default for IkSettings {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            position_tolerance: 1e-5,
            orientation_tolerance: 1e-4,
            damping: 0.05,
            max_step: 0.3,
            restarts: 6,
            restart_step: 0.5,
        }
    }
}

/// Serial arm described by standard DH parameters, with a base offset and a tool offset along
/// the flange z axis.
#[derive(Debug, Clone)]
pub struct DhArm {
    dh_params: Vec<DHParameter>,
    limits: Vec<JointLimit>,
    base_offset: Vector3<f64>,
    tool_offset: f64,
    ik: IkSettings,
}

impl DhArm {
    pub fn new(config: &KinematicsConfig) -> Result<Self, InvalidArgument> {
        if config.dh_parameters.len() != config.joint_limits.len() {
            return Err(InvalidArgument::length_mismatch(
                "joint limits",
                config.dh_parameters.len(),
                config.joint_limits.len(),
            ));
        }

        Ok(Self {
            dh_params: config.dh_parameters.clone(),
            limits: config.joint_limits.clone(),
            base_offset: Vector3::new(
                config.base_offset[0],
                config.base_offset[1],
                config.base_offset[2],
            ),
            tool_offset: config.tool_offset,
            ik: config.ik,
        })
    }

    fn check_len(&self, q: &[f64]) -> Result<(), InvalidArgument> {
        if q.len() != self.dh_params.len() {
            return Err(InvalidArgument::length_mismatch(
                "joint vector",
                self.dh_params.len(),
                q.len(),
            ));
        }
        Ok(())
    }

    fn dh_transformation(a: f64, alpha: f64, d: f64, theta: f64) -> Matrix4<f64> {
        let (sin_theta, cos_theta) = theta.sin_cos();
        let (sin_alpha, cos_alpha) = alpha.sin_cos();

        #[rustfmt::skip]
        let m = Matrix4::new(
            cos_theta, -sin_theta * cos_alpha,  sin_theta * sin_alpha, a * cos_theta,
            sin_theta,  cos_theta * cos_alpha, -cos_theta * sin_alpha, a * sin_theta,
            0.0,        sin_alpha,              cos_alpha,             d,
            0.0,        0.0,                    0.0,                   1.0,
        );
        m
    }

    /// Base frame followed by the frame after every joint. The tool offset is applied to the
    /// last entry.
    fn chain(&self, q: &[f64]) -> Vec<Matrix4<f64>> {
        let mut transform = Matrix4::identity();
        transform[(0, 3)] = self.base_offset.x;
        transform[(1, 3)] = self.base_offset.y;
        transform[(2, 3)] = self.base_offset.z;

        let mut frames = Vec::with_capacity(q.len() + 1);
        frames.push(transform);

        for (dh, angle) in self.dh_params.iter().zip(q) {
            transform *= Self::dh_transformation(dh.a, dh.alpha, dh.d, angle + dh.theta);
            frames.push(transform);
        }

        if let Some(last) = frames.last_mut() {
            *last *= Matrix4::new_translation(&Vector3::new(0.0, 0.0, self.tool_offset));
        }
        frames
    }

    fn end_effector(&self, q: &[f64]) -> Matrix4<f64> {
        self.chain(q).pop().unwrap_or_else(Matrix4::identity)
    }

    /// Geometric Jacobian (linear rows first) at `q`, in the base frame.
    pub fn compute_jacobian(&self, q: &[f64]) -> Result<DMatrix<f64>, InvalidArgument> {
        self.check_len(q)?;
        Ok(Self::jacobian_from_chain(&self.chain(q)))
    }

    fn jacobian_from_chain(frames: &[Matrix4<f64>]) -> DMatrix<f64> {
        let n_joints = frames.len() - 1;
        let mut jacobian = DMatrix::zeros(6, n_joints);
        let ee = &frames[n_joints];
        let ee_position = Vector3::new(ee[(0, 3)], ee[(1, 3)], ee[(2, 3)]);

        for (i, frame) in frames.iter().take(n_joints).enumerate() {
            let joint_position = Vector3::new(frame[(0, 3)], frame[(1, 3)], frame[(2, 3)]);
            let joint_axis = Vector3::new(frame[(0, 2)], frame[(1, 2)], frame[(2, 2)]);

            let linear = joint_axis.cross(&(ee_position - joint_position));
            jacobian[(0, i)] = linear.x;
            jacobian[(1, i)] = linear.y;
            jacobian[(2, i)] = linear.z;
            jacobian[(3, i)] = joint_axis.x;
            jacobian[(4, i)] = joint_axis.y;
            jacobian[(5, i)] = joint_axis.z;
        }

        jacobian
    }

    fn clamp_to_limits(&self, q: &mut DVector<f64>) {
        for (value, limit) in q.iter_mut().zip(&self.limits) {
            *value = value.clamp(limit.min_angle, limit.max_angle);
        }
    }

    /// The caller's seed, then the same seed with the base joint pointing at the target and
    /// swung alternately to either side of that heading.
    fn seeds(&self, seed: &JointVector, target: &Pose) -> Vec<DVector<f64>> {
        let start = seed.to_dvector();
        let mut seeds = vec![start.clone()];
        let (Some(base), Some(limit)) = (self.dh_params.first(), self.limits.first()) else {
            return seeds;
        };

        let heading = (target.xyz[1] - self.base_offset.y).atan2(target.xyz[0] - self.base_offset.x);
        let heading = wrap_angle(heading - base.theta);

        for k in 0..=self.ik.restarts {
            for side in [1.0, -1.0] {
                if k == 0 && side < 0.0 {
                    continue;
                }
                let angle = wrap_angle(heading + side * k as f64 * self.ik.restart_step);
                let mut q = start.clone();
                q[0] = angle.clamp(limit.min_angle, limit.max_angle);
                seeds.push(q);
            }
        }
        seeds
    }

    fn solve_from(&self, mut q: DVector<f64>, target: &Isometry3<f64>) -> Option<JointVector> {
        let damping_sq = self.ik.damping * self.ik.damping;
        self.clamp_to_limits(&mut q);

        for _ in 0..self.ik.max_iterations {
            let frames = self.chain(q.as_slice());
            let error = Self::pose_error(&frames[frames.len() - 1], target);

            if error.rows(0, 3).norm() < self.ik.position_tolerance
                && error.rows(3, 3).norm() < self.ik.orientation_tolerance
            {
                return Some(JointVector::from_dvector(&q));
            }

            let jacobian = Self::jacobian_from_chain(&frames);
            let jjt = &jacobian * jacobian.transpose() + DMatrix::identity(6, 6) * damping_sq;
            let mut dq = jacobian.transpose() * jjt.lu().solve(&error)?;

            let largest = dq.amax();
            if largest > self.ik.max_step {
                dq *= self.ik.max_step / largest;
            }

            q += dq;
            self.clamp_to_limits(&mut q);
        }

        None
    }

    /// Position error followed by rotation-vector error, both in the base frame.
    fn pose_error(current: &Matrix4<f64>, target: &Isometry3<f64>) -> DVector<f64> {
        let position = Vector3::new(current[(0, 3)], current[(1, 3)], current[(2, 3)]);
        let rotation =
            Rotation3::from_matrix_unchecked(current.fixed_view::<3, 3>(0, 0).into_owned());

        let dp = target.translation.vector - position;
        let dr = (target.rotation.to_rotation_matrix() * rotation.transpose()).scaled_axis();
        DVector::from_column_slice(&[dp.x, dp.y, dp.z, dr.x, dr.y, dr.z])
    }
}

impl KinematicModel for DhArm {
    fn dof(&self) -> usize {
        self.dh_params.len()
    }

    fn solve_ik(&self, seed: &JointVector, target: &Pose) -> Option<JointVector> {
        if self.check_len(seed).is_err() {
            return None;
        }

        let target_iso = target.to_isometry();
        self.seeds(seed, target)
            .into_iter()
            .enumerate()
            .find_map(|(attempt, q)| {
                let solution = self.solve_from(q, &target_iso)?;
                if attempt > 0 {
                    debug!("IK for {} converged on restart {}", target, attempt);
                }
                Some(solution)
            })
    }

    fn forward_kinematics(&self, q: &JointVector) -> Result<Pose, InvalidArgument> {
        self.check_len(q)?;
        let ee = self.end_effector(q);
        let rotation = Rotation3::from_matrix_unchecked(ee.fixed_view::<3, 3>(0, 0).into_owned());
        let iso = Isometry3::from_parts(
            Translation3::new(ee[(0, 3)], ee[(1, 3)], ee[(2, 3)]),
            UnitQuaternion::from_rotation_matrix(&rotation),
        );
        Ok(Pose::from_isometry(&iso))
    }
}

fn wrap_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

/// Six-axis model whose joint vector is the pose itself (`[x, y, z, roll, pitch, yaw]`).
///
/// Stands in for a gantry or for the real solver in tests. IK fails outside `reach`
/// (distance from the origin).
#[derive(Debug, Clone, Copy)]
pub struct DirectCartesianModel {
    reach: f64,
}

impl DirectCartesianModel {
    pub fn new() -> Self {
        Self { reach: f64::INFINITY }
    }

    pub fn with_reach(reach: f64) -> Self {
        Self { reach }
    }
}

impl Default for DirectCartesianModel {
    fn default() -> Self {
        Self::new()
    }
}

impl KinematicModel for DirectCartesianModel {
    fn dof(&self) -> usize {
        6
    }

    fn solve_ik(&self, _seed: &JointVector, target: &Pose) -> Option<JointVector> {
        let distance = Vector3::from(target.xyz).norm();
        (distance <= self.reach).then(|| JointVector::new(target.to_array().to_vec()))
    }

    fn forward_kinematics(&self, q: &JointVector) -> Result<Pose, InvalidArgument> {
        let values: [f64; 6] = q
            .as_slice()
            .try_into()
            .map_err(|_| InvalidArgument::length_mismatch("joint vector", 6, q.len()))?;
        Ok(Pose::from_array(values))
    }
}
