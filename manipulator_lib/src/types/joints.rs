use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, Index};

/// Ordered joint angles in radians, in the order the robot declares its joint names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointVector(Vec<f64>);

impl JointVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    /// Largest absolute per-joint difference. Lengths must already match.
    pub fn max_abs_delta(&self, other: &JointVector) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    pub fn to_dvector(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.0)
    }

    pub fn from_dvector(v: &DVector<f64>) -> Self {
        Self(v.iter().copied().collect())
    }
}

impl Deref for JointVector {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl Index<usize> for JointVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl From<Vec<f64>> for JointVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl From<&[f64]> for JointVector {
    fn from(values: &[f64]) -> Self {
        Self(values.to_vec())
    }
}
