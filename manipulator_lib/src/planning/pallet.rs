use crate::error::{InvalidArgument, TaskError};
use crate::types::Pose;
use std::fmt;
use std::str::FromStr;

/// Grid iteration order, outermost axis first. `Zxy` fills layer by layer, then row, then column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisOrder {
    Xyz,
    Xzy,
    Yxz,
    Yzx,
    #[default]
    Zxy,
    Zyx,
}

impl AxisOrder {
    /// Axis indices (0 = x, 1 = y, 2 = z) from outermost to innermost.
    pub fn axes(&self) -> [usize; 3] {
        match self {
            AxisOrder::Xyz => [0, 1, 2],
            AxisOrder::Xzy => [0, 2, 1],
            AxisOrder::Yxz => [1, 0, 2],
            AxisOrder::Yzx => [1, 2, 0],
            AxisOrder::Zxy => [2, 0, 1],
            AxisOrder::Zyx => [2, 1, 0],
        }
    }
}

impl FromStr for AxisOrder {
    type Err = InvalidArgument;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xyz" => Ok(AxisOrder::Xyz),
            "xzy" => Ok(AxisOrder::Xzy),
            "yxz" => Ok(AxisOrder::Yxz),
            "yzx" => Ok(AxisOrder::Yzx),
            "zxy" => Ok(AxisOrder::Zxy),
            "zyx" => Ok(AxisOrder::Zyx),
            other => Err(InvalidArgument::new(format!(
                "unknown axis order '{other}', expected one of xyz, xzy, yxz, yzx, zxy, zyx"
            ))),
        }
    }
}

impl fmt::Display for AxisOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AxisOrder::Xyz => "xyz",
            AxisOrder::Xzy => "xzy",
            AxisOrder::Yxz => "yxz",
            AxisOrder::Yzx => "yzx",
            AxisOrder::Zxy => "zxy",
            AxisOrder::Zyx => "zyx",
        };
        f.write_str(name)
    }
}

/// A validated pallet grid. Built once through [`PalletSpec::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct PalletSpec {
    origin: [f64; 3],
    rpy: [f64; 3],
    counts: [usize; 3],
    steps: [f64; 3],
    order: AxisOrder,
}

impl PalletSpec {
    pub fn new(
        origin: [f64; 3],
        rpy: [f64; 3],
        counts: [usize; 3],
        steps: [f64; 3],
        order: AxisOrder,
    ) -> Result<Self, TaskError> {
        if counts.iter().any(|&n| n == 0) {
            return Err(InvalidArgument::new(format!(
                "pallet cell counts must be at least 1, got {counts:?}"
            ))
            .into());
        }
        if origin.iter().chain(&rpy).chain(&steps).any(|v| !v.is_finite()) {
            return Err(InvalidArgument::new("pallet geometry must be finite").into());
        }

        Ok(Self {
            origin,
            rpy,
            counts,
            steps,
            order,
        })
    }

    pub fn capacity(&self) -> usize {
        self.counts.iter().product()
    }

    pub fn order(&self) -> AxisOrder {
        self.order
    }

    /// Cell-center poses in iteration order, at most `limit` of them.
    pub fn poses(&self, limit: Option<usize>) -> Vec<Pose> {
        generate_pallet_poses(
            self.origin,
            self.rpy,
            self.counts,
            self.steps,
            self.order,
            limit,
        )
    }
}

/// Enumerates `origin + (i*sx, j*sy, k*sz)` for every cell, all with orientation `rpy`.
pub fn generate_pallet_poses(
    origin: [f64; 3],
    rpy: [f64; 3],
    counts: [usize; 3],
    steps: [f64; 3],
    order: AxisOrder,
    limit: Option<usize>,
) -> Vec<Pose> {
    let [outer, middle, inner] = order.axes();
    let total: usize = counts.iter().product();
    let wanted = limit.map_or(total, |l| l.min(total));
    let mut poses = Vec::with_capacity(wanted);

    'grid: for a in 0..counts[outer] {
        for b in 0..counts[middle] {
            for c in 0..counts[inner] {
                if poses.len() == wanted {
                    break 'grid;
                }
                let mut index = [0usize; 3];
                index[outer] = a;
                index[middle] = b;
                index[inner] = c;

                let xyz = [
                    origin[0] + index[0] as f64 * steps[0],
                    origin[1] + index[1] as f64 * steps[1],
                    origin[2] + index[2] as f64 * steps[2],
                ];
                poses.push(Pose::new(xyz, rpy));
            }
        }
    }

    poses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_by_two_zxy() {
        let rpy = [3.14159, 0.0, 0.0];
        let poses = generate_pallet_poses(
            [0.0, 0.0, 0.0],
            rpy,
            [2, 2, 1],
            [0.1, 0.1, 0.0],
            AxisOrder::Zxy,
            None,
        );

        let xy: Vec<(f64, f64)> = poses.iter().map(|p| (p.x(), p.y())).collect();
        assert_eq!(xy, vec![(0.0, 0.0), (0.0, 0.1), (0.1, 0.0), (0.1, 0.1)]);
        assert!(poses.iter().all(|p| p.rpy == rpy && p.z() == 0.0));
    }

    #[test]
    fn test_order_changes_iteration() {
        let poses = generate_pallet_poses(
            [1.0, 2.0, 0.5],
            [0.0; 3],
            [2, 1, 2],
            [0.2, 0.0, 0.05],
            AxisOrder::Xyz,
            None,
        );
        let xz: Vec<(f64, f64)> = poses.iter().map(|p| (p.x(), p.z())).collect();
        assert_eq!(xz, vec![(1.0, 0.5), (1.0, 0.55), (1.2, 0.5), (1.2, 0.55)]);

        let layered = generate_pallet_poses(
            [1.0, 2.0, 0.5],
            [0.0; 3],
            [2, 1, 2],
            [0.2, 0.0, 0.05],
            AxisOrder::Zxy,
            None,
        );
        let xz: Vec<(f64, f64)> = layered.iter().map(|p| (p.x(), p.z())).collect();
        assert_eq!(xz, vec![(1.0, 0.5), (1.2, 0.5), (1.0, 0.55), (1.2, 0.55)]);
    }

    #[test]
    fn test_limit_truncates() {
        let spec = PalletSpec::new([0.0; 3], [0.0; 3], [3, 3, 2], [0.1; 3], AxisOrder::Zyx).unwrap();
        assert_eq!(spec.capacity(), 18);
        assert_eq!(spec.poses(Some(5)).len(), 5);
        assert_eq!(spec.poses(Some(50)).len(), 18);
    }

    #[test]
    fn test_zero_count_rejected() {
        let err = PalletSpec::new([0.0; 3], [0.0; 3], [2, 0, 1], [0.1; 3], AxisOrder::Zxy).unwrap_err();
        assert!(matches!(err, TaskError::InvalidArgument(_)));
    }

    #[test]
    fn test_axis_order_parsing() {
        for name in ["xyz", "xzy", "yxz", "yzx", "zxy", "zyx"] {
            let order: AxisOrder = name.parse().unwrap();
            assert_eq!(order.to_string(), name);
        }
        assert!("xxy".parse::<AxisOrder>().is_err());
        assert_eq!(AxisOrder::default(), AxisOrder::Zxy);
    }
}
