use crate::error::InvalidArgument;

/// Euclidean norm of `current - target`.
pub fn joint_distance(current: &[f64], target: &[f64]) -> Result<f64, InvalidArgument> {
    if current.len() != target.len() {
        return Err(InvalidArgument::length_mismatch(
            "target joint vector",
            current.len(),
            target.len(),
        ));
    }

    Ok(current
        .iter()
        .zip(target)
        .map(|(c, t)| (c - t) * (c - t))
        .sum::<f64>()
        .sqrt())
}

/// True iff the joint-space distance is strictly below `tolerance`.
///
/// There is no default tolerance; each call site picks its own (0.05 rad for task playback,
/// 0.01 rad for precise following, down to 0.005).
pub fn target_reached(current: &[f64], target: &[f64], tolerance: f64) -> Result<bool, InvalidArgument> {
    Ok(joint_distance(current, target)? < tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strictly_less_than_tolerance() {
        let current = [0.0, 0.0];
        let target = [0.0, 0.5];
        assert!(!target_reached(&current, &target, 0.5).unwrap());
        assert!(target_reached(&current, &target, 0.5000001).unwrap());
    }

    #[test]
    fn test_length_mismatch_is_invalid_argument() {
        let err = target_reached(&[0.0; 7], &[0.0; 6], 0.05).unwrap_err();
        assert!(err.to_string().contains("expected 7"));
    }

    fn pair() -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
        (1usize..8).prop_flat_map(|n| {
            (
                prop::collection::vec(-3.0f64..3.0, n),
                prop::collection::vec(-3.0f64..3.0, n),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_symmetric_in_sign((a, b) in pair(), tol in 0.0f64..2.0) {
            prop_assert_eq!(
                target_reached(&a, &b, tol).unwrap(),
                target_reached(&b, &a, tol).unwrap()
            );
        }

        #[test]
        fn prop_monotonic_in_tolerance((a, b) in pair(), tol in 0.0f64..2.0, extra in 0.0f64..1.0) {
            if target_reached(&a, &b, tol).unwrap() {
                prop_assert!(target_reached(&a, &b, tol + extra).unwrap());
            }
        }
    }
}
