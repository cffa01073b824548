//! Vector distance used for nearest-neighbor ranking.
//!
//! Euclidean (L2) distance, the same metric as pgvector's `<->` operator, so
//! the in-memory and Postgres backends rank neighbors identically.

/// Euclidean distance between two vectors.
///
/// Returns `None` when the dimensions differ.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }
    Some(squared_euclidean(a, b).sqrt())
}

/// Squared Euclidean distance. Caller guarantees equal lengths.
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance() {
        let d = euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!((d - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_euclidean_distance_identical_is_zero() {
        assert_eq!(euclidean_distance(&[1.5, -2.0], &[1.5, -2.0]), Some(0.0));
    }

    #[test]
    fn test_euclidean_distance_dimension_mismatch() {
        assert!(euclidean_distance(&[1.0], &[1.0, 2.0]).is_none());
    }
}
