use crate::common::{FaceAuthError, Result};

pub type Descriptor = Vec<f32>;

pub const DEFAULT_THRESHOLD: f32 = 0.55;
pub const DEFAULT_CONFIDENCE_SCALE: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Match,
    NoMatch,
}

impl Decision {
    pub fn is_match(self) -> bool {
        self == Decision::Match
    }
}

/// Euclidean distance between two descriptors of the same extractor.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(FaceAuthError::DimensionMismatch {
            expected: a.len(),
            found: b.len(),
        });
    }

    let sum: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    Ok(sum.sqrt())
}

/// `Match` only when strictly below the threshold.
pub fn decide(distance: f32, threshold: f32) -> Decision {
    if distance < threshold {
        Decision::Match
    } else {
        Decision::NoMatch
    }
}

/// Display heuristic in 0..=100, decreasing with distance. Not used for the decision.
pub fn confidence_score(distance: f32, scale: f32) -> f32 {
    ((1.0 - distance / scale) * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_symmetric_and_zero_on_self() {
        let a = vec![0.1, -0.4, 0.25, 0.9];
        let b = vec![0.3, 0.2, -0.5, 0.0];
        assert_eq!(euclidean_distance(&a, &b).unwrap(), euclidean_distance(&b, &a).unwrap());
        assert_eq!(euclidean_distance(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn unit_cube_diagonal() {
        let d = euclidean_distance(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0]).unwrap();
        assert!((d - 3f32.sqrt()).abs() < 1e-6);
        assert_eq!(decide(d, DEFAULT_THRESHOLD), Decision::NoMatch);
    }

    #[test]
    fn length_mismatch_is_reported() {
        let err = euclidean_distance(&[0.0; 128], &[0.0; 64]).unwrap_err();
        assert!(matches!(err, FaceAuthError::DimensionMismatch { expected: 128, found: 64 }));
    }

    #[test]
    fn threshold_is_strict() {
        assert!(decide(0.54, 0.55).is_match());
        assert_eq!(decide(0.55, 0.55), Decision::NoMatch);
        assert_eq!(decide(0.56, 0.55), Decision::NoMatch);
        assert!(decide(0.0, DEFAULT_THRESHOLD).is_match());
    }

    #[test]
    fn confidence_is_clamped_and_monotonic() {
        assert_eq!(confidence_score(0.0, DEFAULT_CONFIDENCE_SCALE), 100.0);
        assert_eq!(confidence_score(0.8, DEFAULT_CONFIDENCE_SCALE), 0.0);
        assert_eq!(confidence_score(2.0, DEFAULT_CONFIDENCE_SCALE), 0.0);
        assert!((confidence_score(0.4, DEFAULT_CONFIDENCE_SCALE) - 50.0).abs() < 1e-4);

        let mut last = f32::MAX;
        for step in 0..20 {
            let c = confidence_score(step as f32 * 0.05, DEFAULT_CONFIDENCE_SCALE);
            assert!(c <= last);
            last = c;
        }
    }
}
