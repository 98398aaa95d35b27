//! Cosine distance between embedding vectors.

use crate::error::{VectorError, VectorResult};

/// Cosine distance `1 − (a·b)/(‖a‖·‖b‖)`, in `[0, 2]`.
///
/// Both vectors must have the same length and a non-zero norm. A violation
/// means the index holds vectors from different models or the backend
/// returned garbage; it is reported as an error, never as a degenerate
/// distance.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> VectorResult<f32> {
    if a.len() != b.len() {
        return Err(VectorError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    // f64 sums keep `d(v, v)` at zero for a few hundred dims.
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 {
        return Err(VectorError::ZeroNorm { side: "left" });
    }
    if norm_b == 0.0 {
        return Err(VectorError::ZeroNorm { side: "right" });
    }

    let cosine = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    Ok((1.0 - cosine) as f32)
}

/// Whether a vector can be stored in the index at all.
pub fn is_storable(v: &[f32]) -> bool {
    v.iter().any(|&x| x != 0.0) && v.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_distance_is_zero() {
        let v = [0.3, -1.2, 4.0, 0.0, 7.5];
        let d = cosine_distance(&v, &v).unwrap();
        assert!(d.abs() < 1e-6, "d(v, v) = {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = [1.0, 2.0, 3.0];
        let b = [-2.0, 0.5, 1.0];
        let ab = cosine_distance(&a, &b).unwrap();
        let ba = cosine_distance(&b, &a).unwrap();
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_and_opposite() {
        let d = cosine_distance(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!((d - 1.0).abs() < 1e-6);
        let d = cosine_distance(&[1.0, 1.0], &[-1.0, -1.0]).unwrap();
        assert!((d - 2.0).abs() < 1e-6);
    }

    #[test]
    fn scale_does_not_matter() {
        let d = cosine_distance(&[1.0, 2.0], &[10.0, 20.0]).unwrap();
        assert!(d.abs() < 1e-6);
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = cosine_distance(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert_eq!(err, VectorError::LengthMismatch { left: 2, right: 1 });
    }

    #[test]
    fn rejects_zero_norm() {
        assert_eq!(
            cosine_distance(&[0.0, 0.0], &[1.0, 0.0]).unwrap_err(),
            VectorError::ZeroNorm { side: "left" }
        );
        assert_eq!(
            cosine_distance(&[1.0, 0.0], &[0.0, 0.0]).unwrap_err(),
            VectorError::ZeroNorm { side: "right" }
        );
        // Empty vectors have zero norm too.
        assert!(cosine_distance(&[], &[]).is_err());
    }

    #[test]
    fn storable_vectors() {
        assert!(is_storable(&[0.0, 0.1]));
        assert!(!is_storable(&[0.0, 0.0]));
        assert!(!is_storable(&[]));
        assert!(!is_storable(&[1.0, f32::NAN]));
    }
}
