//! Style-matrix blending.
//!
//! Weighted linear combination of voice style matrices. Weights are
//! normalized to sum to one; the result is rescaled so its Frobenius norm
//! equals the weighted average of the inputs' norms, keeping the blended
//! voice at the same energy as its parents. Matrices with fewer rows than
//! the widest input are tiled.

use crate::error::{Result, TtsError};

use super::archive::NpyArray;

/// The only blend method with fully specified semantics.
pub const BLEND_METHOD_WEIGHTED_AVERAGE: &str = "weighted_average";

fn frobenius_norm(data: &[f32]) -> f64 {
    data.iter().map(|&v| (v as f64) * (v as f64)).sum::<f64>().sqrt()
}

/// Blend `(matrix, weight)` pairs into one style matrix.
pub fn blend_styles(inputs: &[(&NpyArray, f32)]) -> Result<NpyArray> {
    if inputs.is_empty() {
        return Err(TtsError::validation("voice blend needs at least one voice"));
    }
    let ncols = inputs[0].0.ncols();
    if inputs.iter().any(|(m, _)| m.ncols() != ncols) {
        return Err(TtsError::validation("blended voices must share a style dimension"));
    }
    let total: f32 = inputs.iter().map(|(_, w)| w.max(0.0)).sum();
    if total <= 0.0 {
        return Err(TtsError::validation("blend weights must sum to a positive value"));
    }

    let nrows = inputs.iter().map(|(m, _)| m.nrows()).max().unwrap_or(0);
    if nrows == 0 {
        return Err(TtsError::validation("blended voices are empty"));
    }

    let mut out = vec![0.0f32; nrows * ncols];
    let mut target_norm = 0.0f64;

    for (matrix, weight) in inputs {
        let w = weight.max(0.0) / total;
        target_norm += w as f64 * frobenius_norm(&matrix.data);
        let rows = matrix.nrows().max(1);
        for r in 0..nrows {
            let src = matrix.row(r % rows);
            let dst = &mut out[r * ncols..(r + 1) * ncols];
            for (d, s) in dst.iter_mut().zip(src) {
                *d += w * s;
            }
        }
    }

    // Rescale to the weighted-average energy of the parents.
    let raw_norm = frobenius_norm(&out);
    if raw_norm > 0.0 && target_norm > 0.0 {
        let scale = (target_norm / raw_norm) as f32;
        for v in &mut out {
            *v *= scale;
        }
    }

    Ok(NpyArray { shape: vec![nrows, ncols], data: out })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: usize, cols: usize, fill: f32) -> NpyArray {
        NpyArray { shape: vec![rows, cols], data: vec![fill; rows * cols] }
    }

    #[test]
    fn equal_blend_of_identical_voices_is_identity() {
        let a = matrix(4, 8, 2.0);
        let b = matrix(4, 8, 2.0);
        let blended = blend_styles(&[(&a, 0.5), (&b, 0.5)]).expect("blend");
        assert_eq!(blended.shape, vec![4, 8]);
        for v in &blended.data {
            assert!((v - 2.0).abs() < 1e-5);
        }
    }

    #[test]
    fn weights_are_normalized() {
        let a = matrix(2, 4, 1.0);
        let b = matrix(2, 4, 3.0);
        // Same ratios whether weights are (1, 3) or (0.25, 0.75).
        let x = blend_styles(&[(&a, 1.0), (&b, 3.0)]).expect("blend");
        let y = blend_styles(&[(&a, 0.25), (&b, 0.75)]).expect("blend");
        for (u, v) in x.data.iter().zip(y.data.iter()) {
            assert!((u - v).abs() < 1e-5);
        }
    }

    #[test]
    fn norm_matches_weighted_average_within_one_percent() {
        let a = NpyArray {
            shape: vec![2, 4],
            data: vec![1.0, -2.0, 3.0, 0.5, 2.0, 1.0, -1.0, 0.25],
        };
        let b = NpyArray {
            shape: vec![2, 4],
            data: vec![0.1, 0.9, -0.4, 2.0, 1.5, -0.7, 0.3, 1.1],
        };
        let (wa, wb) = (0.7f32, 0.3f32);
        let blended = blend_styles(&[(&a, wa), (&b, wb)]).expect("blend");

        let expected =
            wa as f64 * frobenius_norm(&a.data) + wb as f64 * frobenius_norm(&b.data);
        let actual = frobenius_norm(&blended.data);
        assert!(
            (actual - expected).abs() / expected < 0.01,
            "norm {actual} vs expected {expected}"
        );
    }

    #[test]
    fn shorter_matrix_tiles() {
        let a = matrix(4, 8, 1.0);
        let single = matrix(1, 8, 5.0);
        let blended = blend_styles(&[(&a, 0.5), (&single, 0.5)]).expect("blend");
        assert_eq!(blended.nrows(), 4);
    }

    #[test]
    fn rejects_mismatched_columns() {
        let a = matrix(2, 8, 1.0);
        let b = matrix(2, 4, 1.0);
        assert!(blend_styles(&[(&a, 0.5), (&b, 0.5)]).is_err());
    }

    #[test]
    fn rejects_zero_weights() {
        let a = matrix(2, 8, 1.0);
        assert!(blend_styles(&[(&a, 0.0)]).is_err());
    }
}
