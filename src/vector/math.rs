//! Dense vector arithmetic shared by the index, fusion and refinement.
//!
//! Every function here works on plain `f32` slices. Functions that produce a
//! vector meant to leave a component return it unit-length or fail with
//! [`VectorError::ZeroNorm`].

use crate::vector::types::{UNIT_NORM_TOLERANCE, VectorError};

/// Inner product of two equal-length slices.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Euclidean (L2) norm.
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Returns `true` when the vector has unit length within [`UNIT_NORM_TOLERANCE`].
pub fn is_unit(v: &[f32]) -> bool {
    (l2_norm(v) - 1.0).abs() <= UNIT_NORM_TOLERANCE
}

/// Normalizes a vector in place to unit length.
pub fn normalize_in_place(v: &mut [f32]) -> Result<(), VectorError> {
    if let Some(position) = v.iter().position(|x| !x.is_finite()) {
        return Err(VectorError::NonFinite { position });
    }

    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return Err(VectorError::ZeroNorm);
    }

    for x in v.iter_mut() {
        *x /= norm;
    }
    Ok(())
}

/// Returns a unit-length copy of `v`.
pub fn normalized(v: &[f32]) -> Result<Vec<f32>, VectorError> {
    let mut out = v.to_vec();
    normalize_in_place(&mut out)?;
    Ok(out)
}

/// Unweighted component-wise mean of equal-length vectors.
///
/// Returns `None` for an empty input.
pub fn mean<V: AsRef<[f32]>>(vectors: &[V]) -> Option<Vec<f32>> {
    let first = vectors.first()?.as_ref();
    let mut acc = vec![0.0f32; first.len()];

    for v in vectors {
        for (a, x) in acc.iter_mut().zip(v.as_ref()) {
            *a += *x;
        }
    }

    let n = vectors.len() as f32;
    for a in acc.iter_mut() {
        *a /= n;
    }
    Some(acc)
}

/// Computes `a·x + b·y` component-wise.
pub fn linear_combination(a: f32, x: &[f32], b: f32, y: &[f32]) -> Vec<f32> {
    debug_assert_eq!(x.len(), y.len(), "Vectors must have same dimension");
    x.iter().zip(y).map(|(xi, yi)| a * xi + b * yi).collect()
}

/// Unit vector with every component equal to `1/sqrt(dim)`.
///
/// Used as the defined fallback when an embedder cannot produce a vector.
pub fn uniform_unit_vector(dim: usize) -> Vec<f32> {
    if dim == 0 {
        return Vec::new();
    }
    let value = 1.0 / (dim as f32).sqrt();
    vec![value; dim]
}
