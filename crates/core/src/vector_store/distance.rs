/// Floor applied to vector norms before dividing, so zero vectors never produce NaN.
pub const NORM_FLOOR: f32 = 1e-9;

#[inline]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vector dimensions must match");

    // Unrolled by four so release builds auto-vectorize.
    let mut sum = 0.0f32;
    let chunks = a.len() / 4;
    for i in 0..chunks {
        let base = i * 4;
        sum += a[base] * b[base]
            + a[base + 1] * b[base + 1]
            + a[base + 2] * b[base + 2]
            + a[base + 3] * b[base + 3];
    }
    for i in (chunks * 4)..a.len() {
        sum += a[i] * b[i];
    }
    sum
}

#[inline]
pub fn l2_norm(vector: &[f32]) -> f32 {
    inner_product(vector, vector).sqrt()
}

/// Norm used as a divisor: zero norms are replaced by [`NORM_FLOOR`].
#[inline]
pub fn safe_norm(vector: &[f32]) -> f32 {
    let norm = l2_norm(vector);
    if norm == 0.0 {
        NORM_FLOOR
    } else {
        norm
    }
}

/// Returns a unit-length copy of `vector`. Zero vectors come back unchanged.
pub fn normalized(vector: &[f32]) -> Vec<f32> {
    let norm = l2_norm(vector);
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|value| value / norm).collect()
}
