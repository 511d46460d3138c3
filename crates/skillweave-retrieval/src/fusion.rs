//! Score normalization and fusion kernels

/// Z-score normalize: `(x - mean) / std` with population std.
///
/// A constant (or empty) list maps to all zeros.
#[must_use]
pub fn z_score(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if std == 0.0 || !std.is_finite() {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| (s - mean) / std).collect()
}

/// Logistic map into `[0, 1]`, stable for large magnitudes
#[inline]
#[must_use]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Fuse raw dense and sparse scores: `sigmoid(alpha * z(dense) + (1 - alpha) * z(sparse))`
#[must_use]
pub fn fuse(dense: &[f64], sparse: &[f64], alpha: f64) -> Vec<f64> {
    let dense = z_score(dense);
    let sparse = z_score(sparse);
    dense
        .iter()
        .zip(&sparse)
        .map(|(d, s)| sigmoid(alpha * d + (1.0 - alpha) * s))
        .collect()
}
