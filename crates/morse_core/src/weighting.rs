use nalgebra::Matrix2;

use crate::traits::PlanarMap;

/// Diagnostic weighting `+1, -1, +1, ...` over nodes in insertion order.
pub fn alternating_weights(node_count: usize) -> Vec<f64> {
    (0..node_count)
        .map(|node| if node % 2 == 0 { 1.0 } else { -1.0 })
        .collect()
}

/// Local expansion rate of `map` at `(x, y)`: half the log of the largest
/// eigenvalue of the Gram matrix `B = J^T J`, a one-step stretching factor
/// in the most expanded direction.
pub fn expansion_rate(map: &impl PlanarMap, x: f64, y: f64) -> f64 {
    let jacobian = map.jacobian(x, y);
    let gram: Matrix2<f64> = jacobian.transpose() * jacobian;
    let trace = gram[(0, 0)] + gram[(1, 1)];
    let det = gram[(0, 0)] * gram[(1, 1)] - gram[(0, 1)] * gram[(1, 0)];
    // the Gram matrix is symmetric positive semidefinite, so the
    // discriminant only dips below zero through floating error
    let discriminant = (trace * trace - 4.0 * det).max(0.0);
    let largest = 0.5 * (trace + discriminant.sqrt());
    largest.max(f64::MIN_POSITIVE).ln() / 2.0
}
