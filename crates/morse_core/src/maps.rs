use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};

use crate::traits::PlanarMap;

/// The Henon map `(x, y) -> (1 + y - a*x^2, b*x)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Henon {
    pub a: f64,
    pub b: f64,
}

impl Default for Henon {
    fn default() -> Self {
        Self { a: 1.4, b: 0.3 }
    }
}

impl PlanarMap for Henon {
    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (1.0 + y - self.a * x * x, self.b * x)
    }

    fn jacobian(&self, x: f64, _y: f64) -> Matrix2<f64> {
        Matrix2::new(-2.0 * self.a * x, 1.0, self.b, 0.0)
    }
}

/// The Ikeda map with dissipation parameter `u`; derivatives come from the
/// finite-difference default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ikeda {
    pub u: f64,
}

impl Default for Ikeda {
    fn default() -> Self {
        Self { u: 0.9 }
    }
}

impl PlanarMap for Ikeda {
    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let t = 0.4 - 6.0 / (1.0 + x * x + y * y);
        (
            1.0 + self.u * (x * t.cos() - y * t.sin()),
            self.u * (x * t.sin() + y * t.cos()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn henon_maps_the_origin_onto_the_x_axis() {
        let map = Henon::default();
        assert_eq!(map.apply(0.0, 0.0), (1.0, 0.0));
    }

    #[test]
    fn henon_fixed_point_satisfies_the_quadratic() {
        // Fixed points of the Henon map solve a*x^2 + (1 - b)*x - 1 = 0.
        let map = Henon::default();
        let x = ((map.b - 1.0) + ((1.0 - map.b).powi(2) + 4.0 * map.a).sqrt()) / (2.0 * map.a);
        let (fx, fy) = map.apply(x, map.b * x);
        assert!((fx - x).abs() < 1e-12);
        assert!((fy - map.b * x).abs() < 1e-12);
    }

    #[test]
    fn henon_analytic_jacobian_matches_finite_differences() {
        let map = Henon::default();
        let analytic = map.jacobian(0.4, -0.2);
        let numeric = (|x: f64, y: f64| map.apply(x, y)).jacobian(0.4, -0.2);
        for row in 0..2 {
            for col in 0..2 {
                assert!((analytic[(row, col)] - numeric[(row, col)]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn ikeda_stays_finite_near_the_attractor() {
        let map = Ikeda::default();
        let (mut x, mut y) = (0.1, 0.1);
        for _ in 0..1000 {
            let (nx, ny) = map.apply(x, y);
            x = nx;
            y = ny;
        }
        assert!(x.is_finite() && y.is_finite());
        assert!(x.abs() < 10.0 && y.abs() < 10.0);
    }
}
