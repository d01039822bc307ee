use nalgebra::Matrix2;

// Central differences converge fastest with a step near the cube root of
// machine epsilon.
const STEP_SCALE: f64 = 6.0e-6;

/// A discrete dynamical system on the plane.
///
/// Implementors supply the map itself; `jacobian` falls back to a
/// central-difference approximation and can be overridden with analytic
/// derivatives where they are known.
pub trait PlanarMap {
    /// Evaluates the map at `(x, y)`, returning the image point.
    fn apply(&self, x: f64, y: f64) -> (f64, f64);

    /// Partial derivatives of the map at `(x, y)` as the row-major matrix
    /// `[[df/dx, df/dy], [dg/dx, dg/dy]]`.
    fn jacobian(&self, x: f64, y: f64) -> Matrix2<f64> {
        let step_x = STEP_SCALE * (1.0 + x.abs());
        let step_y = STEP_SCALE * (1.0 + y.abs());
        let (f_xp, g_xp) = self.apply(x + step_x, y);
        let (f_xm, g_xm) = self.apply(x - step_x, y);
        let (f_yp, g_yp) = self.apply(x, y + step_y);
        let (f_ym, g_ym) = self.apply(x, y - step_y);
        Matrix2::new(
            (f_xp - f_xm) / (2.0 * step_x),
            (f_yp - f_ym) / (2.0 * step_y),
            (g_xp - g_xm) / (2.0 * step_x),
            (g_yp - g_ym) / (2.0 * step_y),
        )
    }
}

/// Any plain closure on the plane is a map; derivatives come from the
/// finite-difference default.
impl<F> PlanarMap for F
where
    F: Fn(f64, f64) -> (f64, f64),
{
    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        self(x, y)
    }
}
