use crate::traits::PlanarMap;

/// Iterates `map` from `(x0, y0)`, returning the initial point followed by
/// `steps` images.
pub fn trace_orbit(map: &impl PlanarMap, x0: f64, y0: f64, steps: usize) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(steps + 1);
    points.push((x0, y0));
    let (mut x, mut y) = (x0, y0);
    for _ in 0..steps {
        let (next_x, next_y) = map.apply(x, y);
        points.push((next_x, next_y));
        x = next_x;
        y = next_y;
    }
    points
}
