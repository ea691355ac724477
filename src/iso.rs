// src/iso.rs
// Isometric grid projection. Every module that places anything on screen goes
// through these constants and functions, so tile geometry, entity markers and
// particle paths all agree on where a grid cell is.
use glam::{DVec2, Vec2};

/// Screen width of one tile rhombus, in pixels.
pub const TILE_WIDTH: f64 = 64.0;
/// Screen height of one tile rhombus, in pixels.
pub const TILE_HEIGHT: f64 = 32.0;
/// Vertical pixel offset per unit of elevation.
pub const TILE_DEPTH: f64 = 16.0;

/// Projects logical grid coordinates to screen pixels.
///
/// Screen y grows downward here (classic 2D raster convention); callers that
/// feed a y-up world space go through [`world_offset`] instead.
pub fn grid_to_screen(x: f64, y: f64, z: f64) -> DVec2 {
    DVec2::new(
        (x - y) * (TILE_WIDTH / 2.0),
        (x + y) * (TILE_HEIGHT / 2.0) - z * TILE_DEPTH,
    )
}

/// Inverse of [`grid_to_screen`] at ground level (z = 0).
pub fn screen_to_grid(screen: DVec2) -> DVec2 {
    let half_w = TILE_WIDTH / 2.0;
    let half_h = TILE_HEIGHT / 2.0;
    DVec2::new(
        (screen.x / half_w + screen.y / half_h) / 2.0,
        (screen.y / half_h - screen.x / half_w) / 2.0,
    )
}

/// Paint-order key: primarily back-to-front in x+y, then by elevation.
/// The 10x/100x scale gap means one unit of elevation outranks anything
/// closer than ten rows of depth at the same cell.
pub fn z_index(x: f64, y: f64, z: f64) -> i64 {
    ((x + y) * 10.0).floor() as i64 + (z * 100.0) as i64
}

/// [`grid_to_screen`] as an f32 translation in the camera's y-up world space.
pub fn world_offset(x: f64, y: f64, z: f64) -> Vec2 {
    let p = grid_to_screen(x, y, z);
    Vec2::new(p.x as f32, -p.y as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn projection_round_trips_on_integer_grid() {
        for x in -50..=50 {
            for y in -50..=50 {
                let screen = grid_to_screen(x as f64, y as f64, 0.0);
                let back = screen_to_grid(screen);
                assert!((back.x - x as f64).abs() < TOL, "x: {x},{y} -> {back:?}");
                assert!((back.y - y as f64).abs() < TOL, "y: {x},{y} -> {back:?}");
            }
        }
    }

    proptest! {
        #[test]
        fn projection_round_trips_on_fractional_positions(
            x in -50.0f64..50.0,
            y in -50.0f64..50.0,
        ) {
            let back = screen_to_grid(grid_to_screen(x, y, 0.0));
            prop_assert!((back.x - x).abs() < 1e-9);
            prop_assert!((back.y - y).abs() < 1e-9);
        }
    }

    #[test]
    fn z_index_ordering_scale() {
        // Elevation can outrank nearby rows...
        assert!(z_index(2.0, 2.0, 0.0) < z_index(1.0, 1.0, 5.0));
        // ...but depth ordering wins across a wide enough gap.
        assert!(z_index(10.0, 10.0, 0.0) > z_index(1.0, 1.0, 0.0));
    }

    #[test]
    fn z_index_is_monotonic_in_depth_at_ground_level() {
        let mut prev = z_index(0.0, 0.0, 0.0);
        for d in 1..100 {
            let next = z_index(d as f64, d as f64, 0.0);
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn elevation_breaks_ties_within_a_cell() {
        assert!(z_index(3.0, 4.0, 1.0) > z_index(3.0, 4.0, 0.0));
        assert!(z_index(3.0, 4.0, 2.0) > z_index(3.0, 4.0, 1.0));
    }

    #[test]
    fn world_offset_flips_screen_y() {
        let screen = grid_to_screen(2.0, 3.0, 1.0);
        let world = world_offset(2.0, 3.0, 1.0);
        assert_eq!(world.x, screen.x as f32);
        assert_eq!(world.y, -(screen.y as f32));
    }
}
