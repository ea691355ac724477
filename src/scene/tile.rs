// src/scene/tile.rs
// Rhombus tile geometry. Builders append into caller-owned vertex vecs, and
// buffer order is paint order, so callers append tiles back-to-front.
use glam::Vec2;

use crate::color::Color;
use crate::iso;
use crate::models::{LineVertex, PolyVertex};

/// Darkening applied to the two visible side faces of an elevated tile.
pub const LEFT_FACE_DARKEN: f32 = -15.0;
pub const RIGHT_FACE_DARKEN: f32 = -30.0;

/// Glow color for the selected tile.
pub const SELECTION_GLOW: &str = "#fbbf24";

/// Screen-space corners of the cell at `(x, y)` projected at elevation `z`,
/// in world coordinates: back, right, front, left.
fn corners(x: f64, y: f64, z: f64) -> [Vec2; 4] {
    [
        iso::world_offset(x, y, z),
        iso::world_offset(x + 1.0, y, z),
        iso::world_offset(x + 1.0, y + 1.0, z),
        iso::world_offset(x, y + 1.0, z),
    ]
}

fn push_quad(out: &mut Vec<PolyVertex>, quad: [Vec2; 4], color: [f32; 4]) {
    let [a, b, c, d] = quad;
    for p in [a, b, c, a, c, d] {
        out.push(PolyVertex {
            position: p.into(),
            color,
        });
    }
}

/// Appends one tile: top rhombus always, left/right side faces when `z > 0`.
/// `alpha` applies to every face so ownership transparency carries through
/// the whole tile.
pub fn build_tile(
    polys: &mut Vec<PolyVertex>,
    x: f64,
    y: f64,
    z: f64,
    top: Color,
    alpha: f32,
    selected: bool,
) {
    let [back, right, front, left] = corners(x, y, z);

    if selected {
        build_selection_glow(polys, x, y, z);
    }

    if z > 0.0 {
        let [_, right_0, front_0, left_0] = corners(x, y, 0.0);
        // Left face: front-left edge extruded down to ground level.
        push_quad(
            polys,
            [left, front, front_0, left_0],
            top.adjust_brightness(LEFT_FACE_DARKEN).with_alpha(alpha),
        );
        // Right face: front-right edge, darker still.
        push_quad(
            polys,
            [right, front, front_0, right_0],
            top.adjust_brightness(RIGHT_FACE_DARKEN).with_alpha(alpha),
        );
    }

    push_quad(polys, [back, right, front, left], top.with_alpha(alpha));
}

/// Enlarged translucent rhombus drawn beneath a selected tile.
fn build_selection_glow(polys: &mut Vec<PolyVertex>, x: f64, y: f64, z: f64) {
    let glow = Color::from_hex(SELECTION_GLOW).unwrap_or(Color::from((251, 191, 36)));
    let grow = 0.35;
    let quad = [
        iso::world_offset(x - grow, y - grow, z),
        iso::world_offset(x + 1.0 + grow, y - grow, z),
        iso::world_offset(x + 1.0 + grow, y + 1.0 + grow, z),
        iso::world_offset(x - grow, y + 1.0 + grow, z),
    ];
    push_quad(polys, quad, glow.with_alpha(0.35));
}

/// Bright outline around the top face of a selected tile.
pub fn build_tile_outline(lines: &mut Vec<LineVertex>, x: f64, y: f64, z: f64) {
    let glow = Color::from_hex(SELECTION_GLOW).unwrap_or(Color::from((251, 191, 36)));
    let rgba = glow.with_alpha(0.9);
    let c = corners(x, y, z);
    for i in 0..4 {
        lines.push(LineVertex {
            position: c[i].into(),
            color: rgba,
        });
        lines.push(LineVertex {
            position: c[(i + 1) % 4].into(),
            color: rgba,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_tile_is_a_single_rhombus() {
        let mut polys = Vec::new();
        build_tile(&mut polys, 2.0, 3.0, 0.0, Color::from((100, 100, 100)), 1.0, false);
        // Two triangles for the top face, no side faces at ground level.
        assert_eq!(polys.len(), 6);
    }

    #[test]
    fn elevated_tile_grows_side_faces() {
        let mut polys = Vec::new();
        build_tile(&mut polys, 2.0, 3.0, 1.0, Color::from((100, 100, 100)), 1.0, false);
        // Left face + right face + top = three quads.
        assert_eq!(polys.len(), 18);
    }

    #[test]
    fn side_faces_are_darkened_top_color() {
        let top = Color::from_hex("#f59e0b").unwrap();
        let mut polys = Vec::new();
        build_tile(&mut polys, 0.0, 0.0, 1.0, top, 1.0, false);

        let left_rgba = top.adjust_brightness(LEFT_FACE_DARKEN).with_alpha(1.0);
        let right_rgba = top.adjust_brightness(RIGHT_FACE_DARKEN).with_alpha(1.0);
        let top_rgba = top.with_alpha(1.0);
        assert_eq!(polys[0].color, left_rgba);
        assert_eq!(polys[6].color, right_rgba);
        assert_eq!(polys[12].color, top_rgba);
    }

    #[test]
    fn selection_adds_glow_beneath_the_tile() {
        let mut plain = Vec::new();
        build_tile(&mut plain, 1.0, 1.0, 1.0, Color::from((10, 20, 30)), 1.0, false);
        let mut selected = Vec::new();
        build_tile(&mut selected, 1.0, 1.0, 1.0, Color::from((10, 20, 30)), 1.0, true);

        assert_eq!(selected.len(), plain.len() + 6);
        // Glow paints first so the tile sits on top of it.
        assert_eq!(selected[0].color[3], 0.35);
    }

    #[test]
    fn outline_closes_the_rhombus() {
        let mut lines = Vec::new();
        build_tile_outline(&mut lines, 4.0, 4.0, 1.0);
        assert_eq!(lines.len(), 8);
        // Last segment ends where the first begins.
        assert_eq!(lines[7].position, lines[0].position);
    }

    #[test]
    fn top_face_sits_on_the_projected_cell() {
        let mut polys = Vec::new();
        build_tile(&mut polys, 2.0, 3.0, 1.0, Color::from((0, 0, 0)), 1.0, false);
        let top_first: [f32; 2] = iso::world_offset(2.0, 3.0, 1.0).into();
        // Top face is the final quad; its first vertex is the back corner.
        assert_eq!(polys[12].position, top_first);
    }
}
