// src/camera.rs
// Pan/zoom orthographic camera over the projected scene.
use bytemuck::{Pod, Zeroable};
use glam::Vec4Swizzles;
use glam::{Mat4, Vec2, Vec3, Vec4};

// Camera uniform as uploaded to the GPU. Padded to a 16-byte boundary so the
// struct is exactly 80 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub needs_srgb_output_conversion: u32, // 0 for false, 1 for true
    pub _padding: [u32; 3],
}

#[derive(Debug)]
pub struct Camera {
    pub position: Vec2, // world-space center of the view
    pub zoom: f32,      // 1.0 default; >1.0 zooms in, <1.0 zooms out
    pub aspect_ratio: f32,
    pub viewport_size: Vec2, // pixels

    is_panning: bool,
    last_mouse_pos_screen: Option<Vec2>,
}

impl Camera {
    pub fn new(viewport_width: u32, viewport_height: u32) -> Self {
        let aspect_ratio = viewport_width as f32 / viewport_height as f32;
        Self {
            position: Vec2::ZERO,
            zoom: 1.0,
            aspect_ratio: if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
                aspect_ratio
            } else {
                1.0
            },
            viewport_size: Vec2::new(viewport_width as f32, viewport_height as f32),
            is_panning: false,
            last_mouse_pos_screen: None,
        }
    }

    /// Call on window resize.
    pub fn update_aspect_ratio(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect_ratio = width as f32 / height as f32;
            self.viewport_size = Vec2::new(width as f32, height as f32);
        }
    }

    /// Centers the view on a world-space bounding box and zooms out far
    /// enough that the whole box is visible, with a small margin.
    pub fn frame_bounds(&mut self, min: Vec2, max: Vec2) {
        let extent = max - min;
        if extent.x <= 0.0 || extent.y <= 0.0 {
            return;
        }
        self.position = (min + max) / 2.0;
        // Visible world height is 2/zoom, width is 2*aspect/zoom.
        let zoom_for_height = 2.0 / (extent.y * 1.1);
        let zoom_for_width = 2.0 * self.aspect_ratio / (extent.x * 1.1);
        self.zoom = zoom_for_height.min(zoom_for_width);
    }

    /// Screen pixels (top-left origin) to world coordinates.
    pub fn screen_to_world(&self, screen_coords: Vec2) -> Vec2 {
        if self.viewport_size.x == 0.0 || self.viewport_size.y == 0.0 {
            return Vec2::ZERO;
        }

        // Screen y points down; NDC and world y point up.
        let ndc_x = (screen_coords.x / self.viewport_size.x) * 2.0 - 1.0;
        let ndc_y = 1.0 - (screen_coords.y / self.viewport_size.y) * 2.0;

        let view_proj_inv = self.build_view_projection_matrix().inverse();
        let world_coords_vec4 = view_proj_inv * Vec4::new(ndc_x, ndc_y, 0.0, 1.0);

        world_coords_vec4.xy() / world_coords_vec4.w
    }

    /// World coordinates to screen pixels (top-left origin).
    pub fn world_to_screen(&self, world_coords: Vec2) -> Vec2 {
        if self.viewport_size.x == 0.0 || self.viewport_size.y == 0.0 {
            return Vec2::ZERO;
        }
        let world_coords_vec4 = Vec4::new(world_coords.x, world_coords.y, 0.0, 1.0);
        let clip_pos_vec4 = self.build_view_projection_matrix() * world_coords_vec4;
        let ndc_pos = clip_pos_vec4.xy() / clip_pos_vec4.w;
        let screen_x = (ndc_pos.x * 0.5 + 0.5) * self.viewport_size.x;
        // NDC y is up, screen y is down.
        let screen_y = (1.0 - (ndc_pos.y * 0.5 + 0.5)) * self.viewport_size.y;
        Vec2::new(screen_x, screen_y)
    }

    pub fn start_panning(&mut self, screen_pos: Vec2) {
        self.is_panning = true;
        self.last_mouse_pos_screen = Some(screen_pos);
    }

    pub fn pan(&mut self, current_screen_pos: Vec2) {
        if self.is_panning {
            if let Some(last_pos) = self.last_mouse_pos_screen {
                let screen_delta = current_screen_pos - last_pos;

                let world_visible_width = (2.0 / self.zoom) * self.aspect_ratio;
                let world_visible_height = 2.0 / self.zoom;

                let world_units_per_pixel_x = world_visible_width / self.viewport_size.x;
                let world_units_per_pixel_y = world_visible_height / self.viewport_size.y;

                // Dragging right moves the view left; dragging down moves it
                // up (world y is up).
                self.position.x -= screen_delta.x * world_units_per_pixel_x;
                self.position.y += screen_delta.y * world_units_per_pixel_y;
            }
            self.last_mouse_pos_screen = Some(current_screen_pos);
        }
    }

    pub fn end_panning(&mut self) {
        self.is_panning = false;
        self.last_mouse_pos_screen = None;
    }

    /// Zooms by `factor` while keeping `world_focus` fixed on screen.
    pub fn zoom_by(&mut self, factor: f32, world_focus: Vec2) {
        let old_zoom = self.zoom;
        self.zoom *= factor;
        self.zoom = self.zoom.clamp(0.001, 1000.0);

        let offset = self.position - world_focus;
        self.position = world_focus + offset / (self.zoom / old_zoom);
    }

    pub fn build_view_projection_matrix(&self) -> Mat4 {
        // Orthographic projection; zoom shrinks the visible world region.
        let half_world_width = self.aspect_ratio / self.zoom;
        let half_world_height = 1.0 / self.zoom;

        let proj_matrix = Mat4::orthographic_rh(
            -half_world_width,
            half_world_width,
            -half_world_height,
            half_world_height,
            -100.0, // near/far are arbitrary for 2D
            100.0,
        );

        let view_matrix = Mat4::from_translation(Vec3::new(-self.position.x, -self.position.y, 0.0));

        proj_matrix * view_matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_world_round_trip() {
        let mut camera = Camera::new(800, 600);
        camera.position = Vec2::new(12.0, -7.0);
        camera.zoom = 0.01;

        let screen = Vec2::new(137.0, 401.0);
        let world = camera.screen_to_world(screen);
        let back = camera.world_to_screen(world);
        assert!((back - screen).length() < 1e-2, "{back:?}");
    }

    #[test]
    fn frame_bounds_centers_and_fits() {
        let mut camera = Camera::new(1000, 500);
        let min = Vec2::new(-320.0, -160.0);
        let max = Vec2::new(320.0, 160.0);
        camera.frame_bounds(min, max);

        assert_eq!(camera.position, Vec2::ZERO);
        // Both corners must land inside the viewport.
        for corner in [min, max, Vec2::new(min.x, max.y), Vec2::new(max.x, min.y)] {
            let s = camera.world_to_screen(corner);
            assert!(s.x >= 0.0 && s.x <= 1000.0, "{s:?}");
            assert!(s.y >= 0.0 && s.y <= 500.0, "{s:?}");
        }
    }
}
