// src/color.rs
// sRGB byte-triplet color with hex parsing and the linear-space conversions
// the render pipelines consume. Brightness adjustment operates on the sRGB
// channels, matching how the tile side faces are shaded.
use bevy_color::{ColorToComponents, LinearRgba, Srgba};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl From<(u8, u8, u8)> for Color {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self { r, g, b }
    }
}

impl Color {
    /// Parses `#rrggbb` (leading `#` optional). Returns `None` on anything
    /// that is not six hex digits.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix('#').unwrap_or(s);
        if s.len() != 6 {
            return None;
        }
        let r = u8::from_str_radix(&s[0..2], 16).ok()?;
        let g = u8::from_str_radix(&s[2..4], 16).ok()?;
        let b = u8::from_str_radix(&s[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Shifts each channel by `percent` of the full byte range, clamped.
    /// `adjust_brightness(0.0)` is the identity; -100 is black; +100 or
    /// more saturates at white.
    pub fn adjust_brightness(self, percent: f32) -> Self {
        let delta = 255.0 * percent / 100.0;
        let adjust = |c: u8| ((c as f32) + delta).round().clamp(0.0, 255.0) as u8;
        Self {
            r: adjust(self.r),
            g: adjust(self.g),
            b: adjust(self.b),
        }
    }

    fn to_linear(self) -> LinearRgba {
        LinearRgba::from(Srgba::rgb_u8(self.r, self.g, self.b))
    }

    /// Linear-space RGBA at full opacity, as the vertex formats expect.
    pub fn into_linear_rgba(self) -> [f32; 4] {
        self.to_linear().to_f32_array()
    }

    /// Linear-space RGBA with an explicit alpha.
    pub fn with_alpha(self, alpha: f32) -> [f32; 4] {
        let mut rgba = self.to_linear().to_f32_array();
        rgba[3] = alpha;
        rgba
    }

    /// Clear-color form for the render pass.
    pub fn into_linear_wgpu_color(self) -> wgpu::Color {
        let linear = self.to_linear();
        wgpu::Color {
            r: linear.red as f64,
            g: linear.green as f64,
            b: linear.blue as f64,
            a: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let c = Color::from_hex("#3b82f6").unwrap();
        assert_eq!(c, Color::from((0x3b, 0x82, 0xf6)));
        assert_eq!(c.to_hex(), "#3b82f6");
        assert_eq!(Color::from_hex("10b981"), Color::from_hex("#10b981"));
    }

    #[test]
    fn hex_rejects_malformed_input() {
        assert_eq!(Color::from_hex("#fff"), None);
        assert_eq!(Color::from_hex("#gggggg"), None);
        assert_eq!(Color::from_hex(""), None);
        assert_eq!(Color::from_hex("#3b82f6ff"), None);
    }

    #[test]
    fn zero_adjustment_is_identity() {
        for hex in ["#000000", "#ffffff", "#3b82f6", "#f59e0b"] {
            let c = Color::from_hex(hex).unwrap();
            assert_eq!(c.adjust_brightness(0.0), c);
        }
    }

    #[test]
    fn full_darken_is_black() {
        let c = Color::from_hex("#f59e0b").unwrap();
        assert_eq!(c.adjust_brightness(-100.0).to_hex(), "#000000");
    }

    #[test]
    fn large_brighten_clamps_at_white() {
        // Every channel hits the ceiling, zero channels included.
        let c = Color::from_hex("#80ff00").unwrap();
        let bright = c.adjust_brightness(100_000.0);
        assert_eq!(bright.to_hex(), "#ffffff");
        // No wrap-around on an already-saturated channel either.
        assert_eq!(
            Color::from((255, 255, 255)).adjust_brightness(50.0).to_hex(),
            "#ffffff"
        );
    }

    #[test]
    fn darken_moves_every_channel_down() {
        let c = Color::from_hex("#f59e0b").unwrap();
        let d = c.adjust_brightness(-15.0);
        assert!(d.r < c.r && d.g < c.g && d.b < c.b);
    }

    #[test]
    fn with_alpha_overrides_only_alpha() {
        let rgba = Color::from_hex("#3b82f6").unwrap().with_alpha(0.45);
        assert_eq!(rgba[3], 0.45);
        let opaque = Color::from_hex("#3b82f6").unwrap().into_linear_rgba();
        assert_eq!(&rgba[..3], &opaque[..3]);
    }
}
