// src/scene/device.rs
// Device styling: kind -> color/icon, verification -> badge color, and the
// ownership-based transparency rule shared with agents.
use crate::color::Color;
use crate::scene::network::{Device, DeviceKind, DeviceNetwork, Verification};

/// Devices sit on a tile raised one unit above the ground plane.
pub const DEVICE_ELEVATION: f64 = 1.0;

/// Marker circle radius in world units.
pub const MARKER_RADIUS: f32 = 10.0;
/// Verification badge radius in world units.
pub const BADGE_RADIUS: f32 = 4.0;

pub fn kind_color(kind: DeviceKind) -> Color {
    let hex = match kind {
        DeviceKind::Hotspot => "#f59e0b",
        DeviceKind::Sensor => "#10b981",
        DeviceKind::Gateway => "#3b82f6",
        DeviceKind::Storage => "#8b5cf6",
        DeviceKind::Compute => "#ef4444",
    };
    Color::from_hex(hex).unwrap_or(Color::from((120, 120, 120)))
}

pub fn kind_icon(kind: DeviceKind) -> &'static str {
    match kind {
        DeviceKind::Hotspot => "⬡",
        DeviceKind::Sensor => "◉",
        DeviceKind::Gateway => "⬢",
        DeviceKind::Storage => "▣",
        DeviceKind::Compute => "◆",
    }
}

pub fn badge_color(verification: Verification) -> Color {
    let hex = match verification {
        Verification::Verified => "#22c55e",
        Verification::Pending => "#eab308",
        Verification::Failed => "#ef4444",
        Verification::Unknown => "#6b7280",
    };
    Color::from_hex(hex).unwrap_or(Color::from((107, 114, 128)))
}

/// Opacity by the viewer's relationship to the entity: fully opaque when
/// owned, lighter when only token-held, lighter still otherwise.
pub fn entity_alpha(owned: bool, token_held: bool) -> f32 {
    if owned {
        1.0
    } else if token_held {
        0.7
    } else {
        0.45
    }
}

pub fn device_alpha(net: &DeviceNetwork, device: &Device) -> f32 {
    entity_alpha(
        device.is_owned_by(&net.user_address),
        net.user_holds_device_tokens(device),
    )
}

/// Selection label line: name plus the key stats shown in the floating panel.
pub fn device_label(device: &Device) -> String {
    format!(
        "{} · {:.1} DPN/day · {:?}",
        device.name, device.revenue_per_day, device.status
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::network::tests::{agent, device, network};

    #[test]
    fn every_kind_has_a_distinct_color() {
        let kinds = [
            DeviceKind::Hotspot,
            DeviceKind::Sensor,
            DeviceKind::Gateway,
            DeviceKind::Storage,
            DeviceKind::Compute,
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(kind_color(*a), kind_color(*b));
            }
        }
    }

    #[test]
    fn alpha_follows_ownership_then_holdings() {
        assert_eq!(entity_alpha(true, false), 1.0);
        assert_eq!(entity_alpha(true, true), 1.0);
        assert_eq!(entity_alpha(false, true), 0.7);
        assert_eq!(entity_alpha(false, false), 0.45);
    }

    #[test]
    fn device_alpha_resolves_holdings_through_the_managing_agent() {
        let net = network(
            vec![device("dev-1", "0xelse", Some("agent-1"))],
            vec![agent("agent-1", "0xelse", &[("0xuser", 50.0)])],
        );
        assert_eq!(device_alpha(&net, &net.devices[0]), 0.7);

        let net = network(vec![device("dev-1", "0xelse", None)], vec![]);
        assert_eq!(device_alpha(&net, &net.devices[0]), 0.45);

        let net = network(vec![device("dev-1", "0xuser", None)], vec![]);
        assert_eq!(device_alpha(&net, &net.devices[0]), 1.0);
    }

    #[test]
    fn badge_colors_distinguish_verification_states() {
        let states = [
            Verification::Verified,
            Verification::Pending,
            Verification::Failed,
            Verification::Unknown,
        ];
        for (i, a) in states.iter().enumerate() {
            for b in &states[i + 1..] {
                assert_ne!(badge_color(*a), badge_color(*b));
            }
        }
    }
}
