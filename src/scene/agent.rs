// src/scene/agent.rs
// Agent styling and movement. Agents float two units above the ground and,
// when targeting a device, glide toward it on a fixed-duration linear move.
// Progress derives from the move's start instant, never from an incremented
// counter, so a stalled frame cannot drift the animation.
use std::collections::HashMap;

use instant::Instant;

use crate::color::Color;
use crate::scene::device::entity_alpha;
use crate::scene::network::{AgentKind, DeviceNetwork, GridPosition, NetworkAgent};

/// Agents hover one unit above the device tiles.
pub const AGENT_ELEVATION: f64 = 2.0;

/// Duration of one agent move toward its target device.
pub const AGENT_MOVE_SECS: f64 = 5.0;

pub const MARKER_RADIUS: f32 = 12.0;

pub fn kind_color(kind: AgentKind) -> Color {
    let hex = match kind {
        AgentKind::Validator => "#06b6d4",
        AgentKind::Router => "#f97316",
        AgentKind::Oracle => "#a855f7",
        AgentKind::Maintainer => "#84cc16",
    };
    Color::from_hex(hex).unwrap_or(Color::from((120, 120, 120)))
}

pub fn kind_icon(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Validator => "▲",
        AgentKind::Router => "◈",
        AgentKind::Oracle => "✦",
        AgentKind::Maintainer => "⬟",
    }
}

pub fn agent_alpha(net: &DeviceNetwork, agent: &NetworkAgent) -> f32 {
    entity_alpha(
        agent.is_owned_by(&net.user_address),
        agent.holds_tokens(&net.user_address),
    )
}

pub fn agent_label(agent: &NetworkAgent) -> String {
    format!(
        "{} · {} @ {:.3} · {} device(s)",
        agent.name,
        agent.token_symbol,
        agent.token_price,
        agent.managed_device_ids.len()
    )
}

struct Move {
    target_device_id: String,
    from: GridPosition,
    started: Instant,
}

/// Tracks one in-flight move per agent. Retargeting restarts the move from
/// the agent's current anchor at progress 0 (a deliberate reset; the visual
/// jump is accepted).
#[derive(Default)]
pub struct Movements {
    moves: HashMap<String, Move>,
}

impl Movements {
    /// Linear progress of an agent's move in [0, 1].
    fn progress(m: &Move, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(m.started).as_secs_f64();
        (elapsed / AGENT_MOVE_SECS).min(1.0)
    }

    /// Reconciles tracked moves against the current document: starts a move
    /// when an agent gains a target, restarts on retarget, and drops the
    /// entry when the target clears or the move completes.
    pub fn update(&mut self, net: &DeviceNetwork, now: Instant) {
        for agent in &net.agents {
            match (&agent.target_device_id, agent.position) {
                (Some(target), Some(anchor)) => {
                    let restart = match self.moves.get(&agent.id) {
                        Some(m) => &m.target_device_id != target,
                        None => true,
                    };
                    if restart {
                        self.moves.insert(
                            agent.id.clone(),
                            Move {
                                target_device_id: target.clone(),
                                from: anchor,
                                started: now,
                            },
                        );
                    }
                }
                _ => {
                    self.moves.remove(&agent.id);
                }
            }
        }
        self.moves
            .retain(|id, _| net.agents.iter().any(|a| &a.id == id));
    }

    /// Grid position to draw the agent at. Falls back to the anchor position
    /// when there is no move in flight, and skips silently to the anchor if
    /// the target no longer resolves.
    pub fn drawn_position(
        &self,
        net: &DeviceNetwork,
        agent: &NetworkAgent,
        now: Instant,
    ) -> Option<GridPosition> {
        let anchor = agent.position?;
        let Some(m) = self.moves.get(&agent.id) else {
            return Some(anchor);
        };
        let Some(target) = net.device(&m.target_device_id) else {
            return Some(anchor);
        };
        let t = Self::progress(m, now);
        Some(GridPosition {
            x: m.from.x + (target.position.x - m.from.x) * t,
            y: m.from.y + (target.position.y - m.from.y) * t,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::scene::network::tests::{agent, device, network};

    fn advance(now: Instant, secs: f64) -> Instant {
        now + Duration::from_secs_f64(secs)
    }

    fn moving_network() -> DeviceNetwork {
        let mut a = agent("agent-1", "0xuser", &[]);
        a.position = Some(GridPosition { x: 0.0, y: 0.0 });
        a.target_device_id = Some("dev-1".to_string());
        let mut d = device("dev-1", "0xuser", Some("agent-1"));
        d.position = GridPosition { x: 4.0, y: 0.0 };
        network(vec![d], vec![a])
    }

    #[test]
    fn move_interpolates_linearly_over_five_seconds() {
        let net = moving_network();
        let mut movements = Movements::default();
        let start = Instant::now();
        movements.update(&net, start);

        let at = |secs| {
            movements
                .drawn_position(&net, &net.agents[0], advance(start, secs))
                .unwrap()
        };
        assert_eq!(at(0.0).x, 0.0);
        let halfway = at(2.5);
        assert!((halfway.x - 2.0).abs() < 1e-9, "{halfway:?}");
        // Clamped at the target once the duration elapses.
        assert_eq!(at(7.0).x, 4.0);
        assert_eq!(at(7.0).y, 0.0);
    }

    #[test]
    fn retarget_restarts_from_progress_zero() {
        let mut net = moving_network();
        let mut d2 = device("dev-2", "0xuser", None);
        d2.position = GridPosition { x: 0.0, y: 6.0 };
        net.devices.push(d2);

        let mut movements = Movements::default();
        let start = Instant::now();
        movements.update(&net, start);

        // Retarget midway through the first move.
        net.agents[0].target_device_id = Some("dev-2".to_string());
        let mid = advance(start, 2.5);
        movements.update(&net, mid);

        let p = movements
            .drawn_position(&net, &net.agents[0], mid)
            .unwrap();
        // Back at the anchor: the new move starts over.
        assert_eq!(p, GridPosition { x: 0.0, y: 0.0 });
    }

    #[test]
    fn cleared_target_returns_to_anchor() {
        let mut net = moving_network();
        let mut movements = Movements::default();
        let start = Instant::now();
        movements.update(&net, start);

        net.agents[0].target_device_id = None;
        movements.update(&net, advance(start, 1.0));

        let p = movements
            .drawn_position(&net, &net.agents[0], advance(start, 1.0))
            .unwrap();
        assert_eq!(p, GridPosition { x: 0.0, y: 0.0 });
    }

    #[test]
    fn agent_without_position_is_not_drawn() {
        let mut net = moving_network();
        net.agents[0].position = None;
        let movements = Movements::default();
        assert!(
            movements
                .drawn_position(&net, &net.agents[0], Instant::now())
                .is_none()
        );
    }
}
