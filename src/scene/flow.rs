// src/scene/flow.rs
// Revenue flow animation. Particles ride the device -> agent -> user path;
// each one stores its spawn instant and derives progress from the clock, so
// there is no per-frame counter to drift. Emission is a Bernoulli trial per
// eligible device on a fixed two-second cadence.
use glam::Vec2;
use instant::Instant;
use rand::Rng;

use crate::color::Color;
use crate::models::LineVertex;
use crate::scene::network::Device;

/// Emission cadence. One trial per eligible device each tick.
pub const EMIT_TICK_SECS: f64 = 2.0;
/// Total particle lifetime from device to the end of its path.
pub const PARTICLE_LIFE_SECS: f64 = 2.5;
/// Revenue-to-probability divisor. Observed tuning, not a contract.
pub const EMISSION_DIVISOR: f64 = 2000.0;

pub const PARTICLE_RADIUS: f32 = 3.5;
/// Low-opacity color of the static flow lines.
pub const FLOW_LINE_COLOR: &str = "#94a3b8";

const DASH_LEN: f32 = 6.0;
const GAP_LEN: f32 = 6.0;

/// Chance that one tick emits a particle for a device.
pub fn emission_probability(revenue_per_day: f64) -> f64 {
    (revenue_per_day / EMISSION_DIVISOR).clamp(0.0, 1.0)
}

/// Position along the two-phase path at progress `t` in [0, 1]. The first
/// half runs device -> agent; the second half runs agent -> user when the
/// viewer owns the agent, and otherwise holds at the agent endpoint.
pub fn particle_point(t: f64, device: Vec2, agent: Vec2, user_owned: bool, user: Vec2) -> Vec2 {
    let t = t.clamp(0.0, 1.0) as f32;
    if t <= 0.5 {
        device.lerp(agent, t * 2.0)
    } else if user_owned {
        agent.lerp(user, (t - 0.5) * 2.0)
    } else {
        agent
    }
}

#[derive(Debug)]
pub struct Particle {
    pub device_id: String,
    spawned: Instant,
}

impl Particle {
    pub fn progress(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.spawned).as_secs_f64() / PARTICLE_LIFE_SECS
    }
}

/// Owns every active particle and the emission clock.
#[derive(Default)]
pub struct FlowField {
    particles: Vec<Particle>,
    last_emit: Option<Instant>,
}

impl FlowField {
    /// Retires expired particles, then runs emission trials for each tick
    /// boundary that has passed. `eligible` is the set of visible devices
    /// whose managing agent resolves; the caller filters.
    pub fn tick<R: Rng>(&mut self, eligible: &[&Device], now: Instant, rng: &mut R) {
        self.particles.retain(|p| p.progress(now) <= 1.0);

        let Some(last) = self.last_emit else {
            self.last_emit = Some(now);
            return;
        };

        let mut next = last;
        while now.saturating_duration_since(next).as_secs_f64() >= EMIT_TICK_SECS {
            next += std::time::Duration::from_secs_f64(EMIT_TICK_SECS);
            for device in eligible {
                if rng.gen_range(0.0..1.0) < emission_probability(device.revenue_per_day) {
                    self.particles.push(Particle {
                        device_id: device.id.clone(),
                        spawned: now,
                    });
                }
            }
        }
        self.last_emit = Some(next);
    }

    /// Active particles as `(device_id, progress)`, progress guaranteed to
    /// lie in [0, 1].
    pub fn particles(&self, now: Instant) -> impl Iterator<Item = (&str, f64)> {
        self.particles
            .iter()
            .map(move |p| (p.device_id.as_str(), p.progress(now)))
            .filter(|(_, t)| (0.0..=1.0).contains(t))
    }

    pub fn clear(&mut self) {
        self.particles.clear();
        self.last_emit = None;
    }

    #[cfg(test)]
    fn spawn_at(&mut self, device_id: &str, spawned: Instant) {
        self.particles.push(Particle {
            device_id: device_id.to_string(),
            spawned,
        });
    }
}

/// Appends a dashed line from `from` to `to`.
pub fn build_dashed_line(lines: &mut Vec<LineVertex>, from: Vec2, to: Vec2, color: [f32; 4]) {
    let dir = to - from;
    let length = dir.length();
    if length < f32::EPSILON {
        return;
    }
    let dir = dir / length;

    let mut at = 0.0;
    while at < length {
        let end = (at + DASH_LEN).min(length);
        lines.push(LineVertex {
            position: (from + dir * at).into(),
            color,
        });
        lines.push(LineVertex {
            position: (from + dir * end).into(),
            color,
        });
        at = end + GAP_LEN;
    }
}

pub fn flow_line_color() -> [f32; 4] {
    Color::from_hex(FLOW_LINE_COLOR)
        .unwrap_or(Color::from((148, 163, 184)))
        .with_alpha(0.3)
}
