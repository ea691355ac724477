// src/scene/scene.rs
// Scene composition state: selection, visibility filters, placement anchors
// and paint order. GPU-free; app_state turns this into vertex buffers.
use glam::Vec2;

use crate::iso;
use crate::scene::agent::AGENT_ELEVATION;
use crate::scene::device::DEVICE_ELEVATION;
use crate::scene::network::{
    COMMAND_CENTER, Device, DeviceNetwork, GridPosition, GridSize, NetworkAgent,
};

#[derive(Debug, Clone, Copy)]
pub struct VisibilityFilters {
    pub show_my_devices: bool,
    pub show_my_agents: bool,
    pub show_token_holdings: bool,
    pub show_all: bool,
}

impl Default for VisibilityFilters {
    fn default() -> Self {
        Self {
            show_my_devices: true,
            show_my_agents: true,
            show_token_holdings: true,
            show_all: false,
        }
    }
}

/// Selection and filter state. Selection is mutually exclusive between the
/// two entity kinds and toggles off on reselect.
#[derive(Debug, Default)]
pub struct SceneState {
    selected_device: Option<String>,
    selected_agent: Option<String>,
    pub filters: VisibilityFilters,
}

impl SceneState {
    pub fn selected_device(&self) -> Option<&str> {
        self.selected_device.as_deref()
    }

    pub fn selected_agent(&self) -> Option<&str> {
        self.selected_agent.as_deref()
    }

    pub fn select_device(&mut self, id: &str) {
        self.selected_agent = None;
        if self.selected_device.as_deref() == Some(id) {
            self.selected_device = None;
        } else {
            self.selected_device = Some(id.to_string());
        }
    }

    pub fn select_agent(&mut self, id: &str) {
        self.selected_device = None;
        if self.selected_agent.as_deref() == Some(id) {
            self.selected_agent = None;
        } else {
            self.selected_agent = Some(id.to_string());
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected_device = None;
        self.selected_agent = None;
    }

    pub fn device_visible(&self, net: &DeviceNetwork, device: &Device) -> bool {
        self.filters.show_all
            || (device.is_owned_by(&net.user_address) && self.filters.show_my_devices)
            || (net.user_holds_device_tokens(device) && self.filters.show_token_holdings)
    }

    pub fn agent_visible(&self, net: &DeviceNetwork, agent: &NetworkAgent) -> bool {
        self.filters.show_all
            || (agent.is_owned_by(&net.user_address) && self.filters.show_my_agents)
            || (agent.holds_tokens(&net.user_address) && self.filters.show_token_holdings)
    }
}

/// World-space anchor of a device's marker (and its flow endpoint).
pub fn device_marker_pos(device: &Device) -> Vec2 {
    iso::world_offset(device.position.x, device.position.y, DEVICE_ELEVATION)
}

/// World-space anchor of an agent's marker at a drawn grid position.
pub fn agent_marker_pos(position: GridPosition) -> Vec2 {
    iso::world_offset(position.x, position.y, AGENT_ELEVATION)
}

/// World-space position of the user's command center.
pub fn command_center_pos() -> Vec2 {
    iso::world_offset(COMMAND_CENTER.x, COMMAND_CENTER.y, 0.0)
}

/// Bounding box of the whole projected grid in world space, with headroom
/// for elevated entities. The camera frames this so no tile clips.
pub fn scene_pixel_bounds(grid: GridSize) -> (Vec2, Vec2) {
    let w = grid.width as f64;
    let h = grid.height as f64;
    let corners = [
        iso::world_offset(0.0, 0.0, 0.0),
        iso::world_offset(w, 0.0, 0.0),
        iso::world_offset(w, h, 0.0),
        iso::world_offset(0.0, h, 0.0),
        // Elevation headroom above the back corner.
        iso::world_offset(0.0, 0.0, AGENT_ELEVATION),
    ];
    let mut min = corners[0];
    let mut max = corners[0];
    for c in &corners[1..] {
        min = min.min(*c);
        max = max.max(*c);
    }
    (min, max)
}

/// Ground cells in paint order (back to front by iso z-index).
pub fn ordered_cells(grid: GridSize) -> Vec<(u32, u32)> {
    let mut cells: Vec<(u32, u32)> = (0..grid.height)
        .flat_map(|y| (0..grid.width).map(move |x| (x, y)))
        .collect();
    cells.sort_by_key(|&(x, y)| iso::z_index(x as f64, y as f64, 0.0));
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::network::tests::{agent, device, network};

    fn three_device_network() -> DeviceNetwork {
        // One user-owned device, one token-held (non-owned), one unrelated.
        let owned = device("dev-owned", "0xuser", None);
        let held = device("dev-held", "0xelse", Some("agent-held"));
        let unrelated = device("dev-other", "0xstranger", None);
        let holding_agent = agent("agent-held", "0xelse", &[("0xuser", 10.0)]);
        network(vec![owned, held, unrelated], vec![holding_agent])
    }

    fn visible_ids(scene: &SceneState, net: &DeviceNetwork) -> Vec<String> {
        net.devices
            .iter()
            .filter(|d| scene.device_visible(net, d))
            .map(|d| d.id.clone())
            .collect()
    }

    #[test]
    fn my_devices_filter_controls_exactly_the_owned_device() {
        let net = three_device_network();
        let mut scene = SceneState::default();
        scene.filters = VisibilityFilters {
            show_my_devices: true,
            show_my_agents: false,
            show_token_holdings: false,
            show_all: false,
        };
        assert_eq!(visible_ids(&scene, &net), vec!["dev-owned"]);

        scene.filters.show_my_devices = false;
        assert!(visible_ids(&scene, &net).is_empty());
    }

    #[test]
    fn token_filter_controls_exactly_the_held_device() {
        let net = three_device_network();
        let mut scene = SceneState::default();
        scene.filters = VisibilityFilters {
            show_my_devices: false,
            show_my_agents: false,
            show_token_holdings: true,
            show_all: false,
        };
        assert_eq!(visible_ids(&scene, &net), vec!["dev-held"]);

        scene.filters.show_token_holdings = false;
        assert!(visible_ids(&scene, &net).is_empty());
    }

    #[test]
    fn unrelated_device_needs_show_all() {
        let net = three_device_network();
        let mut scene = SceneState::default();
        // Everything except show_all on: the unrelated device stays hidden.
        scene.filters = VisibilityFilters {
            show_my_devices: true,
            show_my_agents: true,
            show_token_holdings: true,
            show_all: false,
        };
        assert!(!visible_ids(&scene, &net).contains(&"dev-other".to_string()));

        scene.filters.show_all = true;
        assert_eq!(visible_ids(&scene, &net).len(), 3);
    }

    #[test]
    fn agent_visibility_follows_ownership_and_holdings() {
        let net = network(
            vec![],
            vec![
                agent("agent-mine", "0xuser", &[]),
                agent("agent-held", "0xelse", &[("0xuser", 5.0)]),
                agent("agent-other", "0xstranger", &[]),
            ],
        );
        let scene = SceneState::default();
        let visible: Vec<&str> = net
            .agents
            .iter()
            .filter(|a| scene.agent_visible(&net, a))
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(visible, vec!["agent-mine", "agent-held"]);
    }

    #[test]
    fn selecting_one_kind_clears_the_other() {
        let mut scene = SceneState::default();
        scene.select_device("dev-1");
        assert_eq!(scene.selected_device(), Some("dev-1"));

        scene.select_agent("agent-1");
        assert_eq!(scene.selected_device(), None);
        assert_eq!(scene.selected_agent(), Some("agent-1"));

        scene.select_device("dev-2");
        assert_eq!(scene.selected_agent(), None);
        assert_eq!(scene.selected_device(), Some("dev-2"));
    }

    #[test]
    fn reselecting_toggles_off() {
        let mut scene = SceneState::default();
        scene.select_device("dev-1");
        scene.select_device("dev-1");
        assert_eq!(scene.selected_device(), None);

        scene.select_agent("agent-1");
        scene.select_agent("agent-1");
        assert_eq!(scene.selected_agent(), None);
    }

    #[test]
    fn bounds_contain_every_cell_corner() {
        let grid = GridSize {
            width: 10,
            height: 7,
        };
        let (min, max) = scene_pixel_bounds(grid);
        for y in 0..=grid.height {
            for x in 0..=grid.width {
                let p = iso::world_offset(x as f64, y as f64, 0.0);
                assert!(p.x >= min.x && p.x <= max.x, "{x},{y}: {p:?}");
                assert!(p.y >= min.y && p.y <= max.y, "{x},{y}: {p:?}");
            }
        }
    }

    #[test]
    fn cells_are_ordered_back_to_front() {
        let grid = GridSize {
            width: 5,
            height: 5,
        };
        let cells = ordered_cells(grid);
        assert_eq!(cells.len(), 25);
        let mut prev = i64::MIN;
        for (x, y) in cells {
            let key = iso::z_index(x as f64, y as f64, 0.0);
            assert!(key >= prev);
            prev = key;
        }
    }

    // The end-to-end placement scenario: a user-owned device at (2,3) managed
    // by a user-owned agent at (2.5,3) renders the device tile anchored at
    // grid (2,3) elevation 1, the agent marker at (2.5,3) elevation 2, and an
    // agent->user line ending at the command center cell (5,8).
    #[test]
    fn scenario_placement_matches_the_projection() {
        let mut dev = device("dev-1", "0xuser", Some("agent-1"));
        dev.position = GridPosition { x: 2.0, y: 3.0 };
        let mut ag = agent("agent-1", "0xuser", &[]);
        ag.position = Some(GridPosition { x: 2.5, y: 3.0 });
        ag.managed_device_ids = vec!["dev-1".to_string()];
        let net = network(vec![dev], vec![ag]);

        let scene = SceneState::default();
        assert!(scene.device_visible(&net, &net.devices[0]));
        assert!(scene.agent_visible(&net, &net.agents[0]));

        assert_eq!(
            device_marker_pos(&net.devices[0]),
            iso::world_offset(2.0, 3.0, 1.0)
        );
        assert_eq!(
            agent_marker_pos(net.agents[0].position.unwrap()),
            iso::world_offset(2.5, 3.0, 2.0)
        );
        // Agent is user-owned, so the second flow leg ends at the command center.
        assert!(net.agents[0].is_owned_by(&net.user_address));
        assert_eq!(command_center_pos(), iso::world_offset(5.0, 8.0, 0.0));
    }
}
