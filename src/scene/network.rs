// src/scene/network.rs
// Deserialized device-network document plus the ownership/holding queries the
// filters and alpha rules are built on. The host supplies this as one JSON
// document per load; nothing here is persisted.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Grid cell the user's command center occupies. Flow paths for user-owned
/// agents terminate here.
pub const COMMAND_CENTER: GridPosition = GridPosition { x: 5.0, y: 8.0 };

/// Logical tile coordinates. Integer for placed entities; agents hold
/// fractional positions mid-move.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GridPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Hotspot,
    Sensor,
    Gateway,
    Storage,
    Compute,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
    Maintenance,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verification {
    Verified,
    Pending,
    Failed,
    #[default]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    pub position: GridPosition,
    pub owner: String,
    #[serde(default)]
    pub managing_agent_id: Option<String>,
    pub status: DeviceStatus,
    pub revenue_per_day: f64,
    #[serde(default)]
    pub verification: Verification,
}

impl Device {
    pub fn is_owned_by(&self, address: &str) -> bool {
        self.owner == address
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Validator,
    Router,
    Oracle,
    Maintainer,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAgent {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    pub owner: String,
    #[serde(default)]
    pub position: Option<GridPosition>,
    #[serde(default)]
    pub target_device_id: Option<String>,
    #[serde(default)]
    pub managed_device_ids: Vec<String>,
    pub token_symbol: String,
    pub token_supply: f64,
    pub token_price: f64,
    pub revenue_generated: f64,
    /// holder address -> token amount
    #[serde(default)]
    pub holders: HashMap<String, f64>,
    #[serde(default)]
    pub verification: Verification,
}

impl NetworkAgent {
    pub fn is_owned_by(&self, address: &str) -> bool {
        self.owner == address
    }

    pub fn holds_tokens(&self, address: &str) -> bool {
        self.holders.get(address).is_some_and(|amount| *amount > 0.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DeviceNetwork {
    pub user_address: String,
    pub devices: Vec<Device>,
    pub agents: Vec<NetworkAgent>,
    pub grid_size: GridSize,
}

impl DeviceNetwork {
    /// Repairs referential integrity after deserialization: any
    /// `managing_agent_id` or `target_device_id` naming a missing entity is
    /// cleared, and missing ids are dropped from `managed_device_ids`.
    /// Returns the number of repairs made; each one is logged. Render code
    /// may still encounter a dangling reference if the host mutates the
    /// document afterwards, and skips it silently in that case.
    pub fn validate(&mut self) -> usize {
        let agent_ids: Vec<String> = self.agents.iter().map(|a| a.id.clone()).collect();
        let device_ids: Vec<String> = self.devices.iter().map(|d| d.id.clone()).collect();
        let mut repairs = 0;

        for device in &mut self.devices {
            if let Some(agent_id) = &device.managing_agent_id {
                if !agent_ids.iter().any(|id| id == agent_id) {
                    log::warn!(
                        "device {} references missing agent {agent_id}; clearing",
                        device.id
                    );
                    device.managing_agent_id = None;
                    repairs += 1;
                }
            }
        }

        for agent in &mut self.agents {
            if let Some(target) = &agent.target_device_id {
                if !device_ids.iter().any(|id| id == target) {
                    log::warn!(
                        "agent {} targets missing device {target}; clearing",
                        agent.id
                    );
                    agent.target_device_id = None;
                    repairs += 1;
                }
            }
            let before = agent.managed_device_ids.len();
            agent
                .managed_device_ids
                .retain(|id| device_ids.iter().any(|d| d == id));
            let dropped = before - agent.managed_device_ids.len();
            if dropped > 0 {
                log::warn!(
                    "agent {} managed {dropped} missing device id(s); dropped",
                    agent.id
                );
                repairs += dropped;
            }
        }

        repairs
    }

    pub fn device(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn agent(&self, id: &str) -> Option<&NetworkAgent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn managing_agent(&self, device: &Device) -> Option<&NetworkAgent> {
        self.agent(device.managing_agent_id.as_deref()?)
    }

    /// True when the viewing user holds tokens in the device's managing agent.
    pub fn user_holds_device_tokens(&self, device: &Device) -> bool {
        self.managing_agent(device)
            .is_some_and(|agent| agent.holds_tokens(&self.user_address))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn device(id: &str, owner: &str, agent: Option<&str>) -> Device {
        Device {
            id: id.to_string(),
            name: format!("Device {id}"),
            kind: DeviceKind::Hotspot,
            position: GridPosition { x: 2.0, y: 3.0 },
            owner: owner.to_string(),
            managing_agent_id: agent.map(str::to_string),
            status: DeviceStatus::Active,
            revenue_per_day: 40.0,
            verification: Verification::Verified,
        }
    }

    pub(crate) fn agent(id: &str, owner: &str, holders: &[(&str, f64)]) -> NetworkAgent {
        NetworkAgent {
            id: id.to_string(),
            name: format!("Agent {id}"),
            kind: AgentKind::Validator,
            owner: owner.to_string(),
            position: Some(GridPosition { x: 2.5, y: 3.0 }),
            target_device_id: None,
            managed_device_ids: Vec::new(),
            token_symbol: "DPN".to_string(),
            token_supply: 1_000_000.0,
            token_price: 0.05,
            revenue_generated: 1234.0,
            holders: holders
                .iter()
                .map(|(addr, amount)| (addr.to_string(), *amount))
                .collect(),
            verification: Verification::Pending,
        }
    }

    pub(crate) fn network(devices: Vec<Device>, agents: Vec<NetworkAgent>) -> DeviceNetwork {
        DeviceNetwork {
            user_address: "0xuser".to_string(),
            devices,
            agents,
            grid_size: GridSize {
                width: 10,
                height: 10,
            },
        }
    }

    #[test]
    fn deserializes_camel_case_document() {
        let json = r#"{
            "userAddress": "0xuser",
            "gridSize": {"width": 10, "height": 10},
            "devices": [{
                "id": "dev-1",
                "name": "Rooftop Hotspot",
                "type": "hotspot",
                "position": {"x": 2, "y": 3},
                "owner": "0xuser",
                "managingAgentId": "agent-1",
                "status": "active",
                "revenuePerDay": 42.5,
                "verification": "verified"
            }],
            "agents": [{
                "id": "agent-1",
                "name": "Fleet Validator",
                "type": "validator",
                "owner": "0xuser",
                "position": {"x": 2.5, "y": 3},
                "managedDeviceIds": ["dev-1"],
                "tokenSymbol": "FLT",
                "tokenSupply": 1000000,
                "tokenPrice": 0.07,
                "revenueGenerated": 910.0,
                "holders": {"0xother": 250.0}
            }]
        }"#;

        let net: DeviceNetwork = serde_json::from_str(json).unwrap();
        assert_eq!(net.devices[0].kind, DeviceKind::Hotspot);
        assert_eq!(net.devices[0].managing_agent_id.as_deref(), Some("agent-1"));
        assert_eq!(net.agents[0].verification, Verification::Unknown);
        assert!(net.agents[0].holds_tokens("0xother"));
        assert!(!net.agents[0].holds_tokens("0xuser"));
    }

    #[test]
    fn validate_clears_dangling_managing_agent() {
        let mut net = network(
            vec![device("dev-1", "0xuser", Some("ghost"))],
            vec![agent("agent-1", "0xuser", &[])],
        );
        assert_eq!(net.validate(), 1);
        assert_eq!(net.devices[0].managing_agent_id, None);
    }

    #[test]
    fn validate_repairs_agent_side_references() {
        let mut bad_agent = agent("agent-1", "0xuser", &[]);
        bad_agent.target_device_id = Some("ghost-dev".to_string());
        bad_agent.managed_device_ids = vec!["dev-1".to_string(), "ghost-dev".to_string()];

        let mut net = network(vec![device("dev-1", "0xuser", Some("agent-1"))], vec![bad_agent]);
        assert_eq!(net.validate(), 2);
        assert_eq!(net.agents[0].target_device_id, None);
        assert_eq!(net.agents[0].managed_device_ids, vec!["dev-1".to_string()]);
    }

    #[test]
    fn validate_leaves_consistent_documents_alone() {
        let mut consistent = agent("agent-1", "0xuser", &[]);
        consistent.target_device_id = Some("dev-1".to_string());
        consistent.managed_device_ids = vec!["dev-1".to_string()];

        let mut net = network(
            vec![device("dev-1", "0xuser", Some("agent-1"))],
            vec![consistent],
        );
        assert_eq!(net.validate(), 0);
        assert_eq!(net.devices[0].managing_agent_id.as_deref(), Some("agent-1"));
    }

    #[test]
    fn token_holding_resolves_through_managing_agent() {
        let net = network(
            vec![device("dev-1", "0xelse", Some("agent-1"))],
            vec![agent("agent-1", "0xelse", &[("0xuser", 100.0)])],
        );
        assert!(net.user_holds_device_tokens(&net.devices[0]));

        let net = network(
            vec![device("dev-1", "0xelse", Some("agent-1"))],
            vec![agent("agent-1", "0xelse", &[("0xuser", 0.0)])],
        );
        assert!(!net.user_holds_device_tokens(&net.devices[0]));
    }
}
