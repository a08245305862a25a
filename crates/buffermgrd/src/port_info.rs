//! Port info registry and effective-speed derivation.

use std::collections::BTreeMap;

use tracing::debug;

use crate::types::{PortInfo, PortState};

/// Highest speed in a comma-separated speed list, as a string.
fn max_of_speed_list(list: &str) -> Option<String> {
    list.split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .max()
        .map(|s| s.to_string())
}

/// In-memory table of port name -> port info.
#[derive(Debug, Default)]
pub struct PortRegistry {
    ports: BTreeMap<String, PortInfo>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the port entry, creating it in the default admin-down
    /// state on first sighting.
    pub fn ensure(&mut self, port: &str) -> &mut PortInfo {
        self.ports.entry(port.to_string()).or_default()
    }

    pub fn get(&self, port: &str) -> Option<&PortInfo> {
        self.ports.get(port)
    }

    pub fn get_mut(&mut self, port: &str) -> Option<&mut PortInfo> {
        self.ports.get_mut(port)
    }

    pub fn remove(&mut self, port: &str) -> Option<PortInfo> {
        self.ports.remove(port)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PortInfo)> {
        self.ports.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when some other port than `except` is admin-down.
    pub fn any_admin_down_except(&self, except: &str) -> bool {
        self.ports
            .iter()
            .any(|(name, pi)| name != except && pi.state == PortState::AdminDown)
    }

    /// Re-derives the effective speed of a port.
    ///
    /// With autonegotiation enabled the effective speed is the highest
    /// advertised speed if any are configured, otherwise the highest
    /// learned supported speed, otherwise unknown (the port stays
    /// initializing). Without autonegotiation it is the configured speed.
    ///
    /// Returns whether the effective speed changed, which is the trigger
    /// for headroom recomputation.
    pub fn refresh_effective_speed(&mut self, port: &str) -> bool {
        let Some(pi) = self.ports.get_mut(port) else {
            return false;
        };

        let new_speed = if pi.auto_neg {
            if let Some(max) = max_of_speed_list(&pi.advertised_speeds) {
                max
            } else if let Some(max) = max_of_speed_list(&pi.supported_speeds) {
                max
            } else {
                debug!(
                    "Port {}: autoneg enabled but no advertised or supported speeds known yet",
                    port
                );
                String::new()
            }
        } else {
            pi.speed.clone()
        };

        let changed = new_speed != pi.effective_speed;
        pi.effective_speed = new_speed;
        changed
    }

    /// Recomputes the non-admin-down state of a port from info
    /// completeness: ready once cable length and effective speed are
    /// known, initializing otherwise. Admin-down is left untouched.
    pub fn refresh_state(&mut self, port: &str) {
        let Some(pi) = self.ports.get_mut(port) else {
            return;
        };
        if pi.state == PortState::AdminDown {
            return;
        }
        pi.state = if !pi.effective_speed.is_empty() && !pi.cable_length.is_empty() {
            PortState::Ready
        } else {
            PortState::Initializing
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_of_speed_list() {
        assert_eq!(
            max_of_speed_list("10000,25000,100000"),
            Some("100000".to_string())
        );
        assert_eq!(max_of_speed_list("40000"), Some("40000".to_string()));
        assert_eq!(max_of_speed_list(""), None);
        assert_eq!(max_of_speed_list("all"), None);
    }

    #[test]
    fn test_ensure_defaults_admin_down() {
        let mut reg = PortRegistry::new();
        let pi = reg.ensure("Ethernet0");
        assert_eq!(pi.state, PortState::AdminDown);
    }

    #[test]
    fn test_effective_speed_no_autoneg() {
        let mut reg = PortRegistry::new();
        reg.ensure("Ethernet0").speed = "100000".to_string();

        assert!(reg.refresh_effective_speed("Ethernet0"));
        assert_eq!(reg.get("Ethernet0").unwrap().effective_speed, "100000");

        // Unchanged speed does not report a change.
        assert!(!reg.refresh_effective_speed("Ethernet0"));
    }

    #[test]
    fn test_effective_speed_autoneg_advertised_wins() {
        let mut reg = PortRegistry::new();
        {
            let pi = reg.ensure("Ethernet0");
            pi.auto_neg = true;
            pi.speed = "40000".to_string();
            pi.advertised_speeds = "10000,25000".to_string();
            pi.supported_speeds = "10000,25000,100000".to_string();
        }
        reg.refresh_effective_speed("Ethernet0");
        assert_eq!(reg.get("Ethernet0").unwrap().effective_speed, "25000");
    }

    #[test]
    fn test_effective_speed_autoneg_supported_fallback() {
        let mut reg = PortRegistry::new();
        {
            let pi = reg.ensure("Ethernet0");
            pi.auto_neg = true;
            pi.supported_speeds = "10000,25000,100000".to_string();
        }
        reg.refresh_effective_speed("Ethernet0");
        assert_eq!(reg.get("Ethernet0").unwrap().effective_speed, "100000");
    }

    #[test]
    fn test_effective_speed_autoneg_nothing_known() {
        let mut reg = PortRegistry::new();
        reg.ensure("Ethernet0").auto_neg = true;
        assert!(!reg.refresh_effective_speed("Ethernet0"));
        assert_eq!(reg.get("Ethernet0").unwrap().effective_speed, "");
    }

    #[test]
    fn test_state_machine_transitions() {
        let mut reg = PortRegistry::new();
        {
            let pi = reg.ensure("Ethernet0");
            pi.state = PortState::Initializing;
            pi.speed = "100000".to_string();
        }

        // Incomplete info keeps the port initializing.
        reg.refresh_effective_speed("Ethernet0");
        reg.refresh_state("Ethernet0");
        assert_eq!(reg.get("Ethernet0").unwrap().state, PortState::Initializing);

        // Cable length arriving completes it.
        reg.get_mut("Ethernet0").unwrap().cable_length = "5m".to_string();
        reg.refresh_state("Ethernet0");
        assert_eq!(reg.get("Ethernet0").unwrap().state, PortState::Ready);

        // Admin-down is never overwritten by refresh_state.
        reg.get_mut("Ethernet0").unwrap().state = PortState::AdminDown;
        reg.refresh_state("Ethernet0");
        assert_eq!(reg.get("Ethernet0").unwrap().state, PortState::AdminDown);
    }

    #[test]
    fn test_any_admin_down_except() {
        let mut reg = PortRegistry::new();
        reg.ensure("Ethernet0");
        reg.ensure("Ethernet4").state = PortState::Ready;

        assert!(!reg.any_admin_down_except("Ethernet0"));
        assert!(reg.any_admin_down_except("Ethernet4"));
    }
}
