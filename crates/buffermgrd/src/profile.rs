//! Buffer profile registry.
//!
//! Owns the profile lifecycle: dynamically derived profiles are created
//! lazily the first time a PG needs them and released once the last
//! reference is gone; statically configured profiles live for as long as
//! their configuration does.

use std::collections::BTreeMap;

use sonic_cfgmgr_common::defaults;
use tracing::debug;

use crate::types::BufferProfile;

/// Derives the canonical name of a dynamically calculated profile.
///
/// The default MTU and the default threshold are omitted from the name;
/// the "_8lane" suffix disambiguates platforms whose 8-lane ports need
/// distinct headroom for the same speed/cable.
pub fn dynamic_profile_name(
    speed: &str,
    cable_length: &str,
    mtu: &str,
    custom_threshold: Option<&str>,
    gearbox_model: &str,
    eight_lane: bool,
) -> String {
    let mut name = format!("pg_lossless_{}_{}", speed, cable_length);
    if mtu != defaults::DEFAULT_MTU {
        name.push_str(&format!("_mtu{}", mtu));
    }
    if let Some(th) = custom_threshold {
        name.push_str(&format!("_th{}", th));
    }
    if !gearbox_model.is_empty() {
        name.push_str(&format!("_{}", gearbox_model));
    }
    if eight_lane {
        name.push_str("_8lane");
    }
    name.push_str("_profile");
    name
}

/// Why a release attempt left the profile in place.
#[derive(Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Removed from the registry; caller must delete it from the stores.
    Released(BufferProfile),
    /// Statically configured profiles are never auto-released.
    KeptStatic,
    /// Still referenced by at least one PG.
    KeptReferenced,
    /// No such profile.
    Missing,
}

/// In-memory table of profile name -> profile entity.
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, BufferProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&BufferProfile> {
        self.profiles.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut BufferProfile> {
        self.profiles.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn insert(&mut self, profile: BufferProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn remove(&mut self, name: &str) -> Option<BufferProfile> {
        self.profiles.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BufferProfile)> {
        self.profiles.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Names of all dynamically calculated profiles.
    pub fn dynamic_profile_names(&self) -> Vec<String> {
        self.profiles
            .values()
            .filter(|p| p.dynamic_calculated && !p.static_configured)
            .map(|p| p.name.clone())
            .collect()
    }

    /// Records a PG reference on a profile. Unknown profiles are ignored.
    pub fn add_reference(&mut self, name: &str, pg_key: &str) {
        if let Some(profile) = self.profiles.get_mut(name) {
            profile.port_pgs.insert(pg_key.to_string());
        }
    }

    /// Drops a PG reference from a profile.
    pub fn remove_reference(&mut self, name: &str, pg_key: &str) {
        if let Some(profile) = self.profiles.get_mut(name) {
            profile.port_pgs.remove(pg_key);
        }
    }

    /// Releases a profile if it is neither statically configured nor
    /// referenced. The caller removes a `Released` profile from the
    /// stores.
    pub fn release(&mut self, name: &str) -> ReleaseOutcome {
        match self.profiles.get(name) {
            None => ReleaseOutcome::Missing,
            Some(p) if p.static_configured => ReleaseOutcome::KeptStatic,
            Some(p) if !p.port_pgs.is_empty() => ReleaseOutcome::KeptReferenced,
            Some(_) => {
                debug!("Releasing unreferenced dynamic profile {}", name);
                ReleaseOutcome::Released(self.profiles.remove(name).expect("checked above"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferDirection, INGRESS_LOSSLESS_POOL_NAME};
    use std::collections::BTreeSet;

    fn make_profile(name: &str, static_configured: bool) -> BufferProfile {
        BufferProfile {
            name: name.to_string(),
            direction: BufferDirection::Ingress,
            pool_name: INGRESS_LOSSLESS_POOL_NAME.to_string(),
            static_configured,
            dynamic_calculated: !static_configured,
            lossless: true,
            threshold_mode: "dynamic_th".to_string(),
            threshold: "0".to_string(),
            xon: "18432".to_string(),
            xoff: "16384".to_string(),
            xon_offset: String::new(),
            size: "34816".to_string(),
            speed: "100000".to_string(),
            cable_length: "5m".to_string(),
            mtu: "9100".to_string(),
            gearbox_model: String::new(),
            lane_count: 4,
            port_pgs: BTreeSet::new(),
        }
    }

    #[test]
    fn test_dynamic_profile_name_defaults() {
        assert_eq!(
            dynamic_profile_name("100000", "5m", "9100", None, "", false),
            "pg_lossless_100000_5m_profile"
        );
    }

    #[test]
    fn test_dynamic_profile_name_full() {
        assert_eq!(
            dynamic_profile_name("400000", "300m", "1500", Some("2"), "gbx1", true),
            "pg_lossless_400000_300m_mtu1500_th2_gbx1_8lane_profile"
        );
    }

    #[test]
    fn test_release_respects_references() {
        let mut reg = ProfileRegistry::new();
        reg.insert(make_profile("pg_lossless_100000_5m_profile", false));
        reg.add_reference("pg_lossless_100000_5m_profile", "Ethernet0:3-4");

        assert_eq!(
            reg.release("pg_lossless_100000_5m_profile"),
            ReleaseOutcome::KeptReferenced
        );
        assert!(reg.contains("pg_lossless_100000_5m_profile"));

        reg.remove_reference("pg_lossless_100000_5m_profile", "Ethernet0:3-4");
        assert!(matches!(
            reg.release("pg_lossless_100000_5m_profile"),
            ReleaseOutcome::Released(_)
        ));
        assert!(!reg.contains("pg_lossless_100000_5m_profile"));
    }

    #[test]
    fn test_release_returns_the_removed_profile() {
        let mut reg = ProfileRegistry::new();
        let profile = make_profile("pg_lossless_100000_5m_profile", false);
        reg.insert(profile.clone());

        assert_eq!(
            reg.release("pg_lossless_100000_5m_profile"),
            ReleaseOutcome::Released(profile)
        );
    }

    #[test]
    fn test_release_keeps_static_profiles() {
        let mut reg = ProfileRegistry::new();
        reg.insert(make_profile("static_profile", true));
        assert_eq!(reg.release("static_profile"), ReleaseOutcome::KeptStatic);
        assert!(reg.contains("static_profile"));
    }

    #[test]
    fn test_release_missing() {
        let mut reg = ProfileRegistry::new();
        assert_eq!(reg.release("nope"), ReleaseOutcome::Missing);
    }

    #[test]
    fn test_dynamic_profile_names_excludes_static() {
        let mut reg = ProfileRegistry::new();
        reg.insert(make_profile("dyn_profile", false));
        reg.insert(make_profile("static_profile", true));
        assert_eq!(reg.dynamic_profile_names(), vec!["dyn_profile".to_string()]);
    }
}
