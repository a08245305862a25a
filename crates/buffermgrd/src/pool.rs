//! Buffer pool registry.

use std::collections::BTreeMap;

use sonic_cfgmgr_common::{FieldValues, FieldValuesExt};
use tracing::warn;

use crate::tables::buffer_pool_fields as fields;
use crate::types::{BufferDirection, BufferPool, INGRESS_LOSSLESS_POOL_NAME};

/// Outcome of a pool configuration upsert, for the caller to derive
/// shared-headroom-pool transitions from.
#[derive(Debug, Clone)]
pub struct PoolUpdate {
    pub is_ingress_lossless: bool,
    /// Shared-headroom size before/after this upsert.
    pub shp_size_before: String,
    pub shp_size_after: String,
    /// True when the pool carries a statically configured size.
    pub static_size: bool,
}

/// In-memory table of pool name -> pool entry.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: BTreeMap<String, BufferPool>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or updates a pool from configuration fields.
    ///
    /// Returns `Err(())` when the direction field is missing or malformed.
    /// A shared-headroom size on any pool other than the ingress-lossless
    /// pool is ignored with a warning; exactly one pool may carry it.
    pub fn upsert(&mut self, name: &str, fvs: &FieldValues) -> Result<PoolUpdate, ()> {
        let direction = match fvs.get_field(fields::TYPE) {
            Some(t) => BufferDirection::parse(t).ok_or(())?,
            None => self.pools.get(name).map(|p| p.direction).ok_or(())?,
        };

        let is_ingress_lossless = name == INGRESS_LOSSLESS_POOL_NAME;
        let entry = self.pools.entry(name.to_string()).or_insert_with(|| BufferPool {
            direction,
            dynamic_size: true,
            mode: String::new(),
            total_size: String::new(),
            xoff: String::new(),
            zero_profile_name: None,
        });
        entry.direction = direction;

        if let Some(mode) = fvs.get_field(fields::MODE) {
            entry.mode = mode.to_string();
        }

        let shp_size_before = entry.xoff.clone();

        match fvs.get_field(fields::SIZE) {
            Some(size) => {
                entry.dynamic_size = false;
                entry.total_size = size.to_string();
            }
            None => {
                // Absent size means plugin-computed; a previously computed
                // size stays until the next recalculation.
                entry.dynamic_size = true;
            }
        }

        match fvs.get_field(fields::XOFF) {
            Some(xoff) if is_ingress_lossless => entry.xoff = xoff.to_string(),
            Some(_) => {
                warn!(
                    "Ignoring shared-headroom size on pool {}; only {} may carry one",
                    name, INGRESS_LOSSLESS_POOL_NAME
                );
            }
            None if is_ingress_lossless => entry.xoff.clear(),
            None => {}
        }

        Ok(PoolUpdate {
            is_ingress_lossless,
            shp_size_before,
            shp_size_after: entry.xoff.clone(),
            static_size: !entry.dynamic_size,
        })
    }

    pub fn remove(&mut self, name: &str) -> Option<BufferPool> {
        self.pools.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&BufferPool> {
        self.pools.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut BufferPool> {
        self.pools.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pools.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BufferPool)> {
        self.pools.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Drops every zero-profile back-reference, after the reclaim feature
    /// has been disabled.
    pub fn clear_zero_profiles(&mut self) {
        for pool in self.pools.values_mut() {
            pool.zero_profile_name = None;
        }
    }

    /// Pool readiness: at least one pool exists and none remain in
    /// "dynamic, unresolved" state.
    pub fn all_resolved(&self) -> bool {
        !self.pools.is_empty() && self.pools.values().all(|p| !p.total_size.is_empty())
    }

    /// Field-values as written to the application store for one pool.
    pub fn to_field_values(pool: &BufferPool) -> FieldValues {
        let mut fvs = vec![
            ("type".to_string(), pool.direction.as_str().to_string()),
            ("mode".to_string(), pool.mode.clone()),
            ("size".to_string(), pool.total_size.clone()),
        ];
        if !pool.xoff.is_empty() {
            fvs.push(("xoff".to_string(), pool.xoff.clone()));
        }
        fvs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fvs(pairs: &[(&str, &str)]) -> FieldValues {
        pairs
            .iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_upsert_static_pool() {
        let mut reg = PoolRegistry::new();
        let update = reg
            .upsert(
                "egress_lossy_pool",
                &fvs(&[("type", "egress"), ("mode", "dynamic"), ("size", "1024000")]),
            )
            .unwrap();

        assert!(!update.is_ingress_lossless);
        assert!(update.static_size);

        let pool = reg.get("egress_lossy_pool").unwrap();
        assert_eq!(pool.direction, BufferDirection::Egress);
        assert!(!pool.dynamic_size);
        assert_eq!(pool.total_size, "1024000");
        assert!(reg.all_resolved());
    }

    #[test]
    fn test_upsert_dynamic_pool_not_resolved() {
        let mut reg = PoolRegistry::new();
        reg.upsert(
            INGRESS_LOSSLESS_POOL_NAME,
            &fvs(&[("type", "ingress"), ("mode", "dynamic")]),
        )
        .unwrap();

        assert!(!reg.all_resolved());
        assert!(reg.get(INGRESS_LOSSLESS_POOL_NAME).unwrap().dynamic_size);
    }

    #[test]
    fn test_upsert_invalid_direction() {
        let mut reg = PoolRegistry::new();
        assert!(reg
            .upsert("some_pool", &fvs(&[("type", "sideways")]))
            .is_err());
        assert!(reg.upsert("some_pool", &fvs(&[("mode", "dynamic")])).is_err());
    }

    #[test]
    fn test_shp_size_tracking() {
        let mut reg = PoolRegistry::new();
        let update = reg
            .upsert(
                INGRESS_LOSSLESS_POOL_NAME,
                &fvs(&[("type", "ingress"), ("mode", "dynamic"), ("xoff", "1024000")]),
            )
            .unwrap();
        assert_eq!(update.shp_size_before, "");
        assert_eq!(update.shp_size_after, "1024000");

        // Removing the field clears the tracked size.
        let update = reg
            .upsert(INGRESS_LOSSLESS_POOL_NAME, &fvs(&[("type", "ingress")]))
            .unwrap();
        assert_eq!(update.shp_size_before, "1024000");
        assert_eq!(update.shp_size_after, "");
    }

    #[test]
    fn test_shp_size_ignored_on_other_pools() {
        let mut reg = PoolRegistry::new();
        let update = reg
            .upsert(
                "egress_lossy_pool",
                &fvs(&[("type", "egress"), ("xoff", "1024000")]),
            )
            .unwrap();
        assert_eq!(update.shp_size_after, "");
        assert_eq!(reg.get("egress_lossy_pool").unwrap().xoff, "");
    }

    #[test]
    fn test_clear_zero_profile_back_references() {
        let mut reg = PoolRegistry::new();
        reg.upsert(
            INGRESS_LOSSLESS_POOL_NAME,
            &fvs(&[("type", "ingress"), ("mode", "dynamic")]),
        )
        .unwrap();
        reg.get_mut(INGRESS_LOSSLESS_POOL_NAME).unwrap().zero_profile_name =
            Some("ingress_lossless_zero_profile".to_string());

        reg.clear_zero_profiles();
        assert!(reg
            .get(INGRESS_LOSSLESS_POOL_NAME)
            .unwrap()
            .zero_profile_name
            .is_none());
    }

    #[test]
    fn test_all_resolved_after_computed_size() {
        let mut reg = PoolRegistry::new();
        reg.upsert(
            INGRESS_LOSSLESS_POOL_NAME,
            &fvs(&[("type", "ingress"), ("mode", "dynamic")]),
        )
        .unwrap();
        assert!(!reg.all_resolved());

        reg.get_mut(INGRESS_LOSSLESS_POOL_NAME).unwrap().total_size = "12345678".to_string();
        assert!(reg.all_resolved());
    }
}
