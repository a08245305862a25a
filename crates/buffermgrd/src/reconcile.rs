//! Admission control, pool-size recomputation and the periodic tick.
//!
//! The reconciler runs on every timer tick and opportunistically after
//! headroom-affecting changes: it recomputes shared pool sizes through the
//! vendor plugin (writing only on change), retries pending reclaims and
//! restores, applies deferred zero profiles after the warm-up window, and
//! declares full initialization once everything configured has landed.

use tracing::{debug, error, info, warn};

use sonic_cfgmgr_common::{Orch, WarmRestartState};
use sonic_orch_common::TaskStatus;

use crate::buffer_mgr::BufferMgrDynamic;
use crate::pool::PoolRegistry;
use crate::reclaim::ZERO_PROFILE_DEFER_TICKS;
use crate::tables::{APP_BUFFER_POOL_TABLE, STATE_BUFFER_POOL_TABLE, STATE_WARM_RESTART_TABLE};
use crate::types::{PortState, INGRESS_LOSSLESS_POOL_NAME};
use crate::vendor::{self, HeadroomResult, PoolSizeResult};

/// A shared-headroom-pool configuration event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShpEvent {
    SizeConfigured,
    SizeRemoved,
    RatioConfigured,
    RatioRemoved,
}

/// What currently enables the shared headroom pool. A configured absolute
/// size takes precedence over the over-subscription ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShpEnabler {
    Size,
    Ratio,
    Disabled,
}

fn shp_enabler(size: &str, ratio: &str) -> ShpEnabler {
    if !size.is_empty() && size != "0" {
        ShpEnabler::Size
    } else if !ratio.is_empty() && ratio != "0" {
        ShpEnabler::Ratio
    } else {
        ShpEnabler::Disabled
    }
}

impl BufferMgrDynamic {
    /// Validates a candidate profile against the port's headroom budget.
    ///
    /// Lossy profiles always pass. A plugin invocation failure or a
    /// missing result line is treated as valid (fail-open) so that a
    /// transient plugin error cannot block convergence; the anomaly is
    /// logged.
    pub(crate) fn is_headroom_valid(
        &mut self,
        port: &str,
        profile_name: &str,
        new_pg: Option<&str>,
    ) -> bool {
        let Some(profile) = self.profiles.get(profile_name) else {
            return true;
        };
        if !profile.lossless {
            return true;
        }
        let keys = vec![port.to_string()];
        let mut args = vec![profile_name.to_string(), profile.size.clone()];
        if let Some(pg) = new_pg {
            args.push(pg.to_string());
        }
        let lines = match self.plugin.check_headroom_budget(&keys, &args) {
            Ok(lines) => lines,
            Err(e) => {
                warn!(
                    "Headroom budget check for port {} failed: {}; accepting",
                    port, e
                );
                return true;
            }
        };
        let fields = vendor::parse_result_lines(&lines);
        match vendor::result_field(&fields, "result") {
            Some("false") => false,
            Some(_) => true,
            None => {
                warn!(
                    "Headroom budget check for port {} returned no result; accepting",
                    port
                );
                true
            }
        }
    }

    /// Marks pool readiness once every registered pool has a resolved
    /// size. The flag is sticky.
    pub(crate) fn update_pool_readiness(&mut self) {
        if !self.pool_ready && self.pools.all_resolved() {
            self.pool_ready = true;
            info!("All buffer pools resolved; starting to apply buffer configuration");
        }
    }

    /// Recomputes shared pool sizes through the vendor plugin and writes
    /// changed pools to the stores. Under ratio-driven shared-headroom
    /// sizing the computed headroom size goes into the store entry only;
    /// the registry keeps tracking the configured value.
    pub(crate) fn recalculate_pool_sizes(&mut self) {
        if self.pools.is_empty() {
            return;
        }
        let lines = match self.plugin.compute_pool_sizes() {
            Ok(lines) => lines,
            Err(e) => {
                debug!("Pool size calculation unavailable: {}", e);
                return;
            }
        };
        let results = PoolSizeResult::from_lines(&lines);

        let ratio_enabled = {
            let configured_xoff = self
                .pools
                .get(INGRESS_LOSSLESS_POOL_NAME)
                .map(|p| p.xoff.clone())
                .unwrap_or_default();
            shp_enabler(&configured_xoff, &self.over_subscribe_ratio) == ShpEnabler::Ratio
        };
        let force = self.shp_deferred_recalc;
        self.shp_deferred_recalc = false;

        for result in results {
            if !self.pools.contains(&result.pool) {
                warn!("Plugin returned a size for unknown pool {}", result.pool);
                continue;
            }
            let Ok(size) = result.size.parse::<u64>() else {
                warn!(
                    "Plugin returned non-numeric size '{}' for pool {}",
                    result.size, result.pool
                );
                continue;
            };
            if self.mmu_size > 0 && size > self.mmu_size {
                error!(
                    "Computed size {} for pool {} exceeds maximum memory size {}; skipped",
                    size, result.pool, self.mmu_size
                );
                continue;
            }

            let mut changed = false;
            {
                let pool = self
                    .pools
                    .get_mut(&result.pool)
                    .expect("existence checked above");
                if pool.dynamic_size && pool.total_size != result.size {
                    pool.total_size = result.size.clone();
                    changed = true;
                }
            }

            let mut computed_xoff = None;
            if result.pool == INGRESS_LOSSLESS_POOL_NAME && ratio_enabled {
                if let Some(shp) = result.shp_size.clone() {
                    if self.appl_db.hget(APP_BUFFER_POOL_TABLE, &result.pool, "xoff")
                        != Some(shp.as_str())
                    {
                        changed = true;
                    }
                    computed_xoff = Some(shp);
                }
            }

            if changed || force {
                let Some(pool) = self.pools.get(&result.pool) else {
                    continue;
                };
                if pool.total_size.is_empty() {
                    continue;
                }
                let mut fvs = PoolRegistry::to_field_values(pool);
                if let Some(xoff) = computed_xoff {
                    match fvs.iter_mut().find(|(f, _)| f == "xoff") {
                        Some(entry) => entry.1 = xoff,
                        None => fvs.push(("xoff".to_string(), xoff)),
                    }
                }
                debug!("Pool {} recomputed: size {}", result.pool, result.size);
                self.appl_db
                    .replace(APP_BUFFER_POOL_TABLE, &result.pool, fvs.clone());
                self.state_db
                    .replace(STATE_BUFFER_POOL_TABLE, &result.pool, fvs);
            }
        }

        self.update_pool_readiness();
    }

    /// Handles a shared-headroom-pool enablement transition. Toggling the
    /// enablement changes how the plugin apportions headroom, so every
    /// dynamically calculated profile must be re-derived; a sizing-source
    /// flip from static to ratio only defers to the next pool recompute.
    pub(crate) fn refresh_shared_headroom_pool(
        &mut self,
        event: ShpEvent,
        old_size: &str,
        old_ratio: &str,
    ) {
        let old = shp_enabler(old_size, old_ratio);
        let new_size = self
            .pools
            .get(INGRESS_LOSSLESS_POOL_NAME)
            .map(|p| p.xoff.clone())
            .unwrap_or_default();
        let new = shp_enabler(&new_size, &self.over_subscribe_ratio);
        debug!(
            "Shared headroom pool transition {:?} -> {:?} on {:?}",
            old, new, event
        );

        let refresh = match (old, event) {
            (ShpEnabler::Size, ShpEvent::RatioConfigured | ShpEvent::RatioRemoved) => false,
            (ShpEnabler::Size, ShpEvent::SizeConfigured) => false,
            (ShpEnabler::Size, ShpEvent::SizeRemoved) => {
                if new == ShpEnabler::Ratio {
                    // Still enabled; sizing source becomes computed.
                    self.shp_deferred_recalc = true;
                    false
                } else {
                    true
                }
            }
            (ShpEnabler::Ratio, ShpEvent::SizeConfigured) => true,
            (ShpEnabler::Ratio, ShpEvent::SizeRemoved) => {
                self.shp_deferred_recalc = true;
                false
            }
            (ShpEnabler::Ratio, ShpEvent::RatioRemoved) => new == ShpEnabler::Disabled,
            (ShpEnabler::Ratio, ShpEvent::RatioConfigured) => {
                // Ratio value change; pool recompute picks up the new sizing.
                self.shp_deferred_recalc = true;
                false
            }
            (ShpEnabler::Disabled, ShpEvent::SizeConfigured | ShpEvent::RatioConfigured) => true,
            (ShpEnabler::Disabled, ShpEvent::SizeRemoved | ShpEvent::RatioRemoved) => false,
        };

        if refresh {
            info!(
                "Shared headroom pool {}; re-deriving dynamic profiles",
                if new == ShpEnabler::Disabled {
                    "disabled"
                } else {
                    "enabled"
                }
            );
            self.refresh_dynamic_profiles();
        }
        self.write_pool_to_stores(INGRESS_LOSSLESS_POOL_NAME);
        self.recalculate_pool_sizes();
    }

    /// Re-derives the headroom of every dynamically calculated profile
    /// through the vendor plugin, writing only profiles whose fields
    /// actually changed.
    pub(crate) fn refresh_dynamic_profiles(&mut self) {
        for name in self.profiles.dynamic_profile_names() {
            let Some((speed, cable, mtu, gearbox, lanes)) = self.profiles.get(&name).map(|p| {
                (
                    p.speed.clone(),
                    p.cable_length.clone(),
                    p.mtu.clone(),
                    p.gearbox_model.clone(),
                    p.lane_count,
                )
            }) else {
                continue;
            };
            let keys = vec![name.clone()];
            let args = vec![speed, cable, mtu, gearbox, lanes.to_string()];
            let lines = match self.plugin.compute_headroom(&keys, &args) {
                Ok(lines) => lines,
                Err(e) => {
                    warn!("Headroom recalculation for {} failed: {}", name, e);
                    continue;
                }
            };
            let headroom = match HeadroomResult::from_lines(&lines) {
                Ok(h) => h,
                Err(e) => {
                    warn!("Headroom recalculation for {} is malformed: {}", name, e);
                    continue;
                }
            };
            let changed = match self.profiles.get_mut(&name) {
                Some(p) => {
                    if p.xon == headroom.xon
                        && p.xoff == headroom.xoff
                        && p.xon_offset == headroom.xon_offset
                        && p.size == headroom.size
                    {
                        false
                    } else {
                        p.xon = headroom.xon;
                        p.xoff = headroom.xoff;
                        p.xon_offset = headroom.xon_offset;
                        p.size = headroom.size;
                        true
                    }
                }
                None => false,
            };
            if changed && self.pool_ready {
                self.write_profile_to_stores(&name);
            }
        }
    }

    /// Periodic timer body: pool recompute, pending-work retries,
    /// deferred zero-profile application and the initialization check.
    pub fn tick(&mut self) {
        self.tick_count += 1;
        self.recalculate_pool_sizes();

        if self.pool_ready {
            for port in self.pending_reclaim_ports.clone() {
                self.retry_pending_reclaim(&port);
            }
            for port in self.pending_apply_ports.clone() {
                let admin_down = self
                    .ports
                    .get(&port)
                    .map(|pi| pi.state == PortState::AdminDown)
                    .unwrap_or(true);
                if admin_down {
                    self.pending_apply_ports.remove(&port);
                    continue;
                }
                if self.reapply_port_objects(&port) != TaskStatus::NeedRetry {
                    self.pending_apply_ports.remove(&port);
                }
            }
        }

        if self.warm_restart || self.tick_count >= ZERO_PROFILE_DEFER_TICKS {
            let items = std::mem::take(&mut self.deferred_zero_items);
            for (port, kind) in items {
                let admin_down = self
                    .ports
                    .get(&port)
                    .map(|pi| pi.state == PortState::AdminDown)
                    .unwrap_or(false);
                if admin_down {
                    self.apply_reclaimed_zero(&port, kind);
                }
            }
        }

        self.check_full_initialization();
        debug!(
            "Tick {}: dispatched {} ok / {} retry / {} failed / {} invalid",
            self.tick_count,
            self.stats.success,
            self.stats.need_retry,
            self.stats.failed,
            self.stats.invalid_entry
        );
    }

    /// Declares the manager completely initialized once all configured and
    /// zero-profile objects are applied. Gates warm-restart reconciliation.
    fn check_full_initialization(&mut self) {
        if self.fully_initialized {
            return;
        }
        if self.pool_ready && !self.has_pending_tasks() {
            self.fully_initialized = true;
            info!("Buffer manager completely initialized");
            if self.warm_restart && self.warm_restart_state != WarmRestartState::Reconciled {
                self.warm_restart_state = WarmRestartState::Reconciled;
                self.state_db.replace(
                    STATE_WARM_RESTART_TABLE,
                    "buffermgrd",
                    vec![(
                        "state".to_string(),
                        WarmRestartState::Reconciled.as_str().to_string(),
                    )],
                );
            }
        }
    }
}
