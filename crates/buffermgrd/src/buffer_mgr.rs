//! Dynamic buffer manager core.
//!
//! `BufferMgrDynamic` owns every registry and the store handles, and is
//! the only writer of either. Configuration-store events are fed into
//! per-table consumers and dispatched to the matching handler; the
//! periodic timer drives pool-size reconciliation and deferred
//! convergence (see `reconcile`), and the admin-down reclaim state
//! machine lives in `reclaim`.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use sonic_cfgmgr_common::{CfgMgr, DbTables, Orch, WarmRestartState};
use sonic_orch_common::{Consumer, ConsumerConfig, KeyOpFieldsValues, Operation, TaskStatus};
use tracing::{debug, error, info, warn};

use crate::bitmap;
use crate::pool::PoolRegistry;
use crate::port_info::PortRegistry;
use crate::profile::{self, ProfileRegistry, ReleaseOutcome};
use crate::reconcile::ShpEvent;
use crate::tables::*;
use crate::types::*;
use crate::vendor::{HeadroomResult, VendorCalcPlugin};
use crate::zero_profiles::ZeroPoolsProfiles;

/// Tables consumed by this manager, in dispatch priority order: platform
/// facts and pools first, objects last.
const CONSUMER_TABLES: &[&str] = &[
    STATE_BUFFER_MAX_PARAM_TABLE,
    STATE_PORT_TABLE,
    CFG_BUFFER_POOL_TABLE,
    CFG_DEFAULT_LOSSLESS_BUFFER_PARAMETER,
    CFG_BUFFER_PROFILE_TABLE,
    CFG_PORT_TABLE,
    CFG_PORT_CABLE_LEN_TABLE,
    CFG_BUFFER_PG_TABLE,
    CFG_BUFFER_QUEUE_TABLE,
    CFG_BUFFER_PORT_INGRESS_PROFILE_LIST,
    CFG_BUFFER_PORT_EGRESS_PROFILE_LIST,
];

/// Per-status dispatch counters, logged on tick.
#[derive(Debug, Default, Clone)]
pub struct DispatchStats {
    pub success: u64,
    pub need_retry: u64,
    pub failed: u64,
    pub invalid_entry: u64,
    pub ignore: u64,
}

impl DispatchStats {
    fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Success => self.success += 1,
            TaskStatus::NeedRetry => self.need_retry += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::InvalidEntry => self.invalid_entry += 1,
            TaskStatus::Ignore => self.ignore += 1,
        }
    }
}

/// The dynamic buffer manager.
pub struct BufferMgrDynamic {
    pub(crate) platform: Platform,
    pub(crate) warm_restart: bool,
    pub(crate) warm_restart_state: WarmRestartState,

    pub(crate) pools: PoolRegistry,
    pub(crate) profiles: ProfileRegistry,
    pub(crate) ports: PortRegistry,

    /// port -> ID-range key -> object.
    pub(crate) port_pgs: BTreeMap<String, BTreeMap<String, BufferObject>>,
    pub(crate) port_queues: BTreeMap<String, BTreeMap<String, BufferObject>>,
    /// port -> comma-joined configured profile list.
    pub(crate) ingress_profile_lists: BTreeMap<String, String>,
    pub(crate) egress_profile_lists: BTreeMap<String, String>,

    /// From DEFAULT_LOSSLESS_BUFFER_PARAMETER.
    pub(crate) default_threshold: String,
    pub(crate) over_subscribe_ratio: String,
    /// Platform maximum memory size; 0 while unknown.
    pub(crate) mmu_size: u64,

    /// Sticky flag: every registered pool has a resolved size.
    pub(crate) pool_ready: bool,
    /// Shared-headroom sizing handed over to the next pool recompute.
    pub(crate) shp_deferred_recalc: bool,

    pub(crate) zero: ZeroPoolsProfiles,
    pub(crate) zero_loaded_to_appl: bool,
    /// Ports whose reclaim has been applied.
    pub(crate) reclaimed_ports: BTreeSet<String>,
    /// Admin-down ports waiting for pool readiness or max-object counts.
    pub(crate) pending_reclaim_ports: BTreeSet<String>,
    /// Admin-up ports whose restore is waiting for pool readiness.
    pub(crate) pending_apply_ports: BTreeSet<String>,
    /// Supported-but-not-configured zero application deferred past the
    /// startup warm-up window.
    pub(crate) deferred_zero_items: Vec<(String, ObjectKind)>,

    pub(crate) tick_count: u64,
    pub(crate) fully_initialized: bool,

    pub(crate) stats: DispatchStats,

    consumers: Vec<Consumer>,
    pub(crate) appl_db: DbTables,
    pub(crate) state_db: DbTables,
    pub(crate) plugin: Box<dyn VendorCalcPlugin>,
}

impl BufferMgrDynamic {
    pub fn new(
        plugin: Box<dyn VendorCalcPlugin>,
        zero: ZeroPoolsProfiles,
        warm_restart: bool,
    ) -> Self {
        let platform = Platform::from_env();
        info!(
            "BufferMgrDynamic initialized on platform {:?} (zero profiles loaded: {}, warm restart: {})",
            platform, zero.loaded, warm_restart
        );
        let consumers = CONSUMER_TABLES
            .iter()
            .enumerate()
            .map(|(i, t)| Consumer::new(ConsumerConfig::new(*t).with_priority(i as i32)))
            .collect();
        Self {
            platform,
            warm_restart,
            warm_restart_state: if warm_restart {
                WarmRestartState::Initialized
            } else {
                WarmRestartState::Disabled
            },
            pools: PoolRegistry::new(),
            profiles: ProfileRegistry::new(),
            ports: PortRegistry::new(),
            port_pgs: BTreeMap::new(),
            port_queues: BTreeMap::new(),
            ingress_profile_lists: BTreeMap::new(),
            egress_profile_lists: BTreeMap::new(),
            default_threshold: String::new(),
            over_subscribe_ratio: String::new(),
            mmu_size: 0,
            pool_ready: false,
            shp_deferred_recalc: false,
            zero,
            zero_loaded_to_appl: false,
            reclaimed_ports: BTreeSet::new(),
            pending_reclaim_ports: BTreeSet::new(),
            pending_apply_ports: BTreeSet::new(),
            deferred_zero_items: Vec::new(),
            tick_count: 0,
            fully_initialized: false,
            stats: DispatchStats::default(),
            consumers,
            appl_db: DbTables::new(),
            state_db: DbTables::new(),
            plugin,
        }
    }

    /// Queues change-feed entries for a table.
    pub fn feed(&mut self, table: &str, entries: Vec<KeyOpFieldsValues>) {
        match self.consumers.iter_mut().find(|c| c.table_name() == table) {
            Some(consumer) => consumer.add_to_sync(entries),
            None => warn!("No consumer for table {}", table),
        }
    }

    /// Drains every consumer in priority order and dispatches entries.
    /// `NeedRetry` items are re-queued in their original order.
    pub fn process(&mut self) {
        for i in 0..self.consumers.len() {
            let table = self.consumers[i].table_name().to_string();
            let entries = self.consumers[i].drain();
            if entries.is_empty() {
                continue;
            }
            let mut kept = Vec::new();
            for entry in entries {
                let status = self.dispatch(&table, &entry);
                self.stats.record(status);
                match status {
                    TaskStatus::NeedRetry => {
                        debug!("{}|{}: dependency not ready, will retry", table, entry.key);
                        kept.push(entry);
                    }
                    TaskStatus::Failed => {
                        error!("{}|{}: operation failed, dropping entry", table, entry.key);
                    }
                    TaskStatus::InvalidEntry => {
                        error!("{}|{}: malformed entry dropped", table, entry.key);
                    }
                    TaskStatus::Success | TaskStatus::Ignore => {}
                }
            }
            self.consumers[i].requeue(kept);
        }
    }

    fn dispatch(&mut self, table: &str, entry: &KeyOpFieldsValues) -> TaskStatus {
        match table {
            STATE_BUFFER_MAX_PARAM_TABLE => self.handle_buffer_max_param(entry),
            STATE_PORT_TABLE => self.handle_port_state(entry),
            CFG_BUFFER_POOL_TABLE => self.handle_buffer_pool(entry),
            CFG_DEFAULT_LOSSLESS_BUFFER_PARAMETER => self.handle_default_lossless(entry),
            CFG_BUFFER_PROFILE_TABLE => self.handle_buffer_profile(entry),
            CFG_PORT_TABLE => self.handle_port(entry),
            CFG_PORT_CABLE_LEN_TABLE => self.handle_cable_length(entry),
            CFG_BUFFER_PG_TABLE => self.handle_buffer_object(entry, ObjectKind::PriorityGroup),
            CFG_BUFFER_QUEUE_TABLE => self.handle_buffer_object(entry, ObjectKind::Queue),
            CFG_BUFFER_PORT_INGRESS_PROFILE_LIST => {
                self.handle_profile_list(entry, BufferDirection::Ingress)
            }
            CFG_BUFFER_PORT_EGRESS_PROFILE_LIST => {
                self.handle_profile_list(entry, BufferDirection::Egress)
            }
            _ => {
                warn!("No handler for table {}", table);
                TaskStatus::Ignore
            }
        }
    }

    // ------------------------------------------------------------------
    // Store write-through helpers
    // ------------------------------------------------------------------

    pub(crate) fn write_pool_to_stores(&mut self, name: &str) {
        let Some(pool) = self.pools.get(name) else {
            return;
        };
        if pool.total_size.is_empty() {
            // Unresolved dynamic pools are held until the reconciler
            // computes a concrete size.
            return;
        }
        let fvs = PoolRegistry::to_field_values(pool);
        self.appl_db.replace(APP_BUFFER_POOL_TABLE, name, fvs.clone());
        self.state_db.replace(STATE_BUFFER_POOL_TABLE, name, fvs);
    }

    pub(crate) fn delete_pool_from_stores(&mut self, name: &str) {
        self.appl_db.del(APP_BUFFER_POOL_TABLE, name);
        self.state_db.del(STATE_BUFFER_POOL_TABLE, name);
    }

    pub(crate) fn write_profile_to_stores(&mut self, name: &str) {
        let Some(p) = self.profiles.get(name) else {
            return;
        };
        let fvs = p.to_field_values();
        self.appl_db.replace(APP_BUFFER_PROFILE_TABLE, name, fvs.clone());
        self.state_db.replace(STATE_BUFFER_PROFILE_TABLE, name, fvs);
    }

    pub(crate) fn delete_profile_from_stores(&mut self, name: &str) {
        self.appl_db.del(APP_BUFFER_PROFILE_TABLE, name);
        self.state_db.del(STATE_BUFFER_PROFILE_TABLE, name);
    }

    /// Attempts to release a profile and removes it from the stores when
    /// the registry lets go of it.
    pub(crate) fn try_release_profile(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        if let ReleaseOutcome::Released(_) = self.profiles.release(name) {
            self.delete_profile_from_stores(name);
        }
    }

    pub(crate) fn object_table(kind: ObjectKind) -> &'static str {
        match kind {
            ObjectKind::PriorityGroup => APP_BUFFER_PG_TABLE,
            ObjectKind::Queue => APP_BUFFER_QUEUE_TABLE,
        }
    }

    pub(crate) fn profile_list_table(direction: BufferDirection) -> &'static str {
        match direction {
            BufferDirection::Ingress => APP_BUFFER_PORT_INGRESS_PROFILE_LIST,
            BufferDirection::Egress => APP_BUFFER_PORT_EGRESS_PROFILE_LIST,
        }
    }

    pub(crate) fn object_map(
        &mut self,
        kind: ObjectKind,
    ) -> &mut BTreeMap<String, BTreeMap<String, BufferObject>> {
        match kind {
            ObjectKind::PriorityGroup => &mut self.port_pgs,
            ObjectKind::Queue => &mut self.port_queues,
        }
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    fn handle_buffer_pool(&mut self, entry: &KeyOpFieldsValues) -> TaskStatus {
        let name = entry.key.as_str();
        if entry.op == Operation::Del {
            // Rare; no dependents expected at deletion time.
            if self.pools.remove(name).is_some() {
                self.delete_pool_from_stores(name);
                info!("Buffer pool {} removed", name);
            }
            return TaskStatus::Success;
        }

        let Ok(update) = self.pools.upsert(name, &entry.fvs) else {
            return TaskStatus::InvalidEntry;
        };

        // Attach the zero-profile back-reference and run the pool-load
        // consistency check: a pool with no zero profile on a platform
        // that cannot remove buffer objects leaves reclaim with no move.
        if self.zero.loaded {
            match self.zero.zero_profile_for_pool(name) {
                Some(zp) => {
                    let zp = zp.to_string();
                    if let Some(pool) = self.pools.get_mut(name) {
                        pool.zero_profile_name = Some(zp);
                    }
                }
                None if !self.zero.support_removal => {
                    error!(
                        "Pool {} has no zero profile and object removal is unsupported; \
                         disabling buffer reclaim for this load",
                        name
                    );
                    self.disable_reclaim();
                }
                None => {}
            }
        }

        if update.static_size {
            self.write_pool_to_stores(name);
        } else {
            debug!("Pool {} size is dynamic; held until recalculation", name);
        }
        self.update_pool_readiness();

        if update.is_ingress_lossless && update.shp_size_before != update.shp_size_after {
            let event = if update.shp_size_after.is_empty() {
                ShpEvent::SizeRemoved
            } else {
                ShpEvent::SizeConfigured
            };
            let old_ratio = self.over_subscribe_ratio.clone();
            self.refresh_shared_headroom_pool(event, &update.shp_size_before, &old_ratio);
        }

        TaskStatus::Success
    }

    fn handle_default_lossless(&mut self, entry: &KeyOpFieldsValues) -> TaskStatus {
        let (new_threshold, new_ratio) = match entry.op {
            Operation::Del => (String::new(), String::new()),
            Operation::Set => (
                match entry.get_field(default_lossless_fields::DEFAULT_DYNAMIC_TH) {
                    Some(th) => th.to_string(),
                    None => self.default_threshold.clone(),
                },
                entry
                    .get_field(default_lossless_fields::OVER_SUBSCRIBE_RATIO)
                    .unwrap_or("")
                    .to_string(),
            ),
        };

        self.default_threshold = new_threshold;

        if new_ratio != self.over_subscribe_ratio {
            let old_ratio = std::mem::replace(&mut self.over_subscribe_ratio, new_ratio.clone());
            let old_size = self
                .pools
                .get(INGRESS_LOSSLESS_POOL_NAME)
                .map(|p| p.xoff.clone())
                .unwrap_or_default();
            let event = if new_ratio.is_empty() {
                ShpEvent::RatioRemoved
            } else {
                ShpEvent::RatioConfigured
            };
            self.refresh_shared_headroom_pool(event, &old_size, &old_ratio);
        }

        TaskStatus::Success
    }

    fn handle_buffer_profile(&mut self, entry: &KeyOpFieldsValues) -> TaskStatus {
        let name = entry.key.as_str();
        if entry.op == Operation::Del {
            return self.handle_buffer_profile_del(name);
        }

        let pool_name = match entry.get_field(buffer_profile_fields::POOL) {
            Some(p) => p.to_string(),
            None => match self.profiles.get(name) {
                Some(existing) => existing.pool_name.clone(),
                None => {
                    warn!("Profile {} has no pool reference", name);
                    return TaskStatus::InvalidEntry;
                }
            },
        };

        let Some(pool) = self.pools.get(&pool_name) else {
            return TaskStatus::NeedRetry;
        };
        if pool.mode.is_empty() {
            return TaskStatus::NeedRetry;
        }
        let pool_direction = pool.direction;
        let threshold_mode = format!("{}_th", pool.mode);

        let headroom_dynamic = entry.get_field(buffer_profile_fields::HEADROOM_TYPE)
            == Some(buffer_profile_fields::HEADROOM_TYPE_DYNAMIC);
        let lossless = headroom_dynamic
            || entry.has_field(buffer_profile_fields::XON)
            || entry.has_field(buffer_profile_fields::XOFF);

        if lossless && pool_direction != BufferDirection::Ingress {
            error!(
                "Lossless profile {} references non-ingress pool {}",
                name, pool_name
            );
            return TaskStatus::Failed;
        }

        let existing_refs = self
            .profiles
            .get(name)
            .map(|p| p.port_pgs.clone())
            .unwrap_or_default();

        let profile = BufferProfile {
            name: name.to_string(),
            direction: pool_direction,
            pool_name,
            static_configured: true,
            // Headroom computed, threshold user-supplied.
            dynamic_calculated: headroom_dynamic,
            lossless,
            threshold: entry.get_field(&threshold_mode).unwrap_or("").to_string(),
            threshold_mode,
            xon: entry.get_field(buffer_profile_fields::XON).unwrap_or("").to_string(),
            xoff: entry.get_field(buffer_profile_fields::XOFF).unwrap_or("").to_string(),
            xon_offset: entry
                .get_field(buffer_profile_fields::XON_OFFSET)
                .unwrap_or("")
                .to_string(),
            size: entry.get_field(buffer_profile_fields::SIZE).unwrap_or("").to_string(),
            speed: String::new(),
            cable_length: String::new(),
            mtu: String::new(),
            gearbox_model: String::new(),
            lane_count: 0,
            port_pgs: existing_refs,
        };
        let referencing = profile.port_pgs.clone();
        self.profiles.insert(profile);

        if !self.pool_ready {
            return TaskStatus::NeedRetry;
        }
        self.write_profile_to_stores(name);

        // A changed static profile re-validates the headroom of every
        // port referencing it.
        let ports: BTreeSet<String> = referencing
            .iter()
            .filter_map(|key| key.split(':').next().map(|p| p.to_string()))
            .collect();
        for port in ports {
            self.refresh_pgs_for_port(&port, None);
        }

        TaskStatus::Success
    }

    fn handle_buffer_profile_del(&mut self, name: &str) -> TaskStatus {
        let referenced = match self.profiles.get(name) {
            None => return TaskStatus::Success,
            Some(p) => !p.port_pgs.is_empty(),
        };
        let queue_referenced = self
            .port_queues
            .values()
            .flat_map(|m| m.values())
            .any(|o| o.configured_profile == name);
        let list_referenced = self
            .ingress_profile_lists
            .values()
            .chain(self.egress_profile_lists.values())
            .any(|l| l.split(',').any(|p| p == name));

        if referenced || queue_referenced || list_referenced {
            error!("Cannot remove profile {}: still referenced", name);
            return TaskStatus::Failed;
        }

        if let Some(p) = self.profiles.get_mut(name) {
            p.static_configured = false;
        }
        self.try_release_profile(name);
        TaskStatus::Success
    }

    fn handle_port(&mut self, entry: &KeyOpFieldsValues) -> TaskStatus {
        let port = entry.key.clone();
        if entry.op == Operation::Del {
            return self.handle_port_del(&port);
        }

        let mut mtu_changed = false;
        {
            let pi = self.ports.ensure(&port);
            if let Some(speed) = entry.get_field(port_fields::SPEED) {
                pi.speed = speed.to_string();
            }
            if let Some(mtu) = entry.get_field(port_fields::MTU) {
                if pi.mtu != mtu {
                    pi.mtu = mtu.to_string();
                    mtu_changed = true;
                }
            }
            if let Some(autoneg) = entry.get_field(port_fields::AUTONEG) {
                pi.auto_neg = autoneg == "on" || autoneg == "true";
            }
            if let Some(adv) = entry.get_field(port_fields::ADV_SPEEDS) {
                pi.advertised_speeds = if adv == "all" { String::new() } else { adv.to_string() };
            }
            if let Some(lanes) = entry.get_field(port_fields::LANES) {
                pi.lane_count = lanes.split(',').filter(|l| !l.trim().is_empty()).count() as u32;
            }
        }

        let speed_changed = self.ports.refresh_effective_speed(&port);

        match entry.get_field(port_fields::ADMIN_STATUS) {
            Some("down") => {
                let was_down = self
                    .ports
                    .get(&port)
                    .map(|pi| pi.state == PortState::AdminDown)
                    .unwrap_or(false);
                if let Some(pi) = self.ports.get_mut(&port) {
                    pi.state = PortState::AdminDown;
                }
                if !was_down || !self.reclaimed_ports.contains(&port) {
                    return self.reclaim_reserved_buffer(&port);
                }
                return TaskStatus::Success;
            }
            Some(_) => {
                // Any non-down admin status counts as up.
                let was_down = self
                    .ports
                    .get(&port)
                    .map(|pi| pi.state == PortState::AdminDown)
                    .unwrap_or(true);
                if was_down {
                    if let Some(pi) = self.ports.get_mut(&port) {
                        pi.state = PortState::Initializing;
                    }
                    self.ports.refresh_state(&port);
                    return self.restore_reserved_buffer(&port);
                }
            }
            None => {}
        }

        self.ports.refresh_state(&port);
        let ready = self
            .ports
            .get(&port)
            .map(|pi| pi.state == PortState::Ready)
            .unwrap_or(false);
        if (speed_changed || mtu_changed) && ready {
            return self.refresh_pgs_for_port(&port, None);
        }
        if (speed_changed || mtu_changed)
            && self
                .ports
                .get(&port)
                .map(|pi| pi.state == PortState::Initializing)
                .unwrap_or(false)
        {
            // Cable length or effective speed still missing.
            return TaskStatus::NeedRetry;
        }
        TaskStatus::Success
    }

    fn handle_port_del(&mut self, port: &str) -> TaskStatus {
        if let Some(pgs) = self.port_pgs.remove(port) {
            for (ids, obj) in pgs {
                let appl_key = format!("{}:{}", port, ids);
                self.appl_db.del(APP_BUFFER_PG_TABLE, &appl_key);
                self.profiles.remove_reference(&obj.running_profile, &appl_key);
                self.try_release_profile(&obj.running_profile);
            }
        }
        if let Some(queues) = self.port_queues.remove(port) {
            for (ids, _) in queues {
                self.appl_db
                    .del(APP_BUFFER_QUEUE_TABLE, &format!("{}:{}", port, ids));
            }
        }
        if self.ingress_profile_lists.remove(port).is_some() {
            self.appl_db.del(APP_BUFFER_PORT_INGRESS_PROFILE_LIST, port);
        }
        if self.egress_profile_lists.remove(port).is_some() {
            self.appl_db.del(APP_BUFFER_PORT_EGRESS_PROFILE_LIST, port);
        }
        self.pending_reclaim_ports.remove(port);
        self.pending_apply_ports.remove(port);
        self.reclaimed_ports.remove(port);
        self.deferred_zero_items.retain(|(p, _)| p != port);
        self.ports.remove(port);
        info!("Port {} removed", port);
        TaskStatus::Success
    }

    fn handle_cable_length(&mut self, entry: &KeyOpFieldsValues) -> TaskStatus {
        if entry.op == Operation::Del {
            return TaskStatus::Success;
        }
        let mut worst = TaskStatus::Success;
        let fvs: Vec<(String, String)> = entry.fvs.clone();
        for (port, length) in fvs {
            {
                let pi = self.ports.ensure(&port);
                if pi.cable_length == length {
                    continue;
                }
                pi.cable_length = length.clone();
            }
            info!("Cable length set to {} for port {}", length, port);
            self.ports.refresh_state(&port);
            let ready = self
                .ports
                .get(&port)
                .map(|pi| pi.state == PortState::Ready)
                .unwrap_or(false);
            if ready && self.refresh_pgs_for_port(&port, None) == TaskStatus::NeedRetry {
                worst = TaskStatus::NeedRetry;
            }
        }
        worst
    }

    fn handle_buffer_max_param(&mut self, entry: &KeyOpFieldsValues) -> TaskStatus {
        if entry.op == Operation::Del {
            return TaskStatus::Success;
        }
        if entry.key == BUFFER_MAX_GLOBAL_KEY {
            match entry
                .get_field(buffer_max_fields::MMU_SIZE)
                .map(|v| v.parse::<u64>())
            {
                Some(Ok(size)) => {
                    self.mmu_size = size;
                    info!("Maximum memory size: {}", size);
                }
                Some(Err(_)) => return TaskStatus::InvalidEntry,
                None => {}
            }
            return TaskStatus::Success;
        }
        let port = entry.key.clone();
        if let Some(Ok(size)) = entry
            .get_field(buffer_max_fields::MAX_HEADROOM_SIZE)
            .map(|v| v.parse::<u64>())
        {
            self.ports.ensure(&port).max_headroom_size = size;
        }
        TaskStatus::Success
    }

    fn handle_port_state(&mut self, entry: &KeyOpFieldsValues) -> TaskStatus {
        if entry.op == Operation::Del {
            return TaskStatus::Success;
        }
        let port = entry.key.clone();
        let mut supported_changed = false;
        {
            let pi = self.ports.ensure(&port);
            if let Some(supported) = entry.get_field(port_state_fields::SUPPORTED_SPEEDS) {
                if pi.supported_speeds != supported {
                    pi.supported_speeds = supported.to_string();
                    supported_changed = true;
                }
            }
            if let Some(Ok(max)) = entry
                .get_field(port_state_fields::MAX_PRIORITY_GROUPS)
                .map(|v| v.parse::<u32>())
            {
                pi.max_priority_groups = max;
            }
            if let Some(Ok(max)) = entry
                .get_field(port_state_fields::MAX_QUEUES)
                .map(|v| v.parse::<u32>())
            {
                pi.max_queues = max;
            }
        }

        if supported_changed && self.ports.refresh_effective_speed(&port) {
            self.ports.refresh_state(&port);
            let ready = self
                .ports
                .get(&port)
                .map(|pi| pi.state == PortState::Ready)
                .unwrap_or(false);
            if ready {
                return self.refresh_pgs_for_port(&port, None);
            }
        }

        // Newly learned maximum counts may unblock a queued reclaim.
        if self.pending_reclaim_ports.contains(&port) {
            self.retry_pending_reclaim(&port);
        }
        TaskStatus::Success
    }

    fn handle_buffer_object(&mut self, entry: &KeyOpFieldsValues, kind: ObjectKind) -> TaskStatus {
        let Some((port, ids)) = split_object_key(&entry.key) else {
            return TaskStatus::InvalidEntry;
        };
        if bitmap::parse_id_range(ids).is_none() {
            return TaskStatus::InvalidEntry;
        }
        let port = port.to_string();
        let ids = ids.to_string();
        let appl_key = to_appl_key(&entry.key);

        if entry.op == Operation::Del {
            return self.handle_buffer_object_del(&port, &ids, &appl_key, kind);
        }

        let profile_field = entry.get_field(buffer_object_fields::PROFILE);
        let dynamic = matches!(profile_field, None | Some(buffer_object_fields::PROFILE_NULL));

        let (configured_profile, lossless) = if dynamic {
            if kind == ObjectKind::Queue {
                warn!("Queue {} has no profile configured", entry.key);
                return TaskStatus::InvalidEntry;
            }
            (String::new(), true)
        } else {
            let name = profile_field.expect("checked above").to_string();
            let Some(profile) = self.profiles.get(&name) else {
                return TaskStatus::NeedRetry;
            };
            if kind == ObjectKind::PriorityGroup && profile.direction != BufferDirection::Ingress {
                error!("PG {} references egress profile {}", entry.key, name);
                return TaskStatus::InvalidEntry;
            }
            (name, profile.lossless)
        };

        self.ports.ensure(&port);
        let previous_running = self
            .object_map(kind)
            .get(&port)
            .and_then(|m| m.get(&ids))
            .map(|o| o.running_profile.clone())
            .unwrap_or_default();
        self.object_map(kind).entry(port.clone()).or_default().insert(
            ids.clone(),
            BufferObject {
                kind,
                configured_profile: configured_profile.clone(),
                running_profile: previous_running,
                lossless,
                dynamic_calculated: dynamic,
            },
        );

        let admin_down = self
            .ports
            .get(&port)
            .map(|pi| pi.state == PortState::AdminDown)
            .unwrap_or(true);
        if admin_down {
            return self.admin_down_object_added(&port, &ids, &appl_key, kind);
        }

        match kind {
            ObjectKind::PriorityGroup => self.refresh_pgs_for_port(&port, Some(&ids)),
            ObjectKind::Queue => self.apply_queue(&port, &ids, &appl_key),
        }
    }

    pub(crate) fn apply_queue(&mut self, port: &str, ids: &str, appl_key: &str) -> TaskStatus {
        if !self.pool_ready {
            return TaskStatus::NeedRetry;
        }
        let Some(obj) = self.port_queues.get(port).and_then(|m| m.get(ids)).cloned() else {
            return TaskStatus::Success;
        };
        if !self.profiles.contains(&obj.configured_profile) {
            return TaskStatus::NeedRetry;
        }
        if !self.appl_db.contains(APP_BUFFER_PROFILE_TABLE, &obj.configured_profile) {
            self.write_profile_to_stores(&obj.configured_profile);
        }
        self.appl_db.replace(
            APP_BUFFER_QUEUE_TABLE,
            appl_key,
            vec![("profile".to_string(), obj.configured_profile.clone())],
        );
        if let Some(o) = self
            .port_queues
            .get_mut(port)
            .and_then(|m| m.get_mut(ids))
        {
            o.running_profile = obj.configured_profile;
        }
        TaskStatus::Success
    }

    fn handle_buffer_object_del(
        &mut self,
        port: &str,
        ids: &str,
        appl_key: &str,
        kind: ObjectKind,
    ) -> TaskStatus {
        let Some(obj) = self.object_map(kind).get(port).and_then(|m| m.get(ids)).cloned() else {
            return TaskStatus::Success;
        };

        let admin_down = self
            .ports
            .get(port)
            .map(|pi| pi.state == PortState::AdminDown)
            .unwrap_or(false);
        if admin_down {
            return self.admin_down_object_removed(port, ids, appl_key, kind);
        }

        if !self.zero.support_removal {
            error!(
                "Cannot remove {} {}: platform does not support removing buffer items",
                kind.as_str(),
                appl_key
            );
            return TaskStatus::Failed;
        }

        if let Some(m) = self.object_map(kind).get_mut(port) {
            m.remove(ids);
        }
        self.appl_db.del(Self::object_table(kind), appl_key);
        if kind == ObjectKind::PriorityGroup {
            self.profiles.remove_reference(&obj.running_profile, appl_key);
            self.try_release_profile(&obj.running_profile);
            self.recalculate_pool_sizes();
        }
        TaskStatus::Success
    }

    fn handle_profile_list(
        &mut self,
        entry: &KeyOpFieldsValues,
        direction: BufferDirection,
    ) -> TaskStatus {
        let port = entry.key.clone();
        let table = Self::profile_list_table(direction);

        if entry.op == Operation::Del {
            let removed = match direction {
                BufferDirection::Ingress => self.ingress_profile_lists.remove(&port),
                BufferDirection::Egress => self.egress_profile_lists.remove(&port),
            };
            if removed.is_some() {
                self.appl_db.del(table, &port);
            }
            return TaskStatus::Success;
        }

        let Some(list) = entry.get_field(profile_list_fields::PROFILE_LIST) else {
            return TaskStatus::InvalidEntry;
        };
        let list = list.to_string();

        for name in list.split(',') {
            if !self.profiles.contains(name) {
                return TaskStatus::NeedRetry;
            }
        }
        if !self.pool_ready {
            return TaskStatus::NeedRetry;
        }

        match direction {
            BufferDirection::Ingress => {
                self.ingress_profile_lists.insert(port.clone(), list.clone())
            }
            BufferDirection::Egress => self.egress_profile_lists.insert(port.clone(), list.clone()),
        };

        self.ports.ensure(&port);
        let admin_down = self
            .ports
            .get(&port)
            .map(|pi| pi.state == PortState::AdminDown)
            .unwrap_or(false);
        if admin_down && self.zero.loaded && self.reclaimed_ports.contains(&port) {
            let zero_list = self.zero_profile_list(&list);
            if !zero_list.is_empty() {
                self.appl_db.replace(
                    table,
                    &port,
                    vec![("profile_list".to_string(), zero_list)],
                );
            }
            return TaskStatus::Success;
        }

        for name in list.split(',') {
            if !self.appl_db.contains(APP_BUFFER_PROFILE_TABLE, name) {
                self.write_profile_to_stores(name);
            }
        }
        self.appl_db
            .replace(table, &port, vec![("profile_list".to_string(), list)]);
        TaskStatus::Success
    }

    // ------------------------------------------------------------------
    // Headroom refresh (PG registry convergence)
    // ------------------------------------------------------------------

    /// Recomputes and re-applies profiles for the port's PGs, all of them
    /// or a single exact ID-range key.
    ///
    /// All-or-nothing: an admission-control rejection releases any
    /// tentatively allocated profile and leaves the stores untouched.
    pub(crate) fn refresh_pgs_for_port(&mut self, port: &str, exact: Option<&str>) -> TaskStatus {
        if !self.pool_ready {
            return TaskStatus::NeedRetry;
        }
        let (state, speed, cable, mtu, gearbox, lanes) = {
            let Some(pi) = self.ports.get(port) else {
                return TaskStatus::NeedRetry;
            };
            (
                pi.state,
                pi.effective_speed.clone(),
                pi.cable_length.clone(),
                pi.mtu.clone(),
                pi.gearbox_model.clone(),
                pi.lane_count,
            )
        };
        if state == PortState::AdminDown {
            debug!("Port {} is admin-down, skipping PG refresh", port);
            return TaskStatus::Success;
        }
        if speed.is_empty() || cable.is_empty() {
            debug!(
                "Unable to refresh PGs for port {}: speed or cable length not known",
                port
            );
            return TaskStatus::NeedRetry;
        }

        let keys: Vec<String> = self
            .port_pgs
            .get(port)
            .map(|m| {
                m.keys()
                    .filter(|k| exact.map(|e| e == k.as_str()).unwrap_or(true))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if keys.is_empty() {
            return TaskStatus::Success;
        }

        // Stage every change before writing anything.
        let mut staged: Vec<(String, String, String)> = Vec::new();
        let mut allocated: Vec<String> = Vec::new();
        for ids in &keys {
            let obj = self.port_pgs[port][ids].clone();
            let appl_key = format!("{}:{}", port, ids);

            let profile_name = if obj.dynamic_calculated {
                match self.allocate_dynamic_profile(&speed, &cable, &mtu, &gearbox, lanes) {
                    Ok((name, created)) => {
                        if created {
                            allocated.push(name.clone());
                        }
                        name
                    }
                    Err(status) => return self.abort_refresh(allocated, status),
                }
            } else {
                let name = obj.configured_profile.clone();
                if !self.profiles.contains(&name) {
                    return self.abort_refresh(allocated, TaskStatus::NeedRetry);
                }
                name
            };

            if obj.lossless {
                let new_pg = if obj.running_profile.is_empty() {
                    Some(appl_key.clone())
                } else {
                    None
                };
                if !self.is_headroom_valid(port, &profile_name, new_pg.as_deref()) {
                    error!(
                        "Headroom budget exceeded on {} for profile {}; aborting PG refresh",
                        port, profile_name
                    );
                    return self.abort_refresh(allocated, TaskStatus::Failed);
                }
            }

            if obj.running_profile != profile_name {
                staged.push((ids.clone(), profile_name, obj.running_profile));
            }
        }

        // Commit.
        let mut touched = false;
        for (ids, new_profile, old_profile) in staged {
            let appl_key = format!("{}:{}", port, ids);
            if !self.appl_db.contains(APP_BUFFER_PROFILE_TABLE, &new_profile) {
                self.write_profile_to_stores(&new_profile);
            }
            self.profiles.add_reference(&new_profile, &appl_key);
            self.appl_db.replace(
                APP_BUFFER_PG_TABLE,
                &appl_key,
                vec![("profile".to_string(), new_profile.clone())],
            );
            if let Some(o) = self.port_pgs.get_mut(port).and_then(|m| m.get_mut(&ids)) {
                o.running_profile = new_profile;
            }
            if !old_profile.is_empty() {
                self.profiles.remove_reference(&old_profile, &appl_key);
                self.try_release_profile(&old_profile);
            }
            touched = true;
        }
        if touched {
            self.recalculate_pool_sizes();
        }
        TaskStatus::Success
    }

    fn abort_refresh(&mut self, allocated: Vec<String>, status: TaskStatus) -> TaskStatus {
        for name in allocated {
            self.try_release_profile(&name);
        }
        status
    }

    /// Returns the canonical dynamic profile, creating it through the
    /// vendor plugin on first use. The boolean reports whether a new
    /// registry entry was created.
    fn allocate_dynamic_profile(
        &mut self,
        speed: &str,
        cable: &str,
        mtu: &str,
        gearbox: &str,
        lane_count: u32,
    ) -> Result<(String, bool), TaskStatus> {
        if self.default_threshold.is_empty() {
            debug!("Default dynamic threshold not known yet");
            return Err(TaskStatus::NeedRetry);
        }
        let eight_lane = self.platform.uses_8lane_naming(lane_count, speed);
        let name = profile::dynamic_profile_name(speed, cable, mtu, None, gearbox, eight_lane);
        if self.profiles.contains(&name) {
            return Ok((name, false));
        }

        let Some(pool) = self.pools.get(INGRESS_LOSSLESS_POOL_NAME) else {
            return Err(TaskStatus::NeedRetry);
        };
        if pool.mode.is_empty() {
            return Err(TaskStatus::NeedRetry);
        }
        let threshold_mode = format!("{}_th", pool.mode);

        let keys = vec![name.clone()];
        let args = vec![
            speed.to_string(),
            cable.to_string(),
            mtu.to_string(),
            gearbox.to_string(),
            lane_count.to_string(),
        ];
        let lines = match self.plugin.compute_headroom(&keys, &args) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("Headroom calculation for {} failed: {}", name, e);
                return Err(TaskStatus::NeedRetry);
            }
        };
        let headroom = match HeadroomResult::from_lines(&lines) {
            Ok(h) => h,
            Err(e) => {
                error!("Headroom result for {} is malformed: {}", name, e);
                return Err(TaskStatus::Failed);
            }
        };

        self.profiles.insert(BufferProfile {
            name: name.clone(),
            direction: BufferDirection::Ingress,
            pool_name: INGRESS_LOSSLESS_POOL_NAME.to_string(),
            static_configured: false,
            dynamic_calculated: true,
            lossless: true,
            threshold_mode,
            threshold: self.default_threshold.clone(),
            xon: headroom.xon,
            xoff: headroom.xoff,
            xon_offset: headroom.xon_offset,
            size: headroom.size,
            speed: speed.to_string(),
            cable_length: cable.to_string(),
            mtu: mtu.to_string(),
            gearbox_model: gearbox.to_string(),
            lane_count,
            port_pgs: BTreeSet::new(),
        });
        info!("Created dynamic buffer profile {}", name);
        Ok((name, true))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn appl_db(&self) -> &DbTables {
        &self.appl_db
    }

    pub fn state_db(&self) -> &DbTables {
        &self.state_db
    }

    pub fn is_pool_ready(&self) -> bool {
        self.pool_ready
    }

    pub fn is_fully_initialized(&self) -> bool {
        self.fully_initialized
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

#[async_trait]
impl Orch for BufferMgrDynamic {
    fn name(&self) -> &str {
        "buffermgr"
    }

    async fn do_task(&mut self) {
        self.process();
    }

    fn on_timer(&mut self) {
        self.tick();
        self.process();
    }

    fn has_pending_tasks(&self) -> bool {
        self.consumers.iter().any(|c| c.has_pending())
            || !self.pending_reclaim_ports.is_empty()
            || !self.pending_apply_ports.is_empty()
            || !self.deferred_zero_items.is_empty()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        let mut dump: Vec<String> = self.consumers.iter().flat_map(|c| c.dump()).collect();
        dump.extend(
            self.pending_reclaim_ports
                .iter()
                .map(|p| format!("pending reclaim: {}", p)),
        );
        dump
    }
}

#[async_trait]
impl CfgMgr for BufferMgrDynamic {
    fn daemon_name(&self) -> &str {
        "buffermgrd"
    }

    fn is_warm_restart(&self) -> bool {
        self.warm_restart
    }

    fn warm_restart_state(&self) -> WarmRestartState {
        self.warm_restart_state
    }

    async fn set_warm_restart_state(&mut self, state: WarmRestartState) {
        self.warm_restart_state = state;
        let daemon = self.daemon_name().to_string();
        self.state_db.replace(
            STATE_WARM_RESTART_TABLE,
            &daemon,
            vec![("state".to_string(), state.as_str().to_string())],
        );
    }

    fn config_table_names(&self) -> &[&str] {
        &[
            CFG_PORT_TABLE,
            CFG_PORT_CABLE_LEN_TABLE,
            CFG_BUFFER_POOL_TABLE,
            CFG_BUFFER_PROFILE_TABLE,
            CFG_BUFFER_PG_TABLE,
            CFG_BUFFER_QUEUE_TABLE,
            CFG_BUFFER_PORT_INGRESS_PROFILE_LIST,
            CFG_BUFFER_PORT_EGRESS_PROFILE_LIST,
            CFG_DEFAULT_LOSSLESS_BUFFER_PARAMETER,
        ]
    }

    fn state_table_names(&self) -> &[&str] {
        &[STATE_BUFFER_MAX_PARAM_TABLE, STATE_PORT_TABLE]
    }
}
