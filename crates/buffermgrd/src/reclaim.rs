//! Admin-down buffer reclaim and admin-up restore.
//!
//! When a port goes admin-down its reserved buffer is handed back to the
//! shared pools: configured PGs and queues get a zero profile substituted
//! (or are removed outright on platforms that support it), and the
//! supported-but-not-configured ID ranges are covered with zero-profile
//! entries tracked as a bitmap on the port. Admin-up reverses all of it
//! and re-converges the port's normal configuration.

use tracing::{debug, info, warn};

use sonic_orch_common::TaskStatus;

use crate::bitmap;
use crate::buffer_mgr::BufferMgrDynamic;
use crate::tables::{APP_BUFFER_PROFILE_TABLE, STATE_RECLAIMED_ITEM_TABLE};
use crate::types::{BufferDirection, BufferObject, ObjectKind, PortState};

/// Ticks to hold back zero-profile application for unconfigured IDs after
/// a cold start, giving the configuration replay time to land. Warm
/// restart skips the window.
pub(crate) const ZERO_PROFILE_DEFER_TICKS: u64 = 3;

impl BufferMgrDynamic {
    /// Reclaims the reserved buffer of an admin-down port. Queues the port
    /// as pending when pools are not ready or the port's maximum object
    /// counts are not known yet. Idempotent: a port already reclaimed is
    /// left alone.
    pub(crate) fn reclaim_reserved_buffer(&mut self, port: &str) -> TaskStatus {
        let (max_pg, max_q) = match self.ports.get(port) {
            Some(pi) => (pi.max_priority_groups, pi.max_queues),
            None => return TaskStatus::NeedRetry,
        };
        if !self.pool_ready || max_pg == 0 || max_q == 0 {
            debug!(
                "Port {} reclaim queued as pending (pool ready: {}, max pgs: {}, max queues: {})",
                port, self.pool_ready, max_pg, max_q
            );
            self.pending_reclaim_ports.insert(port.to_string());
            return TaskStatus::Success;
        }
        self.pending_reclaim_ports.remove(port);
        if self.reclaimed_ports.contains(port) {
            return TaskStatus::Success;
        }

        if self.zero.loaded {
            self.ensure_zero_items_loaded();
        }

        self.reclaim_kind(port, ObjectKind::PriorityGroup);
        self.reclaim_kind(port, ObjectKind::Queue);

        if self.zero.loaded {
            for direction in [BufferDirection::Ingress, BufferDirection::Egress] {
                let list = match direction {
                    BufferDirection::Ingress => self.ingress_profile_lists.get(port),
                    BufferDirection::Egress => self.egress_profile_lists.get(port),
                }
                .cloned();
                if let Some(list) = list {
                    let zero_list = self.zero_profile_list(&list);
                    if !zero_list.is_empty() {
                        self.appl_db.replace(
                            Self::profile_list_table(direction),
                            port,
                            vec![("profile_list".to_string(), zero_list)],
                        );
                    }
                }
            }
        }

        self.reclaimed_ports.insert(port.to_string());
        self.recalculate_pool_sizes();
        info!("Reclaimed reserved buffer of admin-down port {}", port);
        TaskStatus::Success
    }

    /// Reclaims one object kind: substitutes zero profiles on (or removes)
    /// configured objects and records the supported-but-not-configured
    /// bitmap for range application.
    fn reclaim_kind(&mut self, port: &str, kind: ObjectKind) {
        let objects: Vec<(String, BufferObject)> = self
            .object_map(kind)
            .get(port)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let restricted = self.zero.restricted_ids(kind).map(|s| s.to_string());
        let table = Self::object_table(kind);
        let mut configured_bitmap = 0u32;

        for (ids, obj) in &objects {
            let appl_key = format!("{}:{}", port, ids);
            if let Some(bits) = bitmap::ids_to_bitmap(ids) {
                configured_bitmap |= bits;
            }

            if restricted.is_some() {
                // Restricted mode removes configured objects outright; the
                // seed consistency check guarantees removal support.
                self.appl_db.del(table, &appl_key);
                self.drop_object_running_profile(port, kind, ids, &appl_key);
                continue;
            }

            match self.zero_profile_for_object(kind, obj) {
                Some(zero_profile) => {
                    self.appl_db.replace(
                        table,
                        &appl_key,
                        vec![("profile".to_string(), zero_profile.clone())],
                    );
                    self.drop_object_running_profile(port, kind, ids, &appl_key);
                    if let Some(o) = self.object_map(kind).get_mut(port).and_then(|m| m.get_mut(ids))
                    {
                        o.running_profile = zero_profile;
                    }
                }
                None if self.zero.support_removal => {
                    self.appl_db.del(table, &appl_key);
                    self.drop_object_running_profile(port, kind, ids, &appl_key);
                }
                None => {
                    warn!(
                        "No zero profile for {} {} and removal unsupported; left in place",
                        kind.as_str(),
                        appl_key
                    );
                }
            }
        }

        let max = self
            .ports
            .get(port)
            .map(|pi| pi.max_objects(kind))
            .unwrap_or(0);
        let reclaim_bitmap = match &restricted {
            Some(ids) => bitmap::ids_to_bitmap(ids).unwrap_or(0),
            None => bitmap::full_bitmap(max) & !configured_bitmap,
        };
        if let Some(pi) = self.ports.get_mut(port) {
            pi.set_reclaimed_bitmap(kind, reclaim_bitmap);
        }

        if reclaim_bitmap != 0 && self.zero.loaded {
            if self.warm_restart || self.tick_count >= ZERO_PROFILE_DEFER_TICKS {
                self.apply_reclaimed_zero(port, kind);
            } else {
                debug!(
                    "Deferring zero-profile application for unconfigured {}s of {}",
                    kind.as_str(),
                    port
                );
                let item = (port.to_string(), kind);
                if !self.deferred_zero_items.contains(&item) {
                    self.deferred_zero_items.push(item);
                }
            }
        }
    }

    /// Clears the running profile of an object during reclaim, releasing
    /// the reference it held.
    fn drop_object_running_profile(&mut self, port: &str, kind: ObjectKind, ids: &str, appl_key: &str) {
        let old = self
            .object_map(kind)
            .get(port)
            .and_then(|m| m.get(ids))
            .map(|o| o.running_profile.clone())
            .unwrap_or_default();
        if old.is_empty() {
            return;
        }
        if kind == ObjectKind::PriorityGroup {
            self.profiles.remove_reference(&old, appl_key);
            self.try_release_profile(&old);
        }
        if let Some(o) = self.object_map(kind).get_mut(port).and_then(|m| m.get_mut(ids)) {
            o.running_profile = String::new();
        }
    }

    /// Writes zero-profile entries covering the port's reclaimed bitmap
    /// and mirrors the bitmap into the state store for diagnostics.
    pub(crate) fn apply_reclaimed_zero(&mut self, port: &str, kind: ObjectKind) {
        let bitmap_value = self
            .ports
            .get(port)
            .map(|pi| pi.reclaimed_bitmap(kind))
            .unwrap_or(0);
        if bitmap_value == 0 {
            return;
        }
        let Some(zero_profile) = self.zero.default_zero_profile(kind).map(|s| s.to_string())
        else {
            warn!(
                "No zero profile of matching direction for {}s; skipping range application",
                kind.as_str()
            );
            return;
        };
        let table = Self::object_table(kind);
        for range in bitmap::bitmap_range_strings(bitmap_value) {
            self.appl_db.replace(
                table,
                &format!("{}:{}", port, range),
                vec![("profile".to_string(), zero_profile.clone())],
            );
        }
        self.state_db.replace(
            STATE_RECLAIMED_ITEM_TABLE,
            &format!("{}:{}", port, kind.as_str()),
            vec![("ids".to_string(), bitmap::bitmap_to_string(bitmap_value))],
        );
    }

    /// Rewrites the applied zero-profile range entries after the reclaimed
    /// bitmap changed, deleting stale ranges and adding new ones.
    fn rewrite_reclaimed_entries(
        &mut self,
        port: &str,
        kind: ObjectKind,
        old_bitmap: u32,
        new_bitmap: u32,
    ) {
        if let Some(pi) = self.ports.get_mut(port) {
            pi.set_reclaimed_bitmap(kind, new_bitmap);
        }
        if old_bitmap == new_bitmap || !self.zero.loaded {
            return;
        }
        if self
            .deferred_zero_items
            .iter()
            .any(|(p, k)| p == port && *k == kind)
        {
            // Nothing applied yet; the deferred pass picks up the new bitmap.
            return;
        }

        let table = Self::object_table(kind);
        let old_ranges = bitmap::bitmap_range_strings(old_bitmap);
        let new_ranges = bitmap::bitmap_range_strings(new_bitmap);
        for range in old_ranges.iter().filter(|r| !new_ranges.contains(r)) {
            self.appl_db.del(table, &format!("{}:{}", port, range));
        }
        if let Some(zero_profile) = self.zero.default_zero_profile(kind).map(|s| s.to_string()) {
            for range in new_ranges.iter().filter(|r| !old_ranges.contains(r)) {
                self.appl_db.replace(
                    table,
                    &format!("{}:{}", port, range),
                    vec![("profile".to_string(), zero_profile.clone())],
                );
            }
        }

        let diag_key = format!("{}:{}", port, kind.as_str());
        if new_bitmap == 0 {
            self.state_db.del(STATE_RECLAIMED_ITEM_TABLE, &diag_key);
        } else {
            self.state_db.replace(
                STATE_RECLAIMED_ITEM_TABLE,
                &diag_key,
                vec![("ids".to_string(), bitmap::bitmap_to_string(new_bitmap))],
            );
        }
    }

    /// Buffer object configured while its port is admin-down: the object's
    /// IDs leave the supported-but-not-configured set and the object gets
    /// the zero profile of its own pool.
    pub(crate) fn admin_down_object_added(
        &mut self,
        port: &str,
        ids: &str,
        appl_key: &str,
        kind: ObjectKind,
    ) -> TaskStatus {
        if !self.reclaimed_ports.contains(port) {
            // Reclaim still pending or disabled; the object is recorded in
            // the registry and picked up when the reclaim runs.
            return TaskStatus::Success;
        }
        if self.zero.restricted_ids(kind).is_some() {
            // Restricted mode keeps configured objects removed.
            return TaskStatus::Success;
        }

        let bits = bitmap::ids_to_bitmap(ids).unwrap_or(0);
        let old = self
            .ports
            .get(port)
            .map(|pi| pi.reclaimed_bitmap(kind))
            .unwrap_or(0);
        self.rewrite_reclaimed_entries(port, kind, old, old & !bits);

        let obj = self
            .object_map(kind)
            .get(port)
            .and_then(|m| m.get(ids))
            .cloned();
        let Some(obj) = obj else {
            return TaskStatus::Success;
        };
        match self.zero_profile_for_object(kind, &obj) {
            Some(zero_profile) => {
                self.appl_db.replace(
                    Self::object_table(kind),
                    appl_key,
                    vec![("profile".to_string(), zero_profile.clone())],
                );
                if let Some(o) = self.object_map(kind).get_mut(port).and_then(|m| m.get_mut(ids))
                {
                    o.running_profile = zero_profile;
                }
            }
            None if self.zero.support_removal => {
                self.appl_db.del(Self::object_table(kind), appl_key);
            }
            None => {
                warn!("No zero profile for {} on admin-down port {}", appl_key, port);
            }
        }
        TaskStatus::Success
    }

    /// Buffer object deleted while its port is admin-down: its IDs fold
    /// back into the supported-but-not-configured set.
    pub(crate) fn admin_down_object_removed(
        &mut self,
        port: &str,
        ids: &str,
        appl_key: &str,
        kind: ObjectKind,
    ) -> TaskStatus {
        self.drop_object_running_profile(port, kind, ids, appl_key);
        if let Some(m) = self.object_map(kind).get_mut(port) {
            m.remove(ids);
        }
        if !self.reclaimed_ports.contains(port) {
            return TaskStatus::Success;
        }
        if self.zero.restricted_ids(kind).is_some() {
            // The configured entry was already removed at reclaim time.
            return TaskStatus::Success;
        }

        self.appl_db.del(Self::object_table(kind), appl_key);
        let bits = bitmap::ids_to_bitmap(ids).unwrap_or(0);
        let old = self
            .ports
            .get(port)
            .map(|pi| pi.reclaimed_bitmap(kind))
            .unwrap_or(0);
        self.rewrite_reclaimed_entries(port, kind, old, old | bits);
        TaskStatus::Success
    }

    /// Restores a port's normal buffer configuration on admin-up: removes
    /// the zero-profile range entries, re-applies queues, lists and PGs,
    /// and unloads the zero seed once no port needs it.
    pub(crate) fn restore_reserved_buffer(&mut self, port: &str) -> TaskStatus {
        self.pending_reclaim_ports.remove(port);
        let was_reclaimed = self.reclaimed_ports.remove(port);
        self.deferred_zero_items.retain(|(p, _)| p != port);

        if was_reclaimed {
            for kind in [ObjectKind::PriorityGroup, ObjectKind::Queue] {
                let bitmap_value = self
                    .ports
                    .get(port)
                    .map(|pi| pi.reclaimed_bitmap(kind))
                    .unwrap_or(0);
                if bitmap_value != 0 {
                    let table = Self::object_table(kind);
                    for range in bitmap::bitmap_range_strings(bitmap_value) {
                        self.appl_db.del(table, &format!("{}:{}", port, range));
                    }
                    self.state_db.del(
                        STATE_RECLAIMED_ITEM_TABLE,
                        &format!("{}:{}", port, kind.as_str()),
                    );
                    if let Some(pi) = self.ports.get_mut(port) {
                        pi.set_reclaimed_bitmap(kind, 0);
                    }
                }
            }
            info!("Restoring reserved buffer of port {}", port);
        }

        if self.zero_loaded_to_appl
            && self.reclaimed_ports.is_empty()
            && self.pending_reclaim_ports.is_empty()
        {
            self.unload_zero_items();
        }

        match self.reapply_port_objects(port) {
            TaskStatus::NeedRetry => {
                debug!("Port {} re-application pending pool readiness", port);
                self.pending_apply_ports.insert(port.to_string());
                TaskStatus::Success
            }
            status => status,
        }
    }

    /// Re-applies a port's configured queues, profile lists and PGs in
    /// their normal (non-reclaimed) form.
    pub(crate) fn reapply_port_objects(&mut self, port: &str) -> TaskStatus {
        if !self.pool_ready {
            return TaskStatus::NeedRetry;
        }
        let mut worst = TaskStatus::Success;

        let queues: Vec<String> = self
            .port_queues
            .get(port)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        for ids in queues {
            let appl_key = format!("{}:{}", port, ids);
            if self.apply_queue(port, &ids, &appl_key) == TaskStatus::NeedRetry {
                worst = TaskStatus::NeedRetry;
            }
        }

        for direction in [BufferDirection::Ingress, BufferDirection::Egress] {
            let list = match direction {
                BufferDirection::Ingress => self.ingress_profile_lists.get(port),
                BufferDirection::Egress => self.egress_profile_lists.get(port),
            }
            .cloned();
            let Some(list) = list else {
                continue;
            };
            if list.split(',').any(|name| !self.profiles.contains(name)) {
                worst = TaskStatus::NeedRetry;
                continue;
            }
            for name in list.split(',') {
                if !self.appl_db.contains(APP_BUFFER_PROFILE_TABLE, name) {
                    self.write_profile_to_stores(name);
                }
            }
            self.appl_db.replace(
                Self::profile_list_table(direction),
                port,
                vec![("profile_list".to_string(), list)],
            );
        }

        match self.refresh_pgs_for_port(port, None) {
            TaskStatus::NeedRetry => TaskStatus::NeedRetry,
            TaskStatus::Success => worst,
            status => status,
        }
    }

    /// Retries a reclaim queued as pending.
    pub(crate) fn retry_pending_reclaim(&mut self, port: &str) {
        if !self.pending_reclaim_ports.contains(port) {
            return;
        }
        let admin_down = self
            .ports
            .get(port)
            .map(|pi| pi.state == PortState::AdminDown)
            .unwrap_or(false);
        if !admin_down {
            self.pending_reclaim_ports.remove(port);
            return;
        }
        self.reclaim_reserved_buffer(port);
    }

    /// Disables the reclaim feature after a fatal seed-data inconsistency.
    /// The daemon keeps running without reclaim rather than aborting.
    pub(crate) fn disable_reclaim(&mut self) {
        if self.zero_loaded_to_appl {
            self.unload_zero_items();
        }
        self.zero.disable();
        self.pools.clear_zero_profiles();
        self.deferred_zero_items.clear();
        warn!("Buffer reclaim feature disabled for this run");
    }

    /// Maps a configured profile list to its zero-profile equivalent,
    /// de-duplicated per pool. Profiles whose pool has no zero profile are
    /// dropped with a warning.
    pub(crate) fn zero_profile_list(&self, list: &str) -> String {
        let mut out: Vec<String> = Vec::new();
        for name in list.split(',') {
            let pool = self.profiles.get(name).map(|p| p.pool_name.clone());
            match pool.and_then(|p| self.zero.zero_profile_for_pool(&p).map(|s| s.to_string())) {
                Some(zp) => {
                    if !out.contains(&zp) {
                        out.push(zp);
                    }
                }
                None => warn!(
                    "No zero-profile equivalent for {} in profile list; dropping",
                    name
                ),
            }
        }
        out.join(",")
    }

    /// The zero profile substituting for an object's own profile: the one
    /// attached to the profile's pool, falling back to the kind's default.
    fn zero_profile_for_object(&self, kind: ObjectKind, obj: &BufferObject) -> Option<String> {
        let name = if !obj.running_profile.is_empty() {
            obj.running_profile.as_str()
        } else {
            obj.configured_profile.as_str()
        };
        if !name.is_empty() {
            if let Some(zp) = self
                .profiles
                .get(name)
                .and_then(|p| self.pools.get(&p.pool_name))
                .and_then(|pool| pool.zero_profile_name.as_deref())
            {
                return Some(zp.to_string());
            }
        }
        self.zero.default_zero_profile(kind).map(|s| s.to_string())
    }

    /// Replays the zero pool/profile seed entries into the application
    /// store, in file order.
    fn ensure_zero_items_loaded(&mut self) {
        if self.zero_loaded_to_appl || !self.zero.loaded {
            return;
        }
        let items = self.zero.items.clone();
        let count = items.len();
        for item in items {
            self.appl_db.replace(&item.table, &item.key, item.fields);
        }
        self.zero_loaded_to_appl = true;
        info!("Loaded {} zero pool/profile entries into the application store", count);
    }

    /// Reverses the seed replay in reverse file order.
    fn unload_zero_items(&mut self) {
        if !self.zero_loaded_to_appl {
            return;
        }
        let items = self.zero.items.clone();
        for item in items.iter().rev() {
            self.appl_db.del(&item.table, &item.key);
        }
        self.zero_loaded_to_appl = false;
        info!("Unloaded zero pool/profile entries from the application store");
    }
}
