//! Zero-profile/pool seed file.
//!
//! The seed file is an ordered JSON array of pool/profile definitions plus
//! one `control_fields` record. Order matters: zero pools must precede the
//! zero profiles that reference them, and load/unload against the
//! application store replays/reverses that order.
//!
//! ```json
//! [
//!   {"table": "BUFFER_POOL_TABLE", "key": "ingress_zero_pool",
//!    "fields": {"type": "ingress", "mode": "static", "size": "0"}},
//!   {"table": "BUFFER_PROFILE_TABLE", "key": "ingress_lossless_zero_profile",
//!    "fields": {"pool": "ingress_lossless_pool", "size": "0", "dynamic_th": "-8"}},
//!   {"control_fields": {"pgs_to_apply_zero_profile": "0",
//!                       "support_removing_buffer_items": "no"}}
//! ]
//! ```
//!
//! A zero profile's `pool` field names the *configured* pool it reclaims;
//! pool names follow the `ingress_*`/`egress_*` convention, which also
//! yields the profile's direction. Inconsistent seed data disables the
//! reclaim feature for this load rather than aborting the process.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;

use serde_json::Value;
use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult, FieldValues};
use tracing::{info, warn};

use crate::bitmap;
use crate::tables::{APP_BUFFER_POOL_TABLE, APP_BUFFER_PROFILE_TABLE};
use crate::types::{BufferDirection, ObjectKind};

mod control_fields {
    pub const PGS_TO_APPLY: &str = "pgs_to_apply_zero_profile";
    pub const QUEUES_TO_APPLY: &str = "queues_to_apply_zero_profile";
    pub const SUPPORT_REMOVING: &str = "support_removing_buffer_items";
}

/// One ordered pool/profile definition from the seed file.
#[derive(Debug, Clone)]
pub struct ZeroSeedItem {
    pub table: String,
    pub key: String,
    pub fields: FieldValues,
}

/// Parsed and consistency-checked zero-profile seed data.
#[derive(Debug, Clone)]
pub struct ZeroPoolsProfiles {
    /// Pool and profile definitions in file order.
    pub items: Vec<ZeroSeedItem>,
    /// Configured pool name -> zero profile name.
    pool_to_zero_profile: BTreeMap<String, String>,
    /// Zero profile name -> direction (from the referenced pool name).
    profile_direction: BTreeMap<String, BufferDirection>,
    /// Restricted ID list per object kind; `None` means "apply to all".
    pgs_to_apply: Option<String>,
    queues_to_apply: Option<String>,
    /// Whether the platform supports removing buffer objects outright.
    pub support_removal: bool,
    /// True when seed data was loaded and passed the consistency check.
    pub loaded: bool,
}

impl ZeroPoolsProfiles {
    /// No seed data: reclaim falls back to object removal.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            pool_to_zero_profile: BTreeMap::new(),
            profile_direction: BTreeMap::new(),
            pgs_to_apply: None,
            queues_to_apply: None,
            support_removal: true,
            loaded: false,
        }
    }

    /// The zero profile reclaiming into the given configured pool.
    pub fn zero_profile_for_pool(&self, pool: &str) -> Option<&str> {
        self.pool_to_zero_profile.get(pool).map(|s| s.as_str())
    }

    /// The zero profile applied to supported-but-not-configured objects of
    /// the given kind: the first seed profile of the matching direction.
    pub fn default_zero_profile(&self, kind: ObjectKind) -> Option<&str> {
        let direction = kind.direction();
        self.items
            .iter()
            .filter(|item| item.table == APP_BUFFER_PROFILE_TABLE)
            .map(|item| item.key.as_str())
            .find(|name| self.profile_direction.get(*name) == Some(&direction))
    }

    /// Restricted ID list for the kind, if the vendor configured one.
    pub fn restricted_ids(&self, kind: ObjectKind) -> Option<&str> {
        match kind {
            ObjectKind::PriorityGroup => self.pgs_to_apply.as_deref(),
            ObjectKind::Queue => self.queues_to_apply.as_deref(),
        }
    }

    /// Disables the reclaim feature, reverting to "no zero profiles
    /// loaded". Removal support is kept as parsed.
    pub fn disable(&mut self) {
        self.items.clear();
        self.pool_to_zero_profile.clear();
        self.profile_direction.clear();
        self.pgs_to_apply = None;
        self.queues_to_apply = None;
        self.loaded = false;
    }
}

fn parse_field_values(obj: &Value) -> CfgMgrResult<FieldValues> {
    let Value::Object(fields) = obj else {
        return Err(CfgMgrError::internal("Expected JSON object for fields"));
    };
    let mut fvs = FieldValues::new();
    for (field, value) in fields {
        match value {
            Value::String(s) => fvs.push((field.clone(), s.clone())),
            Value::Number(n) => fvs.push((field.clone(), n.to_string())),
            Value::Bool(b) => fvs.push((field.clone(), b.to_string())),
            _ => warn!("Unsupported value type for field {}: {:?}", field, value),
        }
    }
    Ok(fvs)
}

fn direction_from_pool_name(pool: &str) -> Option<BufferDirection> {
    if pool.starts_with("ingress") {
        Some(BufferDirection::Ingress)
    } else if pool.starts_with("egress") {
        Some(BufferDirection::Egress)
    } else {
        None
    }
}

fn check_restricted_ids(name: &str, ids: &Option<String>) -> CfgMgrResult<()> {
    if let Some(ids) = ids {
        if bitmap::ids_to_bitmap(ids).is_none() {
            return Err(CfgMgrError::consistency(format!(
                "{} is not a valid ID list: '{}'",
                name, ids
            )));
        }
    }
    Ok(())
}

/// Loads and consistency-checks the zero-profile seed file.
///
/// A `Consistency` error means the reclaim feature must be disabled for
/// this load; any other error is a plain read/parse failure.
pub fn load_zero_profiles(path: &str) -> CfgMgrResult<ZeroPoolsProfiles> {
    let file = File::open(path).map_err(|e| CfgMgrError::FileRead {
        path: path.to_string(),
        source: e,
    })?;
    let json: Value = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| CfgMgrError::internal(format!("Failed to parse JSON from {}: {}", path, e)))?;

    let Value::Array(records) = json else {
        return Err(CfgMgrError::internal(format!(
            "Zero-profile seed file {} is not a JSON array",
            path
        )));
    };

    let mut zero = ZeroPoolsProfiles::empty();
    let mut control_seen = false;

    for record in &records {
        let Value::Object(obj) = record else {
            return Err(CfgMgrError::internal("Seed record is not a JSON object"));
        };

        if let Some(control) = obj.get("control_fields") {
            if control_seen {
                return Err(CfgMgrError::consistency(
                    "Duplicate control_fields record in zero-profile seed",
                ));
            }
            control_seen = true;
            let fvs = parse_field_values(control)?;
            for (field, value) in fvs {
                match field.as_str() {
                    control_fields::PGS_TO_APPLY => zero.pgs_to_apply = Some(value),
                    control_fields::QUEUES_TO_APPLY => zero.queues_to_apply = Some(value),
                    control_fields::SUPPORT_REMOVING => {
                        zero.support_removal = value == "yes" || value == "true"
                    }
                    _ => warn!("Unknown control field {} in seed file", field),
                }
            }
            continue;
        }

        let table = obj
            .get("table")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CfgMgrError::internal("Seed record missing 'table'"))?
            .to_string();
        let key = obj
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CfgMgrError::internal("Seed record missing 'key'"))?
            .to_string();
        let fields = parse_field_values(
            obj.get("fields")
                .ok_or_else(|| CfgMgrError::internal("Seed record missing 'fields'"))?,
        )?;

        if table == APP_BUFFER_PROFILE_TABLE {
            let pool = fields
                .iter()
                .find(|(f, _)| f == "pool")
                .map(|(_, v)| v.clone())
                .ok_or_else(|| {
                    CfgMgrError::consistency(format!("Zero profile {} has no pool reference", key))
                })?;
            let direction = direction_from_pool_name(&pool).ok_or_else(|| {
                CfgMgrError::consistency(format!(
                    "Cannot derive direction of zero profile {} from pool '{}'",
                    key, pool
                ))
            })?;
            zero.pool_to_zero_profile.insert(pool, key.clone());
            zero.profile_direction.insert(key.clone(), direction);
        } else if table != APP_BUFFER_POOL_TABLE {
            return Err(CfgMgrError::consistency(format!(
                "Unexpected table {} in zero-profile seed",
                table
            )));
        }

        zero.items.push(ZeroSeedItem { table, key, fields });
    }

    if !control_seen {
        return Err(CfgMgrError::consistency(
            "Zero-profile seed has no control_fields record",
        ));
    }

    check_restricted_ids(control_fields::PGS_TO_APPLY, &zero.pgs_to_apply)?;
    check_restricted_ids(control_fields::QUEUES_TO_APPLY, &zero.queues_to_apply)?;

    // Restricted mode removes every configured object outright, which the
    // platform must support.
    if (zero.pgs_to_apply.is_some() || zero.queues_to_apply.is_some()) && !zero.support_removal {
        return Err(CfgMgrError::consistency(
            "Restricted ID list configured but buffer object removal is unsupported",
        ));
    }

    zero.loaded = true;
    info!(
        "Loaded {} zero pool/profile definitions from {} (removal supported: {})",
        zero.items.len(),
        path,
        zero.support_removal
    );
    Ok(zero)
}
