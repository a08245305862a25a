//! Dynamic buffer manager type definitions.

use std::collections::BTreeSet;

/// Buffer pool/profile direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BufferDirection {
    Ingress,
    Egress,
}

impl BufferDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferDirection::Ingress => "ingress",
            BufferDirection::Egress => "egress",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ingress" => Some(BufferDirection::Ingress),
            "egress" => Some(BufferDirection::Egress),
            _ => None,
        }
    }
}

/// Kind of per-port buffer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObjectKind {
    PriorityGroup,
    Queue,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::PriorityGroup => "pg",
            ObjectKind::Queue => "queue",
        }
    }

    /// The direction whose pools back this object kind.
    pub fn direction(&self) -> BufferDirection {
        match self {
            ObjectKind::PriorityGroup => BufferDirection::Ingress,
            ObjectKind::Queue => BufferDirection::Egress,
        }
    }
}

/// Per-port state machine.
///
/// `AdminDown` is the initial state until an explicit admin-status is
/// observed; `Initializing` means admin-up but cable length or effective
/// speed are not known yet; `Ready` means profiles can be (re)computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Initializing,
    Ready,
    AdminDown,
}

/// A buffer pool entry.
#[derive(Debug, Clone)]
pub struct BufferPool {
    pub direction: BufferDirection,
    /// True when the pool's size is computed by the vendor plugin rather
    /// than configured.
    pub dynamic_size: bool,
    /// Pool threshold mode ("dynamic" or "static"); drives the profile
    /// threshold field name ("<mode>_th").
    pub mode: String,
    /// Resolved total size; empty until configured or computed.
    pub total_size: String,
    /// Shared-headroom-pool size; ingress-lossless pool only.
    pub xoff: String,
    /// Zero profile reclaiming into this pool, if one is loaded.
    pub zero_profile_name: Option<String>,
}

/// A buffer profile entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferProfile {
    pub name: String,
    pub direction: BufferDirection,
    pub pool_name: String,
    /// User-authored via BUFFER_PROFILE configuration.
    pub static_configured: bool,
    /// Headroom computed by the vendor plugin.
    pub dynamic_calculated: bool,
    pub lossless: bool,
    /// Threshold field name on the wire, derived from the pool mode.
    pub threshold_mode: String,
    pub threshold: String,
    pub xon: String,
    pub xoff: String,
    pub xon_offset: String,
    pub size: String,
    // Derivation inputs, set for dynamically named profiles.
    pub speed: String,
    pub cable_length: String,
    pub mtu: String,
    pub gearbox_model: String,
    pub lane_count: u32,
    /// Referencing PG keys ("Ethernet0:3-4").
    pub port_pgs: BTreeSet<String>,
}

impl BufferProfile {
    /// Field-values as written to the application store.
    pub fn to_field_values(&self) -> Vec<(String, String)> {
        let mut fvs = vec![("pool".to_string(), self.pool_name.clone())];
        if !self.xon.is_empty() {
            fvs.push(("xon".to_string(), self.xon.clone()));
        }
        if !self.xoff.is_empty() {
            fvs.push(("xoff".to_string(), self.xoff.clone()));
        }
        if !self.xon_offset.is_empty() {
            fvs.push(("xon_offset".to_string(), self.xon_offset.clone()));
        }
        if !self.size.is_empty() {
            fvs.push(("size".to_string(), self.size.clone()));
        }
        if !self.threshold.is_empty() {
            fvs.push((self.threshold_mode.clone(), self.threshold.clone()));
        }
        fvs
    }
}

/// Per-port information driving profile (re)computation.
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub state: PortState,
    pub speed: String,
    /// Derived speed used for headroom calculation; see
    /// `PortRegistry::refresh_effective_speed`.
    pub effective_speed: String,
    pub auto_neg: bool,
    pub advertised_speeds: String,
    pub supported_speeds: String,
    pub cable_length: String,
    pub mtu: String,
    pub gearbox_model: String,
    pub lane_count: u32,
    pub max_priority_groups: u32,
    pub max_queues: u32,
    pub max_headroom_size: u64,
    /// Supported-but-not-configured ID bitmaps, tracked only while the
    /// port is admin-down. Canonical numeric form; textual ranges are a
    /// store-boundary serialization.
    pub reclaimed_pgs: u32,
    pub reclaimed_queues: u32,
}

impl Default for PortInfo {
    fn default() -> Self {
        Self {
            state: PortState::AdminDown,
            speed: String::new(),
            effective_speed: String::new(),
            auto_neg: false,
            advertised_speeds: String::new(),
            supported_speeds: String::new(),
            cable_length: String::new(),
            mtu: sonic_cfgmgr_common::defaults::DEFAULT_MTU.to_string(),
            gearbox_model: String::new(),
            lane_count: 0,
            max_priority_groups: 0,
            max_queues: 0,
            max_headroom_size: 0,
            reclaimed_pgs: 0,
            reclaimed_queues: 0,
        }
    }
}

impl PortInfo {
    /// Maximum object count for a kind; 0 while unknown.
    pub fn max_objects(&self, kind: ObjectKind) -> u32 {
        match kind {
            ObjectKind::PriorityGroup => self.max_priority_groups,
            ObjectKind::Queue => self.max_queues,
        }
    }

    pub fn reclaimed_bitmap(&self, kind: ObjectKind) -> u32 {
        match kind {
            ObjectKind::PriorityGroup => self.reclaimed_pgs,
            ObjectKind::Queue => self.reclaimed_queues,
        }
    }

    pub fn set_reclaimed_bitmap(&mut self, kind: ObjectKind, bitmap: u32) {
        match kind {
            ObjectKind::PriorityGroup => self.reclaimed_pgs = bitmap,
            ObjectKind::Queue => self.reclaimed_queues = bitmap,
        }
    }
}

/// A configured PG or queue buffer object.
#[derive(Debug, Clone)]
pub struct BufferObject {
    pub kind: ObjectKind,
    /// Profile name from configuration; empty for dynamically calculated
    /// lossless PGs.
    pub configured_profile: String,
    /// Currently applied profile; differs from the configured one during
    /// reclaim and before first convergence.
    pub running_profile: String,
    pub lossless: bool,
    pub dynamic_calculated: bool,
}

/// Platform type for platform-specific profile naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    Mellanox,
    Barefoot,
    Other(String),
}

impl Platform {
    /// Detect platform from ASIC_VENDOR environment variable.
    pub fn from_env() -> Self {
        match std::env::var("ASIC_VENDOR") {
            Ok(val) if val == "mellanox" => Platform::Mellanox,
            Ok(val) if val == "barefoot" => Platform::Barefoot,
            Ok(val) => Platform::Other(val),
            Err(_) => Platform::Other("unknown".to_string()),
        }
    }

    pub fn is_mellanox(&self) -> bool {
        matches!(self, Platform::Mellanox)
    }

    /// Whether dynamic profile names carry the "_8lane" disambiguator for
    /// this lane count and speed.
    pub fn uses_8lane_naming(&self, lane_count: u32, speed: &str) -> bool {
        self.is_mellanox() && lane_count == 8 && speed != "400000"
    }
}

/// Buffer pool name constants.
pub const INGRESS_LOSSLESS_POOL_NAME: &str = "ingress_lossless_pool";
