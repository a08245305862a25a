//! Table and field name constants for the dynamic buffer manager.

use sonic_cfgmgr_common::defaults;

// CONFIG_DB tables
pub const CFG_PORT_TABLE: &str = "PORT";
pub const CFG_PORT_CABLE_LEN_TABLE: &str = "CABLE_LENGTH";
pub const CFG_BUFFER_POOL_TABLE: &str = "BUFFER_POOL";
pub const CFG_BUFFER_PROFILE_TABLE: &str = "BUFFER_PROFILE";
pub const CFG_BUFFER_PG_TABLE: &str = "BUFFER_PG";
pub const CFG_BUFFER_QUEUE_TABLE: &str = "BUFFER_QUEUE";
pub const CFG_BUFFER_PORT_INGRESS_PROFILE_LIST: &str = "BUFFER_PORT_INGRESS_PROFILE_LIST";
pub const CFG_BUFFER_PORT_EGRESS_PROFILE_LIST: &str = "BUFFER_PORT_EGRESS_PROFILE_LIST";
pub const CFG_DEFAULT_LOSSLESS_BUFFER_PARAMETER: &str = "DEFAULT_LOSSLESS_BUFFER_PARAMETER";

// STATE_DB-sourced feeds
pub const STATE_BUFFER_MAX_PARAM_TABLE: &str = "BUFFER_MAX_PARAM_TABLE";
pub const STATE_PORT_TABLE: &str = "PORT_TABLE";

// APPL_DB tables
pub const APP_BUFFER_POOL_TABLE: &str = "BUFFER_POOL_TABLE";
pub const APP_BUFFER_PROFILE_TABLE: &str = "BUFFER_PROFILE_TABLE";
pub const APP_BUFFER_PG_TABLE: &str = "BUFFER_PG_TABLE";
pub const APP_BUFFER_QUEUE_TABLE: &str = "BUFFER_QUEUE_TABLE";
pub const APP_BUFFER_PORT_INGRESS_PROFILE_LIST: &str = "BUFFER_PORT_INGRESS_PROFILE_LIST_TABLE";
pub const APP_BUFFER_PORT_EGRESS_PROFILE_LIST: &str = "BUFFER_PORT_EGRESS_PROFILE_LIST_TABLE";

// STATE_DB tables written by this manager
pub const STATE_BUFFER_POOL_TABLE: &str = "BUFFER_POOL_TABLE";
pub const STATE_BUFFER_PROFILE_TABLE: &str = "BUFFER_PROFILE_TABLE";
pub const STATE_RECLAIMED_ITEM_TABLE: &str = "BUFFER_RECLAIMED_ITEM_TABLE";
pub const STATE_WARM_RESTART_TABLE: &str = "WARM_RESTART_TABLE";

/// PORT table fields
pub mod port_fields {
    pub const SPEED: &str = "speed";
    pub const ADMIN_STATUS: &str = "admin_status";
    pub const MTU: &str = "mtu";
    pub const AUTONEG: &str = "autoneg";
    pub const ADV_SPEEDS: &str = "adv_speeds";
    pub const LANES: &str = "lanes";
}

/// STATE_DB PORT_TABLE fields (platform facts)
pub mod port_state_fields {
    pub const SUPPORTED_SPEEDS: &str = "supported_speeds";
    pub const MAX_PRIORITY_GROUPS: &str = "max_priority_groups";
    pub const MAX_QUEUES: &str = "max_queues";
}

/// BUFFER_POOL table fields
pub mod buffer_pool_fields {
    pub const TYPE: &str = "type";
    pub const MODE: &str = "mode";
    pub const SIZE: &str = "size";
    pub const XOFF: &str = "xoff";
}

/// BUFFER_PROFILE table fields
pub mod buffer_profile_fields {
    pub const POOL: &str = "pool";
    pub const XON: &str = "xon";
    pub const XON_OFFSET: &str = "xon_offset";
    pub const XOFF: &str = "xoff";
    pub const SIZE: &str = "size";
    pub const HEADROOM_TYPE: &str = "headroom_type";
    pub const HEADROOM_TYPE_DYNAMIC: &str = "dynamic";
}

/// BUFFER_PG / BUFFER_QUEUE table fields
pub mod buffer_object_fields {
    pub const PROFILE: &str = "profile";
    /// Legacy marker for a dynamically calculated PG.
    pub const PROFILE_NULL: &str = "NULL";
}

/// Profile-list table fields
pub mod profile_list_fields {
    pub const PROFILE_LIST: &str = "profile_list";
}

/// DEFAULT_LOSSLESS_BUFFER_PARAMETER fields
pub mod default_lossless_fields {
    pub const DEFAULT_DYNAMIC_TH: &str = "default_dynamic_th";
    pub const OVER_SUBSCRIBE_RATIO: &str = "over_subscribe_ratio";
}

/// BUFFER_MAX_PARAM_TABLE fields
pub mod buffer_max_fields {
    pub const MMU_SIZE: &str = "mmu_size";
    pub const MAX_HEADROOM_SIZE: &str = "max_headroom_size";
}

/// Special keys
pub const BUFFER_MAX_GLOBAL_KEY: &str = "global";

/// Translates a CONFIG_DB key to the APPL_DB separator convention
/// (`Ethernet0|3-4` -> `Ethernet0:3-4`).
pub fn to_appl_key(cfg_key: &str) -> String {
    cfg_key.replace(
        defaults::CONFIG_DB_KEY_SEPARATOR,
        &defaults::APPL_DB_KEY_SEPARATOR.to_string(),
    )
}

/// Splits a `port|ids` CONFIG_DB object key into its parts.
pub fn split_object_key(cfg_key: &str) -> Option<(&str, &str)> {
    cfg_key.split_once(defaults::CONFIG_DB_KEY_SEPARATOR)
}
