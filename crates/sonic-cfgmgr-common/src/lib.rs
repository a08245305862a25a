//! Common infrastructure for SONiC configuration manager daemons.
//!
//! This crate provides shared functionality for the cfgmgr daemons
//! (buffermgrd and friends) in the Rust rewrite:
//!
//! - [`CfgMgr`]: Base trait extending `Orch` for config managers
//! - [`error`]: Error types for cfgmgr operations
//! - [`table`]: In-memory APPL_DB/STATE_DB table model with idempotent
//!   upsert/delete semantics, injected into managers for deterministic
//!   testing
//!
//! # Architecture
//!
//! Configuration managers follow this pattern:
//!
//! 1. Subscribe to CONFIG_DB tables for configuration changes
//! 2. Monitor STATE_DB to track port/platform readiness
//! 3. Converge processed configuration into APPL_DB for orchagent
//! 4. Mirror applied state back into STATE_DB for diagnostics

pub mod error;
pub mod manager;
pub mod table;

// Re-export commonly used items at crate root
pub use error::{CfgMgrError, CfgMgrResult};
pub use manager::{
    defaults, CfgMgr, DbId, FieldValue, FieldValues, FieldValuesExt, WarmRestartState,
};
pub use table::{DbTables, Table};

// Re-export the Orch trait for convenience
pub use sonic_orch_common::Orch;
