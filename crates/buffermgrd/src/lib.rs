//! Dynamic Buffer Manager Daemon - shared-buffer allocation manager
//!
//! buffermgrd (dynamic model) allocates the switch's shared packet buffer
//! across ports, priority groups and queues:
//!
//! - Derive lossless PG headroom per port from speed, cable length and MTU
//!   through a vendor calculation plugin
//! - Create dynamic buffer profiles on demand and release them on the last
//!   dereference
//! - Reclaim the reserved buffer of admin-down ports with zero profiles
//! - Recompute shared pool and shared-headroom-pool sizes periodically
//! - Platform-specific handling (Mellanox 8-lane naming)

pub mod bitmap;
pub mod buffer_mgr;
pub mod pool;
pub mod port_info;
pub mod profile;
pub mod reclaim;
pub mod reconcile;
pub mod tables;
pub mod types;
pub mod vendor;
pub mod zero_profiles;

pub use buffer_mgr::BufferMgrDynamic;
pub use vendor::{ScriptCalcPlugin, VendorCalcPlugin};
pub use zero_profiles::{load_zero_profiles, ZeroPoolsProfiles};
