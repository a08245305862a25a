//! Dynamic Buffer Manager Daemon Entry Point

use sonic_buffermgrd::{load_zero_profiles, BufferMgrDynamic, ScriptCalcPlugin, ZeroPoolsProfiles};
use sonic_cfgmgr_common::{manager::defaults, CfgMgrError, Orch};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting buffermgrd (dynamic buffer model)");

    let mut args = std::env::args().skip(1);
    let seed_path = args
        .next()
        .unwrap_or_else(|| "/usr/share/sonic/hwsku/asic_table_zero_profiles.json".to_string());
    let headroom_script = args
        .next()
        .unwrap_or_else(|| "/usr/share/swss/buffer_headroom_calculation.lua".to_string());
    let pool_script = args
        .next()
        .unwrap_or_else(|| "/usr/share/swss/buffer_pool_calculation.lua".to_string());
    let budget_script = args
        .next()
        .unwrap_or_else(|| "/usr/share/swss/buffer_check_headroom.lua".to_string());

    let warm_restart = std::env::var("WARM_START")
        .map(|v| v == "true")
        .unwrap_or(false);

    let zero = match load_zero_profiles(&seed_path) {
        Ok(zero) => zero,
        Err(CfgMgrError::Consistency { message }) => {
            error!(
                "Zero-profile seed data is inconsistent: {}; buffer reclaim disabled",
                message
            );
            ZeroPoolsProfiles::empty()
        }
        Err(e) => {
            warn!(
                "No zero-profile seed loaded from {}: {}; reclaim falls back to object removal",
                seed_path, e
            );
            ZeroPoolsProfiles::empty()
        }
    };

    let plugin = Box::new(ScriptCalcPlugin::new(
        headroom_script,
        pool_script,
        budget_script,
    ));
    let mut mgr = BufferMgrDynamic::new(plugin, zero, warm_restart);

    // TODO: subscribe to CONFIG_DB/STATE_DB change feeds and feed entries
    // into the manager once the redis adapter lands

    info!("buffermgrd initialized successfully");

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
        defaults::TICK_INTERVAL_SECS,
    ));
    loop {
        ticker.tick().await;
        mgr.on_timer();
        mgr.do_task().await;
    }
}
