//! Vendor calculation plugin interface.
//!
//! The numeric formulas for headroom and pool sizing are vendor-specific
//! and live outside this daemon. The plugin exposes three pure functions
//! invoked synchronously with key/argument lists; each returns
//! newline-delimited `field:value` result lines (plus optional `debug:...`
//! lines). A deterministic test double substitutes for the scripting
//! runtime in unit tests.

use std::path::PathBuf;
use std::process::Command;

use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};
use tracing::debug;

/// Synchronous vendor calculation plugin.
pub trait VendorCalcPlugin: Send {
    /// Computes xon/xoff/xon_offset/size for a lossless profile.
    ///
    /// `keys` carries the profile name; `args` carries speed, cable
    /// length, MTU, gearbox delay and lane count.
    fn compute_headroom(&self, keys: &[String], args: &[String]) -> CfgMgrResult<Vec<String>>;

    /// Computes shared buffer pool sizes; one `pool:size[:shp_size]` line
    /// per pool.
    fn compute_pool_sizes(&self) -> CfgMgrResult<Vec<String>>;

    /// Checks a candidate profile against the port's headroom budget;
    /// returns a `result:true` / `result:false` line.
    ///
    /// `keys` carries the port; `args` carries the profile name, the
    /// profile size and optionally the newly added PG key.
    fn check_headroom_budget(&self, keys: &[String], args: &[String])
        -> CfgMgrResult<Vec<String>>;
}

/// Splits result lines into `(field, value)` pairs, logging and dropping
/// `debug:` lines.
pub fn parse_result_lines(lines: &[String]) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    for line in lines {
        let Some((field, value)) = line.split_once(':') else {
            debug!("Ignoring malformed plugin result line: {}", line);
            continue;
        };
        if field == "debug" {
            debug!("Plugin: {}", value);
            continue;
        }
        fields.push((field.to_string(), value.to_string()));
    }
    fields
}

/// Looks up one field in parsed result lines.
pub fn result_field<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(f, _)| f == name)
        .map(|(_, v)| v.as_str())
}

/// Headroom result parsed from compute-headroom lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadroomResult {
    pub xon: String,
    pub xoff: String,
    pub xon_offset: String,
    pub size: String,
}

impl HeadroomResult {
    /// Parses compute-headroom result lines; xon and xoff are mandatory.
    pub fn from_lines(lines: &[String]) -> CfgMgrResult<Self> {
        let fields = parse_result_lines(lines);
        let xon = result_field(&fields, "xon")
            .ok_or_else(|| CfgMgrError::internal("headroom result missing xon"))?;
        let xoff = result_field(&fields, "xoff")
            .ok_or_else(|| CfgMgrError::internal("headroom result missing xoff"))?;
        Ok(Self {
            xon: xon.to_string(),
            xoff: xoff.to_string(),
            xon_offset: result_field(&fields, "xon_offset").unwrap_or("").to_string(),
            size: result_field(&fields, "size").unwrap_or("").to_string(),
        })
    }
}

/// One parsed compute-pool-sizes line: `pool:size[:shp_size]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSizeResult {
    pub pool: String,
    pub size: String,
    /// Shared-headroom size, present for the ingress-lossless pool only.
    pub shp_size: Option<String>,
}

impl PoolSizeResult {
    pub fn from_line(line: &str) -> Option<Self> {
        let mut parts = line.split(':');
        let pool = parts.next()?.to_string();
        if pool.is_empty() || pool == "debug" {
            return None;
        }
        let size = parts.next()?.to_string();
        let shp_size = parts.next().map(|s| s.to_string());
        Some(Self { pool, size, shp_size })
    }

    /// Parses all pool-size lines, dropping debug lines.
    pub fn from_lines(lines: &[String]) -> Vec<Self> {
        lines
            .iter()
            .filter_map(|l| {
                if let Some(rest) = l.strip_prefix("debug:") {
                    debug!("Plugin: {}", rest);
                    return None;
                }
                Self::from_line(l)
            })
            .collect()
    }
}

/// Plugin client invoking external calculation scripts.
///
/// Each function is an executable taking `--keys k...` and `--args a...`
/// and printing result lines on stdout. Calls are synchronous and assumed
/// to complete promptly.
pub struct ScriptCalcPlugin {
    headroom_script: PathBuf,
    pool_script: PathBuf,
    budget_script: PathBuf,
}

impl ScriptCalcPlugin {
    pub fn new(
        headroom_script: impl Into<PathBuf>,
        pool_script: impl Into<PathBuf>,
        budget_script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            headroom_script: headroom_script.into(),
            pool_script: pool_script.into(),
            budget_script: budget_script.into(),
        }
    }

    fn run(&self, script: &PathBuf, keys: &[String], args: &[String]) -> CfgMgrResult<Vec<String>> {
        let mut cmd = Command::new(script);
        if !keys.is_empty() {
            cmd.arg("--keys").args(keys);
        }
        if !args.is_empty() {
            cmd.arg("--args").args(args);
        }
        let output = cmd.output().map_err(|e| CfgMgrError::FileRead {
            path: script.display().to_string(),
            source: e,
        })?;
        if !output.status.success() {
            return Err(CfgMgrError::internal(format!(
                "plugin {} exited with {}",
                script.display(),
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.to_string())
            .collect())
    }
}

impl VendorCalcPlugin for ScriptCalcPlugin {
    fn compute_headroom(&self, keys: &[String], args: &[String]) -> CfgMgrResult<Vec<String>> {
        self.run(&self.headroom_script, keys, args)
    }

    fn compute_pool_sizes(&self) -> CfgMgrResult<Vec<String>> {
        self.run(&self.pool_script, &[], &[])
    }

    fn check_headroom_budget(
        &self,
        keys: &[String],
        args: &[String],
    ) -> CfgMgrResult<Vec<String>> {
        self.run(&self.budget_script, keys, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result_lines() {
        let lines = vec![
            "xon:18432".to_string(),
            "debug:port speed 100000".to_string(),
            "xoff:16384".to_string(),
            "malformed".to_string(),
        ];
        let fields = parse_result_lines(&lines);
        assert_eq!(fields.len(), 2);
        assert_eq!(result_field(&fields, "xon"), Some("18432"));
        assert_eq!(result_field(&fields, "xoff"), Some("16384"));
        assert_eq!(result_field(&fields, "debug"), None);
    }

    #[test]
    fn test_headroom_result() {
        let lines = vec![
            "xon:18432".to_string(),
            "xoff:16384".to_string(),
            "size:34816".to_string(),
        ];
        let hr = HeadroomResult::from_lines(&lines).unwrap();
        assert_eq!(hr.xon, "18432");
        assert_eq!(hr.xoff, "16384");
        assert_eq!(hr.size, "34816");
        assert_eq!(hr.xon_offset, "");
    }

    #[test]
    fn test_headroom_result_missing_xoff() {
        let lines = vec!["xon:18432".to_string()];
        assert!(HeadroomResult::from_lines(&lines).is_err());
    }

    #[test]
    fn test_pool_size_result() {
        let lines = vec![
            "debug:recalculating".to_string(),
            "ingress_lossless_pool:12345678:1024000".to_string(),
            "egress_lossy_pool:7654321".to_string(),
        ];
        let results = PoolSizeResult::from_lines(&lines);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].pool, "ingress_lossless_pool");
        assert_eq!(results[0].size, "12345678");
        assert_eq!(results[0].shp_size.as_deref(), Some("1024000"));
        assert_eq!(results[1].shp_size, None);
    }
}
