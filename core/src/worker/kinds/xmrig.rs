//! XMRig: CPU miner driven by a generated JSON config file.

use serde_json::{json, Value};

use super::{count, expect_object, num, param, text};
use crate::error::ControlError;
use crate::telemetry::{DeviceStats, MinerStats};
use crate::worker::kind::{LaunchContext, LaunchPlan};
use crate::worker::params::ParameterSpec;


pub fn parameters() -> Vec<ParameterSpec> {
    vec![
        ParameterSpec::new("threads", "CPU threads", "auto")
            .option("auto", "Automatic")
            .option("1", "1")
            .option("2", "2")
            .option("4", "4")
            .option("8", "8")
            .option("16", "16"),
        ParameterSpec::new("priority", "Process priority", "2")
            .option("0", "Idle")
            .option("1", "Lowest")
            .option("2", "Below normal")
            .option("3", "Normal")
            .option("4", "Above normal")
            .option("5", "Highest"),
        ParameterSpec::new("huge_pages", "Huge pages", "true")
            .option("true", "Enabled")
            .option("false", "Disabled"),
        ParameterSpec::new("donate", "Donation level", "1")
            .option("0", "0%")
            .option("1", "1%"),
    ]
}


pub fn build_args(ctx: &LaunchContext) -> Result<LaunchPlan, ControlError> {
    let priority: u8 = param(ctx.params, "priority").parse().unwrap_or(2);
    let donate: u8 = param(ctx.params, "donate").parse().unwrap_or(1);
    let mut cpu = json!({
        "enabled": true,
        "huge-pages": param(ctx.params, "huge_pages") == "true",
        "priority": priority,
    });
    if let Ok(threads) = param(ctx.params, "threads").parse::<u32>() {
        // Share of logical cores xmrig may use, as a percentage hint.
        cpu["max-threads-hint"] = json!(threads_hint(threads));
    }
    let config = json!({
        "autosave": false,
        "background": false,
        "colors": false,
        "donate-level": donate,
        "http": {
            "enabled": true,
            "host": "127.0.0.1",
            "port": ctx.port,
            "restricted": true,
        },
        "cpu": cpu,
        "pools": [{
            "url": ctx.pool,
            "user": ctx.wallet,
            "pass": ctx.rig_name,
            "rig-id": ctx.rig_name,
            "keepalive": true,
        }],
    });
    let config = serde_json::to_string_pretty(&config)?;
    Ok(LaunchPlan {
        port: ctx.port,
        args: vec![
            "--config".into(),
            ctx.config_path.display().to_string(),
            "--no-color".into(),
        ],
        config: Some(config),
    })
}

fn threads_hint(threads: u32) -> u32 {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1);
    (threads.min(cores) * 100 / cores).max(1)
}


/// Parse `/2/summary`. `hashrate.total` is `[10s, 60s, 15m]`; any slot may
/// be null while xmrig warms up.
pub fn parse_stats(body: &Value) -> Result<MinerStats, String> {
    expect_object(body)?;
    let hashrate = num(body, "/hashrate/total/0");
    Ok(MinerStats {
        hashrate,
        accepted: count(body, "/connection/accepted"),
        rejected: count(body, "/connection/rejected"),
        uptime_secs: count(body, "/uptime"),
        devices: vec![DeviceStats {
            index: 0,
            name: text(body, "/cpu/brand"),
            hashrate,
            temperature: None,
        }],
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::params::restore;
    use std::collections::BTreeMap;
    use std::path::Path;

    #[test]
    fn config_embeds_port_pool_and_wallet() {
        let params = restore(&parameters(), &BTreeMap::new());
        let ctx = LaunchContext {
            port: 16001,
            params: &params,
            wallet: "4wallet",
            pool: "pool.xmr.example:3333",
            rig_name: "den",
            config_path: Path::new("/state/xmrig/config.json"),
        };
        let plan = build_args(&ctx).unwrap();
        assert_eq!(plan.port, 16001);
        assert_eq!(plan.args[0], "--config");
        assert_eq!(plan.args[1], "/state/xmrig/config.json");
        let config: Value = serde_json::from_str(plan.config.as_deref().unwrap()).unwrap();
        assert_eq!(config["http"]["port"], 16001);
        assert_eq!(config["pools"][0]["user"], "4wallet");
        assert_eq!(config["cpu"]["huge-pages"], true);
        assert!(config["cpu"].get("max-threads-hint").is_none());
    }

    #[test]
    fn explicit_threads_set_hint() {
        let mut stored = BTreeMap::new();
        stored.insert("threads".to_string(), "1".to_string());
        let params = restore(&parameters(), &stored);
        let ctx = LaunchContext {
            port: 1,
            params: &params,
            wallet: "w",
            pool: "p:1",
            rig_name: "r",
            config_path: Path::new("c.json"),
        };
        let config: Value =
            serde_json::from_str(build_args(&ctx).unwrap().config.as_deref().unwrap()).unwrap();
        assert!(config["cpu"]["max-threads-hint"].as_u64().unwrap() >= 1);
    }

    #[test]
    fn parse_summary() {
        let body = serde_json::json!({
            "uptime": 120,
            "cpu": {"brand": "Ryzen 7"},
            "connection": {"accepted": 10, "rejected": 2},
            "hashrate": {"total": [5123.5, 5000.0, null]}
        });
        let stats = parse_stats(&body).unwrap();
        assert_eq!(stats.hashrate, 5123.5);
        assert_eq!(stats.accepted, 10);
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.devices[0].name, "Ryzen 7");
    }

    #[test]
    fn warming_up_reports_zero() {
        let body = serde_json::json!({"hashrate": {"total": [null, null, null]}});
        assert_eq!(parse_stats(&body).unwrap().hashrate, 0.0);
    }
}
