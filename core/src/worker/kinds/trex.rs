//! T-Rex: NVIDIA miner, KawPow on Ravencoin.

use serde_json::Value;

use super::{count, expect_object, num, param, text};
use crate::error::ControlError;
use crate::telemetry::{DeviceStats, MinerStats};
use crate::worker::kind::{LaunchContext, LaunchPlan};
use crate::worker::params::ParameterSpec;


pub fn parameters() -> Vec<ParameterSpec> {
    vec![
        ParameterSpec::new("intensity", "Intensity", "auto")
            .option("auto", "Automatic")
            .option("18", "Low")
            .option("20", "Medium")
            .option("22", "High"),
        ParameterSpec::new("temperature_limit", "Temperature limit", "off")
            .option("off", "Off")
            .option("70", "70 °C")
            .option("80", "80 °C")
            .option("90", "90 °C"),
    ]
}


pub fn build_args(ctx: &LaunchContext) -> Result<LaunchPlan, ControlError> {
    let mut args: Vec<String> = vec![
        "-a".into(),
        "kawpow".into(),
        "-o".into(),
        ctx.pool.into(),
        "-u".into(),
        ctx.wallet.into(),
        "-w".into(),
        ctx.rig_name.into(),
        "-p".into(),
        "x".into(),
        "--api-bind-http".into(),
        format!("127.0.0.1:{}", ctx.port),
        "--api-read-only".into(),
        "--no-watchdog".into(),
    ];
    let intensity = param(ctx.params, "intensity");
    if intensity != "auto" {
        args.push("-i".into());
        args.push(intensity.into());
    }
    let limit = param(ctx.params, "temperature_limit");
    if limit != "off" {
        args.push("--temperature-limit".into());
        args.push(limit.into());
    }
    Ok(LaunchPlan {
        port: ctx.port,
        args,
        config: None,
    })
}


pub fn parse_stats(body: &Value) -> Result<MinerStats, String> {
    expect_object(body)?;
    let devices = body
        .get("gpus")
        .and_then(Value::as_array)
        .map(|gpus| {
            gpus.iter()
                .map(|g| DeviceStats {
                    index: count(g, "/device_id") as u32,
                    name: text(g, "/name"),
                    hashrate: num(g, "/hashrate"),
                    temperature: g.get("temperature").and_then(Value::as_f64),
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(MinerStats {
        hashrate: num(body, "/hashrate"),
        accepted: count(body, "/accepted_count"),
        rejected: count(body, "/rejected_count"),
        uptime_secs: count(body, "/uptime"),
        devices,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::params::restore;
    use std::collections::BTreeMap;
    use std::path::Path;

    #[test]
    fn args_bind_api_to_negotiated_port() {
        let mut stored = BTreeMap::new();
        stored.insert("intensity".to_string(), "22".to_string());
        let params = restore(&parameters(), &stored);
        let ctx = LaunchContext {
            port: 14051,
            params: &params,
            wallet: "RWallet",
            pool: "stratum+tcp://rvn.pool.example:3636",
            rig_name: "den",
            config_path: Path::new("unused"),
        };
        let plan = build_args(&ctx).unwrap();
        let joined = plan.args.join(" ");
        assert!(joined.contains("--api-bind-http 127.0.0.1:14051"));
        assert!(joined.contains("-u RWallet"));
        assert!(joined.contains("-i 22"));
        assert!(!joined.contains("--temperature-limit"));
        assert!(plan.config.is_none());
    }

    #[test]
    fn parse_summary_with_gpus() {
        let body = serde_json::json!({
            "hashrate": 31000000,
            "accepted_count": 12,
            "rejected_count": 0,
            "uptime": 3600,
            "gpus": [
                {"device_id": 0, "name": "RTX 3070", "hashrate": 31000000, "temperature": 61}
            ]
        });
        let stats = parse_stats(&body).unwrap();
        assert_eq!(stats.hashrate, 31_000_000.0);
        assert_eq!(stats.devices.len(), 1);
        assert_eq!(stats.devices[0].temperature, Some(61.0));
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(parse_stats(&serde_json::json!([1, 2])).is_err());
    }
}
