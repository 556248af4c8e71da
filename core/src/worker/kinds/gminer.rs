//! GMiner: GPU miner, Etchash on Ethereum Classic. Takes the pool as
//! separate `--server`/`--port` arguments.

use serde_json::Value;

use super::{count, expect_object, host_port, num, param, text};
use crate::error::ControlError;
use crate::telemetry::{DeviceStats, MinerStats};
use crate::worker::kind::{LaunchContext, LaunchPlan};
use crate::worker::params::ParameterSpec;


pub fn parameters() -> Vec<ParameterSpec> {
    vec![
        ParameterSpec::new("temp_limit", "Temperature limit", "off")
            .option("off", "Off")
            .option("75", "75 °C")
            .option("85", "85 °C"),
        ParameterSpec::new("watchdog", "Watchdog", "on")
            .option("on", "On")
            .option("off", "Off"),
    ]
}


pub fn build_args(ctx: &LaunchContext) -> Result<LaunchPlan, ControlError> {
    let (host, port) = host_port(ctx.pool)?;
    let mut args: Vec<String> = vec![
        "--algo".into(),
        "etchash".into(),
        "--server".into(),
        host,
        "--port".into(),
        port,
        "--user".into(),
        format!("{}.{}", ctx.wallet, ctx.rig_name),
        "--api".into(),
        format!("127.0.0.1:{}", ctx.port),
    ];
    let limit = param(ctx.params, "temp_limit");
    if limit != "off" {
        args.push("--templimit".into());
        args.push(limit.into());
    }
    args.push("--watchdog".into());
    args.push(if param(ctx.params, "watchdog") == "off" { "0" } else { "1" }.into());
    Ok(LaunchPlan {
        port: ctx.port,
        args,
        config: None,
    })
}


/// Parse `/stat`. GMiner reports no total; it is the sum of device speeds.
pub fn parse_stats(body: &Value) -> Result<MinerStats, String> {
    expect_object(body)?;
    let devices: Vec<DeviceStats> = body
        .get("devices")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .map(|d| DeviceStats {
                    index: count(d, "/gpu_id") as u32,
                    name: text(d, "/name"),
                    hashrate: num(d, "/speed"),
                    temperature: d.get("temperature").and_then(Value::as_f64),
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(MinerStats {
        hashrate: devices.iter().map(|d| d.hashrate).sum(),
        accepted: count(body, "/total_accepted_shares"),
        rejected: count(body, "/total_rejected_shares"),
        uptime_secs: count(body, "/uptime"),
        devices,
    })
}
