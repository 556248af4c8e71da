//! lolMiner: GPU miner, Autolykos2 on Ergo.

use serde_json::Value;

use super::{count, expect_object, num, param, text};
use crate::error::ControlError;
use crate::telemetry::{DeviceStats, MinerStats};
use crate::worker::kind::{LaunchContext, LaunchPlan};
use crate::worker::params::ParameterSpec;


pub fn parameters() -> Vec<ParameterSpec> {
    vec![ParameterSpec::new("tstop", "Stop temperature", "off")
        .option("off", "Off")
        .option("80", "80 °C")
        .option("90", "90 °C")]
}


pub fn build_args(ctx: &LaunchContext) -> Result<LaunchPlan, ControlError> {
    let mut args: Vec<String> = vec![
        "--algo".into(),
        "AUTOLYKOS2".into(),
        "--pool".into(),
        ctx.pool.into(),
        "--user".into(),
        format!("{}.{}", ctx.wallet, ctx.rig_name),
        "--apihost".into(),
        "127.0.0.1".into(),
        "--apiport".into(),
        ctx.port.to_string(),
    ];
    let tstop = param(ctx.params, "tstop");
    if tstop != "off" {
        args.push("--tstop".into());
        args.push(tstop.into());
    }
    Ok(LaunchPlan {
        port: ctx.port,
        args,
        config: None,
    })
}


/// Parse `/summary`. Rates are reported in `Performance_Unit`s and scaled
/// by `Performance_Factor`.
pub fn parse_stats(body: &Value) -> Result<MinerStats, String> {
    expect_object(body)?;
    let algo = body
        .pointer("/Algorithms/0")
        .ok_or_else(|| "no algorithm section".to_string())?;
    let factor = match num(algo, "/Performance_Factor") {
        f if f > 0.0 => f,
        _ => 1.0,
    };
    let per_worker = algo
        .get("Worker_Performance")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let devices = body
        .get("Workers")
        .and_then(Value::as_array)
        .map(|workers| {
            workers
                .iter()
                .enumerate()
                .map(|(i, w)| DeviceStats {
                    index: count(w, "/Index") as u32,
                    name: text(w, "/Name"),
                    hashrate: per_worker.get(i).and_then(Value::as_f64).unwrap_or(0.0) * factor,
                    temperature: w.get("Core_Temp").and_then(Value::as_f64),
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(MinerStats {
        hashrate: num(algo, "/Total_Performance") * factor,
        accepted: count(algo, "/Total_Accepted"),
        rejected: count(algo, "/Total_Rejected"),
        uptime_secs: count(body, "/Session/Uptime"),
        devices,
    })
}
