//! Container stats math

use serde::{Deserialize, Serialize};

/// One computed resource sample for a running container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx: u64,
    pub network_tx: u64,
}

/// Raw counters read from the runtime's stats endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSample {
    pub cpu_total: u64,
    pub cpu_system: u64,
    pub precpu_total: u64,
    pub precpu_system: u64,
    pub online_cpus: u64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub network_rx: u64,
    pub network_tx: u64,
}

/// Derive percentages from one raw sample.
///
/// CPU percent is cpu-delta over system-delta scaled by core count; a zero
/// system delta (first sample after start) yields 0.
pub fn compute(raw: &RawSample) -> ContainerStats {
    let cpu_delta = raw.cpu_total.saturating_sub(raw.precpu_total) as f64;
    let system_delta = raw.cpu_system.saturating_sub(raw.precpu_system) as f64;

    let cpu_percent = if system_delta > 0.0 && cpu_delta >= 0.0 {
        (cpu_delta / system_delta) * raw.online_cpus.max(1) as f64 * 100.0
    } else {
        0.0
    };

    let memory_percent = if raw.memory_limit > 0 {
        raw.memory_usage as f64 / raw.memory_limit as f64 * 100.0
    } else {
        0.0
    };

    ContainerStats {
        cpu_percent,
        memory_usage: raw.memory_usage,
        memory_limit: raw.memory_limit,
        memory_percent,
        network_rx: raw.network_rx,
        network_tx: raw.network_tx,
    }
}
