use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::serial::DEFAULT_BAUD_RATE;

/// Runtime tunables for the bridge.
///
/// Everything here has a sensible default; the CLI only overrides a few.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    pub config_path: PathBuf,
    pub baud_rate: u32,
    /// Wall-clock bound for the identification handshake on connect
    pub probe_timeout: Duration,
    /// Shorter handshake bound used for hot-plugged ports
    pub monitor_probe_timeout: Duration,
    /// Sleep between non-blocking read checks
    pub read_poll_interval: Duration,
    pub watch_interval: Duration,
    /// Wait after a file change before reading it
    pub watch_settle_delay: Duration,
    pub monitor: MonitorOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorOptions {
    pub disconnected_interval: Duration,
    pub connected_interval: Duration,
    pub disabled_interval: Duration,
    pub max_backoff: Duration,
    pub max_new_ports_per_cycle: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            baud_rate: DEFAULT_BAUD_RATE,
            probe_timeout: Duration::from_secs(3),
            monitor_probe_timeout: Duration::from_secs(1),
            read_poll_interval: Duration::from_millis(20),
            watch_interval: Duration::from_secs(1),
            watch_settle_delay: Duration::from_millis(250),
            monitor: MonitorOptions::default(),
        }
    }
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            disconnected_interval: Duration::from_secs(3),
            connected_interval: Duration::from_secs(10),
            disabled_interval: Duration::from_secs(5),
            max_backoff: Duration::from_secs(30),
            max_new_ports_per_cycle: 4,
        }
    }
}

/// `<config dir>/KommPad/config.json`, or `./config.json` without a config dir
pub fn default_config_path() -> PathBuf {
    match dirs::config_dir() {
        Some(mut path) => {
            path.push("KommPad");
            path.push("config.json");
            path
        }
        None => PathBuf::from("config.json"),
    }
}
