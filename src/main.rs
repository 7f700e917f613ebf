use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use kommpad_bridge_lib::options::BridgeOptions;

const KEY_INJECTION_NOTE: &str = "Note: this build has no OS key injector. Key, macro, media and \
text actions are written to the log instead of being typed; app, URL and layer actions run normally.";

/// Background bridge for the KommPad macro keypad.
///
/// Finds the keypad on a serial port, pushes its display settings and turns
/// button presses into host actions.
#[derive(Debug, Parser)]
#[command(name = "kommpad-bridge", version, after_help = KEY_INJECTION_NOTE)]
struct Cli {
    /// Configuration document shared with the configurator
    #[arg(long, env = "KOMMPAD_CONFIG")]
    config: Option<PathBuf>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Identification timeout in milliseconds
    #[arg(long)]
    probe_timeout_ms: Option<u64>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    /// Print the serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Forget the last known port and exit
    #[arg(long)]
    clear_last_port: bool,
}

impl Cli {
    fn options(&self) -> BridgeOptions {
        let mut options = BridgeOptions::default();
        if let Some(ref path) = self.config {
            options.config_path = path.clone();
        }
        if let Some(baud) = self.baud {
            options.baud_rate = baud;
        }
        if let Some(ms) = self.probe_timeout_ms {
            options.probe_timeout = Duration::from_millis(ms);
        }
        options
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let options = cli.options();
    if cli.list_ports {
        return kommpad_bridge_lib::list_ports(&options).await;
    }
    if cli.clear_last_port {
        return kommpad_bridge_lib::clear_last_port(&options).await;
    }

    kommpad_bridge_lib::run(options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn help_says_keys_are_only_logged() {
        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains("no OS key injector"));
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from(["kommpad-bridge", "--baud", "115200", "--probe-timeout-ms", "500"]);
        let options = cli.options();
        assert_eq!(options.baud_rate, 115200);
        assert_eq!(options.probe_timeout, Duration::from_millis(500));
    }
}
