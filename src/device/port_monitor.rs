use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::{probe, ConnectionState, SessionManager};
use crate::serial::PortDescriptor;
use crate::shutdown::Shutdown;

/// Polls the port registry and hands newly appeared keypads to the session.
///
/// Hot-plug is detected by set difference against the ports seen on the
/// previous cycle. The port of the live session is kept out of that baseline,
/// so after an unplug/replug it counts as new again.
pub struct DeviceMonitor {
    session: Arc<SessionManager>,
    shutdown: Shutdown,
    known: HashSet<String>,
    baseline_taken: bool,
    failures: u32,
}

impl DeviceMonitor {
    pub fn new(session: Arc<SessionManager>, shutdown: Shutdown) -> Self {
        Self {
            session,
            shutdown,
            known: HashSet::new(),
            baseline_taken: false,
            failures: 0,
        }
    }

    pub async fn run(mut self) {
        log::info!("Device monitor started");
        loop {
            let delay = self.cycle().await;
            if !self.shutdown.sleep(delay).await {
                break;
            }
        }
        log::info!("Device monitor stopped");
    }

    /// One poll; returns how long to wait before the next
    pub async fn cycle(&mut self) -> Duration {
        let options = self.session.options().monitor.clone();

        if !self.session.store().monitoring_enabled().await {
            log::debug!("Device monitoring disabled");
            return options.disabled_interval;
        }

        let ports = match self.session.list_ports() {
            Ok(ports) => {
                self.failures = 0;
                ports
            }
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                let delay = backoff(options.disconnected_interval, self.failures, options.max_backoff);
                log::warn!(
                    "Port enumeration failed ({} in a row), retrying in {:?}: {}",
                    self.failures,
                    delay,
                    e
                );
                return delay;
            }
        };

        let state = self.session.state().await;
        let active_port = match &state {
            ConnectionState::Connected { port } => Some(port.as_str()),
            _ => None,
        };

        let appeared: Vec<&PortDescriptor> = ports
            .iter()
            .filter(|p| !self.known.contains(&p.device) && Some(p.device.as_str()) != active_port)
            .collect();
        let first_cycle = !self.baseline_taken;
        self.known = ports
            .iter()
            .map(|p| p.device.clone())
            .filter(|name| Some(name.as_str()) != active_port)
            .collect();
        self.baseline_taken = true;

        if first_cycle {
            log::debug!("Port baseline: {:?}", self.known);
            return self.interval(&state);
        }
        if !appeared.is_empty() {
            log::info!(
                "New serial port(s): {}",
                appeared.iter().map(|p| p.device.as_str()).collect::<Vec<_>>().join(", ")
            );
        }
        if state != ConnectionState::Disconnected {
            return self.interval(&state);
        }

        for port in appeared.into_iter().take(options.max_new_ports_per_cycle) {
            if self.shutdown.is_triggered() {
                break;
            }

            match probe(
                self.session.backend().as_ref(),
                port,
                self.session.options().baud_rate,
                self.session.options().monitor_probe_timeout,
            )
            .await
            {
                Ok(identified) => {
                    if self.session.adopt_link(identified).await {
                        log::info!("Hot-plugged KommPad on {}", port.device);
                        self.known.remove(&port.device);
                    }
                    break;
                }
                Err(e) => log::debug!("Monitor skipped {}: {}", port.device, e),
            }
        }

        let state = self.session.state().await;
        self.interval(&state)
    }

    fn interval(&self, state: &ConnectionState) -> Duration {
        let options = &self.session.options().monitor;
        if state.is_connected() {
            options.connected_interval
        } else {
            options.disconnected_interval
        }
    }
}

/// `base * 2^failures`, capped
fn backoff(base: Duration, failures: u32, max: Duration) -> Duration {
    let factor = 1u32.checked_shl(failures.min(16)).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(max, |d| d.min(max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(3);
        let max = Duration::from_secs(30);
        assert_eq!(backoff(base, 1, max), Duration::from_secs(6));
        assert_eq!(backoff(base, 2, max), Duration::from_secs(12));
        assert_eq!(backoff(base, 3, max), Duration::from_secs(24));
        assert_eq!(backoff(base, 4, max), max);
        assert_eq!(backoff(base, 40, max), max);
    }
}
