use std::sync::Arc;
use std::time::Duration;

use crate::device::SessionManager;
use crate::shutdown::Shutdown;

/// What a detected change led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Unchanged,
    /// The file did not parse; the previous snapshot stays active
    Rejected,
    /// New settings went out over the live connection
    Pushed,
    /// The push failed, or there was no connection, so a reconnect was attempted
    Reconnected { connected: bool },
}

/// Polls the configuration file's modification time and applies changes.
pub struct ConfigWatcher {
    session: Arc<SessionManager>,
    shutdown: Shutdown,
    interval: Duration,
    settle_delay: Duration,
}

impl ConfigWatcher {
    pub fn new(session: Arc<SessionManager>, shutdown: Shutdown) -> Self {
        let options = session.options();
        let interval = options.watch_interval;
        let settle_delay = options.watch_settle_delay;
        Self {
            session,
            shutdown,
            interval,
            settle_delay,
        }
    }

    pub async fn run(self) {
        log::info!(
            "Watching {} for changes",
            self.session.store().path().display()
        );
        while self.shutdown.sleep(self.interval).await {
            self.check().await;
        }
        log::info!("Configuration watcher stopped");
    }

    /// Poll once and act on any change
    pub async fn check(&self) -> ReloadOutcome {
        let store = self.session.store();
        match store.poll_modified().await {
            Ok(true) => {}
            Ok(false) => return ReloadOutcome::Unchanged,
            Err(e) => {
                log::debug!("Could not stat {}: {}", store.path().display(), e);
                return ReloadOutcome::Unchanged;
            }
        }

        log::info!("Configuration changed on disk");
        if !self.shutdown.sleep(self.settle_delay).await {
            return ReloadOutcome::Unchanged;
        }

        if let Err(e) = store.reload().await {
            log::warn!("Keeping previous configuration, reload failed: {}", e);
            return ReloadOutcome::Rejected;
        }

        if self.session.is_connected().await {
            match self.session.push_settings().await {
                Ok(()) => return ReloadOutcome::Pushed,
                Err(e) => log::warn!("Settings push failed, reconnecting: {}", e),
            }
        }

        let connected = match self.session.reconnect().await {
            Ok(port) => {
                log::info!("Reconnected on {}", port);
                true
            }
            Err(e) => {
                log::info!("Reconnect after configuration change failed: {}", e);
                false
            }
        };
        ReloadOutcome::Reconnected { connected }
    }
}
