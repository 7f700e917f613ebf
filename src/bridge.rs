use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::{ConfigStore, ConfigWatcher};
use crate::device::{DeviceMonitor, SessionManager};
use crate::dispatch::DispatchEngine;
use crate::options::BridgeOptions;
use crate::serial::PortBackend;
use crate::shutdown::Shutdown;

/// The running bridge: one session plus the watcher and monitor loops.
pub struct Bridge {
    session: Arc<SessionManager>,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Load the configuration, try an initial connect and start the loops
    pub async fn start(
        options: BridgeOptions,
        backend: Arc<dyn PortBackend>,
        dispatcher: Arc<DispatchEngine>,
    ) -> Self {
        let store = Arc::new(ConfigStore::new(options.config_path.clone()));
        if let Err(e) = store.reload().await {
            log::warn!(
                "Could not load {}: {}",
                store.path().display(),
                e
            );
        }

        let shutdown = Shutdown::new();
        let session = SessionManager::new(backend, store, dispatcher, options, shutdown.clone());

        match session.connect().await {
            Ok(port) => log::info!("KommPad ready on {}", port),
            Err(e) => log::info!("{}; waiting for the device to appear", e),
        }

        let watcher = ConfigWatcher::new(session.clone(), shutdown.clone());
        let monitor = DeviceMonitor::new(session.clone(), shutdown.clone());
        let tasks = vec![tokio::spawn(watcher.run()), tokio::spawn(monitor.run())];

        Self {
            session,
            shutdown,
            tasks,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Stop every loop, close the port and wait for the tasks to finish
    pub async fn stop(self) {
        log::info!("Shutting down");
        self.shutdown.trigger();
        self.session.close().await;

        for task in self.tasks {
            if let Err(e) = task.await {
                log::warn!("Background task ended abnormally: {}", e);
            }
        }
    }
}
