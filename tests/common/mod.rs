#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use kommpad_bridge_lib::config::ConfigStore;
use kommpad_bridge_lib::device::{ConnectionState, SessionManager};
use kommpad_bridge_lib::dispatch::mock::{RecordingKeyInjector, RecordingLauncher, RecordingUrlOpener};
use kommpad_bridge_lib::dispatch::DispatchEngine;
use kommpad_bridge_lib::options::BridgeOptions;
use kommpad_bridge_lib::serial::mock::MockPortBackend;
use kommpad_bridge_lib::shutdown::Shutdown;

pub fn temp_config_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("kommpad-it-{}", uuid::Uuid::new_v4()))
        .join("config.json")
}

/// Write `text` and push the modification time `bump_secs` into the future
/// so coarse filesystem clocks still register the change
pub fn write_config(path: &Path, text: &str, bump_secs: u64) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
    let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(bump_secs))
        .unwrap();
}

/// Timeouts short enough for tests
pub fn fast_options(path: PathBuf) -> BridgeOptions {
    let mut options = BridgeOptions {
        config_path: path,
        probe_timeout: Duration::from_millis(150),
        monitor_probe_timeout: Duration::from_millis(100),
        read_poll_interval: Duration::from_millis(5),
        watch_interval: Duration::from_millis(20),
        watch_settle_delay: Duration::from_millis(10),
        ..BridgeOptions::default()
    };
    options.monitor.max_new_ports_per_cycle = 2;
    options
}

pub struct Rig {
    pub backend: Arc<MockPortBackend>,
    pub keys: Arc<RecordingKeyInjector>,
    pub launcher: Arc<RecordingLauncher>,
    pub urls: Arc<RecordingUrlOpener>,
    pub store: Arc<ConfigStore>,
    pub shutdown: Shutdown,
    pub session: Arc<SessionManager>,
}

impl Rig {
    pub async fn new(backend: Arc<MockPortBackend>, path: PathBuf) -> Self {
        Self::with_options(backend, fast_options(path)).await
    }

    pub async fn with_options(backend: Arc<MockPortBackend>, options: BridgeOptions) -> Self {
        let store = Arc::new(ConfigStore::new(options.config_path.clone()));
        store.reload().await.expect("initial load");

        let keys = Arc::new(RecordingKeyInjector::new());
        let launcher = Arc::new(RecordingLauncher::new());
        let urls = Arc::new(RecordingUrlOpener::new());
        let dispatcher = Arc::new(DispatchEngine::new(
            keys.clone(),
            launcher.clone(),
            urls.clone(),
        ));
        let shutdown = Shutdown::new();
        let session = SessionManager::new(
            backend.clone(),
            store.clone(),
            dispatcher,
            options,
            shutdown.clone(),
        );

        Self {
            backend,
            keys,
            launcher,
            urls,
            store,
            shutdown,
            session,
        }
    }

    pub async fn wait_for_state(&self, wanted: ConnectionState) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if self.session.state().await == wanted {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

/// Poll `check` until it holds or a few seconds pass
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
