mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, fast_options, temp_config_path, write_config};
use kommpad_bridge_lib::bridge::Bridge;
use kommpad_bridge_lib::dispatch::mock::{RecordingKeyInjector, RecordingLauncher, RecordingUrlOpener};
use kommpad_bridge_lib::dispatch::DispatchEngine;
use kommpad_bridge_lib::serial::mock::MockPortBackend;

#[tokio::test]
async fn bridge_connects_dispatches_and_shuts_down() {
    let backend = Arc::new(MockPortBackend::new());
    let pad = backend.add_kommpad("COM5");
    let path = temp_config_path();
    write_config(
        &path,
        r#"{ "mappings": { "button3": { "layer0": {
            "action": "function", "value": "Open_App", "modifiers": ["exe:notepad.exe"], "display": "Pad" } } } }"#,
        0,
    );

    let launcher = Arc::new(RecordingLauncher::new());
    let dispatcher = Arc::new(DispatchEngine::new(
        Arc::new(RecordingKeyInjector::new()),
        launcher.clone(),
        Arc::new(RecordingUrlOpener::new()),
    ));
    let bridge = Bridge::start(fast_options(path), backend, dispatcher).await;
    assert!(bridge.session().is_connected().await);

    pad.queue_line("button3 layer0");
    assert!(eventually(|| launcher.launched() == vec!["notepad.exe".to_string()]).await);

    tokio::time::timeout(Duration::from_secs(3), bridge.stop())
        .await
        .expect("bridge stopped");
    assert!(!pad.is_open());
}

#[tokio::test]
async fn bridge_starts_without_device_or_document() {
    let backend = Arc::new(MockPortBackend::new());
    let dispatcher = Arc::new(DispatchEngine::new(
        Arc::new(RecordingKeyInjector::new()),
        Arc::new(RecordingLauncher::new()),
        Arc::new(RecordingUrlOpener::new()),
    ));
    let bridge = Bridge::start(fast_options(temp_config_path()), backend, dispatcher).await;

    assert!(!bridge.session().is_connected().await);
    assert!(bridge.session().status().await.last_port.is_none());
    tokio::time::timeout(Duration::from_secs(3), bridge.stop())
        .await
        .expect("bridge stopped");
}
