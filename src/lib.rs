pub mod bridge;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod options;
pub mod serial;
pub mod shutdown;

use std::sync::Arc;

use anyhow::Context;

use bridge::Bridge;
use config::ConfigStore;
use dispatch::DispatchEngine;
use options::BridgeOptions;
use serial::{PortBackend, SystemPortBackend};

/// Run the bridge against real serial ports until Ctrl-C
pub async fn run(options: BridgeOptions) -> anyhow::Result<()> {
    log::info!("Using configuration {}", options.config_path.display());

    let bridge = Bridge::start(
        options,
        Arc::new(SystemPortBackend::new()),
        Arc::new(DispatchEngine::system()),
    )
    .await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    bridge.stop().await;
    Ok(())
}

/// Print every serial port and the remembered one
pub async fn list_ports(options: &BridgeOptions) -> anyhow::Result<()> {
    let ports = SystemPortBackend::new()
        .list_ports()
        .context("failed to enumerate serial ports")?;

    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in &ports {
        println!("{}", port.device);
        println!("  description:  {}", port.description);
        println!("  hardware id:  {}", port.hardware_id);
        if let Some(ref manufacturer) = port.manufacturer {
            println!("  manufacturer: {}", manufacturer);
        }
        if let Some(ref product) = port.product {
            println!("  product:      {}", product);
        }
        if let Some(ref serial) = port.serial_number {
            println!("  serial:       {}", serial);
        }
    }

    let store = ConfigStore::new(options.config_path.clone());
    let last = store
        .load()
        .await
        .with_context(|| format!("failed to read {}", store.path().display()))?
        .and_then(|doc| doc.last_port().map(str::to_string));
    match last {
        Some(port) => println!("Last known port: {}", port),
        None => println!("Last known port: none"),
    }
    Ok(())
}

/// Forget the remembered port
pub async fn clear_last_port(options: &BridgeOptions) -> anyhow::Result<()> {
    let store = ConfigStore::new(options.config_path.clone());
    if store
        .clear_last_port()
        .await
        .with_context(|| format!("failed to update {}", store.path().display()))?
    {
        println!("Cleared last known port");
    } else {
        println!("No last known port stored");
    }
    Ok(())
}
