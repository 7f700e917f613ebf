pub mod manager;
pub mod models;
pub mod port_monitor;
pub mod probe;
pub mod pusher;

pub use manager::SessionManager;
pub use models::*;
pub use port_monitor::DeviceMonitor;
pub use probe::{probe, IdentifiedLink, ProbeFailure};

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Device not connected")]
    NotConnected,

    #[error("No KommPad found on any serial port")]
    NoDeviceFound,

    #[error("Settings push failed: {0}")]
    PushFailed(String),

    #[error("Serial communication error: {0}")]
    SerialError(#[from] crate::serial::SerialError),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
