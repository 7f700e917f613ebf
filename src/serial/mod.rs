pub mod interface;
pub mod mock;
pub mod protocol;
pub mod registry;

pub use interface::{LineDecoder, SerialInterface, SerialLink};
pub use protocol::DeviceEvent;
pub use registry::{PortBackend, SystemPortBackend};

use serde::{Deserialize, Serialize};

/// Default baud rate used by the KommPad firmware
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Serial port as reported by the host enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub device: String,
    pub description: String,
    pub hardware_id: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl PortDescriptor {
    /// Descriptor for a port known only by name (non-USB or test ports)
    pub fn named(device: impl Into<String>) -> Self {
        let device = device.into();
        Self {
            description: device.clone(),
            hardware_id: "n/a".to_string(),
            device,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
