use serialport::SerialPortType;

use super::{PortDescriptor, Result, SerialInterface, SerialLink};

/// Host-side access to serial ports.
///
/// `list_ports` is polled every few seconds by the device monitor, so
/// implementations must stay cheap and side-effect free.
pub trait PortBackend: Send + Sync {
    /// Enumerate the ports currently present, in registry order
    fn list_ports(&self) -> Result<Vec<PortDescriptor>>;

    /// Open a port for exclusive use
    fn open(&self, port_name: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>>;
}

/// Enumerates and opens real ports through `serialport`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortBackend;

impl SystemPortBackend {
    pub fn new() -> Self {
        Self
    }
}

impl PortBackend for SystemPortBackend {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(describe_port).collect())
    }

    fn open(&self, port_name: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>> {
        let interface = SerialInterface::open(port_name, baud_rate)?;
        Ok(Box::new(interface))
    }
}

fn describe_port(port: serialport::SerialPortInfo) -> PortDescriptor {
    match port.port_type {
        SerialPortType::UsbPort(usb_info) => {
            let mut hardware_id = format!("USB VID:PID={:04X}:{:04X}", usb_info.vid, usb_info.pid);
            if let Some(ref serial) = usb_info.serial_number {
                hardware_id.push_str(&format!(" SER={}", serial));
            }
            let description = usb_info
                .product
                .clone()
                .unwrap_or_else(|| "USB Serial Device".to_string());

            PortDescriptor {
                device: port.port_name,
                description,
                hardware_id,
                vid: Some(usb_info.vid),
                pid: Some(usb_info.pid),
                manufacturer: usb_info.manufacturer,
                product: usb_info.product,
                serial_number: usb_info.serial_number,
            }
        }
        SerialPortType::BluetoothPort => PortDescriptor {
            description: "Bluetooth Serial Port".to_string(),
            ..PortDescriptor::named(port.port_name)
        },
        SerialPortType::PciPort => PortDescriptor {
            description: "PCI Serial Port".to_string(),
            ..PortDescriptor::named(port.port_name)
        },
        SerialPortType::Unknown => PortDescriptor::named(port.port_name),
    }
}
