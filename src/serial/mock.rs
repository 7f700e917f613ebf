//! In-memory serial ports for exercising the session layer without hardware.
//!
//! A [`MockPortBackend`] holds a set of scripted ports. Each port can be told
//! to answer `ping` (optionally after a delay), to fail reads as if it were
//! unplugged, or to refuse to open. Like a real OS port it can only be open
//! once at a time; dropping the link releases it.
//!
//! ```ignore
//! let backend = Arc::new(MockPortBackend::new());
//! backend.add_port("COM3");
//! let pad = backend.add_kommpad("COM5");
//! // ... connect a session, then
//! pad.queue_line("button1 layer0");
//! assert_eq!(pad.writes()[0], "ping");
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{PortBackend, PortDescriptor, Result, SerialError, SerialLink};

#[derive(Debug)]
struct MockDevice {
    descriptor: PortDescriptor,
    reply: Option<String>,
    reply_delay: Duration,
    pending_reply_at: Option<Instant>,
    inbound: VecDeque<u8>,
    writes: Vec<String>,
    open: bool,
    open_count: usize,
    fail_reads: bool,
    fail_writes: bool,
    fail_open: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Test-side handle to one scripted port
#[derive(Debug, Clone)]
pub struct MockPort {
    device: Arc<Mutex<MockDevice>>,
}

impl MockPort {
    pub fn name(&self) -> String {
        lock(&self.device).descriptor.device.clone()
    }

    /// Queue a line for the host to read
    pub fn queue_line(&self, line: &str) {
        let mut device = lock(&self.device);
        device.inbound.extend(line.as_bytes());
        device.inbound.push_back(b'\n');
    }

    /// Queue raw bytes for the host to read
    pub fn queue_bytes(&self, bytes: &[u8]) {
        lock(&self.device).inbound.extend(bytes);
    }

    /// Every line the host has written, in order
    pub fn writes(&self) -> Vec<String> {
        lock(&self.device).writes.clone()
    }

    pub fn clear_writes(&self) {
        lock(&self.device).writes.clear();
    }

    pub fn is_open(&self) -> bool {
        lock(&self.device).open
    }

    /// Number of successful opens so far
    pub fn open_count(&self) -> usize {
        lock(&self.device).open_count
    }

    /// Make every read fail, as an unplugged device does
    pub fn set_fail_reads(&self, fail: bool) {
        lock(&self.device).fail_reads = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.device).fail_writes = fail;
    }

    pub fn set_fail_open(&self, fail: bool) {
        lock(&self.device).fail_open = fail;
    }

    /// Answer `ping` with `reply`, or stay silent with `None`
    pub fn set_reply(&self, reply: Option<&str>) {
        lock(&self.device).reply = reply.map(str::to_string);
    }

    pub fn set_reply_delay(&self, delay: Duration) {
        lock(&self.device).reply_delay = delay;
    }
}

/// Scriptable replacement for the system port registry
#[derive(Debug, Default)]
pub struct MockPortBackend {
    ports: Mutex<Vec<MockPort>>,
    open_attempts: Mutex<Vec<String>>,
    list_error: Mutex<bool>,
}

impl MockPortBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a port that never answers
    pub fn add_port(&self, name: &str) -> MockPort {
        let port = MockPort {
            device: Arc::new(Mutex::new(MockDevice {
                descriptor: PortDescriptor::named(name),
                reply: None,
                reply_delay: Duration::ZERO,
                pending_reply_at: None,
                inbound: VecDeque::new(),
                writes: Vec::new(),
                open: false,
                open_count: 0,
                fail_reads: false,
                fail_writes: false,
                fail_open: false,
            })),
        };
        lock(&self.ports).push(port.clone());
        port
    }

    /// Add a port that identifies itself as a KommPad
    pub fn add_kommpad(&self, name: &str) -> MockPort {
        let port = self.add_port(name);
        port.set_reply(Some("KommPong"));
        port
    }

    /// Remove a port from enumeration; an open link keeps working until dropped
    pub fn remove_port(&self, name: &str) {
        lock(&self.ports).retain(|p| p.name() != name);
    }

    /// Make enumeration fail
    pub fn set_list_error(&self, fail: bool) {
        *lock(&self.list_error) = fail;
    }

    /// Port names passed to `open`, in call order
    pub fn open_attempts(&self) -> Vec<String> {
        lock(&self.open_attempts).clone()
    }

    pub fn clear_open_attempts(&self) {
        lock(&self.open_attempts).clear();
    }

    fn find(&self, name: &str) -> Option<MockPort> {
        lock(&self.ports).iter().find(|p| p.name() == name).cloned()
    }
}

impl PortBackend for MockPortBackend {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        if *lock(&self.list_error) {
            return Err(SerialError::IoError(io::Error::new(
                io::ErrorKind::Other,
                "enumeration failed",
            )));
        }
        Ok(lock(&self.ports)
            .iter()
            .map(|p| lock(&p.device).descriptor.clone())
            .collect())
    }

    fn open(&self, port_name: &str, _baud_rate: u32) -> Result<Box<dyn SerialLink>> {
        lock(&self.open_attempts).push(port_name.to_string());

        let port = self
            .find(port_name)
            .ok_or_else(|| SerialError::PortNotFound(port_name.to_string()))?;
        {
            let mut device = lock(&port.device);
            if device.fail_open {
                return Err(SerialError::ConnectionFailed(format!("{}: access denied", port_name)));
            }
            if device.open {
                return Err(SerialError::ConnectionFailed(format!("{}: port busy", port_name)));
            }
            device.open = true;
            device.open_count += 1;
        }

        Ok(Box::new(MockLink {
            port_name: port_name.to_string(),
            device: port.device,
        }))
    }
}

/// Open end of a [`MockPort`]
pub struct MockLink {
    port_name: String,
    device: Arc<Mutex<MockDevice>>,
}

impl SerialLink for MockLink {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn clear_input(&mut self) -> Result<()> {
        lock(&self.device).inbound.clear();
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        let mut device = lock(&self.device);
        if device.fail_writes {
            return Err(SerialError::IoError(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write failed",
            )));
        }
        device.writes.push(line.to_string());
        if line == super::protocol::PING && device.reply.is_some() {
            device.pending_reply_at = Some(Instant::now() + device.reply_delay);
        }
        Ok(())
    }

    fn read_available(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut device = lock(&self.device);
        if device.fail_reads {
            return Err(SerialError::IoError(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "device disconnected",
            )));
        }

        if let Some(due) = device.pending_reply_at {
            if Instant::now() >= due {
                device.pending_reply_at = None;
                if let Some(reply) = device.reply.clone() {
                    device.inbound.extend(reply.as_bytes());
                    device.inbound.push_back(b'\n');
                }
            }
        }

        let n = buffer.len().min(device.inbound.len());
        for (slot, byte) in buffer.iter_mut().zip(device.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        lock(&self.device).open = false;
    }
}
