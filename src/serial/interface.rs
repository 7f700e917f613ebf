use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};

use super::{Result, SerialError};

/// Partial-line buffer cap; anything longer without a newline is noise.
const MAX_PENDING_BYTES: usize = 8192;

/// An open, exclusively owned connection to a serial device.
///
/// Reads never block: `read_available` returns `Ok(0)` when nothing is
/// waiting, so callers poll with a short sleep in between. Dropping the link
/// closes the underlying port.
pub trait SerialLink: Send {
    fn port_name(&self) -> &str;

    /// Discard anything already buffered on the input side
    fn clear_input(&mut self) -> Result<()>;

    /// Write `line` followed by a newline and flush
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Copy whatever bytes are currently waiting into `buffer`
    fn read_available(&mut self, buffer: &mut [u8]) -> Result<usize>;
}

/// Real serial port backed by the `serialport` crate
pub struct SerialInterface {
    port_name: String,
    port: Box<dyn SerialPort>,
}

impl SerialInterface {
    /// Open `port_name` at `baud_rate`
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => SerialError::PortNotFound(port_name.to_string()),
                _ => SerialError::ConnectionFailed(format!("{}: {}", port_name, e)),
            })?;

        log::debug!("Opened {} at {} baud", port_name, baud_rate);
        Ok(Self {
            port_name: port_name.to_string(),
            port,
        })
    }
}

impl SerialLink for SerialInterface {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        let payload = format!("{}\n", line);
        self.port.write_all(payload.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }

    fn read_available(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.port.bytes_to_read()? {
            0 => Ok(0),
            _ => match self.port.read(buffer) {
                Ok(n) => Ok(n),
                Err(ref e) if e.kind() == ErrorKind::TimedOut => Ok(0),
                Err(e) => Err(SerialError::IoError(e)),
            },
        }
    }
}

impl Drop for SerialInterface {
    fn drop(&mut self) {
        log::debug!("Closing {}", self.port_name);
    }
}

/// Splits an incoming byte stream into trimmed text lines.
///
/// Invalid UTF-8 is replaced with U+FFFD instead of failing. Bytes are kept
/// until a newline arrives so multi-byte characters split across reads
/// decode correctly.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every complete non-empty line
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n' || *b == b'\r') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }

        if self.pending.len() > MAX_PENDING_BYTES {
            let excess = self.pending.len() - MAX_PENDING_BYTES / 2;
            self.pending.drain(..excess);
            log::debug!("Trimmed {} bytes of unterminated serial input", excess);
        }

        lines
    }

    /// Decoded view of the bytes received since the last newline
    pub fn partial(&self) -> String {
        String::from_utf8_lossy(&self.pending).into_owned()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
