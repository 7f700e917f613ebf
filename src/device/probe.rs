use std::time::{Duration, Instant};

use crate::serial::protocol::{is_identification, PING};
use crate::serial::{LineDecoder, PortBackend, PortDescriptor, SerialError, SerialLink};

/// Sleep between read checks while waiting for the identification reply
const POLL_STEP: Duration = Duration::from_millis(50);

/// Why a port was not adopted. Neither case is fatal; the caller moves on.
#[derive(Debug, thiserror::Error)]
pub enum ProbeFailure {
    #[error("{port} did not identify within {timeout:?}")]
    NotIdentified { port: String, timeout: Duration },

    #[error("I/O error probing {port}: {source}")]
    Io {
        port: String,
        #[source]
        source: SerialError,
    },
}

/// A link that answered the identification ping.
///
/// Input that arrived in the same read as the reply is kept: complete lines
/// in `backlog`, the unterminated tail inside `decoder`.
pub struct IdentifiedLink {
    pub link: Box<dyn SerialLink>,
    pub decoder: LineDecoder,
    pub backlog: Vec<String>,
}

impl IdentifiedLink {
    pub fn port_name(&self) -> &str {
        self.link.port_name()
    }
}

impl From<Box<dyn SerialLink>> for IdentifiedLink {
    fn from(link: Box<dyn SerialLink>) -> Self {
        Self {
            link,
            decoder: LineDecoder::new(),
            backlog: Vec::new(),
        }
    }
}

/// Open `port`, send `ping` and wait up to `timeout` for a `KommPong` reply.
///
/// The timeout is a wall-clock bound over the whole exchange. On success the
/// open link is returned ready for use; on any failure the link is dropped,
/// which releases the port.
pub async fn probe(
    backend: &dyn PortBackend,
    port: &PortDescriptor,
    baud_rate: u32,
    timeout: Duration,
) -> Result<IdentifiedLink, ProbeFailure> {
    let name = port.device.as_str();
    let io = |source: SerialError| ProbeFailure::Io {
        port: name.to_string(),
        source,
    };

    log::debug!("Probing {} ({})", name, port.description);
    let deadline = Instant::now() + timeout;
    let mut link = backend.open(name, baud_rate).map_err(io)?;
    link.clear_input().map_err(io)?;
    link.write_line(PING).map_err(io)?;

    let mut decoder = LineDecoder::new();
    let mut buffer = [0u8; 256];
    loop {
        let n = link.read_available(&mut buffer).map_err(io)?;
        if n > 0 {
            let mut lines = decoder.push(&buffer[..n]).into_iter();
            while let Some(line) = lines.next() {
                if is_identification(&line) {
                    log::info!("KommPad identified on {}: {}", name, line);
                    return Ok(IdentifiedLink {
                        link,
                        decoder,
                        backlog: lines.collect(),
                    });
                }
                log::debug!("{} answered: {}", name, line);
            }
            if is_identification(&decoder.partial()) {
                log::info!("KommPad identified on {}", name);
                return Ok(IdentifiedLink {
                    link,
                    decoder,
                    backlog: Vec::new(),
                });
            }
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep(POLL_STEP.min(deadline - now)).await;
    }

    log::debug!("No identification from {} within {:?}", name, timeout);
    Err(ProbeFailure::NotIdentified {
        port: name.to_string(),
        timeout,
    })
}
