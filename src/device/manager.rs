use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{probe, pusher, ConnectionState, DeviceError, IdentifiedLink, Result, SessionStatus};
use crate::config::ConfigStore;
use crate::dispatch::{DispatchEngine, DispatchOutcome};
use crate::options::BridgeOptions;
use crate::serial::{
    DeviceEvent, LineDecoder, PortBackend, PortDescriptor, SerialError, SerialLink,
};
use crate::shutdown::Shutdown;

/// The open link plus the generation it was installed under.
///
/// Read loops carry the generation they were spawned for and stop as soon as
/// the installed one differs.
struct ActiveLink {
    generation: u64,
    link: Box<dyn SerialLink>,
}

#[derive(Debug, Clone)]
struct SessionState {
    connection: ConnectionState,
    session_id: Option<Uuid>,
    connected_at: Option<DateTime<Utc>>,
}

impl SessionState {
    fn disconnected() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            session_id: None,
            connected_at: None,
        }
    }
}

/// Owns the single device connection.
///
/// Connect, adopt, disconnect and reconnect are serialized by one transition
/// lock, so at most one read loop is ever live. Read failures flip the state
/// to `Disconnected` without taking that lock; recovery is left to the
/// device monitor or an explicit reconnect.
pub struct SessionManager {
    backend: Arc<dyn PortBackend>,
    store: Arc<ConfigStore>,
    dispatcher: Arc<DispatchEngine>,
    options: BridgeOptions,
    shutdown: Shutdown,
    transition: Mutex<()>,
    state: RwLock<SessionState>,
    generation: AtomicU64,
    link: Mutex<Option<ActiveLink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn PortBackend>,
        store: Arc<ConfigStore>,
        dispatcher: Arc<DispatchEngine>,
        options: BridgeOptions,
        shutdown: Shutdown,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            store,
            dispatcher,
            options,
            shutdown,
            transition: Mutex::new(()),
            state: RwLock::new(SessionState::disconnected()),
            generation: AtomicU64::new(0),
            link: Mutex::new(None),
            reader: Mutex::new(None),
        })
    }

    pub fn backend(&self) -> &Arc<dyn PortBackend> {
        &self.backend
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Enumerate the host's serial ports
    pub fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        Ok(self.backend.list_ports()?)
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.connection.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.connection.is_connected()
    }

    pub async fn status(&self) -> SessionStatus {
        let state = self.state.read().await.clone();
        SessionStatus {
            state: state.connection,
            session_id: state.session_id,
            connected_at: state.connected_at,
            last_port: self.store.last_port().await,
        }
    }

    /// Find and connect to the keypad, returning its port.
    ///
    /// The last known good port is tried first; the remaining ports follow
    /// in registry order. Already being connected is not an error.
    pub async fn connect(self: &Arc<Self>) -> Result<String> {
        let _transition = self.transition.lock().await;
        self.connect_locked().await
    }

    /// Close the active connection, if any
    pub async fn disconnect(&self) {
        let _transition = self.transition.lock().await;
        self.close_link("disconnect requested").await;
    }

    pub async fn reconnect(self: &Arc<Self>) -> Result<String> {
        let _transition = self.transition.lock().await;
        self.close_link("reconnecting").await;
        self.connect_locked().await
    }

    /// Take over a link that was already identified elsewhere.
    ///
    /// Returns `false` and drops the link when a session is already live.
    pub async fn adopt_link(self: &Arc<Self>, mut identified: IdentifiedLink) -> bool {
        let _transition = self.transition.lock().await;
        if let ConnectionState::Connected { port } = self.state().await {
            log::debug!(
                "Already connected to {}, releasing {}",
                port,
                identified.port_name()
            );
            return false;
        }

        match self.attach(&mut identified.link).await {
            Ok(()) => {
                self.install(identified).await;
                true
            }
            Err(e) => {
                log::warn!("Could not adopt {}: {}", identified.port_name(), e);
                false
            }
        }
    }

    /// Re-send display names and settings over the live connection
    pub async fn push_settings(&self) -> Result<()> {
        let doc = match self.store.current().await {
            Some(doc) => doc,
            None => {
                log::info!("No configuration loaded, nothing to push");
                return Ok(());
            }
        };

        let mut guard = self.link.lock().await;
        let active = guard.as_mut().ok_or(DeviceError::NotConnected)?;
        pusher::push(active.link.as_mut(), doc.config())
            .map_err(|e| DeviceError::PushFailed(e.to_string()))
    }

    /// Write a free-form command line to the device
    pub async fn send_command(&self, command: &str) -> Result<()> {
        let mut guard = self.link.lock().await;
        let active = guard.as_mut().ok_or(DeviceError::NotConnected)?;
        active.link.write_line(command)?;
        log::debug!("Sent '{}' to {}", command, active.link.port_name());
        Ok(())
    }

    /// Disconnect and wait for the read loop to finish
    pub async fn close(&self) {
        self.disconnect().await;
        let reader = self.reader.lock().await.take();
        if let Some(handle) = reader {
            if let Err(e) = handle.await {
                log::warn!("Read loop ended abnormally: {}", e);
            }
        }
    }

    async fn connect_locked(self: &Arc<Self>) -> Result<String> {
        if let ConnectionState::Connected { port } = self.state().await {
            log::debug!("Already connected to {}", port);
            return Ok(port);
        }

        self.set_connection(ConnectionState::Probing).await;
        let ports = match self.backend.list_ports() {
            Ok(ports) => ports,
            Err(e) => {
                self.set_connection(ConnectionState::Disconnected).await;
                return Err(e.into());
            }
        };

        let last_port = self.store.last_port().await;
        let mut candidates: Vec<&PortDescriptor> = Vec::with_capacity(ports.len());
        if let Some(ref last) = last_port {
            match ports.iter().find(|p| &p.device == last) {
                Some(port) => candidates.push(port),
                None => log::debug!("Last known port {} is not present", last),
            }
        }
        candidates.extend(
            ports
                .iter()
                .filter(|p| Some(&p.device) != last_port.as_ref()),
        );

        log::info!("Scanning {} serial port(s) for a KommPad", candidates.len());
        for port in candidates {
            if self.shutdown.is_triggered() {
                break;
            }

            let mut identified = match probe(
                self.backend.as_ref(),
                port,
                self.options.baud_rate,
                self.options.probe_timeout,
            )
            .await
            {
                Ok(identified) => identified,
                Err(e) => {
                    log::debug!("Skipping {}: {}", port.device, e);
                    continue;
                }
            };

            match self.attach(&mut identified.link).await {
                Ok(()) => {
                    self.install(identified).await;
                    return Ok(port.device.clone());
                }
                Err(e) => log::warn!("Dropping {}: {}", port.device, e),
            }
        }

        self.set_connection(ConnectionState::Disconnected).await;
        log::info!("No KommPad found");
        Err(DeviceError::NoDeviceFound)
    }

    /// Push settings and remember the port before the link goes live
    async fn attach(&self, link: &mut Box<dyn SerialLink>) -> Result<()> {
        match self.store.current().await {
            Some(doc) => pusher::push(link.as_mut(), doc.config())
                .map_err(|e| DeviceError::PushFailed(e.to_string()))?,
            None => log::info!("No configuration yet, skipping settings push"),
        }

        let port = link.port_name().to_string();
        if let Err(e) = self.store.record_last_port(&port).await {
            log::warn!("Could not remember {} as last port: {}", port, e);
        }
        Ok(())
    }

    async fn install(self: &Arc<Self>, identified: IdentifiedLink) {
        let IdentifiedLink {
            link,
            decoder,
            backlog,
        } = identified;
        let port = link.port_name().to_string();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        *self.link.lock().await = Some(ActiveLink { generation, link });
        *self.state.write().await = SessionState {
            connection: ConnectionState::Connected { port: port.clone() },
            session_id: Some(Uuid::new_v4()),
            connected_at: Some(Utc::now()),
        };
        log::info!("Connected to KommPad on {}", port);

        let handle = tokio::spawn(Arc::clone(self).read_loop(generation, decoder, backlog));
        let previous = self.reader.lock().await.replace(handle);
        // a previous loop has already seen its generation retire
        drop(previous);
    }

    async fn close_link(&self, reason: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let closed = self.link.lock().await.take();
        self.set_connection(ConnectionState::Disconnected).await;

        if let Some(active) = closed {
            log::info!("Closed {} ({})", active.link.port_name(), reason);
        }
    }

    /// Abandon the link of `generation` after an I/O error
    async fn mark_failed(&self, generation: u64, error: &SerialError) {
        let mut guard = self.link.lock().await;
        if guard.as_ref().map(|a| a.generation) != Some(generation) {
            return;
        }
        let failed = guard.take();
        // still under the link lock, so a link installed after this one keeps its state
        self.set_connection(ConnectionState::Disconnected).await;
        drop(guard);

        if let Some(active) = failed {
            log::warn!(
                "Lost connection to {}: {}",
                active.link.port_name(),
                error
            );
        }
    }

    async fn set_connection(&self, connection: ConnectionState) {
        let mut state = self.state.write().await;
        if connection.is_connected() {
            state.connection = connection;
        } else {
            *state = SessionState {
                connection,
                ..SessionState::disconnected()
            };
        }
    }

    async fn read_loop(
        self: Arc<Self>,
        generation: u64,
        mut decoder: LineDecoder,
        backlog: Vec<String>,
    ) {
        let mut buffer = [0u8; 512];
        for line in backlog {
            self.handle_line(generation, &line).await;
        }

        loop {
            let read = {
                let mut guard = self.link.lock().await;
                match guard.as_mut() {
                    Some(active) if active.generation == generation => {
                        active.link.read_available(&mut buffer)
                    }
                    _ => break,
                }
            };

            match read {
                Ok(0) => {}
                Ok(n) => {
                    for line in decoder.push(&buffer[..n]) {
                        self.handle_line(generation, &line).await;
                    }
                }
                Err(e) => {
                    self.mark_failed(generation, &e).await;
                    break;
                }
            }

            if !self.shutdown.sleep(self.options.read_poll_interval).await {
                break;
            }
        }

        log::debug!("Read loop {} finished", generation);
    }

    async fn handle_line(&self, generation: u64, line: &str) {
        let event = match DeviceEvent::parse(line) {
            Some(event) => event,
            None => {
                log::debug!("Device: {}", line);
                return;
            }
        };

        self.store.set_active_layer(event.layer);
        let doc = match self.store.current().await {
            Some(doc) => doc,
            None => {
                log::debug!("{} {} with no configuration loaded", event.slot, event.layer);
                return;
            }
        };

        if let DispatchOutcome::DeviceCommand(command) =
            self.dispatcher.dispatch(doc.config(), event.slot, event.layer)
        {
            let mut guard = self.link.lock().await;
            let written = match guard.as_mut() {
                Some(active) if active.generation == generation => active.link.write_line(&command),
                _ => return,
            };
            drop(guard);

            if let Err(e) = written {
                self.mark_failed(generation, &e).await;
            }
        }
    }
}
