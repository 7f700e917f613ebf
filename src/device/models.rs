use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session connection state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Probing,
    Connected { port: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}

/// Point-in-time view of the session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: ConnectionState,
    /// Changes every time a new connection is established
    pub session_id: Option<Uuid>,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_port: Option<String>,
}

impl SessionStatus {
    pub fn port(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Connected { port } => Some(port),
            _ => None,
        }
    }
}
