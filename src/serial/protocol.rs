//! KommPad line protocol.
//!
//! Everything on the wire is newline-terminated UTF-8 text. The host sends
//! `ping`, settings lines and ad-hoc commands; the device answers the ping
//! with a line containing `KommPong` and reports input as
//! `button<N> layer<K>` / `encoder<N> layer<K>`.

use crate::config::{LayerIndex, SlotKey};

/// Identification request
pub const PING: &str = "ping";

/// Substring that marks an identification response
pub const PONG_MARKER: &str = "KommPong";

/// Firmware token that advances the active layer
pub const LAYER_UP_COMMAND: &str = "leyerUp";

pub const DISPLAY_NAMES_PREFIX: &str = "DisplayNames: ";
pub const SETTINGS_PREFIX: &str = "Settings: ";

/// Input notification sent by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceEvent {
    pub slot: SlotKey,
    pub layer: LayerIndex,
}

impl DeviceEvent {
    /// Parse an inbound line; anything other than a button/encoder event is `None`
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if !(line.starts_with("button") || line.starts_with("encoder")) {
            return None;
        }

        let mut parts = line.split_whitespace();
        let slot: SlotKey = parts.next()?.parse().ok()?;
        let layer: LayerIndex = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }

        match slot {
            SlotKey::Dial(_) => None,
            _ => Some(Self { slot, layer }),
        }
    }
}

/// True when a device response identifies a KommPad
pub fn is_identification(text: &str) -> bool {
    text.contains(PONG_MARKER)
}
