//! Recording stand-ins for the host capabilities.
//!
//! Every call is pushed into a `Mutex<Vec<...>>` so tests can assert on
//! exactly what the dispatch engine asked for and in what order. Setting
//! `should_fail` makes every call return an error instead.

use std::sync::Mutex;

use super::actions::{ActionError, KeyInjector, ProcessLauncher, UrlOpener};
use super::keys::KeyToken;

#[derive(Debug, Default)]
pub struct RecordingKeyInjector {
    /// One entry per `press_and_release` call
    pub chords: Mutex<Vec<Vec<KeyToken>>>,
    /// One entry per `type_text` call
    pub typed: Mutex<Vec<String>>,
    pub should_fail: bool,
}

impl RecordingKeyInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn chords(&self) -> Vec<Vec<KeyToken>> {
        self.chords.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn typed(&self) -> Vec<String> {
        self.typed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl KeyInjector for RecordingKeyInjector {
    fn press_and_release(&self, keys: &[KeyToken]) -> Result<(), ActionError> {
        if self.should_fail {
            return Err(ActionError::Injection("mock failure".into()));
        }
        self.chords
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(keys.to_vec());
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), ActionError> {
        if self.should_fail {
            return Err(ActionError::Injection("mock failure".into()));
        }
        self.typed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingLauncher {
    pub launched: Mutex<Vec<String>>,
    pub should_fail: bool,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ProcessLauncher for RecordingLauncher {
    fn launch(&self, command: &str) -> Result<(), ActionError> {
        if self.should_fail {
            return Err(ActionError::Launch {
                target: command.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock failure"),
            });
        }
        self.launched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingUrlOpener {
    pub opened: Mutex<Vec<String>>,
}

impl RecordingUrlOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl UrlOpener for RecordingUrlOpener {
    fn open(&self, url: &str) -> Result<(), ActionError> {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
        Ok(())
    }
}
