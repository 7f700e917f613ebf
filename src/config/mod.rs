pub mod document;
pub mod store;
pub mod watcher;

pub use document::{
    Action, ActionBinding, Binding, BindingError, ColorMode, ConfigDocument, DeviceSection,
    DialBinding, FunctionAction, KommPadConfig, LayerIndex, Modifier, PayloadKind,
    PlainModifier, Rotation, Settings, SlotKey, MATRIX_BUTTONS, MAX_LAYERS,
};
pub use store::ConfigStore;
pub use watcher::{ConfigWatcher, ReloadOutcome};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidShape(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
