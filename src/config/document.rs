use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ConfigError, Result};

/// Number of layer slots the device supports
pub const MAX_LAYERS: u8 = 4;

/// Buttons in the 3x2 key matrix
pub const MATRIX_BUTTONS: u8 = 6;

const DIALS: u8 = 3;
const ENCODERS: u8 = 3;

/// Encoder turn direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rotation {
    Clockwise,
    CounterClockwise,
}

/// Fixed identifier of a physical input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SlotKey {
    Button(u8),
    Dial(u8),
    Encoder(u8),
    EncoderTurn(u8, Rotation),
}

impl SlotKey {
    pub fn is_dial(&self) -> bool {
        matches!(self, SlotKey::Dial(_))
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Button(n) => write!(f, "button{}", n),
            SlotKey::Dial(n) => write!(f, "dial{}", n),
            SlotKey::Encoder(n) => write!(f, "encoder{}", n),
            SlotKey::EncoderTurn(n, Rotation::Clockwise) => write!(f, "encoder{}_cw", n),
            SlotKey::EncoderTurn(n, Rotation::CounterClockwise) => write!(f, "encoder{}_ccw", n),
        }
    }
}

/// Plain decimal only: `+1`, `01` and the like are not slot numbers
fn parse_decimal(digits: &str) -> Option<u8> {
    let n: u8 = digits.parse().ok()?;
    (n.to_string() == digits).then_some(n)
}

fn parse_index(digits: &str, max: u8) -> Option<u8> {
    let n = parse_decimal(digits)?;
    (1..=max).contains(&n).then_some(n)
}

impl FromStr for SlotKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || format!("unknown slot key '{}'", s);

        if let Some(rest) = s.strip_prefix("button") {
            return parse_index(rest, MATRIX_BUTTONS).map(SlotKey::Button).ok_or_else(invalid);
        }
        if let Some(rest) = s.strip_prefix("dial") {
            return parse_index(rest, DIALS).map(SlotKey::Dial).ok_or_else(invalid);
        }
        if let Some(rest) = s.strip_prefix("encoder") {
            let (digits, rotation) = if let Some(d) = rest.strip_suffix("_ccw") {
                (d, Some(Rotation::CounterClockwise))
            } else if let Some(d) = rest.strip_suffix("_cw") {
                (d, Some(Rotation::Clockwise))
            } else {
                (rest, None)
            };
            let n = parse_index(digits, ENCODERS).ok_or_else(invalid)?;
            return Ok(match rotation {
                Some(r) => SlotKey::EncoderTurn(n, r),
                None => SlotKey::Encoder(n),
            });
        }
        Err(invalid())
    }
}

/// Zero-based layer number, written `layer<K>` on disk and on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct LayerIndex(pub u8);

impl fmt::Display for LayerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer{}", self.0)
    }
}

impl FromStr for LayerIndex {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.strip_prefix("layer")
            .and_then(parse_decimal)
            .filter(|n| *n < MAX_LAYERS)
            .map(LayerIndex)
            .ok_or_else(|| format!("unknown layer key '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlainModifier {
    Ctrl,
    Alt,
    Shift,
    Win,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Exe,
    Url,
    Text,
}

/// One entry of a binding's `modifiers` list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
    Plain(PlainModifier),
    Payload { kind: PayloadKind, value: String },
    Unknown(String),
}

impl Modifier {
    pub fn parse(token: &str) -> Self {
        for (prefix, kind) in [("exe:", PayloadKind::Exe), ("url:", PayloadKind::Url), ("text:", PayloadKind::Text)] {
            if let Some(value) = token.strip_prefix(prefix) {
                return Modifier::Payload {
                    kind,
                    value: value.to_string(),
                };
            }
        }

        match token.trim().to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Modifier::Plain(PlainModifier::Ctrl),
            "alt" | "option" => Modifier::Plain(PlainModifier::Alt),
            "shift" => Modifier::Plain(PlainModifier::Shift),
            "win" | "super" | "meta" | "cmd" => Modifier::Plain(PlainModifier::Win),
            _ => Modifier::Unknown(token.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionAction {
    LayerUp,
    OpenWeb,
    OpenApp,
    Text,
}

/// Host action decoded from `action` + `value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Key { key: String },
    Macro { keys: Vec<String> },
    Media { value: String },
    Function(FunctionAction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBinding {
    pub action: Action,
    pub modifiers: Vec<Modifier>,
    pub display: String,
}

impl ActionBinding {
    /// Keyboard modifiers in declaration order
    pub fn plain_modifiers(&self) -> impl Iterator<Item = PlainModifier> + '_ {
        self.modifiers.iter().filter_map(|m| match m {
            Modifier::Plain(p) => Some(*p),
            _ => None,
        })
    }

    /// The payload token of the given kind, if any
    pub fn payload(&self, kind: PayloadKind) -> Option<&str> {
        self.modifiers.iter().find_map(|m| match m {
            Modifier::Payload { kind: k, value } if *k == kind => Some(value.as_str()),
            _ => None,
        })
    }
}

/// Per-application volume range attached to a dial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialBinding {
    pub exe: String,
    pub min: u8,
    pub max: u8,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Action(ActionBinding),
    Dial(DialBinding),
}

impl Binding {
    pub fn display(&self) -> &str {
        match self {
            Binding::Action(b) => &b.display,
            Binding::Dial(d) => &d.display,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("unknown action type '{0}'")]
    UnknownAction(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("missing action type")]
    MissingAction,

    #[error("missing value")]
    MissingValue,

    #[error("{0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Deserialize)]
struct RawBinding {
    action: Option<String>,
    value: Option<OneOrMany>,
    #[serde(default)]
    modifiers: Option<OneOrMany>,
    #[serde(default)]
    modifier: Option<OneOrMany>,
    #[serde(default)]
    display: String,
    exe: Option<String>,
    min: Option<i64>,
    max: Option<i64>,
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != ' ')
        .collect::<String>()
        .to_ascii_lowercase()
}

impl Binding {
    /// Decode one binding; dial slots use the dial shape
    pub fn decode(slot: SlotKey, value: &Value) -> std::result::Result<Self, BindingError> {
        let raw: RawBinding = serde_json::from_value(value.clone())?;

        if slot.is_dial() {
            return Ok(Binding::Dial(DialBinding {
                exe: raw.exe.unwrap_or_default(),
                min: raw.min.unwrap_or(0).clamp(0, 100) as u8,
                max: raw.max.unwrap_or(100).clamp(0, 100) as u8,
                display: raw.display,
            }));
        }

        let kind = raw.action.ok_or(BindingError::MissingAction)?;
        let values = raw.value.map(OneOrMany::into_vec).unwrap_or_default();
        let first = || values.first().cloned().ok_or(BindingError::MissingValue);

        let action = match kind.as_str() {
            "key" => Action::Key { key: first()? },
            "macro" => {
                let keys: Vec<String> = if values.len() == 1 {
                    values[0].split('+').map(|k| k.trim().to_string()).collect()
                } else {
                    values.clone()
                };
                let keys: Vec<String> = keys.into_iter().filter(|k| !k.is_empty()).collect();
                if keys.is_empty() {
                    return Err(BindingError::MissingValue);
                }
                Action::Macro { keys }
            }
            "media" => Action::Media { value: first()? },
            "function" => {
                let name = first()?;
                match normalize_name(&name).as_str() {
                    "layerup" => Action::Function(FunctionAction::LayerUp),
                    "openweb" => Action::Function(FunctionAction::OpenWeb),
                    "openapp" => Action::Function(FunctionAction::OpenApp),
                    "text" => Action::Function(FunctionAction::Text),
                    "volumeup" | "volumedown" | "mute" => Action::Media { value: name },
                    _ => return Err(BindingError::UnknownFunction(name)),
                }
            }
            other => return Err(BindingError::UnknownAction(other.to_string())),
        };

        let mut modifiers = Vec::new();
        let mut seen_payload = false;
        for token in raw.modifiers.or(raw.modifier).map(OneOrMany::into_vec).unwrap_or_default() {
            let modifier = Modifier::parse(&token);
            if let Modifier::Payload { .. } = modifier {
                if seen_payload {
                    log::warn!("Binding {} has more than one payload token, ignoring '{}'", slot, token);
                    continue;
                }
                seen_payload = true;
            }
            modifiers.push(modifier);
        }

        Ok(Binding::Action(ActionBinding {
            action,
            modifiers,
            display: raw.display,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Solid,
    Breathing,
    Rainbow,
    Wave,
    Reactive,
}

impl ColorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorMode::Solid => "solid",
            ColorMode::Breathing => "breathing",
            ColorMode::Rainbow => "rainbow",
            ColorMode::Wave => "wave",
            ColorMode::Reactive => "reactive",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "solid" => Some(ColorMode::Solid),
            "breathing" => Some(ColorMode::Breathing),
            "rainbow" => Some(ColorMode::Rainbow),
            "wave" => Some(ColorMode::Wave),
            "reactive" => Some(ColorMode::Reactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceSection {
    pub last_port: Option<String>,
    pub accent_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub max_layers: u8,
    pub layer_names: [String; MAX_LAYERS as usize],
    pub brightness: u8,
    pub color_mode: ColorMode,
    pub colors: Vec<String>,
    pub idle_timeout: u64,
    pub device_monitoring_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_layers: MAX_LAYERS,
            layer_names: Default::default(),
            brightness: 75,
            color_mode: ColorMode::Solid,
            colors: Vec::new(),
            idle_timeout: 0,
            device_monitoring_enabled: true,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawDevice {
    #[serde(rename = "COM")]
    com: Option<String>,
    #[serde(rename = "lastPort")]
    last_port: Option<String>,
    #[serde(rename = "AccentColor")]
    accent_color: Option<String>,
    #[serde(rename = "accentColor")]
    accent_color_lower: Option<String>,
}

#[derive(Deserialize)]
struct RawLayer {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    #[serde(rename = "MaxLayers")]
    max_layers: Option<i64>,
    #[serde(rename = "maxLayers")]
    max_layers_lower: Option<i64>,
    #[serde(rename = "Layers")]
    layers: Option<BTreeMap<String, RawLayer>>,
    #[serde(rename = "layerNames")]
    layer_names: Option<Vec<String>>,
    #[serde(rename = "Brightness")]
    brightness: Option<i64>,
    #[serde(rename = "brightness")]
    brightness_lower: Option<i64>,
    #[serde(rename = "ColorMode")]
    color_mode: Option<String>,
    #[serde(rename = "colorMode")]
    color_mode_lower: Option<String>,
    #[serde(rename = "Colors")]
    colors: Option<Vec<String>>,
    #[serde(rename = "colors")]
    colors_lower: Option<Vec<String>>,
    #[serde(rename = "idleTimeout")]
    idle_timeout: Option<u64>,
    #[serde(rename = "IdleTimeout")]
    idle_timeout_upper: Option<u64>,
    #[serde(rename = "deviceMonitoringEnabled")]
    device_monitoring_enabled: Option<bool>,
    #[serde(rename = "DeviceMonitoringEnabled")]
    device_monitoring_enabled_upper: Option<bool>,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Self {
        let defaults = Settings::default();

        let max_layers = match raw.max_layers.or(raw.max_layers_lower) {
            Some(n) if (1..=MAX_LAYERS as i64).contains(&n) => n as u8,
            Some(n) => {
                log::warn!("MaxLayers {} out of range, clamping", n);
                n.clamp(1, MAX_LAYERS as i64) as u8
            }
            None => defaults.max_layers,
        };

        let mut layer_names: [String; MAX_LAYERS as usize] = Default::default();
        if let Some(names) = raw.layer_names {
            for (slot, name) in layer_names.iter_mut().zip(names) {
                *slot = name;
            }
        }
        if let Some(layers) = raw.layers {
            for (key, layer) in layers {
                if let Ok(LayerIndex(i)) = key.parse::<LayerIndex>() {
                    layer_names[i as usize] = layer.name;
                }
            }
        }

        let color_mode = match raw.color_mode.or(raw.color_mode_lower) {
            Some(mode) => ColorMode::parse(&mode).unwrap_or_else(|| {
                log::warn!("Unknown color mode '{}', using solid", mode);
                ColorMode::Solid
            }),
            None => defaults.color_mode,
        };

        Self {
            max_layers,
            layer_names,
            brightness: raw
                .brightness
                .or(raw.brightness_lower)
                .map(|b| b.clamp(0, 100) as u8)
                .unwrap_or(defaults.brightness),
            color_mode,
            colors: raw.colors.or(raw.colors_lower).unwrap_or_default(),
            idle_timeout: raw
                .idle_timeout
                .or(raw.idle_timeout_upper)
                .unwrap_or(defaults.idle_timeout),
            device_monitoring_enabled: raw
                .device_monitoring_enabled
                .or(raw.device_monitoring_enabled_upper)
                .unwrap_or(defaults.device_monitoring_enabled),
        }
    }
}

pub type Mappings = BTreeMap<SlotKey, BTreeMap<LayerIndex, Binding>>;

/// Decoded view of the configuration document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KommPadConfig {
    pub device: DeviceSection,
    pub settings: Settings,
    pub mappings: Mappings,
}

impl KommPadConfig {
    fn from_root(root: &Map<String, Value>) -> Result<Self> {
        let device: RawDevice = match root.get("device") {
            Some(v) => serde_json::from_value(v.clone())?,
            None => RawDevice::default(),
        };
        let raw_settings: RawSettings = match root.get("settings") {
            Some(v) => serde_json::from_value(v.clone())?,
            None => RawSettings::default(),
        };
        let settings = Settings::from_raw(raw_settings);

        let mappings = match root.get("mappings") {
            Some(Value::Object(slots)) => decode_mappings(slots, settings.max_layers),
            Some(Value::Null) | None => Mappings::new(),
            Some(_) => return Err(ConfigError::InvalidShape("'mappings' must be an object".to_string())),
        };

        Ok(Self {
            device: DeviceSection {
                last_port: device
                    .com
                    .or(device.last_port)
                    .filter(|p| !p.is_empty()),
                accent_color: device.accent_color.or(device.accent_color_lower),
            },
            settings,
            mappings,
        })
    }

    /// Binding at `slot` on `layer`, if configured
    pub fn binding(&self, slot: SlotKey, layer: LayerIndex) -> Option<&Binding> {
        self.mappings.get(&slot)?.get(&layer)
    }
}

fn decode_mappings(slots: &Map<String, Value>, max_layers: u8) -> Mappings {
    let mut mappings = Mappings::new();

    for (slot_key, layers) in slots {
        let slot: SlotKey = match slot_key.parse() {
            Ok(slot) => slot,
            Err(e) => {
                log::warn!("Skipping mapping: {}", e);
                continue;
            }
        };
        let Value::Object(layers) = layers else {
            log::warn!("Skipping mapping {}: expected an object of layers", slot);
            continue;
        };

        let mut decoded = BTreeMap::new();
        for (layer_key, value) in layers {
            let layer: LayerIndex = match layer_key.parse() {
                Ok(layer) => layer,
                Err(e) => {
                    log::warn!("Skipping {}: {}", slot, e);
                    continue;
                }
            };
            if layer.0 >= max_layers {
                log::debug!("Ignoring {} {} beyond MaxLayers {}", slot, layer, max_layers);
                continue;
            }
            match Binding::decode(slot, value) {
                Ok(binding) => {
                    decoded.insert(layer, binding);
                }
                Err(e) => log::warn!("Skipping binding {} {}: {}", slot, layer, e),
            }
        }

        if !decoded.is_empty() {
            mappings.insert(slot, decoded);
        }
    }

    mappings
}

/// The persisted JSON document together with its decoded view.
///
/// The raw tree is what gets written back, so keys this crate does not
/// understand survive a load/save cycle unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    raw: Map<String, Value>,
    config: KommPadConfig,
}

impl ConfigDocument {
    pub fn empty() -> Self {
        Self {
            raw: Map::new(),
            config: KommPadConfig::default(),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(raw) = value else {
            return Err(ConfigError::InvalidShape("top level must be an object".to_string()));
        };
        let config = KommPadConfig::from_root(&raw)?;
        Ok(Self { raw, config })
    }

    /// Pretty-printed JSON with two-space indentation
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.raw)?)
    }

    pub fn config(&self) -> &KommPadConfig {
        &self.config
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    pub fn last_port(&self) -> Option<&str> {
        self.config.device.last_port.as_deref()
    }

    /// Record `port` as the last known good port; false when it was already stored
    pub fn set_last_port(&mut self, port: &str) -> bool {
        if self.last_port() == Some(port) {
            return false;
        }

        let device = self
            .raw
            .entry("device")
            .or_insert_with(|| Value::Object(Map::new()));
        if !device.is_object() {
            *device = Value::Object(Map::new());
        }
        if let Value::Object(device) = device {
            let key = if device.contains_key("lastPort") && !device.contains_key("COM") {
                "lastPort"
            } else {
                "COM"
            };
            device.insert(key.to_string(), Value::String(port.to_string()));
        }

        self.config.device.last_port = Some(port.to_string());
        true
    }

    /// Forget the last known good port; false when none was stored
    pub fn clear_last_port(&mut self) -> bool {
        let mut removed = false;
        if let Some(Value::Object(device)) = self.raw.get_mut("device") {
            removed |= device.remove("COM").is_some();
            removed |= device.remove("lastPort").is_some();
        }
        self.config.device.last_port = None;
        removed
    }
}
