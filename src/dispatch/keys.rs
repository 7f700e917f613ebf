use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::config::PlainModifier;

/// Non-printable keys the injector understands by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Ctrl,
    Alt,
    Shift,
    Win,
    Enter,
    Escape,
    Tab,
    Space,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    PrintScreen,
    ScrollLock,
    Pause,
    CapsLock,
    NumLock,
    /// F1..=F12
    Function(u8),
    /// Numpad 0..=9
    Numpad(u8),
    NumpadPlus,
    NumpadMinus,
    NumpadMultiply,
    NumpadDivide,
    NumpadEnter,
    NumpadDecimal,
    VolumeUp,
    VolumeDown,
    VolumeMute,
    MediaPlayPause,
    MediaNext,
    MediaPrevious,
    MediaStop,
}

/// Abstract key handed to the key injection service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyToken {
    Named(NamedKey),
    Char(char),
    /// Unrecognised multi-character name, passed through as-is
    Literal(String),
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != ' ' && *c != '-')
        .collect::<String>()
        .to_ascii_lowercase()
}

static KEY_NAMES: Lazy<HashMap<String, NamedKey>> = Lazy::new(|| {
    use NamedKey::*;

    let mut names: Vec<(&str, NamedKey)> = vec![
        ("ctrl", Ctrl),
        ("control", Ctrl),
        ("alt", Alt),
        ("shift", Shift),
        ("win", Win),
        ("super", Win),
        ("cmd", Win),
        ("enter", Enter),
        ("return", Enter),
        ("esc", Escape),
        ("escape", Escape),
        ("tab", Tab),
        ("space", Space),
        ("backspace", Backspace),
        ("delete", Delete),
        ("del", Delete),
        ("insert", Insert),
        ("home", Home),
        ("end", End),
        ("pageup", PageUp),
        ("pagedown", PageDown),
        ("up", Up),
        ("down", Down),
        ("left", Left),
        ("right", Right),
        ("printscreen", PrintScreen),
        ("scrolllock", ScrollLock),
        ("pause", Pause),
        ("capslock", CapsLock),
        ("numlock", NumLock),
        ("numpadplus", NumpadPlus),
        ("numpadminus", NumpadMinus),
        ("numpadmultiply", NumpadMultiply),
        ("numpaddivide", NumpadDivide),
        ("numpadenter", NumpadEnter),
        ("numpaddecimal", NumpadDecimal),
    ];
    names.extend(MEDIA_NAMES.iter().copied());

    let mut table: HashMap<String, NamedKey> =
        names.into_iter().map(|(n, k)| (n.to_string(), k)).collect();
    for n in 1..=12u8 {
        table.insert(format!("f{}", n), Function(n));
    }
    for n in 0..=9u8 {
        table.insert(format!("numpad{}", n), Numpad(n));
    }
    table
});

const MEDIA_NAMES: &[(&str, NamedKey)] = &[
    ("volumeup", NamedKey::VolumeUp),
    ("mediavolumeup", NamedKey::VolumeUp),
    ("volumedown", NamedKey::VolumeDown),
    ("mediavolumedown", NamedKey::VolumeDown),
    ("volumemute", NamedKey::VolumeMute),
    ("mediavolumemute", NamedKey::VolumeMute),
    ("mute", NamedKey::VolumeMute),
    ("mediaplaypause", NamedKey::MediaPlayPause),
    ("playpause", NamedKey::MediaPlayPause),
    ("medianext", NamedKey::MediaNext),
    ("nexttrack", NamedKey::MediaNext),
    ("mediaprevious", NamedKey::MediaPrevious),
    ("previoustrack", NamedKey::MediaPrevious),
    ("mediastop", NamedKey::MediaStop),
];

/// Map a configured key name to a token; unknown names pass through
pub fn resolve_key(name: &str) -> KeyToken {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return KeyToken::Char(c);
    }

    match KEY_NAMES.get(&normalize(name)) {
        Some(key) => KeyToken::Named(*key),
        None => KeyToken::Literal(name.to_string()),
    }
}

/// Media action for a `media` binding value
pub fn media_key(value: &str) -> Option<NamedKey> {
    let wanted = normalize(value);
    MEDIA_NAMES
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, key)| *key)
}

pub fn modifier_key(modifier: PlainModifier) -> NamedKey {
    match modifier {
        PlainModifier::Ctrl => NamedKey::Ctrl,
        PlainModifier::Alt => NamedKey::Alt,
        PlainModifier::Shift => NamedKey::Shift,
        PlainModifier::Win => NamedKey::Win,
    }
}
