pub mod actions;
pub mod keys;
pub mod mock;

pub use actions::{
    ActionError, KeyInjector, LaunchTarget, LogKeyInjector, ProcessLauncher, SystemLauncher,
    SystemUrlOpener, UrlOpener,
};
pub use keys::{KeyToken, NamedKey};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::config::{
    Action, ActionBinding, Binding, FunctionAction, KommPadConfig, LayerIndex, PayloadKind,
    SlotKey,
};
use crate::serial::protocol::LAYER_UP_COMMAND;

/// What happened to one inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing mapped at that slot/layer
    NoBinding,
    /// A host action was started
    Performed,
    /// Binding found but there was nothing to do (dial, unknown media, missing payload)
    Skipped,
    /// The host capability reported an error; already logged
    Failed,
    /// The binding asks the device to do something; the caller writes this line
    DeviceCommand(String),
}

/// Turns device events into host actions.
///
/// Every capability call is guarded: errors and panics are logged and turned
/// into [`DispatchOutcome::Failed`] so the serial read loop keeps going.
pub struct DispatchEngine {
    keys: Arc<dyn KeyInjector>,
    launcher: Arc<dyn ProcessLauncher>,
    urls: Arc<dyn UrlOpener>,
}

impl DispatchEngine {
    pub fn new(
        keys: Arc<dyn KeyInjector>,
        launcher: Arc<dyn ProcessLauncher>,
        urls: Arc<dyn UrlOpener>,
    ) -> Self {
        Self {
            keys,
            launcher,
            urls,
        }
    }

    /// Engine wired to the host implementations
    pub fn system() -> Self {
        Self::new(
            Arc::new(LogKeyInjector),
            Arc::new(SystemLauncher),
            Arc::new(SystemUrlOpener),
        )
    }

    /// Run the binding at `slot`/`layer`
    pub fn dispatch(
        &self,
        config: &KommPadConfig,
        slot: SlotKey,
        layer: LayerIndex,
    ) -> DispatchOutcome {
        let binding = match config.binding(slot, layer) {
            Some(binding) => binding,
            None => {
                log::debug!("No binding for {} on {}", slot, layer);
                return DispatchOutcome::NoBinding;
            }
        };

        match binding {
            Binding::Dial(dial) => {
                log::debug!("Ignoring dial binding {} ({})", slot, dial.exe);
                DispatchOutcome::Skipped
            }
            Binding::Action(action) => {
                log::info!("{} on {} -> {}", slot, layer, action.display);
                self.run_action(slot, action)
            }
        }
    }

    fn run_action(&self, slot: SlotKey, binding: &ActionBinding) -> DispatchOutcome {
        match &binding.action {
            Action::Key { key } => {
                let mut chord: Vec<KeyToken> = binding
                    .plain_modifiers()
                    .map(|m| KeyToken::Named(keys::modifier_key(m)))
                    .collect();
                chord.push(keys::resolve_key(key));
                self.guarded("key", || self.keys.press_and_release(&chord))
            }
            Action::Macro { keys: names } => {
                let chord: Vec<KeyToken> = names.iter().map(|k| keys::resolve_key(k)).collect();
                self.guarded("macro", || self.keys.press_and_release(&chord))
            }
            Action::Media { value } => match keys::media_key(value) {
                Some(key) => self.guarded("media", || {
                    self.keys.press_and_release(&[KeyToken::Named(key)])
                }),
                None => {
                    log::warn!("Unknown media action '{}' on {}", value, slot);
                    DispatchOutcome::Skipped
                }
            },
            Action::Function(FunctionAction::LayerUp) => {
                DispatchOutcome::DeviceCommand(LAYER_UP_COMMAND.to_string())
            }
            Action::Function(FunctionAction::OpenWeb) => {
                match self.payload(slot, binding, PayloadKind::Url) {
                    Some(url) => self.guarded("open web", || self.urls.open(url)),
                    None => DispatchOutcome::Skipped,
                }
            }
            Action::Function(FunctionAction::OpenApp) => {
                match self.payload(slot, binding, PayloadKind::Exe) {
                    Some(exe) => self.guarded("open app", || self.launcher.launch(exe)),
                    None => DispatchOutcome::Skipped,
                }
            }
            Action::Function(FunctionAction::Text) => {
                match self.payload(slot, binding, PayloadKind::Text) {
                    Some(text) => self.guarded("text", || self.keys.type_text(text)),
                    None => DispatchOutcome::Skipped,
                }
            }
        }
    }

    fn payload<'a>(
        &self,
        slot: SlotKey,
        binding: &'a ActionBinding,
        kind: PayloadKind,
    ) -> Option<&'a str> {
        let value = binding.payload(kind).filter(|v| !v.trim().is_empty());
        if value.is_none() {
            log::warn!("{} binding '{}' has no {:?} payload", slot, binding.display, kind);
        }
        value
    }

    fn guarded<F>(&self, what: &str, call: F) -> DispatchOutcome
    where
        F: FnOnce() -> Result<(), ActionError>,
    {
        match catch_unwind(AssertUnwindSafe(call)) {
            Ok(Ok(())) => DispatchOutcome::Performed,
            Ok(Err(e)) => {
                log::warn!("{} action failed: {}", what, e);
                DispatchOutcome::Failed
            }
            Err(_) => {
                log::error!("{} action panicked", what);
                DispatchOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{RecordingKeyInjector, RecordingLauncher, RecordingUrlOpener};
    use super::*;
    use crate::config::ConfigDocument;

    struct Harness {
        keys: Arc<RecordingKeyInjector>,
        launcher: Arc<RecordingLauncher>,
        urls: Arc<RecordingUrlOpener>,
        engine: DispatchEngine,
    }

    fn harness_with(keys: RecordingKeyInjector, launcher: RecordingLauncher) -> Harness {
        let keys = Arc::new(keys);
        let launcher = Arc::new(launcher);
        let urls = Arc::new(RecordingUrlOpener::new());
        let engine = DispatchEngine::new(keys.clone(), launcher.clone(), urls.clone());
        Harness {
            keys,
            launcher,
            urls,
            engine,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingKeyInjector::new(), RecordingLauncher::new())
    }

    fn config(json: &str) -> KommPadConfig {
        ConfigDocument::from_json_str(json)
            .expect("valid document")
            .config()
            .clone()
    }

    const MAPPINGS: &str = r#"{ "mappings": {
        "button1": {
            "layer0": { "action": "key", "value": "c", "modifiers": ["ctrl", "shift"], "display": "Copy" },
            "layer1": { "action": "macro", "value": ["alt", "tab"], "display": "Switch" }
        },
        "button2": { "layer0": { "action": "function", "value": "Open_Web",
                                 "modifiers": ["ctrl", "url:https://example.com"], "display": "Web" } },
        "button3": { "layer0": { "action": "function", "value": "Open_App",
                                 "modifiers": ["exe:notepad.exe"], "display": "Pad" } },
        "button4": { "layer0": { "action": "function", "value": "Text",
                                 "modifiers": ["text:hello world"], "display": "Hi" } },
        "button5": { "layer0": { "action": "function", "value": "Layer_Up", "display": "Layer" } },
        "button6": { "layer0": { "action": "media", "value": "Volume_Up", "display": "Vol+" },
                     "layer1": { "action": "media", "value": "Calculator", "display": "?" } },
        "dial1":   { "layer0": { "exe": "spotify.exe", "min": 0, "max": 80, "display": "Spotify" } }
    } }"#;

    #[test]
    fn key_binding_presses_modifiers_then_key() {
        let h = harness();
        let outcome = h
            .engine
            .dispatch(&config(MAPPINGS), SlotKey::Button(1), LayerIndex(0));

        assert_eq!(outcome, DispatchOutcome::Performed);
        assert_eq!(
            h.keys.chords(),
            vec![vec![
                KeyToken::Named(NamedKey::Ctrl),
                KeyToken::Named(NamedKey::Shift),
                KeyToken::Char('c'),
            ]]
        );
    }

    #[test]
    fn resolves_only_the_requested_layer() {
        let h = harness();
        h.engine
            .dispatch(&config(MAPPINGS), SlotKey::Button(1), LayerIndex(1));

        assert_eq!(
            h.keys.chords(),
            vec![vec![KeyToken::Named(NamedKey::Alt), KeyToken::Named(NamedKey::Tab)]]
        );
    }

    #[test]
    fn absent_bindings_have_no_side_effects() {
        let h = harness();
        let cfg = config(MAPPINGS);

        assert_eq!(
            h.engine.dispatch(&cfg, SlotKey::Button(2), LayerIndex(3)),
            DispatchOutcome::NoBinding
        );
        assert_eq!(
            h.engine.dispatch(&cfg, SlotKey::Encoder(1), LayerIndex(0)),
            DispatchOutcome::NoBinding
        );
        assert!(h.keys.chords().is_empty());
        assert!(h.launcher.launched().is_empty());
        assert!(h.urls.opened().is_empty());
    }

    #[test]
    fn open_web_uses_url_payload_without_pressing_modifiers() {
        let h = harness();
        let outcome = h
            .engine
            .dispatch(&config(MAPPINGS), SlotKey::Button(2), LayerIndex(0));

        assert_eq!(outcome, DispatchOutcome::Performed);
        assert_eq!(h.urls.opened(), vec!["https://example.com".to_string()]);
        assert!(h.keys.chords().is_empty());
    }

    #[test]
    fn open_app_and_text_use_their_payloads() {
        let h = harness();
        let cfg = config(MAPPINGS);
        h.engine.dispatch(&cfg, SlotKey::Button(3), LayerIndex(0));
        h.engine.dispatch(&cfg, SlotKey::Button(4), LayerIndex(0));

        assert_eq!(h.launcher.launched(), vec!["notepad.exe".to_string()]);
        assert_eq!(h.keys.typed(), vec!["hello world".to_string()]);
    }

    #[test]
    fn layer_up_becomes_a_device_command() {
        let h = harness();
        let outcome = h
            .engine
            .dispatch(&config(MAPPINGS), SlotKey::Button(5), LayerIndex(0));
        assert_eq!(outcome, DispatchOutcome::DeviceCommand("leyerUp".to_string()));
    }

    #[test]
    fn media_taps_known_keys_and_skips_unknown() {
        let h = harness();
        let cfg = config(MAPPINGS);

        assert_eq!(
            h.engine.dispatch(&cfg, SlotKey::Button(6), LayerIndex(0)),
            DispatchOutcome::Performed
        );
        assert_eq!(
            h.engine.dispatch(&cfg, SlotKey::Button(6), LayerIndex(1)),
            DispatchOutcome::Skipped
        );
        assert_eq!(h.keys.chords(), vec![vec![KeyToken::Named(NamedKey::VolumeUp)]]);
    }

    #[test]
    fn dial_bindings_are_not_dispatched() {
        let h = harness();
        let outcome = h
            .engine
            .dispatch(&config(MAPPINGS), SlotKey::Dial(1), LayerIndex(0));
        assert_eq!(outcome, DispatchOutcome::Skipped);
        assert!(h.launcher.launched().is_empty());
    }

    #[test]
    fn capability_failures_are_contained() {
        let h = harness_with(RecordingKeyInjector::failing(), RecordingLauncher::failing());
        let cfg = config(MAPPINGS);

        assert_eq!(
            h.engine.dispatch(&cfg, SlotKey::Button(1), LayerIndex(0)),
            DispatchOutcome::Failed
        );
        assert_eq!(
            h.engine.dispatch(&cfg, SlotKey::Button(3), LayerIndex(0)),
            DispatchOutcome::Failed
        );
        // later dispatches still run
        assert_eq!(
            h.engine.dispatch(&cfg, SlotKey::Button(2), LayerIndex(0)),
            DispatchOutcome::Performed
        );
    }

    #[test]
    fn panicking_capability_is_contained() {
        struct Exploding;
        impl UrlOpener for Exploding {
            fn open(&self, _url: &str) -> Result<(), ActionError> {
                panic!("boom");
            }
        }

        let engine = DispatchEngine::new(
            Arc::new(RecordingKeyInjector::new()),
            Arc::new(RecordingLauncher::new()),
            Arc::new(Exploding),
        );
        let outcome = engine.dispatch(&config(MAPPINGS), SlotKey::Button(2), LayerIndex(0));
        assert_eq!(outcome, DispatchOutcome::Failed);
    }
}
