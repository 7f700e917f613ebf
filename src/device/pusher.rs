//! Builds and sends the two settings lines the firmware expects after connect.

use crate::config::{KommPadConfig, LayerIndex, SlotKey, MATRIX_BUTTONS, MAX_LAYERS};
use crate::serial::protocol::{DISPLAY_NAMES_PREFIX, SETTINGS_PREFIX};
use crate::serial::{self, SerialLink};

const NAME_SEPARATORS: &[char] = &['~', '|'];
const SETTINGS_SEPARATORS: &[char] = &[',', '~'];

/// Line breaks and the line's own separators become spaces so one field
/// can never spill into the next, or onto a new line.
fn field(value: &str, separators: &[char]) -> String {
    value
        .chars()
        .map(|c| {
            if c == '\r' || c == '\n' || separators.contains(&c) {
                ' '
            } else {
                c
            }
        })
        .collect()
}

/// `DisplayNames: a~b~c~d~e~f|...` with all four layers present
pub fn display_names_line(config: &KommPadConfig) -> String {
    let layers: Vec<String> = (0..MAX_LAYERS)
        .map(|layer| {
            (1..=MATRIX_BUTTONS)
                .map(|button| {
                    config
                        .binding(SlotKey::Button(button), LayerIndex(layer))
                        .map(|b| field(b.display(), NAME_SEPARATORS))
                        .unwrap_or_default()
                })
                .collect::<Vec<_>>()
                .join("~")
        })
        .collect();

    format!("{}{}", DISPLAY_NAMES_PREFIX, layers.join("|"))
}

/// `Settings: maxLayers,names,brightness,colorMode,colors,idleTimeout`
pub fn settings_line(config: &KommPadConfig) -> String {
    let settings = &config.settings;
    let list = |values: &[String]| {
        values
            .iter()
            .map(|v| field(v, SETTINGS_SEPARATORS))
            .collect::<Vec<_>>()
            .join("~")
    };
    format!(
        "{}{},{},{},{},{},{}",
        SETTINGS_PREFIX,
        settings.max_layers,
        list(&settings.layer_names),
        settings.brightness,
        settings.color_mode.as_str(),
        list(&settings.colors),
        settings.idle_timeout
    )
}

pub fn build_lines(config: &KommPadConfig) -> [String; 2] {
    [display_names_line(config), settings_line(config)]
}

/// Write both lines, display names first
pub fn push(link: &mut dyn SerialLink, config: &KommPadConfig) -> serial::Result<()> {
    let [names, settings] = build_lines(config);
    link.write_line(&names)?;
    link.write_line(&settings)?;
    log::info!("Pushed settings to {}: {}", link.port_name(), settings);
    log::debug!("{}", names);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigDocument;

    fn config(json: &str) -> KommPadConfig {
        ConfigDocument::from_json_str(json).unwrap().config().clone()
    }

    #[test]
    fn defaults_render_four_empty_layers() {
        let [names, settings] = build_lines(&KommPadConfig::default());
        assert_eq!(names, "DisplayNames: ~~~~~|~~~~~|~~~~~|~~~~~");
        assert_eq!(settings, "Settings: 4,~~~,75,solid,,0");
    }

    #[test]
    fn renders_gui_document() {
        let cfg = config(
            r##"{
                "settings": {
                    "MaxLayers": 2,
                    "Layers": { "layer0": { "name": "Main" }, "layer1": { "name": "Media" } },
                    "Brightness": 40,
                    "ColorMode": "breathing",
                    "Colors": ["#ff0000", "#00ff00"],
                    "idleTimeout": 300
                },
                "mappings": {
                    "button1": { "layer0": { "action": "key", "value": "a", "display": "A" } },
                    "button6": { "layer1": { "action": "media", "value": "Volume_Up", "display": "Vol+" } },
                    "button2": { "layer3": { "action": "key", "value": "z", "display": "Hidden" } }
                }
            }"##,
        );

        let [names, settings] = build_lines(&cfg);
        assert_eq!(names, "DisplayNames: A~~~~~|~~~~~Vol+|~~~~~|~~~~~");
        assert_eq!(settings, "Settings: 2,Main~Media~~,40,breathing,#ff0000~#00ff00,300");
    }

    #[test]
    fn separators_and_line_breaks_in_fields_are_neutralized() {
        let cfg = config(
            r#"{
                "settings": {
                    "MaxLayers": 2,
                    "Layers": { "layer0": { "name": "A,B" }, "layer1": { "name": "x~y\r\nz" } },
                    "Colors": ["red,blue"]
                },
                "mappings": {
                    "button1": { "layer0": { "action": "key", "value": "a", "display": "Line1\nLine2" } },
                    "button2": { "layer0": { "action": "key", "value": "b", "display": "a|b~c" } }
                }
            }"#,
        );

        let [names, settings] = build_lines(&cfg);
        assert_eq!(names, "DisplayNames: Line1 Line2~a b c~~~~|~~~~~|~~~~~|~~~~~");
        assert_eq!(settings, "Settings: 2,A B~x y  z~~,75,solid,red blue,0");
        for line in [&names, &settings] {
            assert!(!line.contains('\n') && !line.contains('\r'));
        }
        assert_eq!(settings.split(',').count(), 6);
    }

    #[test]
    fn push_writes_exactly_two_lines_in_order() {
        use crate::serial::mock::MockPortBackend;
        use crate::serial::PortBackend;

        let backend = MockPortBackend::new();
        let pad = backend.add_kommpad("COM9");
        let mut link = backend.open("COM9", 9600).unwrap();

        push(link.as_mut(), &KommPadConfig::default()).unwrap();
        let writes = pad.writes();
        assert_eq!(writes.len(), 2);
        assert!(writes[0].starts_with("DisplayNames: "));
        assert!(writes[1].starts_with("Settings: "));
    }
}
