//! Snapshot Codecs
//!
//! A context only needs a complete, order-independent list of component
//! records; how those records are laid out in a file is the codec's business.
//! TOML is the default, JSON is selected by a `.json` extension.

use crate::error::{ConfigError, Result};
use crate::snapshot::ConfigSnapshot;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Encode/decode a [`ConfigSnapshot`]
pub trait ConfigCodec {
    fn format(&self) -> &'static str;

    fn encode(&self, snapshot: &ConfigSnapshot) -> Result<String>;

    fn decode(&self, text: &str) -> Result<ConfigSnapshot>;
}

/// TOML snapshot codec
///
/// ```toml
/// [[component]]
/// kind = "transport"
/// family = "null"
/// name = "tap0"
///
/// [component.args]
/// type = "transport"
/// engine = "hub"
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlCodec;

impl ConfigCodec for TomlCodec {
    fn format(&self) -> &'static str {
        "toml"
    }

    fn encode(&self, snapshot: &ConfigSnapshot) -> Result<String> {
        toml::to_string_pretty(snapshot).map_err(|e| ConfigError::Encode {
            format: self.format(),
            message: e.to_string(),
        })
    }

    fn decode(&self, text: &str) -> Result<ConfigSnapshot> {
        toml::from_str(text).map_err(|e| ConfigError::Decode {
            format: self.format(),
            message: e.to_string(),
        })
    }
}

/// JSON snapshot codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ConfigCodec for JsonCodec {
    fn format(&self) -> &'static str {
        "json"
    }

    fn encode(&self, snapshot: &ConfigSnapshot) -> Result<String> {
        serde_json::to_string_pretty(snapshot).map_err(|e| ConfigError::Encode {
            format: self.format(),
            message: e.to_string(),
        })
    }

    fn decode(&self, text: &str) -> Result<ConfigSnapshot> {
        serde_json::from_str(text).map_err(|e| ConfigError::Decode {
            format: self.format(),
            message: e.to_string(),
        })
    }
}

/// Pick a codec from the file extension
pub fn codec_for_path(path: &Path) -> Box<dyn ConfigCodec> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Box::new(JsonCodec),
        _ => Box::new(TomlCodec),
    }
}

/// Write `snapshot` to `path`
pub fn save_snapshot(path: &Path, snapshot: &ConfigSnapshot) -> Result<()> {
    let codec = codec_for_path(path);
    let text = codec.encode(snapshot)?;
    fs::write(path, text).map_err(|e| ConfigError::io(path, e))?;
    debug!(?path, components = snapshot.len(), format = codec.format(), "snapshot saved");
    Ok(())
}

/// Read a snapshot from `path`
pub fn load_snapshot(path: &Path) -> Result<ConfigSnapshot> {
    let codec = codec_for_path(path);
    let text = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    let snapshot = codec.decode(&text)?;
    debug!(?path, components = snapshot.len(), format = codec.format(), "snapshot loaded");
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{
        ComponentArgs, ComponentKind, ComponentRecord, ConnectionManagerArgs, TransportArgs,
    };
    use tempfile::tempdir;

    fn sample() -> ConfigSnapshot {
        ConfigSnapshot::new(vec![
            ComponentRecord {
                kind: ComponentKind::Engine,
                family: "null".to_string(),
                name: "hub".to_string(),
                args: ComponentArgs::None,
            },
            ComponentRecord {
                kind: ComponentKind::Transport,
                family: "null".to_string(),
                name: "tap0".to_string(),
                args: ComponentArgs::Transport(TransportArgs {
                    engine: Some("hub".to_string()),
                    head_size: 4,
                    tail_size: 0,
                }),
            },
            ComponentRecord {
                kind: ComponentKind::ConnectionManager,
                family: "null".to_string(),
                name: "cm".to_string(),
                args: ComponentArgs::ConnectionManager(ConnectionManagerArgs {
                    transport: "tap0".to_string(),
                    engine: "hub".to_string(),
                    delay_ms: 5,
                    refuse: false,
                }),
            },
        ])
    }

    #[test]
    fn test_toml_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("components.toml");
        save_snapshot(&path, &sample()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[[component]]"));
        assert_eq!(load_snapshot(&path).unwrap(), sample());
    }

    #[test]
    fn test_json_selected_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("components.json");
        save_snapshot(&path, &sample()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.trim_start().starts_with('{'));
        assert_eq!(load_snapshot(&path).unwrap(), sample());
    }

    #[test]
    fn test_hand_written_toml() {
        let text = r#"
[[component]]
kind = "transport"
family = "null"
name = "a"

[[component]]
kind = "engine"
family = "null"
name = "b"
"#;
        let snapshot = TomlCodec.decode(text).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("a").unwrap().args, ComponentArgs::None);
        assert_eq!(snapshot.get("b").unwrap().kind, ComponentKind::Engine);
    }

    #[test]
    fn test_decode_error_names_format() {
        let err = TomlCodec.decode("[[component]]\nkind = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Decode { format: "toml", .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = load_snapshot(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
