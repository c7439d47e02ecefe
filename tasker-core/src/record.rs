use serde::{Deserialize, Serialize};
use std::fmt;

/// How the supervisor drives the bundler for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Continuous watch build plus live-reload proxy
    #[default]
    Development,
    /// Single-shot build, then exit
    Production,
    /// Watch build served through the in-process dev server
    Server,
}

impl Mode {
    /// Resolve the `--mode` flag value.
    ///
    /// Only the short forms `d`, `p` and `s` are recognized (case-insensitive).
    /// Anything else falls back to development.
    pub fn from_flag(flag: &str) -> Self {
        match flag.trim().to_ascii_lowercase().as_str() {
            "p" => Mode::Production,
            "s" => Mode::Server,
            _ => Mode::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
            Mode::Server => "server",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ports held by one supervisor instance: live-reload proxy, proxy control UI,
/// and the bundler-internal dev server port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSet {
    pub local: Option<u16>,
    pub ui: Option<u16>,
    pub webpack: Option<u16>,
}

impl PortSet {
    pub fn is_empty(&self) -> bool {
        self.local.is_none() && self.ui.is_none() && self.webpack.is_none()
    }
}

/// The `process` section of the registry document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessRecord {
    pub pid: Option<u32>,
    pub title: String,
    pub argv: Vec<String>,
    pub mode: Mode,
    pub ports: PortSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_flag_resolves_short_forms() {
        assert_eq!(Mode::from_flag("d"), Mode::Development);
        assert_eq!(Mode::from_flag("p"), Mode::Production);
        assert_eq!(Mode::from_flag("S"), Mode::Server);
    }

    #[test]
    fn unknown_mode_flag_falls_back_to_development() {
        assert_eq!(Mode::from_flag("production"), Mode::Development);
        assert_eq!(Mode::from_flag("x"), Mode::Development);
        assert_eq!(Mode::from_flag(""), Mode::Development);
    }

    #[test]
    fn mode_serializes_as_lowercase_name() {
        assert_eq!(
            serde_json::to_string(&Mode::Production).unwrap(),
            r#""production""#
        );
        let parsed: Mode = serde_json::from_str(r#""server""#).unwrap();
        assert_eq!(parsed, Mode::Server);
    }

    #[test]
    fn unresolved_ports_serialize_as_null() {
        let ports = PortSet {
            local: Some(4000),
            ui: None,
            webpack: Some(4002),
        };
        let v = serde_json::to_value(ports).unwrap();
        assert_eq!(v["local"], 4000);
        assert!(v["ui"].is_null());
        assert_eq!(v["webpack"], 4002);
    }

    #[test]
    fn partial_record_parses_with_defaults() {
        let record: ProcessRecord =
            serde_json::from_str(r#"{"ports":{"local":3000}}"#).unwrap();
        assert_eq!(record.pid, None);
        assert_eq!(record.mode, Mode::Development);
        assert_eq!(record.ports.local, Some(3000));
        assert!(record.argv.is_empty());
    }

    #[test]
    fn port_set_is_empty_only_without_any_port() {
        assert!(PortSet::default().is_empty());
        assert!(
            !PortSet {
                ui: Some(1),
                ..Default::default()
            }
            .is_empty()
        );
    }
}
