//! Configuration file handling for grblstream
//!
//! Supports JSON and TOML file formats, chosen by file extension. Missing
//! sections and keys fall back to their defaults.
//!
//! Configuration is organized into logical sections:
//! - Connection settings (port, baud rate, timing)
//! - Streaming settings
//! - Jog settings

use crate::error::{ConfigError, SettingsError, SettingsResult};
use grblstream_communication::{JogCommand, JogStyle, LinkConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port name that selects the first listed port
pub const AUTO_PORT: &str = "Auto";

/// Application directory name under the platform config directory
const APP_DIR: &str = "grblstream";

/// Default config file name
const CONFIG_FILE: &str = "config.toml";

/// Connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port name, or "Auto"
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Wait after opening the port before talking to the controller
    pub settle_delay_ms: u64,
    /// Read timeout; the reader notices a disconnect within this time
    pub read_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: AUTO_PORT.to_string(),
            baud_rate: 115200,
            settle_delay_ms: 2000,
            read_timeout_ms: 100,
        }
    }
}

impl ConnectionSettings {
    /// Whether the port should be picked automatically
    pub fn is_auto_port(&self) -> bool {
        self.port.eq_ignore_ascii_case(AUTO_PORT)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl From<&ConnectionSettings> for LinkConfig {
    fn from(settings: &ConnectionSettings) -> Self {
        LinkConfig {
            settle_delay: settings.settle_delay(),
            read_timeout: settings.read_timeout(),
        }
    }
}

/// Streaming settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// How long a stop may take before it is reported as stuck
    pub stop_join_timeout_ms: u64,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            stop_join_timeout_ms: 5000,
        }
    }
}

impl StreamingSettings {
    pub fn stop_join_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_join_timeout_ms)
    }
}

/// Jog settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JogSettings {
    /// Step length in mm
    pub step_mm: f64,
    /// Feed rate in mm/min
    pub feed_rate: f64,
    /// Send `X+` style lines instead of `$J=` jogs
    pub manual_protocol: bool,
}

impl Default for JogSettings {
    fn default() -> Self {
        Self {
            step_mm: 1.0,
            feed_rate: 500.0,
            manual_protocol: false,
        }
    }
}

impl JogSettings {
    /// Wire format for jogs
    pub fn style(&self) -> JogStyle {
        if self.manual_protocol {
            JogStyle::Manual
        } else {
            JogStyle::Grbl
        }
    }

    /// Build the line for an `X+` / `Y-` shorthand
    pub fn line_for(&self, shorthand: &str) -> Option<String> {
        JogCommand::parse_shorthand(shorthand, self.step_mm, self.feed_rate)
            .map(|jog| jog.to_line(self.style()))
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Streaming settings
    pub streaming: StreamingSettings,
    /// Jog settings
    pub jog: JogSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("none").to_string(),
            )),
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// `<config dir>/grblstream/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no config directory on this platform".to_string())
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = Format::of(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return defaults
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SettingsError::ConfigDirectory(format!("{}: {}", parent.display(), e))
            })?;
        }

        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.connection.port.trim().is_empty() {
            return Err(SettingsError::InvalidSetting {
                key: "connection.port".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        if self.connection.baud_rate == 0 {
            return Err(out_of_range("connection.baud_rate", self.connection.baud_rate));
        }

        if self.connection.read_timeout_ms == 0 {
            return Err(out_of_range(
                "connection.read_timeout_ms",
                self.connection.read_timeout_ms,
            ));
        }

        if self.streaming.stop_join_timeout_ms == 0 {
            return Err(out_of_range(
                "streaming.stop_join_timeout_ms",
                self.streaming.stop_join_timeout_ms,
            ));
        }

        if !(self.jog.step_mm.is_finite() && self.jog.step_mm > 0.0) {
            return Err(out_of_range("jog.step_mm", self.jog.step_mm));
        }

        if !(self.jog.feed_rate.is_finite() && self.jog.feed_rate > 0.0) {
            return Err(out_of_range("jog.feed_rate", self.jog.feed_rate));
        }

        Ok(())
    }
}

fn out_of_range(key: &str, value: impl ToString) -> SettingsError {
    ConfigError::ValueOutOfRange {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert!(config.connection.is_auto_port());
        assert_eq!(config.connection.baud_rate, 115200);
        assert_eq!(config.connection.settle_delay(), Duration::from_secs(2));
        assert_eq!(config.streaming.stop_join_timeout(), Duration::from_secs(5));
        assert_eq!(config.jog.style(), JogStyle::Grbl);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_link_config_from_settings() {
        let settings = ConnectionSettings {
            settle_delay_ms: 0,
            read_timeout_ms: 25,
            ..ConnectionSettings::default()
        };
        let link = LinkConfig::from(&settings);
        assert_eq!(link.settle_delay, Duration::ZERO);
        assert_eq!(link.read_timeout, Duration::from_millis(25));
    }

    #[test]
    fn test_jog_lines() {
        let mut jog = JogSettings::default();
        assert_eq!(jog.line_for("X+"), Some("$J=G91 X1 F500".to_string()));
        jog.manual_protocol = true;
        assert_eq!(jog.line_for("y-"), Some("Y-".to_string()));
        assert_eq!(jog.line_for("Q+"), None);
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::new();
        config.connection.port = "/dev/ttyACM0".to_string();
        config.jog.step_mm = 0.1;
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::new();
        config.connection.baud_rate = 250000;
        config.save_to_file(&path).unwrap();

        assert_eq!(Config::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[connection]\nport = \"COM4\"\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.connection.port, "COM4");
        assert_eq!(config.connection.baud_rate, 115200);
        assert_eq!(config.jog, JogSettings::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config::new();
        config.jog.feed_rate = 0.0;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::Config(ConfigError::ValueOutOfRange { .. }))
        ));

        let mut config = Config::new();
        config.connection.port = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { .. })
        ));

        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[connection]\nbaud_rate = 0\n").unwrap();
        assert!(Config::load_from_file(&path).is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        assert!(matches!(
            Config::new().save_to_file(&path),
            Err(SettingsError::Config(ConfigError::UnsupportedFormat(_)))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_load_or_default() {
        let dir = tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load_from_file(&path),
            Err(SettingsError::JsonError(_))
        ));
    }
}
