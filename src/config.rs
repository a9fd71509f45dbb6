//! Configuration management for the camera sender

use crate::capture::CaptureOptions;
use crate::streamer::StreamerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("transport '{0}' is not implemented")]
    TransportNotImplemented(String),

    #[error("unsupported transport '{0}'")]
    UnsupportedTransport(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete sender configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sender: SenderConfig,

    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Streaming side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Stream transport; only "tcp" is implemented
    #[serde(default = "default_transport")]
    pub transport: String,

    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Listen port (0 = ephemeral)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of cameras to open
    #[serde(default = "default_camera_count")]
    pub camera_count: u16,

    /// Send rate cap (0 = unlimited)
    #[serde(default)]
    pub max_fps: u32,

    /// Stats log interval in sent frames (0 = never)
    #[serde(default = "default_log_every")]
    pub log_every: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            bind: default_bind(),
            port: default_port(),
            camera_count: default_camera_count(),
            max_fps: 0,
            log_every: default_log_every(),
        }
    }
}

/// Camera transport side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Bounded wait per bulk read
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Bulk read size in bytes
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,

    /// Sleep after a transient read error (0 = retry immediately)
    #[serde(default)]
    pub retry_backoff_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
            packet_size: default_packet_size(),
            retry_backoff_ms: 0,
        }
    }
}

// Default value functions
fn default_transport() -> String {
    "tcp".to_string()
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    9000
}
fn default_camera_count() -> u16 {
    1
}
fn default_log_every() -> u64 {
    120
}
fn default_read_timeout_ms() -> u64 {
    1000
}
fn default_packet_size() -> usize {
    0x400
}

/// Smallest packet that can hold both fragment headers
const MIN_PACKET_SIZE: usize = 12;
const MAX_PACKET_SIZE: usize = 65536;

impl Config {
    /// Loads configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Loads configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sender = &self.sender;

        match sender.transport.as_str() {
            "tcp" => {}
            "udp" => return Err(ConfigError::TransportNotImplemented(sender.transport.clone())),
            other => return Err(ConfigError::UnsupportedTransport(other.to_string())),
        }

        if sender.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("bind address must not be empty".into()));
        }

        if sender.camera_count == 0 {
            return Err(ConfigError::Invalid("camera_count must be >= 1".into()));
        }

        let capture = &self.capture;

        if capture.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("read_timeout_ms must be > 0".into()));
        }

        if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&capture.packet_size) {
            return Err(ConfigError::Invalid(format!(
                "packet_size must be between {} and {}, got {}",
                MIN_PACKET_SIZE, MAX_PACKET_SIZE, capture.packet_size
            )));
        }

        Ok(())
    }

    /// Saves configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn streamer_config(&self) -> StreamerConfig {
        StreamerConfig {
            bind: self.sender.bind.clone(),
            port: self.sender.port,
            max_fps: self.sender.max_fps,
            log_every: self.sender.log_every,
        }
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            retry_backoff: Duration::from_millis(self.capture.retry_backoff_ms),
        }
    }

    #[cfg(feature = "usb")]
    pub fn usb_settings(&self) -> crate::capture::usb::UsbSettings {
        crate::capture::usb::UsbSettings {
            read_timeout: Duration::from_millis(self.capture.read_timeout_ms),
            packet_size: self.capture.packet_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sender.transport, "tcp");
        assert_eq!(config.sender.bind, "0.0.0.0");
        assert_eq!(config.sender.port, 9000);
        assert_eq!(config.sender.camera_count, 1);
        assert_eq!(config.sender.max_fps, 0);
        assert_eq!(config.sender.log_every, 120);
        assert_eq!(config.capture.read_timeout_ms, 1000);
        assert_eq!(config.capture.packet_size, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
[sender]
transport = "tcp"
bind = "127.0.0.1"
port = 9100
camera_count = 2
max_fps = 15
log_every = 30

[capture]
read_timeout_ms = 500
packet_size = 2048
retry_backoff_ms = 5
        "#;

        let config = Config::from_str(toml).unwrap();

        assert_eq!(config.sender.bind, "127.0.0.1");
        assert_eq!(config.sender.port, 9100);
        assert_eq!(config.sender.camera_count, 2);
        assert_eq!(config.capture.packet_size, 2048);

        let streamer = config.streamer_config();
        assert_eq!(streamer.max_fps, 15);
        assert_eq!(streamer.log_every, 30);
        assert_eq!(
            config.capture_options().retry_backoff,
            Duration::from_millis(5)
        );
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config = Config::from_str("[sender]\nport = 7000\n").unwrap();
        assert_eq!(config.sender.port, 7000);
        assert_eq!(config.sender.log_every, 120);
        assert_eq!(config.capture.read_timeout_ms, 1000);
    }

    #[test]
    fn test_transport_selection() {
        assert!(matches!(
            Config::from_str("[sender]\ntransport = \"udp\"\n"),
            Err(ConfigError::TransportNotImplemented(_))
        ));
        assert!(matches!(
            Config::from_str("[sender]\ntransport = \"serial\"\n"),
            Err(ConfigError::UnsupportedTransport(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_str("[sender]\ncamera_count = 0\n").is_err());
        assert!(Config::from_str("[capture]\nread_timeout_ms = 0\n").is_err());
        assert!(Config::from_str("[capture]\npacket_size = 8\n").is_err());
        assert!(Config::from_str("[capture]\npacket_size = 70000\n").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sender.toml");

        let mut config = Config::default();
        config.sender.port = 9555;
        config.sender.max_fps = 25;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.sender.port, 9555);
        assert_eq!(loaded.sender.max_fps, 25);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/sender.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
