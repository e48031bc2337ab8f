use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionSettings,
    pub reconnect: ReconnectConfig,
    pub audio: AudioConfig,
    pub recording: RecordingConfig,
    pub api: ApiConfig,
}

/// Identity and address sent to the meeting client on every connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub protocol_version: String,
    pub manufacturer: String,
    pub device: String,
    pub app_name: String,
    pub app_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Growth factor applied when the meeting client drops us right after a token was sent
    pub auth_failure_multiplier: u32,
    /// A close within this window after sending a token counts as a rejected token
    pub auth_failure_window_ms: u64,
    /// A session that stays up this long resets the backoff
    pub stable_after_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Mp3,
    Wav,
}

impl Codec {
    pub fn extension(&self) -> &'static str {
        match self {
            Codec::Mp3 => "mp3",
            Codec::Wav => "wav",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per mixed block handed to the encoder
    pub block_frames: usize,
    /// Capacity (in blocks) of the queue between capture and encoding
    pub queue_capacity: usize,
    /// How many blocks one source may run ahead before the other is zero-filled
    pub max_lag_blocks: usize,
    /// Name fragment of the microphone device; empty means the default input
    pub microphone_device: String,
    /// Name fragment of the loopback ("Stereo Mix") device
    pub system_device: String,
    pub codec: Codec,
    pub bitrate_kbps: u32,
    /// LAME quality, 0 (best) to 9 (worst)
    pub quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub output_dir: PathBuf,
    pub record_all_meetings: bool,
    pub file_prefix: String,
    pub shutdown_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8124,
            protocol_version: "2.0.0".to_string(),
            manufacturer: "TeamsHelper".to_string(),
            device: "TeamsHelper".to_string(),
            app_name: "TeamsHelper".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            auth_failure_multiplier: 4,
            auth_failure_window_ms: 2_000,
            stable_after_ms: 10_000,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            block_frames: 1024,
            queue_capacity: 64,
            max_lag_blocks: 4,
            microphone_device: "Microphone".to_string(),
            system_device: "Stereo Mix".to_string(),
            codec: Codec::Mp3,
            bitrate_kbps: 128,
            quality: 2,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: global::default_recordings_dir(),
            record_all_meetings: true,
            file_prefix: "Recording".to_string(),
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8125,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("protocol_version '{0}' is not a semantic version")]
    ProtocolVersion(String),
    #[error("audio.{0} must be greater than zero")]
    Zero(&'static str),
    #[error("audio.channels must be 1 or 2 (got {0})")]
    Channels(u16),
    #[error("unsupported MP3 bitrate {0} kbps")]
    Bitrate(u32),
    #[error("MP3 quality must be between 0 and 9 (got {0})")]
    Quality(u8),
    #[error("reconnect.max_delay_ms ({max}) is below initial_delay_ms ({initial})")]
    DelayRange { initial: u64, max: u64 },
}

pub const SUPPORTED_BITRATES: &[u32] = &[
    8, 16, 24, 32, 40, 48, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = global::config_file()?;
        Self::load_from(&config_path)
    }

    /// Load from an explicit path, writing defaults there when the file is missing.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("Invalid configuration")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        semver::Version::parse(&self.connection.protocol_version)
            .map_err(|_| ConfigError::ProtocolVersion(self.connection.protocol_version.clone()))?;

        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return Err(ConfigError::Zero("sample_rate"));
        }
        if audio.block_frames == 0 {
            return Err(ConfigError::Zero("block_frames"));
        }
        if audio.queue_capacity == 0 {
            return Err(ConfigError::Zero("queue_capacity"));
        }
        if !(1..=2).contains(&audio.channels) {
            return Err(ConfigError::Channels(audio.channels));
        }
        if audio.codec == Codec::Mp3 {
            if !SUPPORTED_BITRATES.contains(&audio.bitrate_kbps) {
                return Err(ConfigError::Bitrate(audio.bitrate_kbps));
            }
            if audio.quality > 9 {
                return Err(ConfigError::Quality(audio.quality));
            }
        }

        let reconnect = &self.reconnect;
        if reconnect.max_delay_ms < reconnect.initial_delay_ms {
            return Err(ConfigError::DelayRange {
                initial: reconnect.initial_delay_ms,
                max: reconnect.max_delay_ms,
            });
        }

        Ok(())
    }
}

impl RecordingConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.port, 8124);
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.audio.codec, Codec::Mp3);
        assert!(config.recording.record_all_meetings);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [audio]
            codec = "wav"
            sample_rate = 48000
            "#,
        )
        .unwrap();

        assert_eq!(config.audio.codec, Codec::Wav);
        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.audio.channels, 2);
        assert_eq!(config.connection.host, "localhost");
    }

    #[test]
    fn test_rejects_bad_protocol_version() {
        let mut config = Config::default();
        config.connection.protocol_version = "two".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ProtocolVersion(_))
        ));
    }

    #[test]
    fn test_rejects_unsupported_bitrate() {
        let mut config = Config::default();
        config.audio.bitrate_kbps = 100;
        assert!(matches!(config.validate(), Err(ConfigError::Bitrate(100))));

        config.audio.codec = Codec::Wav;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.api.port, 8125);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.connection.protocol_version, "2.0.0");
    }
}
