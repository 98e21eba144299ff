//! Configuration management

use anyhow::{Context, Result};
use levelmeter_audio::{AudioSource, CaptureConfig, DEFAULT_SAMPLE_RATE};
use levelmeter_level::LevelConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::socket;

/// Meter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Capture rate in Hz (default: 8000)
    pub sample_rate: u32,

    /// Input tuning preset; a name or the legacy integer code
    pub audio_source: AudioSource,

    /// Audio device index (None = default device)
    pub device_index: Option<usize>,

    /// Smoothing coefficient (default: 0.9)
    pub alpha: f64,

    /// Added to the level before it is placed on the bar (default: 10.0)
    pub offset_db: f64,

    /// Bar segments (default: 10)
    pub segments: usize,

    /// dB per bar segment (default: 6.0)
    pub db_per_segment: f64,

    /// Unix socket path for control commands
    pub socket_path: String,
}

impl Default for MeterConfig {
    fn default() -> Self {
        let level = LevelConfig::default();
        Self {
            config_path: Self::default_config_path(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            audio_source: AudioSource::default(),
            device_index: None,
            alpha: level.alpha,
            offset_db: level.offset_db,
            segments: level.segments,
            db_per_segment: level.db_per_segment,
            socket_path: socket::default_socket_path().display().to_string(),
        }
    }
}

impl MeterConfig {
    /// Load configuration from the default location, or create it
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path())
    }

    /// Load configuration from `path`, writing defaults there if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::read(path)
        } else {
            let config = Self {
                config_path: path.to_path_buf(),
                ..Self::default()
            };
            config.save().context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Parse an existing configuration file
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config: MeterConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            audio_source: self.audio_source,
            device_index: self.device_index,
        }
    }

    pub fn level_config(&self) -> LevelConfig {
        LevelConfig::default()
            .alpha(self.alpha)
            .offset(self.offset_db)
            .bar(self.segments, self.db_per_segment)
    }

    /// Check both halves before anything is opened
    pub fn validate(&self) -> Result<()> {
        self.capture_config()
            .validate()
            .context("Invalid capture settings")?;
        self.level_config()
            .validate()
            .context("Invalid level settings")?;
        Ok(())
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("LevelMeter")
        } else if cfg!(target_os = "macos") {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("com.levelmeter.daemon")
        } else {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("levelmeter")
        };

        config_dir.join("config.toml")
    }
}

/// Capture settings forced from the command line, applied over every read of
/// the file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub sample_rate: Option<u32>,
    pub audio_source: Option<AudioSource>,
    pub device_index: Option<usize>,
}

impl Overrides {
    pub fn apply(&self, config: &mut MeterConfig) {
        if let Some(rate) = self.sample_rate {
            config.sample_rate = rate;
        }
        if let Some(source) = self.audio_source {
            config.audio_source = source;
        }
        if self.device_index.is_some() {
            config.device_index = self.device_index;
        }
    }
}
