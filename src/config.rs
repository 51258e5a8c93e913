//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::bus::state::DEFAULT_INITIAL_KEY_COUNT;
use crate::error::{IpbError, Result};
use crate::ipb::encoder::{FrameEncoder, FrameFormat, SequencePolicy};
use crate::ipb::protocol::{IPB_BROADCAST_ADDRESS, IPB_DEFAULT_SOURCE_ADDRESS};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub erd: ErdConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// How long one frame attempt may hold the port while the line is idle
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// Frame addressing and counters
#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    #[serde(default = "default_source_address")]
    pub source_address: u8,

    #[serde(default = "default_destination_address")]
    pub destination_address: u8,

    #[serde(default)]
    pub sequence_policy: SequenceMode,

    #[serde(default)]
    pub sequence_start: u8,

    /// Count the body checksum in the body length field
    #[serde(default)]
    pub length_includes_checksum: bool,

    #[serde(default = "default_initial_key_count")]
    pub initial_key_count: u8,
}

/// How outgoing sequence numbers evolve, written `"fixed"` or `"incrementing"`
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SequenceMode {
    #[default]
    Fixed,
    Incrementing,
}

/// ERD dictionary configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ErdConfig {
    #[serde(default = "default_dictionary_path")]
    pub dictionary_path: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for the daily log file; empty disables file logging
    #[serde(default)]
    pub log_dir: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_timeout_ms() -> u64 { 100 }
fn default_reconnect_interval_ms() -> u64 { 1000 }

fn default_source_address() -> u8 { IPB_DEFAULT_SOURCE_ADDRESS }
fn default_destination_address() -> u8 { IPB_BROADCAST_ADDRESS }
fn default_initial_key_count() -> u8 { DEFAULT_INITIAL_KEY_COUNT }

fn default_dictionary_path() -> String { "config/erd_library.json".to_string() }

fn default_log_level() -> String { "info".to_string() }
fn default_file_prefix() -> String { "ipb-bus.log".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            source_address: default_source_address(),
            destination_address: default_destination_address(),
            sequence_policy: SequenceMode::default(),
            sequence_start: 0,
            length_includes_checksum: false,
            initial_key_count: default_initial_key_count(),
        }
    }
}

impl Default for ErdConfig {
    fn default() -> Self {
        Self {
            dictionary_path: default_dictionary_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
            file_prefix: default_file_prefix(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> IpbError {
    IpbError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ipb_bus::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if ![9600, 19200, 38400, 57600, 115200, 230400].contains(&self.serial.baud_rate) {
            return Err(invalid(
                "baud_rate must be one of: 9600, 19200, 38400, 57600, 115200, 230400",
            ));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(invalid("timeout_ms must be between 1 and 10000"));
        }

        if self.serial.reconnect_interval_ms == 0 || self.serial.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        if self.erd.dictionary_path.is_empty() {
            return Err(invalid("erd dictionary_path cannot be empty"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "logging level '{}' must be one of: trace, debug, info, warn, error",
                self.logging.level
            )));
        }

        if !self.logging.log_dir.is_empty() && self.logging.file_prefix.is_empty() {
            return Err(invalid("logging file_prefix cannot be empty when log_dir is set"));
        }

        Ok(())
    }

    /// Sequence policy for outgoing frames
    pub fn sequence_policy(&self) -> SequencePolicy {
        match self.bus.sequence_policy {
            SequenceMode::Fixed => SequencePolicy::Fixed(self.bus.sequence_start),
            SequenceMode::Incrementing => SequencePolicy::Incrementing(self.bus.sequence_start),
        }
    }

    /// Frame addressing and length convention
    pub fn frame_format(&self) -> FrameFormat {
        FrameFormat {
            source: self.bus.source_address,
            destination: self.bus.destination_address,
            length_includes_checksum: self.bus.length_includes_checksum,
        }
    }

    /// Frame encoder for outgoing commands
    pub fn frame_encoder(&self) -> FrameEncoder {
        FrameEncoder::new(self.frame_format(), self.sequence_policy())
    }

    /// Read timeout for one frame attempt
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.serial.timeout_ms)
    }

    /// Delay between serial open attempts
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.serial.reconnect_interval_ms)
    }
}
