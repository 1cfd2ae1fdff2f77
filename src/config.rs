//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{AmrError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub receiver: ReceiverConfig,
    pub dispatch: DispatchConfig,
    pub capture: CaptureConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Receiver configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ReceiverConfig {
    /// Frame ring storage in bytes
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,

    #[serde(default = "default_start_enabled")]
    pub start_enabled: bool,
}

/// Poll loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,

    /// 0 disables periodic statistics
    #[serde(default = "default_stats_interval_s")]
    pub stats_interval_s: u64,
}

/// Capture replay configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    /// File of ASCII '0'/'1' line samples
    #[serde(default = "default_capture_path")]
    pub path: String,

    /// Replay pace in samples per second
    #[serde(default = "default_bit_rate_hz")]
    pub bit_rate_hz: u32,
}

/// Record output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_format")]
    pub format: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily log files; empty logs to stderr only
    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_ring_capacity() -> usize { 512 }
fn default_start_enabled() -> bool { true }

fn default_drain_interval_ms() -> u64 { 10 }
fn default_stats_interval_s() -> u64 { 10 }

fn default_capture_path() -> String { "capture.txt".to_string() }
fn default_bit_rate_hz() -> u32 { 32768 }

fn default_output_format() -> String { "jsonl".to_string() }

fn default_log_level() -> String { "info".to_string() }

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from a TOML file
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
    /// use amr_decoder::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // An IDM frame needs 101 bytes of ring
        if self.receiver.ring_capacity < 128 || self.receiver.ring_capacity > u16::MAX as usize {
            return Err(invalid("ring_capacity must be between 128 and 65535"));
        }

        if self.dispatch.drain_interval_ms == 0 || self.dispatch.drain_interval_ms > 1000 {
            return Err(invalid("drain_interval_ms must be between 1 and 1000"));
        }

        if self.dispatch.stats_interval_s > 3600 {
            return Err(invalid("stats_interval_s must be at most 3600"));
        }

        if self.capture.path.is_empty() {
            return Err(invalid("capture path cannot be empty"));
        }

        if self.capture.bit_rate_hz == 0 || self.capture.bit_rate_hz > 1_000_000 {
            return Err(invalid("bit_rate_hz must be between 1 and 1000000"));
        }

        if self.output.format != "jsonl" {
            return Err(invalid("output format must be \"jsonl\""));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid("logging level must be one of trace, debug, info, warn, error"));
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> AmrError {
    AmrError::Config(toml::de::Error::custom(msg))
}
