//! # Door Controller Configuration
//!
//! Settings are read from a TOML file. Every field has a default, so a
//! missing file section (or a missing file, when no path is given on the
//! command line) yields the stock setup.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [controller]
//! journal_path = "/var/lib/pulse-gate/pimc_status"
//! open_pulses = 11
//! close_pulses = 11
//! max_time_secs = 30
//! resume_on_start = true
//!
//! [driver]
//! simulated = false
//! settle_ms = 250
//! poll_interval_ms = 50
//!
//! [gpio]
//! forward_pin = 26
//! reverse_pin = 20
//! feedback_pin = 5
//!
//! [server]
//! bind = "0.0.0.0:5000"
//! ```

// src/config.rs - Single configuration file
use crate::hardware::DriverTiming;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub gpio: GpioConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Motion controller settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Journal file; must already exist and hold the current status.
    #[serde(default = "default_journal_path")]
    pub journal_path: PathBuf,
    #[serde(default = "default_pulses")]
    pub open_pulses: u32,
    #[serde(default = "default_pulses")]
    pub close_pulses: u32,
    /// Maximum motor runtime per operation.
    #[serde(default = "default_max_time_secs")]
    pub max_time_secs: u64,
    /// Resume an interrupted operation right after loading the journal.
    #[serde(default)]
    pub resume_on_start: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            journal_path: default_journal_path(),
            open_pulses: default_pulses(),
            close_pulses: default_pulses(),
            max_time_secs: default_max_time_secs(),
            resume_on_start: false,
        }
    }
}

impl ControllerConfig {
    pub fn max_time(&self) -> Duration {
        Duration::from_secs(self.max_time_secs)
    }
}

/// Motor driver selection and timing.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DriverConfig {
    /// Use the simulated motor instead of GPIO. The journal is still written.
    #[serde(default)]
    pub simulated: bool,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_simulated_pulse_ms")]
    pub simulated_pulse_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            simulated: false,
            settle_ms: default_settle_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            simulated_pulse_ms: default_simulated_pulse_ms(),
        }
    }
}

impl DriverConfig {
    pub fn timing(&self) -> DriverTiming {
        DriverTiming {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            settle_delay: Duration::from_millis(self.settle_ms),
        }
    }
}

/// BCM pin numbers for the relay outputs and the pulse input.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GpioConfig {
    #[serde(default = "default_forward_pin")]
    pub forward_pin: u32,
    #[serde(default = "default_reverse_pin")]
    pub reverse_pin: u32,
    #[serde(default = "default_feedback_pin")]
    pub feedback_pin: u32,
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            forward_pin: default_forward_pin(),
            reverse_pin: default_reverse_pin(),
            feedback_pin: default_feedback_pin(),
            sysfs_root: default_sysfs_root(),
        }
    }
}

/// HTTP front-end settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("pimc_status")
}
fn default_pulses() -> u32 {
    11
}
fn default_max_time_secs() -> u64 {
    30
}
fn default_settle_ms() -> u64 {
    250
}
fn default_poll_interval_ms() -> u64 {
    50
}
fn default_simulated_pulse_ms() -> u64 {
    1000
}
fn default_forward_pin() -> u32 {
    26
}
fn default_reverse_pin() -> u32 {
    20
}
fn default_feedback_pin() -> u32 {
    5
}
fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys/class/gpio")
}
fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

impl Config {
    /// Reject settings the controller cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.controller;
        if c.open_pulses == 0 || c.close_pulses == 0 {
            return Err(ConfigError::Invalid(
                "open_pulses and close_pulses must be greater than zero".into(),
            ));
        }
        if c.max_time_secs == 0 {
            return Err(ConfigError::Invalid("max_time_secs must be greater than zero".into()));
        }
        if self.driver.poll_interval_ms == 0 || self.driver.simulated_pulse_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms and simulated_pulse_ms must be greater than zero".into(),
            ));
        }
        let g = &self.gpio;
        if g.forward_pin == g.reverse_pin
            || g.forward_pin == g.feedback_pin
            || g.reverse_pin == g.feedback_pin
        {
            return Err(ConfigError::Invalid(format!(
                "GPIO pins must be distinct (forward={}, reverse={}, feedback={})",
                g.forward_pin, g.reverse_pin, g.feedback_pin
            )));
        }
        Ok(())
    }
}

/// Load and validate a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.controller.open_pulses, 11);
        assert_eq!(config.controller.max_time(), Duration::from_secs(30));
        assert_eq!(config.driver.timing(), DriverTiming::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [controller]
            journal_path = "/tmp/door"
            close_pulses = 5
            max_time_secs = 2

            [driver]
            simulated = true
            "#,
        )
        .unwrap();
        assert_eq!(config.controller.journal_path, PathBuf::from("/tmp/door"));
        assert_eq!(config.controller.open_pulses, 11);
        assert_eq!(config.controller.close_pulses, 5);
        assert_eq!(config.controller.max_time_secs, 2);
        assert!(config.driver.simulated);
        assert_eq!(config.gpio.forward_pin, 26);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.controller.max_time_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.gpio.reverse_pin = config.gpio.forward_pin;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("door.toml");
        std::fs::write(&path, "[server]\nbind = \"127.0.0.1:8080\"\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");

        assert!(matches!(
            load_config(dir.path().join("absent.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
