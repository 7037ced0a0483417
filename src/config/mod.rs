use crate::metering_62056::obis_parser::OBJECT_VALUE_ALLOWED_CHARS;
use crate::metering_62056::utils::{is_standard_baud_rate, is_valid_mode_char};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_yml;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read the config on config/meter.yaml or meter.yaml")]
    NotFound,
    #[error("Unable to read config file {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("Unable to parse config file: {0}")]
    Parse(#[from] serde_yml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn reader_initial_baud_rate_default() -> u32 { 300 }
fn reader_identification_timeout_default() -> u64 { 2000 }
fn reader_read_timeout_default() -> u64 { 500 }
fn reader_max_cycle_default() -> u64 { 60 }
fn reader_drain_timeout_default() -> u64 { 2000 }
fn reader_drain_poll_default() -> u64 { 20 }
fn reader_identification_settle_default() -> u64 { 1000 }
fn reader_ack_settle_default() -> u64 { 50 }
fn reader_strip_unit_default() -> bool { true }
fn reader_verify_checksum_default() -> bool { true }
fn reader_value_allowed_chars_default() -> String { OBJECT_VALUE_ALLOWED_CHARS.to_string() }

/// Settings of a single readout cycle. All timeouts are in milliseconds,
/// `max_cycle_secs` in seconds.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ReaderConfig {
    #[serde(default="reader_initial_baud_rate_default")]
    pub initial_baud_rate: u32,
    #[serde(default="reader_identification_timeout_default")]
    pub identification_timeout_ms: u64,
    #[serde(default="reader_read_timeout_default")]
    pub read_timeout_ms: u64,
    #[serde(default="reader_max_cycle_default")]
    pub max_cycle_secs: u64,
    #[serde(default="reader_drain_timeout_default")]
    pub drain_timeout_ms: u64,
    #[serde(default="reader_drain_poll_default")]
    pub drain_poll_ms: u64,
    #[serde(default="reader_identification_settle_default")]
    pub identification_settle_ms: u64,
    #[serde(default="reader_ack_settle_default")]
    pub ack_settle_ms: u64,
    /// Substring the identification has to contain, e.g. "ELS"
    #[serde(default)]
    pub expected_identifier: Option<String>,
    /// Forces the mode character, for reading heads that cannot keep up
    #[serde(default)]
    pub mode_override: Option<char>,
    /// Put between `?` and `!` of the request
    #[serde(default)]
    pub device_address: Option<String>,
    #[serde(default="reader_strip_unit_default")]
    pub strip_unit: bool,
    #[serde(default="reader_verify_checksum_default")]
    pub verify_checksum: bool,
    #[serde(default="reader_value_allowed_chars_default")]
    pub value_allowed_chars: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            initial_baud_rate: reader_initial_baud_rate_default(),
            identification_timeout_ms: reader_identification_timeout_default(),
            read_timeout_ms: reader_read_timeout_default(),
            max_cycle_secs: reader_max_cycle_default(),
            drain_timeout_ms: reader_drain_timeout_default(),
            drain_poll_ms: reader_drain_poll_default(),
            identification_settle_ms: reader_identification_settle_default(),
            ack_settle_ms: reader_ack_settle_default(),
            expected_identifier: None,
            mode_override: None,
            device_address: None,
            strip_unit: reader_strip_unit_default(),
            verify_checksum: reader_verify_checksum_default(),
            value_allowed_chars: reader_value_allowed_chars_default(),
        }
    }
}

impl ReaderConfig {
    pub fn identification_timeout(&self) -> Duration { Duration::from_millis(self.identification_timeout_ms) }
    pub fn read_timeout(&self) -> Duration { Duration::from_millis(self.read_timeout_ms) }
    pub fn max_cycle(&self) -> Duration { Duration::from_secs(self.max_cycle_secs) }
    pub fn drain_timeout(&self) -> Duration { Duration::from_millis(self.drain_timeout_ms) }
    pub fn drain_poll(&self) -> Duration { Duration::from_millis(self.drain_poll_ms) }
    pub fn identification_settle(&self) -> Duration { Duration::from_millis(self.identification_settle_ms) }
    pub fn ack_settle(&self) -> Duration { Duration::from_millis(self.ack_settle_ms) }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_standard_baud_rate(self.initial_baud_rate) {
            return Err(ConfigError::Invalid(format!("initial_baud_rate {} is not a standard rate", self.initial_baud_rate)));
        }

        if let Some(mode) = self.mode_override {
            if !is_valid_mode_char(mode) {
                return Err(ConfigError::Invalid(format!("mode_override {:?} must be 0-6 or A-F", mode)));
            }
        }

        let timeouts = [
            ("identification_timeout_ms", self.identification_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("max_cycle_secs", self.max_cycle_secs),
            ("drain_timeout_ms", self.drain_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{} must not be zero", name)));
        }

        if self.value_allowed_chars.is_empty() {
            return Err(ConfigError::Invalid("value_allowed_chars must not be empty".to_string()));
        }

        Ok(())
    }
}

fn retry_initial_default() -> f64 { 1.0 }
fn retry_multiplier_default() -> f64 { 1.5 }
fn retry_max_default() -> f64 { 600.0 }

/// Backoff after failed readouts, in seconds
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RetryConfig {
    #[serde(default="retry_initial_default")]
    pub initial_secs: f64,
    #[serde(default="retry_multiplier_default")]
    pub multiplier: f64,
    #[serde(default="retry_max_default")]
    pub max_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            initial_secs: retry_initial_default(),
            multiplier: retry_multiplier_default(),
            max_secs: retry_max_default(),
        }
    }
}

fn app_objects_default() -> Vec<String> { vec!["1.7.0".to_string(), "1.8.0".to_string()] }
fn app_read_interval_default() -> u64 { 600 }
fn app_poll_interval_default() -> u64 { 5 }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct AppConfig {
    /// Serial device of the optical reading head
    pub port: String,
    #[serde(default="app_objects_default")]
    pub objects: Vec<String>,
    /// Seconds between two successful readouts
    #[serde(default="app_read_interval_default")]
    pub read_interval_secs: u64,
    /// Milliseconds between two `poll()` calls
    #[serde(default="app_poll_interval_default")]
    pub poll_interval_ms: u64,
    /// JSON lines file the readings are appended to, stdout when unset
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
}

impl AppConfig {
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let c: AppConfig = serde_yml::from_str(contents)?;
        c.validate()?;
        Ok(c)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let c = Self::from_yaml(&contents)?;
        info!("Config loaded from {}", path.display());
        Ok(c)
    }

    /// Looks for `config/meter.yaml` first, then `meter.yaml`
    pub fn load() -> Result<Self, ConfigError> {
        ["config/meter.yaml", "meter.yaml"]
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
            .ok_or(ConfigError::NotFound)
            .and_then(Self::load_from)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port.is_empty() {
            return Err(ConfigError::Invalid("port must not be empty".to_string()));
        }

        if self.retry.multiplier < 1.0 || self.retry.initial_secs <= 0.0 {
            return Err(ConfigError::Invalid("retry backoff must grow from a positive start".to_string()));
        }

        self.reader.validate()
    }
}
