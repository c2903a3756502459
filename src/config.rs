//! Machine configuration.
//!
//! Values are taken, highest priority first, from environment variables,
//! the project-local `avr-emu.toml`, and the built-in defaults.
//!
//! ```toml
//! # avr-emu.toml
//! data_memory_size = 2000
//! stack_capacity = 256
//! fault_policy = "silent"   # or "report"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::memory::{DEFAULT_DATA_MEMORY_SIZE, PCMSK0};
use crate::stack::DEFAULT_STACK_CAPACITY;

pub const LOCAL_CONFIG_FILE: &str = "avr-emu.toml";

/// How faults detected during a phase are surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// Log and count the fault, carry on as the hardware would.
    #[default]
    Silent,
    /// Same machine behaviour, but `step_phase` also returns the fault.
    Report,
}

impl FromStr for FaultPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" => Ok(FaultPolicy::Silent),
            "report" => Ok(FaultPolicy::Report),
            other => Err(ConfigError::Invalid {
                field: "fault_policy",
                reason: format!("expected \"silent\" or \"report\", got \"{}\"", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_memory_size: usize,
    pub stack_capacity: usize,
    pub fault_policy: FaultPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_memory_size: DEFAULT_DATA_MEMORY_SIZE,
            stack_capacity: DEFAULT_STACK_CAPACITY,
            fault_policy: FaultPolicy::Silent,
        }
    }
}

impl Config {
    /// Load configuration from all sources. Unreadable or invalid sources are
    /// logged and skipped.
    pub fn load() -> Self {
        let mut config = match Self::from_file(Path::new(LOCAL_CONFIG_FILE)) {
            Ok(config) => {
                log::info!("Loaded config from {}", LOCAL_CONFIG_FILE);
                config
            }
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                log::warn!("Ignoring {}: {}", LOCAL_CONFIG_FILE, e);
                Self::default()
            }
        };

        if let Err(e) = config.apply_env_overrides() {
            log::warn!("Ignoring environment override: {}", e);
        }

        if let Err(e) = config.validate() {
            log::warn!("Falling back to defaults: {}", e);
            return Self::default();
        }

        config
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("AVR_EMU_DATA_MEMORY_SIZE") {
            log::info!("Using AVR_EMU_DATA_MEMORY_SIZE from environment: {}", value);
            self.data_memory_size = parse_size("data_memory_size", &value)?;
        }
        if let Ok(value) = std::env::var("AVR_EMU_STACK_CAPACITY") {
            log::info!("Using AVR_EMU_STACK_CAPACITY from environment: {}", value);
            self.stack_capacity = parse_size("stack_capacity", &value)?;
        }
        if let Ok(value) = std::env::var("AVR_EMU_FAULT_POLICY") {
            log::info!("Using AVR_EMU_FAULT_POLICY from environment: {}", value);
            self.fault_policy = value.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // The I/O registers must be addressable.
        let min_data = PCMSK0 as usize + 1;
        if !(min_data..=0x1_0000).contains(&self.data_memory_size) {
            return Err(ConfigError::Invalid {
                field: "data_memory_size",
                reason: format!("must be between {} and 65536", min_data),
            });
        }
        if !(1..=0x1_0000).contains(&self.stack_capacity) {
            return Err(ConfigError::Invalid {
                field: "stack_capacity",
                reason: "must be between 1 and 65536".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_size(field: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("{}", e),
    })
}
