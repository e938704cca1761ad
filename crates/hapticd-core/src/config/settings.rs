use crate::{Error, Result};
use hapticd_proto::CURRENT_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Config {
    /// Load config from file, falling back to defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// holds out-of-range values.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        super::validation::warn_unknown_fields(&content, "config.json");
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values serde cannot range-check.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.server.min_schema_version > CURRENT_SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "server.minSchemaVersion {} is newer than the supported {}",
                self.server.min_schema_version, CURRENT_SCHEMA_VERSION
            )));
        }
        if self.server.server_name.trim().is_empty() {
            return Err(Error::Config("server.serverName is empty".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for device in &self.simulation.devices {
            if !seen.insert(device.identity.as_str()) {
                return Err(Error::Config(format!(
                    "simulation.devices has duplicate identity {}",
                    device.identity
                )));
            }
        }
        Ok(())
    }
}

/// When inbound traffic counts as a liveness signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PingResetPolicy {
    /// Every inbound message resets the ping timer.
    #[default]
    AnyMessage,
    /// Only `Ping` resets the ping timer.
    PingOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Ping watchdog interval in milliseconds; 0 disables it.
    #[serde(default)]
    pub max_ping_time_ms: u32,

    /// Oldest client schema version accepted at handshake.
    #[serde(default)]
    pub min_schema_version: u32,

    #[serde(default)]
    pub ping_reset_policy: PingResetPolicy,
}

fn default_server_name() -> String {
    "hapticd".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            max_ping_time_ms: 0,
            min_schema_version: 0,
            ping_reset_policy: PingResetPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    #[serde(default = "default_simulated_devices")]
    pub devices: Vec<SimulatedDeviceConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            devices: default_simulated_devices(),
        }
    }
}

/// A device the simulated backend announces while scanning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedDeviceConfig {
    pub identity: String,

    pub name: String,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub vibrators: u32,

    #[serde(default)]
    pub rotators: u32,

    #[serde(default)]
    pub linears: u32,

    #[serde(default)]
    pub battery: bool,

    #[serde(default)]
    pub rssi: bool,

    #[serde(default)]
    pub message_timing_gap_ms: u32,
}

impl SimulatedDeviceConfig {
    #[must_use]
    pub fn new(identity: &str, name: &str) -> Self {
        Self {
            identity: identity.to_string(),
            name: name.to_string(),
            display_name: None,
            vibrators: 0,
            rotators: 0,
            linears: 0,
            battery: false,
            rssi: false,
            message_timing_gap_ms: 0,
        }
    }
}

fn default_simulated_devices() -> Vec<SimulatedDeviceConfig> {
    vec![
        SimulatedDeviceConfig {
            vibrators: 2,
            battery: true,
            rssi: true,
            ..SimulatedDeviceConfig::new("sim-vibrator", "Simulated Vibrator")
        },
        SimulatedDeviceConfig {
            linears: 1,
            message_timing_gap_ms: 100,
            ..SimulatedDeviceConfig::new("sim-stroker", "Simulated Stroker")
        },
    ]
}
