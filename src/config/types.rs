use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::device::constants::{DEFAULT_READ_INTERVAL, DEFAULT_RECONNECT_INTERVAL};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriverConfig {
    /// Seconds to wait after a reading before reading again.
    pub read_interval: f64,
    /// Seconds to wait before trying to connect again.
    pub reconnect_interval: f64,
}

fn check_interval(name: &'static str, value: f64) -> Result<(), ConfigError> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => Ok(()),
        _ => Err(ConfigError::InvalidInterval { name, value }),
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_interval("readInterval", self.read_interval)?;
        check_interval("reconnectInterval", self.reconnect_interval)?;
        Ok(())
    }

    pub fn read_interval(&self) -> Duration {
        Duration::from_secs_f64(self.read_interval)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs_f64(self.reconnect_interval)
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            read_interval: DEFAULT_READ_INTERVAL,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}
