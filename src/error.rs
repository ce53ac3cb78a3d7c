use std::io;
use thiserror::Error;
use std::str::Utf8Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },

    #[error("Invalid value for {name}: {value} (must be a positive number of seconds)")]
    InvalidInterval { name: &'static str, value: f64 },
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (usb): {source}")]
    Device { #[from] source: DeviceError },

    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start application (tokio runtime): {source}")]
    Runtime { #[from] source: io::Error },
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (rusb): {source}")]
    Usb { #[from] source: rusb::Error },

    #[error("Interface {interface} has no IN endpoint")]
    MissingEndpoint { interface: u8 },

    #[error("Report too short: expected at least {expected} bytes, got {actual}")]
    ShortReport { expected: usize, actual: usize },

    #[error("Blocking USB task failed: {source}")]
    BlockingTask { #[from] source: JoinError },
}
