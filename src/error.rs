use std::any::Any;
use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use btleplug;
use serde_json;

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
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start link engine (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start link engine (bluetooth): {source}")]
    DeviceError { #[from] source: DeviceError },

    #[error("Failed to start link engine (runtime): {source}")]
    Runtime { #[from] source: io::Error },
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("Radio operation failed: {0}")]
    Radio(String),

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,

    #[error("The data characteristic has no notification configuration descriptor")]
    MissingDescriptor,
}

impl DeviceError {
    /// Wrong peripheral or firmware. These are not fed to the reconnect policy.
    pub fn is_pairing_error(&self) -> bool {
        matches!(self, DeviceError::MissingCharacteristic | DeviceError::MissingDescriptor)
    }
}

pub fn readable_task_panic_error(error: &Box<dyn Any + Send + 'static>) -> String {
    let mut stringified = String::from("???");

    if let Some(s) = error.downcast_ref::<&str>() {
        stringified = s.to_string();
    }
    else if let Some(s) = error.downcast_ref::<String>() {
        stringified = s.clone();
    }

    format!("panic from task: [{}]", stringified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pairing_errors_are_final() {
        assert!(DeviceError::MissingCharacteristic.is_pairing_error());
        assert!(DeviceError::MissingDescriptor.is_pairing_error());
        assert!(!DeviceError::Radio("busy".to_string()).is_pairing_error());
        assert!(!DeviceError::NoAdapter.is_pairing_error());
    }

    #[test]
    fn panic_payload_is_readable() {
        let payload: Box<dyn Any + Send + 'static> = Box::new("boom");
        assert_eq!(readable_task_panic_error(&payload), "panic from task: [boom]");

        let payload: Box<dyn Any + Send + 'static> = Box::new(String::from("bang"));
        assert_eq!(readable_task_panic_error(&payload), "panic from task: [bang]");
    }
}
