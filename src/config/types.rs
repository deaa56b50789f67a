use std::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::{
    FALL_PULSE, IMPACT_PULSE, RECONNECT_DELAY, SAHAY_DATA_CHARACTERISTIC_UUID, SAHAY_DEVICE_NAME,
    SAHAY_SERVICE_UUID, SAHAY_SHORT_NAME,
};
use crate::device::types::TargetFilter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub service_uuid: Uuid,
    pub data_characteristic_uuid: Uuid,
    pub device_name: String,
    pub short_name: String,
    pub reconnect_delay_ms: u64,
    pub impact_pulse_ms: u64,
    pub fall_pulse_ms: u64,
}

impl Config {
    pub fn target_filter(&self) -> TargetFilter {
        TargetFilter {
            service: self.service_uuid,
            device_name: self.device_name.clone(),
            short_name: self.short_name.clone(),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn impact_pulse(&self) -> Duration {
        Duration::from_millis(self.impact_pulse_ms)
    }

    pub fn fall_pulse(&self) -> Duration {
        Duration::from_millis(self.fall_pulse_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            service_uuid: SAHAY_SERVICE_UUID,
            data_characteristic_uuid: SAHAY_DATA_CHARACTERISTIC_UUID,
            device_name: SAHAY_DEVICE_NAME.to_string(),
            short_name: SAHAY_SHORT_NAME.to_string(),
            reconnect_delay_ms: RECONNECT_DELAY,
            impact_pulse_ms: IMPACT_PULSE,
            fall_pulse_ms: FALL_PULSE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.reconnect_delay(), Duration::from_secs(3));
        assert_eq!(config.impact_pulse(), Duration::from_millis(200));
        assert_eq!(config.fall_pulse(), Duration::from_millis(1000));
        assert_eq!(config.target_filter().short_name, "Sahay");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str(r#"{ "deviceName": "Sahay_Band2", "reconnectDelayMs": 5000 }"#).unwrap();
        assert_eq!(config.device_name, "Sahay_Band2");
        assert_eq!(config.reconnect_delay_ms, 5000);
        assert_eq!(config.service_uuid, SAHAY_SERVICE_UUID);
        assert_eq!(config.fall_pulse_ms, 1000);
    }

    #[test]
    fn uses_camel_case() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("\"dataCharacteristicUuid\":\"6e400003-b5a3-f393-e0a9-e50e24dcca9e\""));
        assert!(json.contains("\"shortName\":\"Sahay\""));
    }
}
