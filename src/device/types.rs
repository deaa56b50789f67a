use std::fmt;
use uuid::Uuid;

use crate::error::DeviceError;

/// Connection state as seen by everything outside the lifecycle engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Scanning,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Scanning => "Scanning",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        };

        write!(f, "{}", result)
    }
}

/// One frame received from the sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    Ready,
    Heartbeat,
    Impact,
    FallDetected,
    Unknown(String),
}

/// A decoded frame together with its trimmed text, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub raw: String,
    pub message: DeviceMessage,
}

/// Opaque, radio-backend specific identity of a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeripheralId(pub String);

impl From<&str> for PeripheralId {
    fn from(value: &str) -> Self {
        PeripheralId(value.to_string())
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub peripheral: PeripheralId,
    pub name: Option<String>,
    pub services: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
    pub uuid: Uuid,
    pub notify: bool,
    pub descriptors: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub uuid: Uuid,
    pub characteristics: Vec<DiscoveredCharacteristic>,
}

/// Asynchronous results and notifications reported by a [`crate::device::radio::Radio`].
#[derive(Debug)]
pub enum RadioEvent {
    Advertisement(Advertisement),
    ScanFailed(DeviceError),
    Connected {
        peripheral: PeripheralId,
    },
    Disconnected {
        peripheral: PeripheralId,
        reason: Option<DeviceError>,
    },
    ServicesDiscovered {
        peripheral: PeripheralId,
        result: Result<Vec<DiscoveredService>, DeviceError>,
    },
    DescriptorWritten {
        peripheral: PeripheralId,
        result: Result<(), DeviceError>,
    },
    CharacteristicChanged {
        peripheral: PeripheralId,
        characteristic: Uuid,
        value: Vec<u8>,
    },
}

/// Decides which advertisement belongs to our sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFilter {
    pub service: Uuid,
    pub device_name: String,
    pub short_name: String,
}

impl TargetFilter {
    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        if !advertisement.services.contains(&self.service) {
            return false;
        }

        let name = match &advertisement.name {
            Some(name) => name,
            None => return false,
        };

        if name == &self.device_name {
            return true;
        }

        !self.short_name.is_empty()
            && name.to_lowercase().contains(&self.short_name.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::constants::{SAHAY_DEVICE_NAME, SAHAY_SERVICE_UUID, SAHAY_SHORT_NAME};

    fn filter() -> TargetFilter {
        TargetFilter {
            service: SAHAY_SERVICE_UUID,
            device_name: SAHAY_DEVICE_NAME.to_string(),
            short_name: SAHAY_SHORT_NAME.to_string(),
        }
    }

    fn advertisement(name: Option<&str>, services: Vec<Uuid>) -> Advertisement {
        Advertisement {
            peripheral: PeripheralId::from("AA:BB:CC:DD:EE:FF"),
            name: name.map(str::to_string),
            services,
        }
    }

    #[test]
    fn exact_name_matches() {
        assert!(filter().matches(&advertisement(Some(SAHAY_DEVICE_NAME), vec![SAHAY_SERVICE_UUID])));
    }

    #[test]
    fn short_name_substring_is_case_insensitive() {
        assert!(filter().matches(&advertisement(Some("grandma-SAHAY-band"), vec![SAHAY_SERVICE_UUID])));
        assert!(filter().matches(&advertisement(Some("sahay"), vec![SAHAY_SERVICE_UUID])));
    }

    #[test]
    fn other_device_is_rejected() {
        assert!(!filter().matches(&advertisement(Some("OtherDevice"), vec![SAHAY_SERVICE_UUID])));
    }

    #[test]
    fn service_is_required() {
        assert!(!filter().matches(&advertisement(Some(SAHAY_DEVICE_NAME), vec![])));
        assert!(!filter().matches(&advertisement(Some(SAHAY_DEVICE_NAME), vec![Uuid::nil()])));
    }

    #[test]
    fn nameless_advertisement_is_rejected() {
        assert!(!filter().matches(&advertisement(None, vec![SAHAY_SERVICE_UUID])));
    }

    #[test]
    fn empty_short_name_does_not_match_everything() {
        let mut filter = filter();
        filter.short_name = String::new();
        assert!(!filter.matches(&advertisement(Some("OtherDevice"), vec![SAHAY_SERVICE_UUID])));
        assert!(filter.matches(&advertisement(Some(SAHAY_DEVICE_NAME), vec![SAHAY_SERVICE_UUID])));
    }
}
