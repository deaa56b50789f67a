use uuid::Uuid;

/**
 * How long (milliseconds) to wait after a disconnect before scanning again.
 */
pub const RECONNECT_DELAY: u64 = 3000;

/**
 * How long (milliseconds) the haptic pulse for an impact frame lasts.
 */
pub const IMPACT_PULSE: u64 = 200;

/**
 * How long (milliseconds) the haptic pulse for a detected fall lasts.
 */
pub const FALL_PULSE: u64 = 1000;

/**
 * The UUID of the Bluetooth BLE service advertised by the Sahay fall sensor
 */
pub const SAHAY_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/**
 * The UUID of the remote GATT characteristic the sensor pushes its text frames on.
 */
pub const SAHAY_DATA_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/**
 * Client Characteristic Configuration Descriptor (0x2902).
 */
pub const CLIENT_CONFIGURATION_DESCRIPTOR_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/**
 * The exact name the sensor firmware advertises.
 */
pub const SAHAY_DEVICE_NAME: &str = "Sahay_FallSensor";

/**
 * Any advertised name containing this (case-insensitive) is also accepted.
 */
pub const SAHAY_SHORT_NAME: &str = "Sahay";

pub const FRAME_READY: &str = "READY";
pub const FRAME_HEARTBEAT: &str = "HEARTBEAT";
pub const FRAME_IMPACT: &str = "IMPACT";
pub const FRAME_FALL_DETECTED: &str = "FALL_DETECTED";

pub const STATUS_RADIO_OFF: &str = "Bluetooth is off";
pub const STATUS_SCANNING: &str = "Searching for Sahay sensor";
pub const STATUS_RECONNECTING: &str = "Disconnected, reconnecting";
pub const STATUS_READY: &str = "Sensor ready";
pub const STATUS_FALL_DETECTED: &str = "Fall detected! Alerting caregivers";
pub const STATUS_UNSUPPORTED: &str = "Sensor not supported, restart required";
pub const STATUS_STOPPED: &str = "Stopped";
