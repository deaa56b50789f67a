use std::time::Duration;
use log::info;

/// Vibration motor of the phone/watch running the engine.
pub trait Haptics: Send + Sync {
    fn pulse(&self, duration: Duration);
}

/// The persistent status notification shown while the engine runs.
pub trait StatusNotifier: Send + Sync {
    fn set_status_text(&self, text: &str);
}

/// Used when no platform haptics are available; only logs.
pub struct LogHaptics;

impl Haptics for LogHaptics {
    fn pulse(&self, duration: Duration) {
        info!("Haptic pulse for {}", humantime::format_duration(duration));
    }
}

pub struct LogStatusNotifier;

impl StatusNotifier for LogStatusNotifier {
    fn set_status_text(&self, text: &str) {
        info!("Status: {}", text);
    }
}
