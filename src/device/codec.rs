use crate::device::constants::{FRAME_FALL_DETECTED, FRAME_HEARTBEAT, FRAME_IMPACT, FRAME_READY};
use crate::device::types::{DecodedFrame, DeviceMessage};

/// Maps a text frame to a message. Total: anything unrecognized becomes `Unknown`.
/// The firmware uses fixed casing, so matching is exact.
pub fn decode(raw: &str) -> DeviceMessage {
    match raw.trim() {
        FRAME_READY => DeviceMessage::Ready,
        FRAME_HEARTBEAT => DeviceMessage::Heartbeat,
        FRAME_IMPACT => DeviceMessage::Impact,
        FRAME_FALL_DETECTED => DeviceMessage::FallDetected,
        other => DeviceMessage::Unknown(other.to_string()),
    }
}

/// Decodes a notification payload. Invalid UTF-8 is replaced rather than rejected.
pub fn decode_frame(payload: &[u8]) -> DecodedFrame {
    let text = String::from_utf8_lossy(payload);
    let raw = text.trim().to_string();
    let message = decode(&raw);

    DecodedFrame { raw, message }
}
