use std::time::SystemTime;

use crate::device::types::ConnectionState;
use crate::state::observable::ObservableField;

/// Point-in-time copy of every field, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateSnapshot {
    pub connection_state: ConnectionState,
    pub device_name: Option<String>,
    pub last_heartbeat_at: Option<SystemTime>,
    pub fall_alert_pending: bool,
    pub last_raw_message: Option<String>,
}

/// The state shared between the link engine, the dispatcher and any number of readers.
///
/// Readers get each field through its accessor and may `get` or `subscribe` it. Writing is
/// crate-private: the lifecycle engine owns the connection fields, the dispatcher owns the
/// message derived ones.
pub struct StateStore {
    connection_state: ObservableField<ConnectionState>,
    device_name: ObservableField<Option<String>>,
    last_heartbeat_at: ObservableField<Option<SystemTime>>,
    fall_alert_pending: ObservableField<bool>,
    last_raw_message: ObservableField<Option<String>>,
}

impl StateStore {
    pub fn new() -> Self {
        StateStore {
            connection_state: ObservableField::new(ConnectionState::Disconnected),
            device_name: ObservableField::new(None),
            last_heartbeat_at: ObservableField::new(None),
            fall_alert_pending: ObservableField::new(false),
            last_raw_message: ObservableField::new(None),
        }
    }

    pub fn connection_state(&self) -> &ObservableField<ConnectionState> {
        &self.connection_state
    }

    pub fn device_name(&self) -> &ObservableField<Option<String>> {
        &self.device_name
    }

    pub fn last_heartbeat_at(&self) -> &ObservableField<Option<SystemTime>> {
        &self.last_heartbeat_at
    }

    pub fn fall_alert_pending(&self) -> &ObservableField<bool> {
        &self.fall_alert_pending
    }

    pub fn last_raw_message(&self) -> &ObservableField<Option<String>> {
        &self.last_raw_message
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            connection_state: self.connection_state.get(),
            device_name: self.device_name.get(),
            last_heartbeat_at: self.last_heartbeat_at.get(),
            fall_alert_pending: self.fall_alert_pending.get(),
            last_raw_message: self.last_raw_message.get(),
        }
    }

    pub(crate) fn set_connection_state(&self, state: ConnectionState) {
        self.connection_state.set(state);
    }

    /// Re-asserts `Connected` after the sensor reported ready. A ready frame that is processed
    /// after the link already dropped must not resurrect the connection, so nothing happens
    /// while disconnected or scanning.
    pub(crate) fn reassert_connected(&self) -> bool {
        self.connection_state.set_if(
            |current| matches!(current, ConnectionState::Connecting | ConnectionState::Connected),
            ConnectionState::Connected,
        )
    }

    pub(crate) fn set_device_name(&self, name: Option<String>) {
        self.device_name.set(name);
    }

    pub(crate) fn set_last_heartbeat_at(&self, at: SystemTime) {
        self.last_heartbeat_at.set(Some(at));
    }

    pub(crate) fn set_fall_alert_pending(&self, pending: bool) {
        self.fall_alert_pending.set(pending);
    }

    pub(crate) fn set_last_raw_message(&self, raw: String) {
        self.last_raw_message.set(Some(raw));
    }

    /// Clears the fields derived from sensor messages. The connection fields belong to the engine.
    pub(crate) fn clear_message_state(&self) {
        self.last_heartbeat_at.set(None);
        self.fall_alert_pending.set(false);
        self.last_raw_message.set(None);
    }
}

impl Default for StateStore {
    fn default() -> Self {
        StateStore::new()
    }
}
