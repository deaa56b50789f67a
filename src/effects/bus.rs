use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};

pub const FALL_DETECTED_EVENT_ID: &str = "FALL_DETECTED";

/// Events delivered to every part of the application, whether or not it observes the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// `detected_at` starts the response clock of the fall-alert flow.
    FallDetected { detected_at: SystemTime },
}

impl AppEvent {
    pub fn event_id(&self) -> &'static str {
        match self {
            AppEvent::FallDetected { .. } => FALL_DETECTED_EVENT_ID,
        }
    }
}

/// Process-wide notification bus. Listener queues are unbounded: a slow listener delays its
/// own events but never loses one.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Vec<UnboundedSender<AppEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    pub fn register(&self) -> UnboundedReceiver<AppEvent> {
        let (sender, receiver) = unbounded();
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).push(sender);
        receiver
    }

    /// Returns the number of listeners the event was delivered to.
    pub fn publish(&self, event: AppEvent) -> usize {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|listener| listener.unbounded_send(event).is_ok());
        listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listener_receives_every_event() {
        let bus = EventBus::new();
        let mut first = bus.register();
        let mut second = bus.register();
        let event = AppEvent::FallDetected { detected_at: SystemTime::UNIX_EPOCH };

        assert_eq!(bus.publish(event), 2);
        assert_eq!(bus.publish(event), 2);

        for listener in [&mut first, &mut second] {
            assert_eq!(listener.try_next().ok().flatten(), Some(event));
            assert_eq!(listener.try_next().ok().flatten(), Some(event));
        }
    }

    #[test]
    fn closed_listeners_are_dropped() {
        let bus = EventBus::new();
        let listener = bus.register();
        drop(listener);

        assert_eq!(bus.publish(AppEvent::FallDetected { detected_at: SystemTime::now() }), 0);
    }

    #[test]
    fn event_id() {
        let event = AppEvent::FallDetected { detected_at: SystemTime::now() };
        assert_eq!(event.event_id(), "FALL_DETECTED");
    }
}
