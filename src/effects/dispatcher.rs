use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use futures::StreamExt;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::types::Config;
use crate::device::constants::{STATUS_FALL_DETECTED, STATUS_READY};
use crate::device::types::{DecodedFrame, DeviceMessage};
use crate::effects::bus::{AppEvent, EventBus};
use crate::effects::outputs::{Haptics, StatusNotifier};
use crate::state::store::StateStore;

#[derive(Debug)]
pub enum DispatchCommand {
    /// A frame forwarded during the given engine session.
    Frame { session: u64, frame: DecodedFrame },
    AcknowledgeFallAlert,
    /// Sent by the engine on stop. Frames from earlier sessions still queued are discarded.
    Reset,
}

#[derive(Clone)]
pub struct Outputs {
    pub haptics: Arc<dyn Haptics>,
    pub status: Arc<dyn StatusNotifier>,
    pub bus: EventBus,
}

pub struct Dispatcher {
    store: Arc<StateStore>,
    outputs: Outputs,
    impact_pulse: Duration,
    fall_pulse: Duration,
    // shared with every DispatcherHandle; bumped on reset
    session: Arc<AtomicU64>,
}

impl Dispatcher {
    pub fn new(store: Arc<StateStore>, outputs: Outputs, config: &Config) -> Self {
        Dispatcher {
            store,
            outputs,
            impact_pulse: config.impact_pulse(),
            fall_pulse: config.fall_pulse(),
            session: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn handle(&self, command: DispatchCommand) {
        match command {
            DispatchCommand::Frame { session, frame } => {
                if session == self.session.load(Ordering::SeqCst) {
                    self.dispatch(frame);
                } else {
                    debug!("Discarding frame {:?} from a stopped session", frame.raw);
                }
            },
            DispatchCommand::AcknowledgeFallAlert => {
                info!("Fall alert acknowledged");
                self.store.set_fall_alert_pending(false);
            },
            DispatchCommand::Reset => {
                debug!("Clearing message state");
                self.store.clear_message_state();
            },
        }
    }

    fn dispatch(&self, frame: DecodedFrame) {
        let DecodedFrame { raw, message } = frame;
        self.store.set_last_raw_message(raw);

        match message {
            DeviceMessage::Ready => {
                info!("Sensor reports ready");
                self.store.reassert_connected();
                self.outputs.status.set_status_text(STATUS_READY);
            },
            DeviceMessage::Heartbeat => {
                debug!("Heartbeat");
                self.store.set_last_heartbeat_at(SystemTime::now());
            },
            DeviceMessage::Impact => {
                info!("Impact reported");
                self.outputs.haptics.pulse(self.impact_pulse);
            },
            DeviceMessage::FallDetected => {
                warn!("Fall detected");
                self.outputs.haptics.pulse(self.fall_pulse);
                self.outputs.status.set_status_text(STATUS_FALL_DETECTED);
                self.store.set_fall_alert_pending(true);

                let listeners = self.outputs.bus.publish(AppEvent::FallDetected { detected_at: SystemTime::now() });
                if listeners == 0 {
                    warn!("No listener registered for fall alerts");
                }
            },
            DeviceMessage::Unknown(text) => {
                debug!("Unrecognized frame {:?}", text);
            },
        }
    }
}

/// Queue into the dispatcher task. Sending never blocks and never drops.
#[derive(Clone)]
pub struct DispatcherHandle {
    sender: UnboundedSender<DispatchCommand>,
    session: Arc<AtomicU64>,
}

impl DispatcherHandle {
    fn send(&self, command: DispatchCommand) {
        if let Err(err) = self.sender.unbounded_send(command) {
            warn!("Dispatcher is gone, dropping {:?}", err.into_inner());
        }
    }

    pub fn send_frame(&self, frame: DecodedFrame) {
        let session = self.session.load(Ordering::SeqCst);
        self.send(DispatchCommand::Frame { session, frame });
    }

    pub fn acknowledge_fall_alert(&self) {
        self.send(DispatchCommand::AcknowledgeFallAlert);
    }

    /// Ends the current session: frames sent before this call are never applied.
    pub fn reset(&self) {
        self.session.fetch_add(1, Ordering::SeqCst);
        self.send(DispatchCommand::Reset);
    }
}

pub fn spawn_dispatcher(cancel: CancellationToken, dispatcher: Dispatcher) -> (DispatcherHandle, JoinHandle<()>) {
    let (sender, mut receiver) = unbounded::<DispatchCommand>();
    let session = dispatcher.session.clone();

    let handle = spawn(async move {
        'mainloop: loop {
            tokio::select! {
                // drain what is queued (the final reset included) before honouring cancel
                biased;
                command = receiver.next() => match command {
                    Some(command) => dispatcher.handle(command),
                    None => break 'mainloop,
                },
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
            }
        }

        debug!("Dispatcher stopped");
    });

    (DispatcherHandle { sender, session }, handle)
}
