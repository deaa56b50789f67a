use std::sync::Arc;
use std::time::Duration;
use futures::StreamExt;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use log::{debug, error, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::types::Config;
use crate::device::codec::decode_frame;
use crate::device::constants::{
    CLIENT_CONFIGURATION_DESCRIPTOR_UUID, ENABLE_NOTIFICATION_VALUE, STATUS_RADIO_OFF, STATUS_RECONNECTING,
    STATUS_SCANNING, STATUS_STOPPED, STATUS_UNSUPPORTED,
};
use crate::device::radio::Radio;
use crate::device::types::{
    Advertisement, ConnectionState, DiscoveredService, PeripheralId, RadioEvent, TargetFilter,
};
use crate::effects::dispatcher::DispatcherHandle;
use crate::effects::outputs::StatusNotifier;
use crate::error::{readable_task_panic_error, DeviceError};
use crate::state::store::StateStore;

#[derive(Debug)]
pub enum EngineCommand {
    Start,
    Stop,
    ReconnectDue { generation: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Subscription {
    DiscoveringServices,
    WritingDescriptor { characteristic: Uuid },
    Subscribed { characteristic: Uuid },
}

#[derive(Debug)]
enum LinkState {
    Disconnected,
    Scanning,
    Connecting {
        peripheral: PeripheralId,
        name: Option<String>,
    },
    Connected {
        peripheral: PeripheralId,
        name: Option<String>,
        subscription: Subscription,
    },
}

impl LinkState {
    fn connection_state(&self) -> ConnectionState {
        match self {
            LinkState::Disconnected => ConnectionState::Disconnected,
            LinkState::Scanning => ConnectionState::Scanning,
            LinkState::Connecting { .. } => ConnectionState::Connecting,
            LinkState::Connected { .. } => ConnectionState::Connected,
        }
    }

    fn peripheral(&self) -> Option<&PeripheralId> {
        match self {
            LinkState::Connecting { peripheral, .. } | LinkState::Connected { peripheral, .. } => Some(peripheral),
            _ => None,
        }
    }
}

/// The collaborators the engine reports to.
#[derive(Clone)]
pub struct EngineLinks {
    pub store: Arc<StateStore>,
    pub dispatcher: DispatcherHandle,
    pub status: Arc<dyn StatusNotifier>,
}

/// Discover, connect, subscribe and keep reconnecting to the fall sensor.
///
/// Every radio callback and command is handled on one task, one at a time. The engine is the
/// only writer of the connection state and device name in the store.
pub struct LinkEngine<R: Radio> {
    radio: R,
    links: EngineLinks,
    filter: TargetFilter,
    data_characteristic: Uuid,
    reconnect_delay: Duration,
    commands: UnboundedSender<EngineCommand>,

    state: LinkState,
    running: bool,
    // bumped whenever a pending reconnect becomes obsolete
    generation: u64,
    reconnect_cancel: Option<CancellationToken>,
}

impl<R: Radio> LinkEngine<R> {
    pub fn new(radio: R, links: EngineLinks, config: &Config, commands: UnboundedSender<EngineCommand>) -> Self {
        LinkEngine {
            radio,
            links,
            filter: config.target_filter(),
            data_characteristic: config.data_characteristic_uuid,
            reconnect_delay: config.reconnect_delay(),
            commands,
            state: LinkState::Disconnected,
            running: false,
            generation: 0,
            reconnect_cancel: None,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.connection_state()
    }

    fn set_status(&self, text: &str) {
        self.links.status.set_status_text(text);
    }

    fn transition(&mut self, state: LinkState) {
        let previous = self.state.connection_state();
        self.state = state;
        let current = self.state.connection_state();

        if previous != current {
            info!("Connection state {} -> {}", previous, current);
            self.links.store.set_connection_state(current);
        }
    }

    pub fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Start => self.start(),
            EngineCommand::Stop => self.stop(),
            EngineCommand::ReconnectDue { generation } => self.reconnect_due(generation),
        }
    }

    pub fn start(&mut self) {
        if self.running && !matches!(self.state, LinkState::Disconnected) {
            debug!("Start requested while {}; ignoring", self.state.connection_state());
            return;
        }

        // an explicit start while waiting for the backoff supersedes the pending reconnect
        self.running = true;
        self.cancel_reconnect();
        self.begin_scan();
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }

        info!("Stopping link engine");
        self.running = false;
        self.cancel_reconnect();

        match std::mem::replace(&mut self.state, LinkState::Disconnected) {
            LinkState::Scanning => self.radio.stop_scan(),
            LinkState::Connecting { peripheral, .. } | LinkState::Connected { peripheral, .. } => {
                self.radio.release(&peripheral);
            },
            LinkState::Disconnected => {},
        }

        self.links.store.set_connection_state(ConnectionState::Disconnected);
        self.links.store.set_device_name(None);
        // frames already forwarded belong to the stopped session and are dropped
        self.links.dispatcher.reset();
        self.set_status(STATUS_STOPPED);
    }

    fn begin_scan(&mut self) {
        if !self.radio.is_powered_on() {
            warn!("Bluetooth radio is powered off; not scanning until restarted");
            self.transition(LinkState::Disconnected);
            self.set_status(STATUS_RADIO_OFF);
            return;
        }

        info!("Scanning for {} ({})", self.filter.device_name, self.filter.service);
        self.transition(LinkState::Scanning);
        self.set_status(STATUS_SCANNING);
        self.radio.start_scan(&[self.filter.service]);
    }

    fn cancel_reconnect(&mut self) {
        self.generation += 1;
        if let Some(cancel) = self.reconnect_cancel.take() {
            debug!("Cancelling pending reconnect");
            cancel.cancel();
        }
    }

    fn schedule_reconnect(&mut self) {
        self.cancel_reconnect();

        let generation = self.generation;
        let cancel = CancellationToken::new();
        let commands = self.commands.clone();
        let delay = self.reconnect_delay;
        self.reconnect_cancel = Some(cancel.clone());

        info!("Reconnecting in {}", humantime::format_duration(delay));
        spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {},
                _ = sleep(delay) => {
                    // the engine may already be gone during shutdown
                    let _ = commands.unbounded_send(EngineCommand::ReconnectDue { generation });
                },
            }
        });
    }

    fn reconnect_due(&mut self, generation: u64) {
        if !self.running || generation != self.generation || !matches!(self.state, LinkState::Disconnected) {
            debug!("Ignoring stale reconnect");
            return;
        }

        self.reconnect_cancel = None;
        self.begin_scan();
    }

    /// Drops the link after a transient failure and lets the reconnect policy take over.
    fn link_lost(&mut self, reason: Option<DeviceError>) {
        match reason {
            Some(err) => warn!("Connection lost: {}", err),
            None => warn!("Connection lost"),
        }

        if let Some(peripheral) = self.state.peripheral().cloned() {
            self.radio.release(&peripheral);
        }

        self.links.store.set_device_name(None);
        self.transition(LinkState::Disconnected);
        self.set_status(STATUS_RECONNECTING);
        self.schedule_reconnect();
    }

    /// Gives up on the current peripheral without retrying; only an explicit start recovers.
    fn pairing_failed(&mut self, err: DeviceError) {
        error!("Peripheral can not be used: {}", err);

        if let Some(peripheral) = self.state.peripheral().cloned() {
            self.radio.release(&peripheral);
        }

        self.links.store.set_device_name(None);
        self.transition(LinkState::Disconnected);
        self.set_status(STATUS_UNSUPPORTED);
    }

    /// Routes a failure on the current link to the pairing or the reconnect policy.
    fn link_failed(&mut self, err: DeviceError) {
        if err.is_pairing_error() {
            self.pairing_failed(err);
        } else {
            self.link_lost(Some(err));
        }
    }

    fn is_current(&self, peripheral: &PeripheralId) -> bool {
        self.state.peripheral() == Some(peripheral)
    }

    pub fn handle_radio_event(&mut self, event: RadioEvent) {
        if !self.running {
            if let RadioEvent::Connected { peripheral } = &event {
                // a connect that was in flight when we stopped
                self.radio.release(peripheral);
            }
            debug!("Ignoring radio event while stopped: {:?}", event);
            return;
        }

        match event {
            RadioEvent::Advertisement(advertisement) => self.on_advertisement(advertisement),
            RadioEvent::ScanFailed(err) => {
                if matches!(self.state, LinkState::Scanning) {
                    warn!("Scanning failed: {}", err);
                    self.transition(LinkState::Disconnected);
                    self.set_status(STATUS_RECONNECTING);
                    self.schedule_reconnect();
                }
            },
            RadioEvent::Connected { peripheral } => self.on_connected(peripheral),
            RadioEvent::Disconnected { peripheral, reason } => {
                if self.is_current(&peripheral) {
                    self.link_lost(reason);
                } else {
                    debug!("Ignoring disconnect of {}", peripheral);
                }
            },
            RadioEvent::ServicesDiscovered { peripheral, result } => self.on_services_discovered(peripheral, result),
            RadioEvent::DescriptorWritten { peripheral, result } => self.on_descriptor_written(peripheral, result),
            RadioEvent::CharacteristicChanged { peripheral, characteristic, value } => {
                match &self.state {
                    LinkState::Connected { peripheral: current, subscription: Subscription::Subscribed { characteristic: subscribed }, .. }
                        if current == &peripheral && subscribed == &characteristic => {
                        self.links.dispatcher.send_frame(decode_frame(&value));
                    },
                    _ => debug!("Ignoring notification from {} before subscription", peripheral),
                }
            },
        }
    }

    fn on_advertisement(&mut self, advertisement: Advertisement) {
        if !matches!(self.state, LinkState::Scanning) || !self.filter.matches(&advertisement) {
            return;
        }

        info!(
            "Using peripheral {} {} {:?}",
            advertisement.peripheral,
            advertisement.name.as_deref().unwrap_or("NONE"),
            advertisement.services,
        );

        // first match wins
        self.radio.stop_scan();
        self.radio.connect(&advertisement.peripheral);
        self.set_status(&format!("Connecting to {}", advertisement.name.as_deref().unwrap_or("sensor")));
        self.transition(LinkState::Connecting {
            peripheral: advertisement.peripheral,
            name: advertisement.name,
        });
    }

    fn on_connected(&mut self, peripheral: PeripheralId) {
        let name = match &self.state {
            LinkState::Connecting { peripheral: current, name } if current == &peripheral => name.clone(),
            _ => {
                warn!("Unexpected connection to {}; releasing it", peripheral);
                self.radio.release(&peripheral);
                return;
            },
        };

        info!("Connected; Discovering services...");
        self.links.store.set_device_name(name.clone());
        self.set_status(&format!("Connected to {}", name.as_deref().unwrap_or("sensor")));
        self.radio.discover_services(&peripheral);
        self.transition(LinkState::Connected {
            peripheral,
            name,
            subscription: Subscription::DiscoveringServices,
        });
    }

    fn on_services_discovered(&mut self, peripheral: PeripheralId, result: Result<Vec<DiscoveredService>, DeviceError>) {
        match &self.state {
            LinkState::Connected { peripheral: current, subscription: Subscription::DiscoveringServices, .. }
                if current == &peripheral => {},
            _ => {
                debug!("Ignoring service discovery result for {}", peripheral);
                return;
            },
        }

        let services = match result {
            Ok(services) => services,
            Err(err) => {
                warn!("Service discovery failed");
                self.link_failed(err);
                return;
            },
        };

        let characteristic = match self.find_data_characteristic(&services) {
            Ok(characteristic) => characteristic,
            Err(err) => {
                self.link_failed(err);
                return;
            },
        };

        info!("Subscribing to characteristic {} {}", self.filter.service, characteristic);
        if let Err(err) = self.radio.enable_notifications(&peripheral, characteristic) {
            self.link_failed(err);
            return;
        }

        self.radio.write_descriptor(
            &peripheral,
            characteristic,
            CLIENT_CONFIGURATION_DESCRIPTOR_UUID,
            &ENABLE_NOTIFICATION_VALUE,
        );

        if let LinkState::Connected { subscription, .. } = &mut self.state {
            *subscription = Subscription::WritingDescriptor { characteristic };
        }
    }

    fn find_data_characteristic(&self, services: &[DiscoveredService]) -> Result<Uuid, DeviceError> {
        let characteristic = services
            .iter()
            .filter(|service| service.uuid == self.filter.service)
            .flat_map(|service| service.characteristics.iter())
            .find(|characteristic| characteristic.uuid == self.data_characteristic && characteristic.notify)
            .ok_or(DeviceError::MissingCharacteristic)?;

        if !characteristic.descriptors.contains(&CLIENT_CONFIGURATION_DESCRIPTOR_UUID) {
            return Err(DeviceError::MissingDescriptor);
        }

        Ok(characteristic.uuid)
    }

    fn on_descriptor_written(&mut self, peripheral: PeripheralId, result: Result<(), DeviceError>) {
        let characteristic = match &self.state {
            LinkState::Connected { peripheral: current, subscription: Subscription::WritingDescriptor { characteristic }, .. }
                if current == &peripheral => *characteristic,
            _ => {
                debug!("Ignoring descriptor write result for {}", peripheral);
                return;
            },
        };

        if let Err(err) = result {
            warn!("Enabling notifications failed");
            self.link_failed(err);
            return;
        }

        info!("Peripheral ready; waiting for frames");
        if let LinkState::Connected { subscription, .. } = &mut self.state {
            *subscription = Subscription::Subscribed { characteristic };
        }
    }
}

/// Control surface of a running engine task.
pub struct EngineHandle {
    commands: UnboundedSender<EngineCommand>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl EngineHandle {
    fn send(&self, command: EngineCommand) {
        if self.commands.unbounded_send(command).is_err() {
            warn!("Link engine is not running");
        }
    }

    /// Idempotent while the engine is scanning, connecting or connected.
    pub fn start(&self) {
        self.send(EngineCommand::Start);
    }

    pub fn stop(&self) {
        self.send(EngineCommand::Stop);
    }

    /// Stops the engine, releases the radio and waits for the task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();

        if let Err(err) = self.handle.await {
            if err.is_panic() {
                error!("Link engine failed: {}", readable_task_panic_error(&err.into_panic()));
            }
        }
    }
}

pub fn spawn_link_engine<R>(
    cancel: CancellationToken,
    radio: R,
    mut radio_events: UnboundedReceiver<RadioEvent>,
    links: EngineLinks,
    config: &Config,
) -> EngineHandle
where
    R: Radio + Send + 'static,
{
    let (commands, mut command_receiver) = unbounded::<EngineCommand>();
    let mut engine = LinkEngine::new(radio, links, config, commands.clone());
    let task_cancel = cancel.clone();

    let handle = spawn(async move {
        'mainloop: loop {
            tokio::select! {
                _ = task_cancel.cancelled() => {
                    break 'mainloop;
                },
                Some(command) = command_receiver.next() => {
                    engine.handle_command(command);
                },
                Some(event) = radio_events.next() => {
                    engine.handle_radio_event(event);
                },
            }
        }

        engine.stop();
        info!("Link engine stopped");
    });

    EngineHandle { commands, cancel, handle }
}
