#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use sahay_link::config::types::Config;
use sahay_link::device::connection::{spawn_link_engine, EngineHandle, EngineLinks};
use sahay_link::device::constants::{
    CLIENT_CONFIGURATION_DESCRIPTOR_UUID, SAHAY_DATA_CHARACTERISTIC_UUID, SAHAY_DEVICE_NAME, SAHAY_SERVICE_UUID,
};
use sahay_link::device::radio::Radio;
use sahay_link::device::types::{
    Advertisement, DiscoveredCharacteristic, DiscoveredService, PeripheralId, RadioEvent,
};
use sahay_link::effects::bus::{AppEvent, EventBus};
use sahay_link::effects::dispatcher::{spawn_dispatcher, Dispatcher, DispatcherHandle, Outputs};
use sahay_link::effects::outputs::{Haptics, StatusNotifier};
use sahay_link::error::DeviceError;
use sahay_link::state::store::StateStore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    StartScan(Vec<Uuid>),
    StopScan,
    Connect(PeripheralId),
    DiscoverServices(PeripheralId),
    EnableNotifications(PeripheralId, Uuid),
    WriteDescriptor(PeripheralId, Uuid, Uuid, Vec<u8>),
    Release(PeripheralId),
}

#[derive(Clone)]
pub struct MockRadio {
    calls: Arc<Mutex<Vec<RadioCall>>>,
    powered: Arc<AtomicBool>,
}

impl MockRadio {
    pub fn new() -> Self {
        MockRadio {
            calls: Arc::new(Mutex::new(Vec::new())),
            powered: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_powered(&self, powered: bool) {
        self.powered.store(powered, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count<F: Fn(&RadioCall) -> bool>(&self, predicate: F) -> usize {
        self.calls.lock().unwrap().iter().filter(|call| predicate(call)).count()
    }

    pub fn scans(&self) -> usize {
        self.count(|call| matches!(call, RadioCall::StartScan(_)))
    }

    fn record(&self, call: RadioCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Radio for MockRadio {
    fn is_powered_on(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    fn start_scan(&mut self, services: &[Uuid]) {
        self.record(RadioCall::StartScan(services.to_vec()));
    }

    fn stop_scan(&mut self) {
        self.record(RadioCall::StopScan);
    }

    fn connect(&mut self, peripheral: &PeripheralId) {
        self.record(RadioCall::Connect(peripheral.clone()));
    }

    fn discover_services(&mut self, peripheral: &PeripheralId) {
        self.record(RadioCall::DiscoverServices(peripheral.clone()));
    }

    fn enable_notifications(&mut self, peripheral: &PeripheralId, characteristic: Uuid) -> Result<(), DeviceError> {
        self.record(RadioCall::EnableNotifications(peripheral.clone(), characteristic));
        Ok(())
    }

    fn write_descriptor(&mut self, peripheral: &PeripheralId, characteristic: Uuid, descriptor: Uuid, value: &[u8]) {
        self.record(RadioCall::WriteDescriptor(peripheral.clone(), characteristic, descriptor, value.to_vec()));
    }

    fn release(&mut self, peripheral: &PeripheralId) {
        self.record(RadioCall::Release(peripheral.clone()));
    }
}

#[derive(Default)]
pub struct RecordingHaptics {
    pub pulses: Mutex<Vec<Duration>>,
}

impl Haptics for RecordingHaptics {
    fn pulse(&self, duration: Duration) {
        self.pulses.lock().unwrap().push(duration);
    }
}

#[derive(Default)]
pub struct RecordingStatus {
    pub texts: Mutex<Vec<String>>,
}

impl RecordingStatus {
    pub fn last(&self) -> Option<String> {
        self.texts.lock().unwrap().last().cloned()
    }
}

impl StatusNotifier for RecordingStatus {
    fn set_status_text(&self, text: &str) {
        self.texts.lock().unwrap().push(text.to_string());
    }
}

pub fn sensor() -> PeripheralId {
    PeripheralId::from("C0:FF:EE:00:00:01")
}

pub fn advertisement(name: &str) -> RadioEvent {
    RadioEvent::Advertisement(Advertisement {
        peripheral: sensor(),
        name: Some(name.to_string()),
        services: vec![SAHAY_SERVICE_UUID],
    })
}

pub fn sensor_services() -> Vec<DiscoveredService> {
    vec![DiscoveredService {
        uuid: SAHAY_SERVICE_UUID,
        characteristics: vec![DiscoveredCharacteristic {
            uuid: SAHAY_DATA_CHARACTERISTIC_UUID,
            notify: true,
            descriptors: vec![CLIENT_CONFIGURATION_DESCRIPTOR_UUID],
        }],
    }]
}

pub fn frame(text: &str) -> RadioEvent {
    RadioEvent::CharacteristicChanged {
        peripheral: sensor(),
        characteristic: SAHAY_DATA_CHARACTERISTIC_UUID,
        value: text.as_bytes().to_vec(),
    }
}

/// Lets every spawned task run until it blocks, without advancing the paused clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub struct Harness {
    pub radio: MockRadio,
    pub radio_events: UnboundedSender<RadioEvent>,
    pub store: Arc<StateStore>,
    pub haptics: Arc<RecordingHaptics>,
    pub status: Arc<RecordingStatus>,
    pub fall_events: UnboundedReceiver<AppEvent>,
    pub dispatcher: DispatcherHandle,
    pub engine: EngineHandle,
    pub cancel: CancellationToken,
}

impl Harness {
    pub fn new() -> Self {
        let cancel = CancellationToken::new();
        let config = Config::default();
        let radio = MockRadio::new();
        let store = Arc::new(StateStore::new());
        let haptics = Arc::new(RecordingHaptics::default());
        let status = Arc::new(RecordingStatus::default());
        let bus = EventBus::new();
        let fall_events = bus.register();

        let outputs = Outputs {
            haptics: haptics.clone(),
            status: status.clone(),
            bus,
        };
        let (dispatcher, _) = spawn_dispatcher(cancel.child_token(), Dispatcher::new(store.clone(), outputs, &config));

        let (radio_events, receiver) = unbounded();
        let engine = spawn_link_engine(
            cancel.child_token(),
            radio.clone(),
            receiver,
            EngineLinks { store: store.clone(), dispatcher: dispatcher.clone(), status: status.clone() },
            &config,
        );

        Harness { radio, radio_events, store, haptics, status, fall_events, dispatcher, engine, cancel }
    }

    pub async fn send(&self, event: RadioEvent) {
        self.radio_events.unbounded_send(event).unwrap();
        settle().await;
    }

    pub async fn start(&self) {
        self.engine.start();
        settle().await;
    }

    pub async fn stop(&self) {
        self.engine.stop();
        settle().await;
    }

    /// Drives the engine from start to a live notification subscription.
    pub async fn connect(&self) {
        self.start().await;
        self.send(advertisement(SAHAY_DEVICE_NAME)).await;
        self.send(RadioEvent::Connected { peripheral: sensor() }).await;
        self.send(RadioEvent::ServicesDiscovered { peripheral: sensor(), result: Ok(sensor_services()) }).await;
        self.send(RadioEvent::DescriptorWritten { peripheral: sensor(), result: Ok(()) }).await;
    }

    pub fn fall_event_count(&mut self) -> usize {
        let mut count = 0;
        while let Ok(Some(_)) = self.fall_events.try_next() {
            count += 1;
        }
        count
    }
}
