use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use btleplug::api::{Central, CentralEvent, CentralState, CharPropFlags, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use log::{debug, info, warn};
use tokio::spawn;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::constants::CLIENT_CONFIGURATION_DESCRIPTOR_UUID;
use crate::device::radio::Radio;
use crate::device::types::{Advertisement, DiscoveredCharacteristic, DiscoveredService, PeripheralId, RadioEvent};
use crate::error::DeviceError;

type PeripheralMap = Arc<Mutex<HashMap<PeripheralId, Peripheral>>>;

fn peripheral_id(id: &btleplug::platform::PeripheralId) -> PeripheralId {
    PeripheralId(format!("{:?}", id))
}

/// [`Radio`] backed by the first bluetooth adapter btleplug finds.
pub struct BtleRadio {
    adapter: Adapter,
    events: UnboundedSender<RadioEvent>,
    peripherals: PeripheralMap,
    powered: Arc<AtomicBool>,
    notifying: HashMap<PeripheralId, Uuid>,
    notification_tasks: HashMap<PeripheralId, CancellationToken>,
    cancel: CancellationToken,
}

impl BtleRadio {
    pub async fn new(cancel: CancellationToken) -> Result<(Self, UnboundedReceiver<RadioEvent>), DeviceError> {
        let manager = Manager::new().await?;
        let adapter = manager.adapters().await?.into_iter().next().ok_or(DeviceError::NoAdapter)?;
        info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));

        let powered = match adapter.adapter_state().await {
            Ok(state) => !matches!(state, CentralState::PoweredOff),
            Err(err) => {
                warn!("Could not query adapter state, assuming powered on: {:?}", err);
                true
            },
        };

        let (events, receiver) = unbounded();
        let radio = BtleRadio {
            adapter,
            events,
            peripherals: Arc::new(Mutex::new(HashMap::new())),
            powered: Arc::new(AtomicBool::new(powered)),
            notifying: HashMap::new(),
            notification_tasks: HashMap::new(),
            cancel,
        };

        radio.pump_central_events().await?;
        Ok((radio, receiver))
    }

    fn lookup(&self, peripheral: &PeripheralId) -> Option<Peripheral> {
        self.peripherals.lock().unwrap_or_else(PoisonError::into_inner).get(peripheral).cloned()
    }

    fn send(events: &UnboundedSender<RadioEvent>, event: RadioEvent) {
        if events.unbounded_send(event).is_err() {
            debug!("Link engine is gone, dropping radio event");
        }
    }

    /// Translates adapter events into advertisements, disconnects and power changes.
    async fn pump_central_events(&self) -> Result<(), DeviceError> {
        let mut central_events = self.adapter.events().await?;
        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let peripherals = self.peripherals.clone();
        let powered = self.powered.clone();
        let cancel = self.cancel.clone();

        spawn(async move {
            'mainloop: loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        break 'mainloop;
                    },
                    event = central_events.next() => match event {
                        None => break 'mainloop,
                        Some(CentralEvent::DeviceDiscovered(id)) | Some(CentralEvent::DeviceUpdated(id)) => {
                            let peripheral = match adapter.peripheral(&id).await {
                                Ok(peripheral) => peripheral,
                                Err(err) => {
                                    warn!("Could not look up peripheral: {:?}", err);
                                    continue;
                                },
                            };

                            match peripheral.properties().await {
                                Err(err) => warn!("Could not query peripheral for properties: {:?}", err),
                                Ok(None) => debug!("Peripheral has no properties"),
                                Ok(Some(properties)) => {
                                    let id = peripheral_id(&id);
                                    peripherals.lock().unwrap_or_else(PoisonError::into_inner).insert(id.clone(), peripheral);
                                    BtleRadio::send(&events, RadioEvent::Advertisement(Advertisement {
                                        peripheral: id,
                                        name: properties.local_name,
                                        services: properties.services,
                                    }));
                                },
                            }
                        },
                        Some(CentralEvent::DeviceDisconnected(id)) => {
                            BtleRadio::send(&events, RadioEvent::Disconnected { peripheral: peripheral_id(&id), reason: None });
                        },
                        Some(CentralEvent::StateUpdate(state)) => {
                            info!("Adapter state changed to {:?}", state);
                            powered.store(!matches!(state, CentralState::PoweredOff), Ordering::SeqCst);
                        },
                        Some(_) => {},
                    },
                }
            }

            debug!("Central event pump stopped");
        });

        Ok(())
    }

    fn stop_notifications(&mut self, peripheral: &PeripheralId) {
        self.notifying.remove(peripheral);
        if let Some(cancel) = self.notification_tasks.remove(peripheral) {
            cancel.cancel();
        }
    }
}

impl Radio for BtleRadio {
    fn is_powered_on(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    fn start_scan(&mut self, services: &[Uuid]) {
        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let filter = ScanFilter { services: services.to_vec() };

        spawn(async move {
            if let Err(err) = adapter.start_scan(filter).await {
                BtleRadio::send(&events, RadioEvent::ScanFailed(err.into()));
            }
        });
    }

    fn stop_scan(&mut self) {
        let adapter = self.adapter.clone();

        spawn(async move {
            if let Err(err) = adapter.stop_scan().await {
                warn!("Failed to stop scanning: {:?}", err);
            }
        });
    }

    fn connect(&mut self, peripheral: &PeripheralId) {
        let events = self.events.clone();
        let id = peripheral.clone();

        let Some(handle) = self.lookup(peripheral) else {
            BtleRadio::send(&events, RadioEvent::Disconnected {
                peripheral: id,
                reason: Some(DeviceError::Radio("peripheral is no longer known to the adapter".to_string())),
            });
            return;
        };

        spawn(async move {
            info!("Connecting to peripheral...");
            let event = match handle.connect().await {
                Ok(()) => RadioEvent::Connected { peripheral: id },
                Err(err) => RadioEvent::Disconnected { peripheral: id, reason: Some(err.into()) },
            };
            BtleRadio::send(&events, event);
        });
    }

    fn discover_services(&mut self, peripheral: &PeripheralId) {
        let events = self.events.clone();
        let id = peripheral.clone();

        let Some(handle) = self.lookup(peripheral) else {
            BtleRadio::send(&events, RadioEvent::ServicesDiscovered {
                peripheral: id,
                result: Err(DeviceError::Radio("peripheral is no longer known to the adapter".to_string())),
            });
            return;
        };

        spawn(async move {
            let result = match handle.discover_services().await {
                Err(err) => Err(err.into()),
                Ok(()) => Ok(handle.services().into_iter().map(|service| DiscoveredService {
                    uuid: service.uuid,
                    characteristics: service.characteristics.into_iter().map(|characteristic| {
                        let notify = characteristic.properties.contains(CharPropFlags::NOTIFY);
                        let mut descriptors: Vec<Uuid> = characteristic.descriptors.iter().map(|d| d.uuid).collect();
                        // some platforms manage the configuration descriptor themselves and do not list it
                        if notify && !descriptors.contains(&CLIENT_CONFIGURATION_DESCRIPTOR_UUID) {
                            descriptors.push(CLIENT_CONFIGURATION_DESCRIPTOR_UUID);
                        }

                        DiscoveredCharacteristic { uuid: characteristic.uuid, notify, descriptors }
                    }).collect(),
                }).collect()),
            };

            BtleRadio::send(&events, RadioEvent::ServicesDiscovered { peripheral: id, result });
        });
    }

    fn enable_notifications(&mut self, peripheral: &PeripheralId, characteristic: Uuid) -> Result<(), DeviceError> {
        if self.lookup(peripheral).is_none() {
            return Err(DeviceError::Radio("peripheral is no longer known to the adapter".to_string()));
        }

        self.notifying.insert(peripheral.clone(), characteristic);
        Ok(())
    }

    fn write_descriptor(&mut self, peripheral: &PeripheralId, characteristic: Uuid, descriptor: Uuid, value: &[u8]) {
        let events = self.events.clone();
        let id = peripheral.clone();
        let delivered = self.notifying.get(peripheral).copied();

        let handle = match self.lookup(peripheral) {
            Some(handle) => handle,
            None => {
                BtleRadio::send(&events, RadioEvent::DescriptorWritten {
                    peripheral: id,
                    result: Err(DeviceError::Radio("peripheral is no longer known to the adapter".to_string())),
                });
                return;
            },
        };

        if descriptor != CLIENT_CONFIGURATION_DESCRIPTOR_UUID {
            warn!("Only the client configuration descriptor is supported, not {}", descriptor);
        }
        debug!("Writing {:?} to {} of {}", value, descriptor, characteristic);

        let cancel = self.cancel.child_token();
        if let Some(previous) = self.notification_tasks.insert(peripheral.clone(), cancel.clone()) {
            previous.cancel();
        }

        spawn(async move {
            // open the stream before subscribing so that the first frame is not missed
            let mut notifications = match handle.notifications().await {
                Ok(stream) => stream,
                Err(err) => {
                    BtleRadio::send(&events, RadioEvent::DescriptorWritten { peripheral: id, result: Err(err.into()) });
                    return;
                },
            };

            let target = handle.characteristics().into_iter().find(|c| c.uuid == characteristic);
            let result = match target {
                None => Err(DeviceError::MissingCharacteristic),
                // subscribe() writes the client configuration descriptor for us
                Some(target) => handle.subscribe(&target).await.map_err(DeviceError::from),
            };
            let subscribed = result.is_ok();
            BtleRadio::send(&events, RadioEvent::DescriptorWritten { peripheral: id.clone(), result });

            if !subscribed {
                return;
            }

            'mainloop: loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        break 'mainloop;
                    },
                    data = notifications.next() => match data {
                        None => break 'mainloop,
                        Some(data) if Some(data.uuid) == delivered => {
                            BtleRadio::send(&events, RadioEvent::CharacteristicChanged {
                                peripheral: id.clone(),
                                characteristic: data.uuid,
                                value: data.value,
                            });
                        },
                        Some(data) => debug!("Ignoring notification from {}", data.uuid),
                    },
                }
            }

            debug!("Notification reader for {} stopped", id);
        });
    }

    fn release(&mut self, peripheral: &PeripheralId) {
        self.stop_notifications(peripheral);

        let Some(handle) = self.lookup(peripheral) else {
            return;
        };

        spawn(async move {
            match handle.is_connected().await {
                Ok(true) => {
                    if let Err(err) = handle.disconnect().await {
                        warn!("Failed to disconnect peripheral: {:?}", err);
                    }
                },
                Ok(false) => {},
                Err(err) => warn!("Error checking for connection state: {:?}", err),
            }
        });
    }
}
