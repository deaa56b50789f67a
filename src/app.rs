use std::sync::Arc;
use futures::StreamExt;
use log::{info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::io::ConfigIO;
use crate::device::btle::BtleRadio;
use crate::device::connection::{spawn_link_engine, EngineLinks};
use crate::effects::bus::{AppEvent, EventBus};
use crate::effects::dispatcher::{spawn_dispatcher, Dispatcher, Outputs};
use crate::effects::outputs::{LogHaptics, LogStatusNotifier, StatusNotifier};
use crate::error::AppRunError;
use crate::state::store::StateStore;

/// Stands in for the presentation layer: logs what a UI would render.
fn spawn_observers(cancel: CancellationToken, store: &StateStore, bus: &EventBus) -> JoinHandle<()> {
    let mut states = store.connection_state().subscribe();
    let mut names = store.device_name().subscribe();
    let mut fall_events = bus.register();

    spawn(async move {
        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                Some(state) = states.next() => {
                    info!("Sensor link: {}", state);
                },
                Some(name) = names.next() => {
                    if let Some(name) = name {
                        info!("Sensor: {}", name);
                    }
                },
                Some(event) = fall_events.next() => match event {
                    AppEvent::FallDetected { detected_at } => {
                        warn!("{} at {}", event.event_id(), humantime::format_rfc3339(detected_at));
                    },
                },
            }
        }
    })
}

pub async fn run_link(config_io: ConfigIO) -> Result<(), AppRunError> {
    let config = config_io.read().await?;
    info!("Looking for {} (or any name containing {:?})", config.device_name, config.short_name);

    let cancel = CancellationToken::new();
    let store = Arc::new(StateStore::new());
    let bus = EventBus::new();
    let status: Arc<dyn StatusNotifier> = Arc::new(LogStatusNotifier);

    let observers = spawn_observers(cancel.child_token(), &store, &bus);

    let outputs = Outputs {
        haptics: Arc::new(LogHaptics),
        status: status.clone(),
        bus: bus.clone(),
    };
    let (dispatcher, dispatcher_task) = spawn_dispatcher(
        cancel.child_token(),
        Dispatcher::new(store.clone(), outputs, &config),
    );

    let (radio, radio_events) = BtleRadio::new(cancel.child_token()).await?;
    let engine = spawn_link_engine(
        cancel.child_token(),
        radio,
        radio_events,
        EngineLinks { store: store.clone(), dispatcher, status },
        &config,
    );
    engine.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    engine.shutdown().await;
    cancel.cancel();

    for task in [dispatcher_task, observers] {
        if let Err(err) = task.await {
            warn!("Background task failed: {:?}", err);
        }
    }

    Ok(())
}
