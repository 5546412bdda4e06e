use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::module::SparkServiceModule;
use super::types::{SparkPatchPayload, SparkStatePayload};
use super::{patch_topic, state_topic, SPARK_PATCH_EVENT, SPARK_STATE_EVENT};
use crate::{BrewlinkError, Event, EventBus, QoSLevel, Result};

/// Lifecycle of a synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Stopped,
    Starting,
    /// Latest status reports the controller as synchronized
    Synchronized,
    /// Subscribed, but the controller is offline or not yet synchronized
    Unsynchronized,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub state_events: u64,
    pub patch_events: u64,
    pub malformed_events: u64,
}

#[derive(Default)]
struct SyncCounters {
    state_events: AtomicU64,
    patch_events: AtomicU64,
    malformed_events: AtomicU64,
}

struct Running {
    subscription_id: String,
    consumer: JoinHandle<()>,
}

/// Keeps one service module in step with the controller.
///
/// A single subscription covers the state and patch topics, so events are
/// applied strictly in arrival order by one consumer task.
pub struct Synchronizer {
    module: Arc<SparkServiceModule>,
    event_bus: Arc<EventBus>,
    state_tx: Arc<watch::Sender<SyncState>>,
    counters: Arc<SyncCounters>,
    running: Mutex<Option<Running>>,
}

impl Synchronizer {
    pub fn new(module: Arc<SparkServiceModule>, event_bus: Arc<EventBus>) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Stopped);
        Self {
            module,
            event_bus,
            state_tx: Arc::new(state_tx),
            counters: Arc::new(SyncCounters::default()),
            running: Mutex::new(None),
        }
    }

    pub fn module(&self) -> &Arc<SparkServiceModule> {
        &self.module
    }

    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    /// Receiver that observes every state transition
    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            state_events: self.counters.state_events.load(Ordering::Relaxed),
            patch_events: self.counters.patch_events.load(Ordering::Relaxed),
            malformed_events: self.counters.malformed_events.load(Ordering::Relaxed),
        }
    }

    /// Subscribes to the service topics, then performs an initial fetch.
    ///
    /// A failing fetch is logged and does not fail the start; the next
    /// full-state event brings the module up to date. Calling `start` on a
    /// running synchronizer is a no-op.
    #[tracing::instrument(skip(self), fields(service_id = %self.module.id()))]
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }
        self.state_tx.send_replace(SyncState::Starting);

        let service_id = self.module.id().to_string();
        let (subscription_id, rx) = self
            .event_bus
            .subscribe_topics(
                vec![state_topic(&service_id), patch_topic(&service_id)],
                vec![],
                QoSLevel::QosBatched,
            )
            .await?;

        let consumer = tokio::spawn(consume_events(
            rx,
            Arc::clone(&self.module),
            Arc::clone(&self.counters),
            Arc::clone(&self.state_tx),
        ));
        *running = Some(Running {
            subscription_id,
            consumer,
        });
        drop(running);

        match self.module.fetch_all().await {
            Ok(synchronized) => {
                self.state_tx.send_if_modified(|state| {
                    if *state == SyncState::Starting {
                        *state = sync_state(synchronized);
                        true
                    } else {
                        false
                    }
                });
            }
            Err(e) => {
                warn!(service_id = %service_id, error = %e, "Initial fetch failed; waiting for state events");
                self.state_tx.send_if_modified(|state| {
                    if *state == SyncState::Starting {
                        *state = SyncState::Unsynchronized;
                        true
                    } else {
                        false
                    }
                });
            }
        }

        info!(service_id = %service_id, state = ?self.state(), "Synchronizer started");
        Ok(())
    }

    /// Unsubscribes and halts the consumer task.
    ///
    /// Once this returns, no further event mutates the module.
    pub async fn stop(&self) -> Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };
        self.event_bus.unsubscribe(&running.subscription_id).await?;
        running.consumer.abort();
        // Wait for the abort so an in-flight event cannot land afterwards
        let _ = running.consumer.await;

        self.state_tx.send_replace(SyncState::Stopped);
        info!(service_id = %self.module.id(), "Synchronizer stopped");
        Ok(())
    }
}

fn sync_state(synchronized: bool) -> SyncState {
    if synchronized {
        SyncState::Synchronized
    } else {
        SyncState::Unsynchronized
    }
}

async fn consume_events(
    mut rx: mpsc::Receiver<Event>,
    module: Arc<SparkServiceModule>,
    counters: Arc<SyncCounters>,
    state_tx: Arc<watch::Sender<SyncState>>,
) {
    while let Some(event) = rx.recv().await {
        match apply_event(&module, &event).await {
            Ok(Some(synchronized)) => {
                counters.state_events.fetch_add(1, Ordering::Relaxed);
                state_tx.send_replace(sync_state(synchronized));
            }
            Ok(None) => {
                counters.patch_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.malformed_events.fetch_add(1, Ordering::Relaxed);
                debug!(
                    service_id = %module.id(),
                    event_id = %event.id,
                    error = %e,
                    "Dropped event"
                );
            }
        }
    }
    debug!(service_id = %module.id(), "Event stream closed");
}

/// Event type each service topic carries
fn expected_type(service_id: &str, topic: &str) -> Option<&'static str> {
    if topic == state_topic(service_id) {
        Some(SPARK_STATE_EVENT)
    } else if topic == patch_topic(service_id) {
        Some(SPARK_PATCH_EVENT)
    } else {
        None
    }
}

/// Applies one event. Returns the reported synchronization flag for
/// full-state events and `None` for patches.
///
/// The event type must match the topic it was delivered on.
pub async fn apply_event(module: &SparkServiceModule, event: &Event) -> Result<Option<bool>> {
    match expected_type(module.id(), &event.topic) {
        Some(expected) if expected == event.r#type => {}
        Some(expected) => {
            return Err(BrewlinkError::MalformedEvent(format!(
                "{} on {} (expected {})",
                event.r#type, event.topic, expected
            )))
        }
        None => {
            return Err(BrewlinkError::MalformedEvent(format!(
                "unexpected topic: {}",
                event.topic
            )))
        }
    }

    match event.r#type.as_str() {
        SPARK_STATE_EVENT => {
            let SparkStatePayload { mut status, blocks } = serde_json::from_value(event.payload.clone())
                .map_err(|e| BrewlinkError::MalformedEvent(format!("{}: {}", event.r#type, e)))?;
            status.service_id = module.id().to_string();
            let synchronized = status.is_synchronized;
            module
                .write(|s| {
                    s.repo.update_blocks(blocks);
                    s.update_status(status);
                })
                .await;
            Ok(Some(synchronized))
        }
        SPARK_PATCH_EVENT => {
            let SparkPatchPayload { changed, deleted } = serde_json::from_value(event.payload.clone())
                .map_err(|e| BrewlinkError::MalformedEvent(format!("{}: {}", event.r#type, e)))?;
            module.patch_blocks(changed, &deleted).await;
            Ok(None)
        }
        other => Err(BrewlinkError::MalformedEvent(format!(
            "unknown event type: {}",
            other
        ))),
    }
}
