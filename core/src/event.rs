// Event bus implementation
use crate::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Event envelope carried on the bus.
///
/// `source` holds the publishing service key, `payload` the event body
/// exactly as it arrived on the wire. `topic` is set by the bus on publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub timestamp_ms: i64,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: next_id("evt"),
            r#type: event_type.into(),
            topic: String::new(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            source: source.into(),
            payload,
        }
    }
}

/// Delivery guarantee of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QoSLevel {
    /// Drop on full queue or backpressure
    QosRealtime,
    /// Bounded queue, publisher waits
    QosBatched,
    /// Large bounded queue, publisher waits
    QosBackground,
}

/// Subscription information
#[derive(Debug, Clone)]
struct Subscription {
    id: String,
    event_types: Vec<String>,
    qos: QoSLevel,
    sender: mpsc::Sender<Event>,
}

/// Event bus statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBusStats {
    pub total_published: u64,
    pub total_delivered: u64,
    pub active_subscriptions: usize,
    pub dropped_events: u64,
}

/// Event bus core implementation
pub struct EventBus {
    // Topic -> Subscriber list
    subscriptions: Arc<DashMap<String, Vec<Subscription>>>,

    // Statistics
    stats: Arc<DashMap<String, EventBusStats>>,
}

impl EventBus {
    pub async fn new() -> Result<Self> {
        Ok(Self {
            subscriptions: Arc::new(DashMap::new()),
            stats: Arc::new(DashMap::new()),
        })
    }

    pub async fn start(&self) -> Result<()> {
        info!("Event Bus started");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        info!("Event Bus shutting down");
        self.subscriptions.clear();
        Ok(())
    }

    /// Publish event to topic, stamping the topic on the event
    pub async fn publish(&self, topic: &str, mut event: Event) -> Result<u64> {
        debug!("Publishing event {} to topic {}", event.id, topic);
        event.topic = topic.to_string();

        self.update_stats(topic, |stats| stats.total_published += 1);

        // Senders are cloned out so no map guard is held across an await
        let subs: Vec<Subscription> = match self.subscriptions.get(topic) {
            Some(subs) => subs.value().clone(),
            None => {
                debug!("No subscriptions for topic: {}", topic);
                return Ok(0);
            }
        };

        let mut delivered = 0;
        let mut dropped = 0;

        for sub in &subs {
            if !sub.event_types.is_empty() && !sub.event_types.contains(&event.r#type) {
                continue;
            }

            match sub.qos {
                QoSLevel::QosRealtime => {
                    if sub.sender.try_send(event.clone()).is_ok() {
                        delivered += 1;
                    } else {
                        dropped += 1;
                        warn!("Dropped realtime event for subscription {}", sub.id);
                    }
                }
                QoSLevel::QosBatched | QoSLevel::QosBackground => {
                    match sub.sender.send(event.clone()).await {
                        Ok(_) => delivered += 1,
                        Err(_) => {
                            dropped += 1;
                            warn!("Failed to send event to subscription {}", sub.id);
                        }
                    }
                }
            }
        }

        self.update_stats(topic, |stats| {
            stats.total_delivered += delivered;
            stats.dropped_events += dropped;
        });

        Ok(delivered)
    }

    /// Subscribe to topic
    pub async fn subscribe(
        &self,
        topic: String,
        event_types: Vec<String>,
        qos: QoSLevel,
    ) -> Result<(String, mpsc::Receiver<Event>)> {
        self.subscribe_topics(vec![topic], event_types, qos).await
    }

    /// Subscribe to several topics through a single receiver.
    ///
    /// Events published on any of the topics arrive in publish order.
    pub async fn subscribe_topics(
        &self,
        topics: Vec<String>,
        event_types: Vec<String>,
        qos: QoSLevel,
    ) -> Result<(String, mpsc::Receiver<Event>)> {
        let subscription_id = next_id(&format!("sub_{}", topics.join("+")));
        let cap = match qos {
            QoSLevel::QosRealtime => 64,
            QoSLevel::QosBatched => 1024,
            QoSLevel::QosBackground => 4096,
        };
        let (tx, rx) = mpsc::channel(cap);

        for topic in &topics {
            let subscription = Subscription {
                id: subscription_id.clone(),
                event_types: event_types.clone(),
                qos,
                sender: tx.clone(),
            };

            self.subscriptions
                .entry(topic.clone())
                .or_default()
                .push(subscription);

            self.update_stats(topic, |stats| {
                stats.active_subscriptions += 1;
            });
        }

        info!(
            "Created subscription {} for topics {:?}",
            subscription_id, topics
        );
        Ok((subscription_id, rx))
    }

    /// Unsubscribe from all topics of a subscription
    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        for mut entry in self.subscriptions.iter_mut() {
            let topic = entry.key().clone();
            let before = entry.value().len();
            entry.value_mut().retain(|sub| sub.id != subscription_id);
            let removed = before - entry.value().len();

            if removed > 0 {
                self.update_stats(&topic, |stats| {
                    stats.active_subscriptions = stats.active_subscriptions.saturating_sub(removed);
                });
            }
        }

        info!("Unsubscribed {}", subscription_id);
        Ok(())
    }

    /// Get stats
    pub fn get_stats(&self, topic: &str) -> Option<EventBusStats> {
        self.stats.get(topic).map(|s| s.clone())
    }

    fn update_stats<F>(&self, topic: &str, f: F)
    where
        F: FnOnce(&mut EventBusStats),
    {
        let mut entry = self.stats.entry(topic.to_string()).or_default();
        f(entry.value_mut());
    }
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_id(prefix: &str) -> String {
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{}_{:x}_{}", prefix, nanos, seq)
}
