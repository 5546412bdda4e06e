pub mod config;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use brewlink_core::spark::block_types::graphed_values;
use brewlink_core::spark::relations::collect_links;
use brewlink_core::spark::ConnectionSummary;
use brewlink_core::{BrewlinkError, Event, EventBus, SparkServiceModule, SparkServices};

pub use config::BridgeConfig;

#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Core(#[from] BrewlinkError),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Message body as published by the history service on `brewcast/state/...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    /// Publishing service id
    pub key: String,
    #[serde(rename = "type")]
    pub r#type: String,
    pub data: serde_json::Value,
}

/// Parses one `"<topic> <json>"` line into its topic and bus event.
pub fn parse_line(line: &str) -> Result<(String, Event)> {
    let line = line.trim();
    let (topic, body) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| BridgeError::InvalidMessage(format!("missing payload: {}", line)))?;
    if topic.is_empty() {
        return Err(BridgeError::InvalidMessage("empty topic".into()));
    }
    let message: StateMessage = serde_json::from_str(body.trim())
        .map_err(|e| BridgeError::InvalidMessage(format!("{}: {}", topic, e)))?;
    Ok((
        topic.to_string(),
        Event::new(message.r#type, message.key, message.data),
    ))
}

#[derive(Debug, Default)]
pub struct IngressStats {
    pub lines: AtomicU64,
    pub published: AtomicU64,
    pub rejected: AtomicU64,
}

/// Running line ingress
pub struct Ingress {
    pub local_addr: SocketAddr,
    pub stats: Arc<IngressStats>,
    handle: JoinHandle<()>,
}

impl Ingress {
    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Binds `addr` and publishes every well-formed line from every connection
/// on the bus. Malformed lines are logged and skipped.
pub async fn start_ingress(addr: &str, event_bus: Arc<EventBus>) -> Result<Ingress> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let stats = Arc::new(IngressStats::default());
    info!(target: "bridge", addr = %local_addr, "Ingress listening");

    let accept_stats = Arc::clone(&stats);
    let handle = tokio::spawn(async move {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(target: "bridge", error = %e, "Accept failed");
                    continue;
                }
            };
            debug!(target: "bridge", peer = %peer, "Ingress connection");
            tokio::spawn(handle_connection(
                stream,
                Arc::clone(&event_bus),
                Arc::clone(&accept_stats),
            ));
        }
    });

    Ok(Ingress {
        local_addr,
        stats,
        handle,
    })
}

async fn handle_connection(stream: TcpStream, event_bus: Arc<EventBus>, stats: Arc<IngressStats>) {
    let mut lines = LinesStream::new(BufReader::new(stream).lines());
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(target: "bridge", error = %e, "Ingress read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        stats.lines.fetch_add(1, Ordering::Relaxed);

        match parse_line(&line) {
            Ok((topic, event)) => match event_bus.publish(&topic, event).await {
                Ok(delivered) => {
                    stats.published.fetch_add(1, Ordering::Relaxed);
                    debug!(target: "bridge", topic = %topic, delivered, "Published");
                }
                Err(e) => warn!(target: "bridge", topic = %topic, error = %e, "Publish failed"),
            },
            Err(e) => {
                stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(target: "bridge", error = %e, "Rejected ingress line");
            }
        }
    }
}

/// Periodically re-fetches every running service over REST.
///
/// Failures are logged; the loop keeps going.
pub fn spawn_reconcile(services: Arc<SparkServices>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            for id in services.service_ids() {
                let Some(module) = services.get(&id) else {
                    continue;
                };
                match module.fetch_all().await {
                    Ok(synchronized) => {
                        debug!(target: "bridge", service_id = %id, synchronized, "Reconciled")
                    }
                    Err(e) => warn!(target: "bridge", service_id = %id, error = %e, "Reconcile failed"),
                }
            }
        }
    })
}

/// Snapshot of the derived state of one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceReport {
    pub service_id: String,
    pub connection: Option<ConnectionSummary>,
    pub blocks: usize,
    pub volatile_blocks: usize,
    pub relations: usize,
    pub drive_chains: usize,
    pub limited_blocks: Vec<String>,
    pub broken_links: usize,
    /// Numeric graphed fields currently holding a value
    pub graphed_values: usize,
}

pub async fn service_report(module: &SparkServiceModule) -> ServiceReport {
    let relations = module.relations().await.len();
    let drive_chains = module.drive_chains().await.len();
    let mut limited_blocks: Vec<String> = module.limiters().await.into_keys().collect();
    limited_blocks.sort();

    let (connection, blocks, volatile_blocks, broken_links, graphed) = module
        .read(|s| {
            let broken = s
                .repo
                .blocks()
                .iter()
                .flat_map(|b| collect_links(&b.data))
                .filter(|(_, link)| s.repo.is_broken(*link))
                .count();
            let graphed = s.repo.blocks().iter().map(|b| graphed_values(b).len()).sum::<usize>();
            (
                s.status.as_ref().map(|status| status.summary()),
                s.repo.blocks().len(),
                s.repo.volatile_blocks().len(),
                broken,
                graphed,
            )
        })
        .await;

    ServiceReport {
        service_id: module.id().to_string(),
        connection,
        blocks,
        volatile_blocks,
        relations,
        drive_chains,
        limited_blocks,
        broken_links,
        graphed_values: graphed,
    }
}

/// Logs a report for every running service at a fixed period
pub fn spawn_reporter(services: Arc<SparkServices>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            for id in services.service_ids() {
                let Some(module) = services.get(&id) else {
                    continue;
                };
                let report = service_report(&module).await;
                info!(
                    target: "bridge",
                    service_id = %report.service_id,
                    connection = ?report.connection,
                    blocks = report.blocks,
                    volatile = report.volatile_blocks,
                    relations = report.relations,
                    drive_chains = report.drive_chains,
                    limited = ?report.limited_blocks,
                    broken_links = report.broken_links,
                    graphed = report.graphed_values,
                    "Service state"
                );
            }
        }
    })
}
