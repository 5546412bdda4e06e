// Brewlink Core Library
// Spark block synchronization and relation engine

pub mod event;
pub mod spark;
pub mod telemetry;

use std::sync::Arc;

// Export core types
pub use event::{Event, EventBus, EventBusStats, QoSLevel};
pub use spark::{
    Block, BlockAddress, BlockData, BlockFieldAddress, BlockRepository, BlockType, FieldValue, HttpSparkApi,
    Link, Quantity, SparkApi, SparkApiConfig, SparkServiceModule, SparkServices, SparkStatus, SyncState,
    Synchronizer,
};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrewlinkError {
    #[error("Event bus error: {0}")]
    EventBusError(String),

    #[error("Block {0} already exists")]
    DuplicateId(String),

    #[error("Block {0} is volatile")]
    AlreadyVolatile(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Drive cycle detected: {}", .0.join(" -> "))]
    DriveCycle(Vec<String>),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, BrewlinkError>;

/// Core runtime
pub struct Brewlink {
    pub event_bus: Arc<EventBus>,
    pub services: Arc<SparkServices>,
}

impl Brewlink {
    pub async fn new(api: Arc<dyn SparkApi>) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new().await?);
        let services = Arc::new(SparkServices::new(Arc::clone(&event_bus), api));
        Ok(Self {
            event_bus,
            services,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        tracing::info!("Starting Brewlink...");

        self.event_bus.start().await?;

        tracing::info!("Brewlink started successfully");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down Brewlink...");

        self.services.shutdown().await;
        self.event_bus.shutdown().await?;

        tracing::info!("Brewlink shut down successfully");
        Ok(())
    }
}
