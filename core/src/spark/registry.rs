use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use super::api::SparkApi;
use super::module::{SparkServiceModule, WidgetConfigStore};
use super::sync::Synchronizer;
use crate::{BrewlinkError, EventBus, Result};

#[derive(Clone)]
struct ServiceHandle {
    module: Arc<SparkServiceModule>,
    synchronizer: Arc<Synchronizer>,
}

/// Service id -> running Spark service module
pub struct SparkServices {
    services: Arc<DashMap<String, ServiceHandle>>,
    event_bus: Arc<EventBus>,
    api: Arc<dyn SparkApi>,
    widgets: Option<Arc<dyn WidgetConfigStore>>,
}

impl SparkServices {
    pub fn new(event_bus: Arc<EventBus>, api: Arc<dyn SparkApi>) -> Self {
        Self {
            services: Arc::new(DashMap::new()),
            event_bus,
            api,
            widgets: None,
        }
    }

    pub fn with_widget_store(mut self, widgets: Arc<dyn WidgetConfigStore>) -> Self {
        self.widgets = Some(widgets);
        self
    }

    /// Creates and starts the module for `service_id`, or returns the
    /// running one.
    pub async fn start_service(&self, service_id: &str) -> Result<Arc<SparkServiceModule>> {
        // Handle is cloned out so no map guard is held across an await
        let handle = self
            .services
            .entry(service_id.to_string())
            .or_insert_with(|| {
                let mut module = SparkServiceModule::new(service_id, Arc::clone(&self.api));
                if let Some(widgets) = &self.widgets {
                    module = module.with_widget_store(Arc::clone(widgets));
                }
                let module = Arc::new(module);
                let synchronizer = Arc::new(Synchronizer::new(Arc::clone(&module), Arc::clone(&self.event_bus)));
                ServiceHandle { module, synchronizer }
            })
            .value()
            .clone();

        handle.synchronizer.start().await?;
        info!(service_id = %service_id, "Spark service started");
        Ok(handle.module)
    }

    pub async fn stop_service(&self, service_id: &str) -> Result<()> {
        let (_, handle) = self
            .services
            .remove(service_id)
            .ok_or_else(|| BrewlinkError::ServiceNotFound(service_id.to_string()))?;
        handle.synchronizer.stop().await?;
        info!(service_id = %service_id, "Spark service stopped");
        Ok(())
    }

    pub fn get(&self, service_id: &str) -> Option<Arc<SparkServiceModule>> {
        self.services.get(service_id).map(|h| Arc::clone(&h.module))
    }

    pub fn module(&self, service_id: &str) -> Result<Arc<SparkServiceModule>> {
        self.get(service_id)
            .ok_or_else(|| BrewlinkError::ServiceNotFound(service_id.to_string()))
    }

    pub fn synchronizer(&self, service_id: &str) -> Option<Arc<Synchronizer>> {
        self.services.get(service_id).map(|h| Arc::clone(&h.synchronizer))
    }

    pub fn service_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub async fn shutdown(&self) {
        let ids = self.service_ids();
        for id in ids {
            if let Err(e) = self.stop_service(&id).await {
                warn!(service_id = %id, error = %e, "Failed to stop Spark service");
            }
        }
    }
}
