use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::api::SparkApi;
use super::block_types::BlockType;
use super::relations::{
    calculate_drive_chains, calculate_limiters, calculate_relations, checked_drive_chains, driven_block_ids,
};
use super::repository::BlockRepository;
use super::resolver::BlockReference;
use super::types::{
    Block, BlockFieldAddress, FieldValue, Limiters, RelationEdge, SparkExported, SparkStatus, UnitAlternatives,
    UserUnits,
};
use crate::{BrewlinkError, Result};

/// Dashboard widget settings that may reference blocks by id
#[async_trait]
pub trait WidgetConfigStore: Send + Sync {
    /// Point every widget showing `current_id` on `service_id` at `new_id`.
    ///
    /// Returns the number of widgets rewritten.
    async fn rename_block_references(&self, service_id: &str, current_id: &str, new_id: &str) -> Result<usize>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub config: Value,
}

/// Widget store kept in process memory
#[derive(Default)]
pub struct InMemoryWidgetStore {
    widgets: DashMap<String, Widget>,
}

impl InMemoryWidgetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_widget(&self, widget: Widget) {
        self.widgets.insert(widget.id.clone(), widget);
    }

    pub fn widget(&self, id: &str) -> Option<Widget> {
        self.widgets.get(id).map(|w| w.clone())
    }
}

#[async_trait]
impl WidgetConfigStore for InMemoryWidgetStore {
    async fn rename_block_references(&self, service_id: &str, current_id: &str, new_id: &str) -> Result<usize> {
        let mut renamed = 0;
        for mut entry in self.widgets.iter_mut() {
            let widget = entry.value_mut();
            let matches = widget.config.get("serviceId").and_then(Value::as_str) == Some(service_id)
                && widget.config.get("blockId").and_then(Value::as_str) == Some(current_id);
            if !matches {
                continue;
            }
            if let Some(config) = widget.config.as_object_mut() {
                config.insert("blockId".to_string(), Value::String(new_id.to_string()));
            }
            widget.title = new_id.to_string();
            renamed += 1;
        }
        Ok(renamed)
    }
}

/// Everything a service module knows about its controller
#[derive(Debug, Clone, Default)]
pub struct SparkServiceState {
    pub repo: BlockRepository,
    pub status: Option<SparkStatus>,
    pub last_status: Option<DateTime<Utc>>,
    pub discovered_blocks: Vec<String>,
}

impl SparkServiceState {
    pub fn new(service_id: &str) -> Self {
        Self {
            repo: BlockRepository::new(service_id),
            ..Default::default()
        }
    }

    pub fn update_status(&mut self, status: SparkStatus) {
        self.status = Some(status);
        self.last_status = Some(Utc::now());
    }
}

/// Per-service action layer.
///
/// Local mutations are applied under the state lock. Backend mutations are
/// sent to the API; their effect arrives later as a patch event.
pub struct SparkServiceModule {
    id: String,
    api: Arc<dyn SparkApi>,
    state: RwLock<SparkServiceState>,
    widgets: Option<Arc<dyn WidgetConfigStore>>,
}

impl SparkServiceModule {
    pub fn new(service_id: impl Into<String>, api: Arc<dyn SparkApi>) -> Self {
        let id = service_id.into();
        Self {
            state: RwLock::new(SparkServiceState::new(&id)),
            id,
            api,
            widgets: None,
        }
    }

    pub fn with_widget_store(mut self, widgets: Arc<dyn WidgetConfigStore>) -> Self {
        self.widgets = Some(widgets);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Runs `f` against the current state under a read lock
    pub async fn read<R>(&self, f: impl FnOnce(&SparkServiceState) -> R) -> R {
        f(&*self.state.read().await)
    }

    pub(crate) async fn write<R>(&self, f: impl FnOnce(&mut SparkServiceState) -> R) -> R {
        f(&mut *self.state.write().await)
    }

    // Reads

    pub async fn blocks(&self) -> Vec<Block> {
        self.read(|s| s.repo.blocks().to_vec()).await
    }

    pub async fn volatile_blocks(&self) -> Vec<Block> {
        self.read(|s| s.repo.volatile_blocks().to_vec()).await
    }

    pub async fn block_ids(&self) -> Vec<String> {
        self.read(|s| s.repo.block_ids()).await
    }

    pub async fn block_by_id(&self, id: &str) -> Option<Block> {
        self.read(|s| s.repo.block_by_id(id).cloned()).await
    }

    pub async fn resolve<R: BlockReference + Sync + ?Sized>(&self, reference: &R) -> Option<Block> {
        self.read(|s| s.repo.resolve(reference).cloned()).await
    }

    pub async fn field_by_address(&self, addr: &BlockFieldAddress) -> Option<FieldValue> {
        self.read(|s| s.repo.field_by_address(addr).cloned()).await
    }

    pub async fn blocks_by_type(&self, block_type: &BlockType) -> Vec<Block> {
        self.read(|s| s.repo.blocks_by_type(block_type).cloned().collect()).await
    }

    pub async fn status(&self) -> Option<SparkStatus> {
        self.read(|s| s.status.clone()).await
    }

    pub async fn last_status(&self) -> Option<DateTime<Utc>> {
        self.read(|s| s.last_status).await
    }

    pub async fn last_blocks(&self) -> Option<DateTime<Utc>> {
        self.read(|s| s.repo.last_blocks()).await
    }

    pub async fn discovered_blocks(&self) -> Vec<String> {
        self.read(|s| s.discovered_blocks.clone()).await
    }

    // Derived views, recomputed from the persistent blocks on every call

    pub async fn relations(&self) -> Vec<RelationEdge> {
        self.read(|s| calculate_relations(s.repo.blocks())).await
    }

    pub async fn drive_chains(&self) -> Vec<Vec<String>> {
        self.read(|s| calculate_drive_chains(s.repo.blocks())).await
    }

    pub async fn checked_drive_chains(&self) -> Result<Vec<Vec<String>>> {
        self.read(|s| checked_drive_chains(s.repo.blocks())).await
    }

    pub async fn driven_block_ids(&self) -> Vec<String> {
        self.read(|s| driven_block_ids(s.repo.blocks())).await
    }

    pub async fn limiters(&self) -> Limiters {
        self.read(|s| calculate_limiters(s.repo.blocks())).await
    }

    // Local state updates

    pub async fn set_block(&self, block: Block) {
        self.write(|s| s.repo.set_block(block)).await
    }

    pub async fn update_blocks(&self, blocks: Vec<Block>) {
        self.write(|s| s.repo.update_blocks(blocks)).await
    }

    pub async fn patch_blocks(&self, changed: Vec<Block>, deleted: &[String]) {
        self.write(|s| s.repo.patch_blocks(changed, deleted)).await
    }

    pub async fn update_status(&self, status: SparkStatus) {
        self.write(|s| s.update_status(status)).await
    }

    pub async fn invalidate_blocks(&self) {
        self.write(|s| s.repo.invalidate_blocks()).await
    }

    // Actions

    pub async fn fetch_block(&self, block: &Block) -> Result<()> {
        let fetched = self.api.fetch_block(block).await?;
        self.set_block(fetched).await;
        Ok(())
    }

    pub async fn fetch_blocks(&self) -> Result<()> {
        let blocks = self.api.fetch_blocks(&self.id).await?;
        debug!(service_id = %self.id, count = blocks.len(), "Fetched blocks");
        self.update_blocks(blocks).await;
        Ok(())
    }

    pub async fn create_block(&self, block: &Block) -> Result<()> {
        if block.is_volatile() {
            return Err(BrewlinkError::AlreadyVolatile(block.id.clone()));
        }
        self.api.create_block(block).await?;
        Ok(())
    }

    pub async fn create_volatile_block(&self, block: Block) -> Result<()> {
        self.write(|s| s.repo.create_volatile_block(block)).await
    }

    pub async fn save_block(&self, block: Block) -> Result<()> {
        if block.is_volatile() {
            return self.write(|s| s.repo.save_volatile_block(block)).await;
        }
        self.api.persist_block(&block).await?;
        Ok(())
    }

    /// Resolves `reference`, applies `f` to a copy and saves the result.
    ///
    /// Does nothing when the reference resolves to no block.
    pub async fn modify_block<R, F>(&self, reference: &R, f: F) -> Result<()>
    where
        R: BlockReference + Sync + ?Sized,
        F: FnOnce(Block) -> Block,
    {
        match self.resolve(reference).await {
            Some(actual) => self.save_block(f(actual)).await,
            None => Ok(()),
        }
    }

    pub async fn remove_block(&self, block: &Block) -> Result<()> {
        if block.is_volatile() {
            self.remove_volatile_block(&block.id).await;
            return Ok(());
        }
        self.api.delete_block(block).await
    }

    pub async fn remove_volatile_block(&self, id: &str) -> Option<Block> {
        self.write(|s| s.repo.remove_volatile_block(id)).await
    }

    #[tracing::instrument(skip(self), fields(service_id = %self.id))]
    pub async fn rename_block(&self, current_id: &str, new_id: &str) -> Result<()> {
        let renamed_locally = self
            .write(|s| -> Result<bool> {
                if s.repo.block_by_id(new_id).is_some() {
                    return Err(BrewlinkError::DuplicateId(new_id.to_string()));
                }
                if s.repo.is_volatile_id(current_id) {
                    s.repo.rename_volatile_block(current_id, new_id)?;
                    return Ok(true);
                }
                Ok(false)
            })
            .await?;
        if renamed_locally {
            return Ok(());
        }

        self.api.rename_block(&self.id, current_id, new_id).await?;
        self.fetch_blocks().await?;

        if let Some(widgets) = &self.widgets {
            let count = widgets.rename_block_references(&self.id, current_id, new_id).await?;
            info!(service_id = %self.id, widgets = count, "Renamed block references in widgets");
        }
        Ok(())
    }

    pub async fn clear_blocks(&self) -> Result<()> {
        self.api.clear_blocks(&self.id).await?;
        self.fetch_blocks().await
    }

    pub async fn save_auto_connecting(&self, enabled: bool) -> Result<()> {
        self.api.persist_autoconnecting(&self.id, enabled).await?;
        Ok(())
    }

    /// Fetches newly discovered block ids and appends them to the local list
    pub async fn fetch_discovered_blocks(&self) -> Result<Vec<String>> {
        let discovered = self.api.fetch_discovered_blocks(&self.id).await?;
        self.write(|s| s.discovered_blocks.extend(discovered.iter().cloned()))
            .await;
        Ok(discovered)
    }

    pub async fn clear_discovered_blocks(&self) {
        self.write(|s| s.discovered_blocks.clear()).await
    }

    pub async fn clean_unused_names(&self) -> Result<Vec<String>> {
        self.api.clean_unused_names(&self.id).await
    }

    pub async fn fetch_compatible_blocks(&self, block_type: &str) -> Result<Vec<String>> {
        self.api.fetch_compatible_blocks(&self.id, block_type).await
    }

    pub async fn fetch_units(&self) -> Result<UserUnits> {
        self.api.fetch_units(&self.id).await
    }

    pub async fn persist_units(&self, units: &UserUnits) -> Result<UserUnits> {
        self.api.persist_units(&self.id, units).await
    }

    pub async fn fetch_unit_alternatives(&self) -> Result<UnitAlternatives> {
        self.api.fetch_unit_alternatives(&self.id).await
    }

    /// Refreshes status, and blocks plus discovery when the controller is
    /// synchronized. Returns whether it was.
    pub async fn fetch_all(&self) -> Result<bool> {
        let status = self.api.fetch_spark_status(&self.id).await?;
        let synchronized = status.is_synchronized;
        self.update_status(status).await;

        if synchronized {
            tokio::try_join!(self.fetch_discovered_blocks(), self.fetch_blocks())?;
        } else {
            debug!(service_id = %self.id, "Controller not synchronized; skipping block fetch");
        }
        Ok(synchronized)
    }

    pub async fn flash_firmware(&self) -> Result<Value> {
        self.api.flash_firmware(&self.id).await
    }

    pub async fn service_export(&self) -> Result<SparkExported> {
        self.api.service_export(&self.id).await
    }

    pub async fn service_import(&self, exported: &SparkExported) -> Result<Vec<String>> {
        let messages = self.api.service_import(&self.id, exported).await?;
        self.fetch_blocks().await?;
        Ok(messages)
    }

    pub async fn controller_reboot(&self) -> Result<()> {
        self.api.controller_reboot(&self.id).await
    }

    pub async fn service_reboot(&self) -> Result<()> {
        self.api.service_reboot(&self.id).await
    }
}
