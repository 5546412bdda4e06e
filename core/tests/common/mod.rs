//! Shared test fixtures
//!
//! - `FakeSparkApi`: in-memory controller backend recording every call
//! - `block`: builds a block from its wire representation

#![allow(dead_code)]

use brewlink_core::spark::{
    Block, SparkApi, SparkExported, SparkStatus, UnitAlternatives, UserUnits,
};
use brewlink_core::{BrewlinkError, Result};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub const SERVICE: &str = "spark-one";

/// Builds a block the way the controller sends it, so postfixed keys go
/// through the wire codec.
pub fn block(id: &str, block_type: &str, data: Value) -> Block {
    serde_json::from_value(json!({
        "id": id,
        "serviceId": SERVICE,
        "type": block_type,
        "data": data,
    }))
    .expect("valid wire block")
}

pub fn synchronized_status() -> SparkStatus {
    SparkStatus {
        service_id: SERVICE.to_string(),
        is_connected: true,
        is_acknowledged: true,
        is_synchronized: true,
        is_compatible_firmware: true,
        is_valid_device_id: true,
        ..Default::default()
    }
}

/// Backend fake holding a block list
#[derive(Default)]
pub struct FakeSparkApi {
    pub blocks: Mutex<Vec<Block>>,
    pub status: Mutex<SparkStatus>,
    pub discovered: Mutex<Vec<String>>,
    pub units: Mutex<UserUnits>,
    pub calls: Mutex<Vec<String>>,
    pub offline: AtomicBool,
}

impl FakeSparkApi {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self {
            blocks: Mutex::new(blocks),
            status: Mutex::new(synchronized_status()),
            ..Default::default()
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) -> Result<()> {
        self.calls.lock().unwrap().push(call.to_string());
        if self.offline.load(Ordering::SeqCst) {
            return Err(BrewlinkError::BackendUnavailable("offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SparkApi for FakeSparkApi {
    async fn fetch_block(&self, block: &Block) -> Result<Block> {
        self.record("fetch_block")?;
        self.blocks
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.id == block.id)
            .cloned()
            .ok_or_else(|| BrewlinkError::NotFound(block.id.clone()))
    }

    async fn fetch_blocks(&self, _service_id: &str) -> Result<Vec<Block>> {
        self.record("fetch_blocks")?;
        Ok(self.blocks.lock().unwrap().clone())
    }

    async fn create_block(&self, block: &Block) -> Result<Block> {
        self.record("create_block")?;
        Ok(block.clone())
    }

    async fn persist_block(&self, block: &Block) -> Result<Block> {
        self.record("persist_block")?;
        Ok(block.clone())
    }

    async fn delete_block(&self, _block: &Block) -> Result<()> {
        self.record("delete_block")
    }

    async fn rename_block(&self, _service_id: &str, current_id: &str, new_id: &str) -> Result<()> {
        self.record("rename_block")?;
        for b in self.blocks.lock().unwrap().iter_mut() {
            if b.id == current_id {
                b.id = new_id.to_string();
            }
        }
        Ok(())
    }

    async fn clear_blocks(&self, _service_id: &str) -> Result<()> {
        self.record("clear_blocks")?;
        self.blocks.lock().unwrap().clear();
        Ok(())
    }

    async fn fetch_compatible_blocks(&self, _service_id: &str, block_type: &str) -> Result<Vec<String>> {
        self.record("fetch_compatible_blocks")?;
        let constraint = brewlink_core::spark::BlockOrIntfType::from(block_type.to_string());
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.block_type.satisfies(&constraint))
            .map(|b| b.id.clone())
            .collect())
    }

    async fn fetch_discovered_blocks(&self, _service_id: &str) -> Result<Vec<String>> {
        self.record("fetch_discovered_blocks")?;
        Ok(std::mem::take(&mut *self.discovered.lock().unwrap()))
    }

    async fn fetch_units(&self, _service_id: &str) -> Result<UserUnits> {
        self.record("fetch_units")?;
        Ok(self.units.lock().unwrap().clone())
    }

    async fn persist_units(&self, _service_id: &str, units: &UserUnits) -> Result<UserUnits> {
        self.record("persist_units")?;
        *self.units.lock().unwrap() = units.clone();
        Ok(units.clone())
    }

    async fn fetch_unit_alternatives(&self, _service_id: &str) -> Result<UnitAlternatives> {
        self.record("fetch_unit_alternatives")?;
        Ok(UnitAlternatives::from([(
            "temperature".to_string(),
            vec!["degC".to_string(), "degF".to_string()],
        )]))
    }

    async fn fetch_spark_status(&self, _service_id: &str) -> Result<SparkStatus> {
        self.record("fetch_spark_status")?;
        Ok(self.status.lock().unwrap().clone())
    }

    async fn persist_autoconnecting(&self, _service_id: &str, enabled: bool) -> Result<bool> {
        self.record("persist_autoconnecting")?;
        self.status.lock().unwrap().is_autoconnecting = enabled;
        Ok(enabled)
    }

    async fn flash_firmware(&self, _service_id: &str) -> Result<Value> {
        self.record("flash_firmware")?;
        Ok(json!({"address": "flash"}))
    }

    async fn service_export(&self, _service_id: &str) -> Result<SparkExported> {
        self.record("service_export")?;
        Ok(SparkExported {
            blocks: self.blocks.lock().unwrap().clone(),
            store: vec![],
        })
    }

    async fn service_import(&self, _service_id: &str, exported: &SparkExported) -> Result<Vec<String>> {
        self.record("service_import")?;
        *self.blocks.lock().unwrap() = exported.blocks.clone();
        Ok(vec![format!("imported {} blocks", exported.blocks.len())])
    }

    async fn controller_reboot(&self, _service_id: &str) -> Result<()> {
        self.record("controller_reboot")
    }

    async fn service_reboot(&self, _service_id: &str) -> Result<()> {
        self.record("service_reboot")
    }

    async fn clean_unused_names(&self, _service_id: &str) -> Result<Vec<String>> {
        self.record("clean_unused_names")?;
        Ok(vec!["unused-1".to_string()])
    }
}
