#![allow(dead_code)]

use std::sync::Arc;

use brewlink_core::spark::{Block, SparkStatus};
use brewlink_core::{HttpSparkApi, SparkApiConfig};
use serde_json::{json, Value};

pub const SERVICE: &str = "spark-one";

/// REST client pointed at a closed port; every call fails fast.
pub fn offline_api() -> Arc<HttpSparkApi> {
    Arc::new(HttpSparkApi::with_config(SparkApiConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        timeout_ms: 200,
        ..Default::default()
    }))
}

pub fn block(id: &str, block_type: &str, data: Value) -> Block {
    serde_json::from_value(wire_block(id, block_type, data)).expect("valid wire block")
}

pub fn wire_block(id: &str, block_type: &str, data: Value) -> Value {
    json!({
        "id": id,
        "serviceId": SERVICE,
        "type": block_type,
        "data": data,
    })
}

pub fn status(synchronized: bool) -> SparkStatus {
    SparkStatus {
        service_id: SERVICE.to_string(),
        is_connected: true,
        is_acknowledged: true,
        is_synchronized: synchronized,
        is_compatible_firmware: true,
        is_valid_device_id: true,
        ..Default::default()
    }
}
