//! Spark data model: blocks, typed field values and derived records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::block_types::{BlockOrIntfType, BlockType};
use super::parse::WireBlock;

/// Numeric value with a unit, decoded from `name[unit]` fields
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: Option<f64>,
    pub unit: String,
}

impl Quantity {
    pub fn new(value: impl Into<Option<f64>>, unit: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            unit: unit.into(),
        }
    }
}

/// Typed reference to another block, decoded from `name<type,driven>` fields
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Link {
    pub id: Option<String>,
    pub link_type: Option<BlockOrIntfType>,
    pub driven: bool,
}

impl Link {
    pub fn new(id: Option<&str>, link_type: Option<BlockOrIntfType>) -> Self {
        Self {
            id: id.map(str::to_string),
            link_type,
            driven: false,
        }
    }

    pub fn driven(mut self) -> Self {
        self.driven = true;
        self
    }

    /// Referenced id, treating an empty string as unset
    pub fn target(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Value of a block data field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// null, bool, number or string
    Scalar(serde_json::Value),
    Quantity(Quantity),
    Link(Link),
    List(Vec<FieldValue>),
    Object(BlockData),
}

impl FieldValue {
    pub fn null() -> Self {
        FieldValue::Scalar(serde_json::Value::Null)
    }

    pub fn as_link(&self) -> Option<&Link> {
        match self {
            FieldValue::Link(link) => Some(link),
            _ => None,
        }
    }

    pub fn as_quantity(&self) -> Option<&Quantity> {
        match self {
            FieldValue::Quantity(qty) => Some(qty),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BlockData> {
        match self {
            FieldValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Scalar(v) => v.as_bool(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Scalar(v) => v.as_f64(),
            FieldValue::Quantity(q) => q.value,
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(v) => v.as_str(),
            _ => None,
        }
    }
}

impl From<Quantity> for FieldValue {
    fn from(value: Quantity) -> Self {
        FieldValue::Quantity(value)
    }
}

impl From<Link> for FieldValue {
    fn from(value: Link) -> Self {
        FieldValue::Link(value)
    }
}

impl From<BlockData> for FieldValue {
    fn from(value: BlockData) -> Self {
        FieldValue::Object(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        FieldValue::List(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Scalar(value.into())
    }
}

/// Field map that keeps declaration order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockData {
    fields: Vec<(String, FieldValue)>,
}

impl BlockData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut FieldValue> {
        self.fields
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Replaces an existing field in place, or appends a new one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(existing) => Some(std::mem::replace(existing, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let idx = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(idx).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for BlockData {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        let mut data = BlockData::new();
        for (k, v) in iter {
            data.insert(k, v);
        }
        data
    }
}

impl<const N: usize> From<[(&str, FieldValue); N]> for BlockData {
    fn from(pairs: [(&str, FieldValue); N]) -> Self {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockMeta {
    #[serde(default)]
    pub volatile: bool,
}

/// Controller-managed block.
///
/// (De)serialization goes through the postfix wire codec, so a `Block`
/// read from JSON always carries typed quantities and links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireBlock", into = "WireBlock")]
pub struct Block {
    pub id: String,
    pub nid: Option<u32>,
    pub service_id: String,
    pub block_type: BlockType,
    pub data: BlockData,
    pub meta: Option<BlockMeta>,
}

impl Block {
    pub fn new(
        service_id: impl Into<String>,
        id: impl Into<String>,
        block_type: BlockType,
        data: BlockData,
    ) -> Self {
        Self {
            id: id.into(),
            nid: None,
            service_id: service_id.into(),
            block_type,
            data,
            meta: None,
        }
    }

    pub fn is_volatile(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.volatile)
    }

    pub fn address(&self) -> BlockAddress {
        BlockAddress {
            service_id: Some(self.service_id.clone()),
            id: Some(self.id.clone()),
            block_type: Some(BlockOrIntfType::Block(self.block_type.clone())),
        }
    }
}

/// Locator for a block that may or may not exist
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockAddress {
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub block_type: Option<BlockOrIntfType>,
}

impl BlockAddress {
    pub fn new(service_id: &str, id: Option<&str>, block_type: Option<BlockOrIntfType>) -> Self {
        Self {
            service_id: Some(service_id.to_string()),
            id: id.map(str::to_string),
            block_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockFieldAddress {
    #[serde(flatten)]
    pub address: BlockAddress,
    #[serde(default)]
    pub field: Option<String>,
}

/// Link discovered while scanning block data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub source: String,
    pub target: String,
    pub relation: Vec<String>,
}

/// Limited block id -> descriptions of the blocks limiting it
pub type Limiters = HashMap<String, Vec<String>>;

pub fn limitation_string(limitations: &[String]) -> Option<String> {
    if limitations.is_empty() {
        None
    } else {
        Some(limitations.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SparkStatus {
    pub service_id: String,
    pub is_autoconnecting: bool,
    pub is_connected: bool,
    pub is_acknowledged: bool,
    pub is_synchronized: bool,
    pub is_compatible_firmware: bool,
    pub is_latest_firmware: bool,
    pub is_valid_device_id: bool,
    pub connection_kind: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionSummary {
    Synchronized,
    Acknowledged,
    Connected,
    Incompatible,
    Disconnected,
}

impl SparkStatus {
    pub fn summary(&self) -> ConnectionSummary {
        if !self.is_connected {
            ConnectionSummary::Disconnected
        } else if self.is_acknowledged && !(self.is_compatible_firmware && self.is_valid_device_id) {
            ConnectionSummary::Incompatible
        } else if self.is_synchronized {
            ConnectionSummary::Synchronized
        } else if self.is_acknowledged {
            ConnectionSummary::Acknowledged
        } else {
            ConnectionSummary::Connected
        }
    }
}

/// Payload of a `Spark.state` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparkStatePayload {
    pub status: SparkStatus,
    pub blocks: Vec<Block>,
}

/// Payload of a `Spark.patch` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparkPatchPayload {
    pub changed: Vec<Block>,
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparkExported {
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub store: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUnits {
    pub temperature: String,
}

impl Default for UserUnits {
    fn default() -> Self {
        Self {
            temperature: "degC".to_string(),
        }
    }
}

pub type UnitAlternatives = HashMap<String, Vec<String>>;
