//! Postfix wire codec.
//!
//! The controller encodes typed values in field names:
//!
//! - `setting[degC]: 20` is a [`Quantity`]
//! - `sensorId<TempSensorInterface>: "sensor-1"` is a [`Link`]
//! - `outputId<ActuatorAnalogInterface,driven>: "pwm-1"` is a driven [`Link`]
//!
//! Every other key passes through unchanged.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::block_types::{BlockOrIntfType, BlockType};
use super::types::{Block, BlockData, BlockMeta, FieldValue, Link, Quantity};

const BLOX_TYPE_KEY: &str = "__bloxtype";

fn postfix_expr() -> &'static Regex {
    static EXPR: OnceLock<Regex> = OnceLock::new();
    EXPR.get_or_init(|| Regex::new(r"^(.*)([\[<])(.*)[\]>]$").expect("postfix pattern is valid"))
}

/// Splits a postfixed key into its base name and the first bracketed term.
///
/// `"field<SetpointSensorPair,driven>"` yields `("field", Some("SetpointSensorPair"))`.
pub fn split_postfixed(key: &str) -> (&str, Option<&str>) {
    match postfix_expr().captures(key) {
        Some(caps) => {
            let name = caps.get(1).map_or("", |m| m.as_str());
            let postfix = caps
                .get(3)
                .map(|m| m.as_str().split(',').next().unwrap_or_default());
            (name, postfix)
        }
        None => (key, None),
    }
}

/// Decodes one wire field, or `None` if the key is not postfixed or the
/// value has the wrong shape for its postfix.
pub fn parse_postfixed(key: &str, value: &Value) -> Option<(String, FieldValue)> {
    if !(key.ends_with(']') || key.ends_with('>')) {
        return None;
    }
    let caps = postfix_expr().captures(key)?;
    let name = caps.get(1)?.as_str();
    let bracket = caps.get(2)?.as_str();
    let inner = caps.get(3)?.as_str();

    match bracket {
        "<" => {
            let id = match value {
                Value::Null => None,
                Value::String(s) => Some(s.as_str()),
                _ => return None,
            };
            let mut parts = inner.split(',');
            let link_type = parts
                .next()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| BlockOrIntfType::from(t.to_string()));
            let driven = parts.next().is_some_and(|d| !d.trim().is_empty());
            let mut link = Link::new(id, link_type);
            link.driven = driven;
            Some((name.to_string(), FieldValue::Link(link)))
        }
        "[" => {
            let amount = match value {
                Value::Null => None,
                Value::Number(n) => n.as_f64(),
                _ => return None,
            };
            Some((name.to_string(), FieldValue::Quantity(Quantity::new(amount, inner))))
        }
        _ => None,
    }
}

/// Decodes an already-typed object (`{"__bloxtype": "Quantity", ...}`).
fn parse_blox_field(obj: &Map<String, Value>) -> Option<FieldValue> {
    match obj.get(BLOX_TYPE_KEY)?.as_str()? {
        "Quantity" => {
            let value = obj.get("value").and_then(Value::as_f64);
            let unit = obj.get("unit").and_then(Value::as_str).unwrap_or_default();
            Some(FieldValue::Quantity(Quantity::new(value, unit)))
        }
        "Link" => {
            let id = obj.get("id").and_then(Value::as_str);
            let link_type = obj
                .get("type")
                .and_then(Value::as_str)
                .map(|t| BlockOrIntfType::from(t.to_string()));
            let mut link = Link::new(id, link_type);
            link.driven = obj.get("driven").and_then(Value::as_bool).unwrap_or(false);
            Some(FieldValue::Link(link))
        }
        _ => None,
    }
}

pub fn deserialize_value(value: &Value) -> FieldValue {
    match value {
        Value::Array(items) => FieldValue::List(items.iter().map(deserialize_value).collect()),
        Value::Object(obj) => {
            parse_blox_field(obj).unwrap_or_else(|| FieldValue::Object(deserialize_object(obj)))
        }
        scalar => FieldValue::Scalar(scalar.clone()),
    }
}

pub fn deserialize_object(obj: &Map<String, Value>) -> BlockData {
    obj.iter()
        .map(|(key, value)| {
            parse_postfixed(key, value).unwrap_or_else(|| (key.clone(), deserialize_value(value)))
        })
        .collect()
}

fn quantity_value(value: Option<f64>) -> Value {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 9_007_199_254_740_992.0 => Value::from(v as i64),
        Some(v) => Value::from(v),
        None => Value::Null,
    }
}

/// Encodes one field, returning the postfixed key and its wire value.
pub fn serialize_field(key: &str, value: &FieldValue) -> (String, Value) {
    match value {
        FieldValue::Quantity(qty) => (format!("{}[{}]", key, qty.unit), quantity_value(qty.value)),
        FieldValue::Link(link) => {
            let link_type = link.link_type.as_ref().map(|t| t.name()).unwrap_or_default();
            let postfix = if link.driven {
                format!("{},driven", link_type)
            } else {
                link_type.to_string()
            };
            let id = link.id.clone().map(Value::String).unwrap_or(Value::Null);
            (format!("{}<{}>", key, postfix), id)
        }
        other => (key.to_string(), serialize_value(other)),
    }
}

pub fn serialize_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Scalar(v) => v.clone(),
        FieldValue::List(items) => Value::Array(items.iter().map(serialize_value).collect()),
        FieldValue::Object(obj) => Value::Object(serialize_object(obj)),
        // Typed values outside an object have no key to carry the postfix
        FieldValue::Quantity(qty) => serde_json::json!({
            BLOX_TYPE_KEY: "Quantity",
            "value": quantity_value(qty.value),
            "unit": qty.unit,
        }),
        FieldValue::Link(link) => serde_json::json!({
            BLOX_TYPE_KEY: "Link",
            "id": link.id,
            "type": link.link_type.as_ref().map(|t| t.name().to_string()),
            "driven": link.driven,
        }),
    }
}

pub fn serialize_object(data: &BlockData) -> Map<String, Value> {
    data.iter().map(|(k, v)| serialize_field(k, v)).collect()
}

/// Block as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireBlock {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nid: Option<u32>,
    #[serde(rename = "serviceId", default)]
    pub service_id: String,
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<BlockMeta>,
}

impl From<WireBlock> for Block {
    fn from(wire: WireBlock) -> Self {
        Block {
            id: wire.id,
            nid: wire.nid,
            service_id: wire.service_id,
            block_type: BlockType::from(wire.block_type.as_str()),
            data: deserialize_object(&wire.data),
            meta: wire.meta,
        }
    }
}

impl From<Block> for WireBlock {
    fn from(block: Block) -> Self {
        WireBlock {
            data: serialize_object(&block.data),
            id: block.id,
            nid: block.nid,
            service_id: block.service_id,
            block_type: block.block_type.name().to_string(),
            meta: block.meta,
        }
    }
}
