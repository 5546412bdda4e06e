mod common;

use brewlink_core::spark::{
    BlockAddress, BlockFieldAddress, BlockIntfType, BlockOrIntfType, BlockRepository, FieldValue, KnownBlockType,
    Link, Quantity,
};
use common::{block, SERVICE};
use serde_json::json;

fn repo() -> BlockRepository {
    let mut repo = BlockRepository::new(SERVICE);
    repo.update_blocks(vec![
        block("sensor-1", "TempSensorMock", json!({"value[degC]": 19.5})),
        block(
            "pair-1",
            "SetpointSensorPair",
            json!({"sensorId<TempSensorInterface>": "sensor-1", "storedSetting[degC]": 20}),
        ),
    ]);
    repo.save_volatile_block(block("draft", "Pid", json!({"inputId<SetpointSensorPairInterface>": "pair-1"})))
        .unwrap();
    repo
}

#[test]
fn resolves_link_through_interface() {
    let repo = repo();
    let pair = repo.block_by_id("pair-1").unwrap();
    let link = pair.data.get("sensorId").and_then(FieldValue::as_link).unwrap();

    let sensor = repo.resolve(link).unwrap();
    assert_eq!(sensor.id, "sensor-1");
    assert!(!repo.is_broken(link));
}

#[test]
fn resolves_volatile_blocks_after_persistent() {
    let repo = repo();
    let link = Link::new(Some("draft"), Some(KnownBlockType::Pid.into()));
    assert_eq!(repo.resolve(&link).map(|b| b.id.as_str()), Some("draft"));
}

#[test]
fn unset_ids_resolve_to_nothing_and_are_not_broken() {
    let repo = repo();
    for link in [Link::new(None, None), Link::new(Some(""), None)] {
        assert!(repo.resolve(&link).is_none());
        assert!(!repo.is_broken(&link));
    }
}

#[test]
fn dangling_and_mistyped_links_are_broken() {
    let repo = repo();

    let dangling = Link::new(Some("gone"), None);
    assert!(repo.is_broken(&dangling));

    let mistyped = Link::new(
        Some("sensor-1"),
        Some(BlockOrIntfType::Intf(BlockIntfType::ActuatorAnalogInterface)),
    );
    assert!(repo.resolve(&mistyped).is_none());
    assert!(repo.is_broken(&mistyped));
}

#[test]
fn field_by_address_returns_typed_value() {
    let repo = repo();
    let addr = BlockFieldAddress {
        address: BlockAddress::new(SERVICE, Some("pair-1"), None),
        field: Some("storedSetting".to_string()),
    };
    assert_eq!(
        repo.field_by_address(&addr),
        Some(&FieldValue::Quantity(Quantity::new(20.0, "degC")))
    );

    let missing_field = BlockFieldAddress {
        field: Some("nope".to_string()),
        ..addr.clone()
    };
    assert!(repo.field_by_address(&missing_field).is_none());

    let no_field = BlockFieldAddress { field: None, ..addr };
    assert!(repo.field_by_address(&no_field).is_none());
}

#[test]
fn address_for_other_service_is_ignored() {
    let repo = repo();
    let addr = BlockAddress::new("spark-two", Some("sensor-1"), None);
    assert!(repo.resolve(&addr).is_none());

    let any_service = BlockAddress {
        service_id: None,
        id: Some("sensor-1".to_string()),
        block_type: None,
    };
    assert!(repo.resolve(&any_service).is_some());
}

#[test]
fn block_resolves_to_itself() {
    let repo = repo();
    let sensor = repo.block_by_id("sensor-1").unwrap().clone();
    assert_eq!(repo.resolve(&sensor), Some(&sensor));
    assert_eq!(repo.resolve(&sensor.address()).map(|b| b.id.as_str()), Some("sensor-1"));
}

#[test]
fn field_address_deserializes_flattened() {
    let addr: BlockFieldAddress = serde_json::from_value(json!({
        "serviceId": SERVICE,
        "id": "pair-1",
        "type": "SetpointSensorPairInterface",
        "field": "storedSetting",
    }))
    .unwrap();
    assert_eq!(
        addr.address.block_type,
        Some(BlockOrIntfType::Intf(BlockIntfType::SetpointSensorPairInterface))
    );
    assert!(repo().field_by_address(&addr).is_some());
}
