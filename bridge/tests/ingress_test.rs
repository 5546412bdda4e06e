mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use brewlink_bridge::{parse_line, start_ingress, BridgeError};
use brewlink_core::spark::{state_topic, SyncState};
use brewlink_core::{Brewlink, QoSLevel};
use common::{offline_api, status, wire_block, SERVICE};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

fn state_line(ids: &[&str]) -> String {
    let blocks: Vec<_> = ids
        .iter()
        .map(|id| wire_block(id, "TempSensorMock", json!({"value[degC]": 21.5})))
        .collect();
    let body = json!({
        "key": SERVICE,
        "type": "Spark.state",
        "data": {"status": status(true), "blocks": blocks},
    });
    format!("{} {}\n", state_topic(SERVICE), body)
}

#[test]
fn parse_line_splits_topic_and_envelope() {
    let (topic, event) = parse_line(
        r#"brewcast/state/spark-one/patch {"key":"spark-one","type":"Spark.patch","data":{"changed":[],"deleted":["a"]}}"#,
    )
    .unwrap();

    assert_eq!(topic, "brewcast/state/spark-one/patch");
    assert_eq!(event.r#type, "Spark.patch");
    assert_eq!(event.source, "spark-one");
    assert_eq!(event.payload["deleted"], json!(["a"]));
}

#[test]
fn parse_line_rejects_garbage() {
    for line in ["", "brewcast/state/spark-one", "topic {not json", r#"topic {"key":"a"}"#] {
        assert!(
            matches!(parse_line(line), Err(BridgeError::InvalidMessage(_))),
            "accepted {:?}",
            line
        );
    }
}

#[tokio::test]
async fn ingress_publishes_lines_to_subscribers() {
    let brewlink = Brewlink::new(offline_api()).await.unwrap();
    let (_id, mut rx) = brewlink
        .event_bus
        .subscribe(state_topic(SERVICE), vec![], QoSLevel::QosBatched)
        .await
        .unwrap();

    let ingress = start_ingress("127.0.0.1:0", Arc::clone(&brewlink.event_bus))
        .await
        .unwrap();
    let mut stream = TcpStream::connect(ingress.local_addr).await.unwrap();
    stream.write_all(b"not-a-message\n").await.unwrap();
    stream.write_all(state_line(&["a"]).as_bytes()).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timeout")
        .expect("event");
    assert_eq!(event.r#type, "Spark.state");
    assert_eq!(event.topic, state_topic(SERVICE));

    // Counter is bumped once publish returns, which may trail the receive
    tokio::time::timeout(Duration::from_secs(2), async {
        while ingress.stats.published.load(Ordering::Relaxed) < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("publish not counted");
    assert_eq!(ingress.stats.rejected.load(Ordering::Relaxed), 1);
    ingress.abort();
}

#[tokio::test]
async fn ingress_drives_service_state() {
    let mut brewlink = Brewlink::new(offline_api()).await.unwrap();
    brewlink.start().await.unwrap();
    let module = brewlink.services.start_service(SERVICE).await.unwrap();
    let sync = brewlink.services.synchronizer(SERVICE).expect("synchronizer");
    assert_eq!(sync.state(), SyncState::Unsynchronized);

    let ingress = start_ingress("127.0.0.1:0", Arc::clone(&brewlink.event_bus))
        .await
        .unwrap();
    let mut stream = TcpStream::connect(ingress.local_addr).await.unwrap();
    stream.write_all(state_line(&["a", "b"]).as_bytes()).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while module.block_ids().await.len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("state not applied");

    assert_eq!(module.block_ids().await, vec!["a", "b"]);
    assert_eq!(sync.state(), SyncState::Synchronized);

    ingress.abort();
    brewlink.shutdown().await.unwrap();
}
