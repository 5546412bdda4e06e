use brewlink_core::event::EventBus;
use brewlink_core::{Event, QoSLevel, Result};
use serde_json::json;

fn make_event(id: &str, event_type: &str) -> Event {
    Event {
        id: id.to_string(),
        r#type: event_type.to_string(),
        topic: String::new(),
        timestamp_ms: 0,
        source: "spark-one".to_string(),
        payload: json!({}),
    }
}

#[tokio::test]
async fn subscribe_and_publish_basic() -> Result<()> {
    let bus = EventBus::new().await?;
    let (_sub_id, mut rx) = bus
        .subscribe("brewcast/state/spark-one".to_string(), vec![], QoSLevel::QosBatched)
        .await?;

    bus.publish("brewcast/state/spark-one", make_event("e1", "Spark.state"))
        .await?;

    let received = tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv())
        .await
        .expect("timeout")
        .expect("channel closed");
    assert_eq!(received.id, "e1");
    Ok(())
}

#[tokio::test]
async fn multi_topic_subscription_preserves_publish_order() -> Result<()> {
    let bus = EventBus::new().await?;
    let (_sub_id, mut rx) = bus
        .subscribe_topics(
            vec!["topic.state".to_string(), "topic.patch".to_string()],
            vec![],
            QoSLevel::QosBatched,
        )
        .await?;

    bus.publish("topic.state", make_event("s1", "Spark.state")).await?;
    bus.publish("topic.patch", make_event("p1", "Spark.patch")).await?;
    bus.publish("topic.state", make_event("s2", "Spark.state")).await?;
    bus.publish("topic.patch", make_event("p2", "Spark.patch")).await?;

    let mut ids = Vec::new();
    for _ in 0..4 {
        let evt = tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        ids.push(evt.id);
    }
    assert_eq!(ids, vec!["s1", "p1", "s2", "p2"]);
    Ok(())
}

#[tokio::test]
async fn unsubscribe_stops_receiving_events() -> Result<()> {
    let bus = EventBus::new().await?;
    let (sub_id, mut rx) = bus
        .subscribe_topics(
            vec!["topic.a".to_string(), "topic.b".to_string()],
            vec![],
            QoSLevel::QosBatched,
        )
        .await?;

    bus.publish("topic.a", make_event("before", "unit")).await?;
    bus.unsubscribe(&sub_id).await?;
    bus.publish("topic.a", make_event("after-a", "unit")).await?;
    bus.publish("topic.b", make_event("after-b", "unit")).await?;

    let first = tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv())
        .await
        .expect("timeout")
        .expect("channel closed");
    assert_eq!(first.id, "before");

    // All senders are gone, so the channel closes
    let second = tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv()).await;
    assert!(
        second.is_err() || second.unwrap().is_none(),
        "should not receive after unsubscribe"
    );
    assert_eq!(bus.get_stats("topic.b").expect("stats").active_subscriptions, 0);
    Ok(())
}

#[tokio::test]
async fn event_type_filtering_works() -> Result<()> {
    let bus = EventBus::new().await?;
    let (_sub_id, mut rx) = bus
        .subscribe(
            "topic.filter".to_string(),
            vec!["Spark.patch".to_string()],
            QoSLevel::QosBatched,
        )
        .await?;

    bus.publish("topic.filter", make_event("a1", "Spark.patch")).await?;
    bus.publish("topic.filter", make_event("b1", "Spark.state")).await?;
    bus.publish("topic.filter", make_event("a2", "Spark.patch")).await?;

    let r1 = rx.recv().await.expect("channel closed");
    assert_eq!(r1.id, "a1");
    let r2 = rx.recv().await.expect("channel closed");
    assert_eq!(r2.id, "a2");

    let r3 = tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv()).await;
    assert!(r3.is_err(), "Spark.state should have been filtered");
    Ok(())
}

#[tokio::test]
async fn qos_realtime_drops_when_queue_is_full() -> Result<()> {
    let bus = EventBus::new().await?;
    let (_sub_id, mut rx) = bus
        .subscribe("topic.rt".to_string(), vec![], QoSLevel::QosRealtime)
        .await?;

    for i in 0..500 {
        let _ = bus.publish("topic.rt", make_event(&format!("rt{}", i), "unit")).await;
    }

    let mut received_count = 0;
    while rx.try_recv().is_ok() {
        received_count += 1;
    }

    let stats = bus.get_stats("topic.rt").expect("stats exist");
    assert!(stats.dropped_events > 0, "expected drops for realtime QoS");
    assert!(received_count < 500, "not all events should be received");
    Ok(())
}

#[tokio::test]
async fn delivered_event_carries_its_topic() -> Result<()> {
    let bus = EventBus::new().await?;
    let (_sub_id, mut rx) = bus
        .subscribe_topics(
            vec!["topic.one".to_string(), "topic.two".to_string()],
            vec![],
            QoSLevel::QosBatched,
        )
        .await?;

    bus.publish("topic.two", make_event("t2", "unit")).await?;
    bus.publish("topic.one", make_event("t1", "unit")).await?;

    let first = rx.recv().await.expect("channel closed");
    assert_eq!((first.id.as_str(), first.topic.as_str()), ("t2", "topic.two"));
    let second = rx.recv().await.expect("channel closed");
    assert_eq!((second.id.as_str(), second.topic.as_str()), ("t1", "topic.one"));
    Ok(())
}

#[tokio::test]
async fn publish_to_empty_topic_returns_zero() -> Result<()> {
    let bus = EventBus::new().await?;
    let delivered = bus.publish("topic.empty", make_event("orphan", "unit")).await?;
    assert_eq!(delivered, 0, "no subscribers should mean zero delivery");
    Ok(())
}

#[tokio::test]
async fn stats_track_published_and_delivered() -> Result<()> {
    let bus = EventBus::new().await?;
    let (_sub_id, mut rx) = bus
        .subscribe("topic.stats".to_string(), vec![], QoSLevel::QosBatched)
        .await?;

    for i in 0..10 {
        bus.publish("topic.stats", make_event(&format!("s{}", i), "unit"))
            .await?;
    }

    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }

    let stats = bus.get_stats("topic.stats").expect("stats");
    assert_eq!(stats.total_published, 10);
    assert_eq!(stats.total_delivered, 10);
    assert_eq!(count, 10);
    Ok(())
}

#[tokio::test]
async fn shutdown_clears_subscriptions() -> Result<()> {
    let bus = EventBus::new().await?;
    let (_sub_id, mut rx) = bus
        .subscribe("topic.shut".to_string(), vec![], QoSLevel::QosBatched)
        .await?;

    bus.shutdown().await?;

    let delivered = bus.publish("topic.shut", make_event("post_shut", "unit")).await?;
    assert_eq!(delivered, 0, "subscriptions cleared after shutdown");

    let r = tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv()).await;
    assert!(r.is_err() || r.unwrap().is_none());
    Ok(())
}

#[test]
fn event_serializes_type_field() {
    let event = Event::new("Spark.patch", "spark-one", json!({"changed": [], "deleted": []}));
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "Spark.patch");
    assert_eq!(value["source"], "spark-one");
    assert!(event.timestamp_ms > 0);
}
