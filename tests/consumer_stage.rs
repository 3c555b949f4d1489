// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consumer stage over the in-memory broker: lifecycle, ordering, offsets and meters.

use mqbridge::config::ConsumerConfig;
use mqbridge::consumer::{ConsumerReader, ConsumerStage, IterativeReader};
use mqbridge::deserializer::{JsonDeserializer, StringDeserializer};
use mqbridge::monitoring::{
    InMemoryEventsLogger, InMemoryMeterRegistry, CONSUMER_RECORDS_METER, CONSUMER_VALUE_BYTES_METER,
};
use mqbridge::transport::memory::InMemoryBroker;
use mqbridge::transport::{MessageHeaders, TransportMessage};
use mqbridge::{BridgeError, Destination, Monitoring, MonitoringConfig, StageContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn context() -> StageContext {
    StageContext::new("load-test", "consume")
}

fn string_stage(reader: ConsumerReader) -> ConsumerStage<String> {
    ConsumerStage::new(reader, Arc::new(StringDeserializer), Monitoring::disabled())
}

#[tokio::test]
async fn test_order_preserved_across_destinations() {
    init_logging();
    let broker = InMemoryBroker::new();
    let stage = string_stage(ConsumerReader::for_queues(
        broker.connection_factory(),
        ["left", "right"],
    ));
    stage.start(&context()).await.unwrap();

    broker.publish(&Destination::queue("left"), TransportMessage::text("A"));
    broker.publish(&Destination::queue("right"), TransportMessage::text("B"));
    broker.publish(&Destination::queue("left"), TransportMessage::text("C"));

    let mut values = Vec::new();
    let mut destinations = Vec::new();
    for _ in 0..3 {
        let result = stage.next().await.unwrap();
        values.push(result.record.value);
        destinations.push(result.record.destination.unwrap().name().to_string());
    }

    assert_eq!(values, vec!["A", "B", "C"]);
    assert_eq!(destinations, vec!["left", "right", "left"]);
    stage.stop(&context()).await;
}

#[tokio::test]
async fn test_offsets_are_one_based_and_monotonic() {
    init_logging();
    let broker = InMemoryBroker::new();
    let stage = string_stage(ConsumerReader::for_topics(broker.connection_factory(), ["ticks"]));
    stage.start(&context()).await.unwrap();
    assert_eq!(stage.next_offset(), 1);

    for i in 0..5 {
        broker.publish(&Destination::topic("ticks"), TransportMessage::text(i.to_string()));
    }
    let mut offsets = Vec::new();
    for _ in 0..5 {
        offsets.push(stage.next().await.unwrap().record.offset);
    }

    assert_eq!(offsets, vec![1, 2, 3, 4, 5]);
    assert_eq!(stage.next_offset(), 6);
    stage.stop(&context()).await;
}

#[tokio::test]
async fn test_headers_are_carried_into_record() {
    init_logging();
    let broker = InMemoryBroker::new();
    let stage = string_stage(ConsumerReader::for_queues(broker.connection_factory(), ["q"]));
    stage.start(&context()).await.unwrap();

    broker.publish(
        &Destination::queue("q"),
        TransportMessage::text("hello").with_headers(MessageHeaders {
            correlation_id: Some("corr-7".to_string()),
            priority: Some(9),
            ..Default::default()
        }),
    );
    let result = stage.next().await.unwrap();

    assert_eq!(result.meters.consumed_bytes, 5);
    assert_eq!(result.record.correlation_id.as_deref(), Some("corr-7"));
    assert_eq!(result.record.priority, Some(9));
    assert!(result.record.message_id.unwrap().starts_with("ID:"));
    assert!(result.record.timestamp.is_some());
    stage.stop(&context()).await;
}

#[tokio::test]
async fn test_restart_leaves_no_residual_receivers() {
    init_logging();
    let broker = InMemoryBroker::new();
    let stage = string_stage(ConsumerReader::for_queues(
        broker.connection_factory(),
        ["a", "b"],
    ));

    for _ in 0..2 {
        stage.start(&context()).await.unwrap();
        assert!(stage.has_next());
        assert_eq!(stage.reader().receiver_count(), 2);
        assert_eq!(broker.open_receivers(), 2);

        stage.stop(&context()).await;
        assert!(!stage.has_next());
        assert_eq!(stage.reader().receiver_count(), 0);
        assert_eq!(broker.open_receivers(), 0);
    }
    assert_eq!(broker.connections_created(), 2);
}

#[tokio::test]
async fn test_stop_unblocks_caller_through_has_next() {
    init_logging();
    let broker = InMemoryBroker::new();
    let stage = Arc::new(string_stage(ConsumerReader::for_queues(
        broker.connection_factory(),
        ["idle"],
    )));
    stage.start(&context()).await.unwrap();

    let pulled = tokio::time::timeout(Duration::from_millis(50), stage.next()).await;
    assert!(pulled.is_err(), "next() must wait while nothing is delivered");

    stage.stop(&context()).await;
    assert!(!stage.has_next());
}

#[tokio::test]
async fn test_queue_and_topic_together_rejected() {
    init_logging();
    let broker = InMemoryBroker::new();
    let config = ConsumerConfig {
        queues: vec!["q".to_string()],
        topics: vec!["t".to_string()],
        ..Default::default()
    };
    let reader = ConsumerReader::new(&config)
        .with_queue_connection_factory(broker.connection_factory())
        .with_topic_connection_factory(broker.connection_factory());

    let error = reader.start(&context()).await.unwrap_err();
    assert!(matches!(error, BridgeError::Configuration { .. }));
    assert!(!reader.has_next());
}

#[tokio::test]
async fn test_config_with_queues_and_topics_fails_on_start() {
    init_logging();
    let broker = InMemoryBroker::new();
    let config = ConsumerConfig {
        queues: vec!["q".to_string()],
        topics: vec!["t".to_string()],
        ..Default::default()
    };
    let stage: ConsumerStage<String> = ConsumerStage::from_config(
        &config,
        broker.connection_factory(),
        Arc::new(StringDeserializer),
        Arc::new(InMemoryMeterRegistry::new()),
        Arc::new(InMemoryEventsLogger::new()),
    );

    let error = stage.start(&context()).await.unwrap_err();
    assert!(error.is_configuration());
    assert!(!stage.has_next());
    assert_eq!(broker.connections_created(), 0);
    assert_eq!(broker.open_receivers(), 0);
    assert!(matches!(stage.next().await, Err(BridgeError::NotStarted { .. })));
    stage.stop(&context()).await;
}

#[tokio::test]
async fn test_stage_next_before_start_fails_fast() {
    init_logging();
    let broker = InMemoryBroker::new();
    let stage = string_stage(ConsumerReader::for_queues(broker.connection_factory(), ["q"]));
    broker.publish(&Destination::queue("q"), TransportMessage::text("early"));

    let result = tokio::time::timeout(Duration::from_millis(200), stage.next())
        .await
        .expect("next() before start must not wait");
    assert!(matches!(result, Err(BridgeError::NotStarted { .. })));
    assert_eq!(stage.next_offset(), 1);
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Order {
    id: u32,
    item: String,
}

#[tokio::test]
async fn test_json_stage_with_monitoring() {
    init_logging();
    let broker = InMemoryBroker::new();
    let registry = Arc::new(InMemoryMeterRegistry::new());
    let logger = Arc::new(InMemoryEventsLogger::new());
    let config = ConsumerConfig {
        queues: vec!["orders".to_string()],
        monitoring: MonitoringConfig::all(),
        ..Default::default()
    };
    let stage = ConsumerStage::from_config(
        &config,
        broker.connection_factory(),
        Arc::new(JsonDeserializer::<Order>::new()),
        registry.clone(),
        logger.clone(),
    );
    stage.start(&context()).await.unwrap();

    let valid = r#"{"id":1,"item":"book"}"#;
    broker.publish(&Destination::queue("orders"), TransportMessage::text(valid));
    broker.publish(
        &Destination::queue("orders"),
        TransportMessage::bytes(br#"{"id":2,"item":"pen","gift":true}"#.to_vec()),
    );

    let first = stage.next().await.unwrap();
    assert_eq!(
        first.record.value,
        Order {
            id: 1,
            item: "book".to_string()
        }
    );

    let second = stage.next().await;
    assert!(matches!(second, Err(BridgeError::Deserialization { .. })));

    assert_eq!(registry.total(CONSUMER_RECORDS_METER), 2.0);
    assert_eq!(
        registry.total(CONSUMER_VALUE_BYTES_METER),
        (valid.len() + r#"{"id":2,"item":"pen","gift":true}"#.len()) as f64
    );
    assert_eq!(logger.events().len(), 4);
    stage.stop(&context()).await;
}
