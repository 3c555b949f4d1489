// SPDX-License-Identifier: MIT OR Apache-2.0

//! Producer and consumer stages sharing one in-memory broker.

use mqbridge::consumer::{ConsumerReader, ConsumerStage};
use mqbridge::deserializer::{ObjectDeserializer, StringDeserializer};
use mqbridge::producer::{MessageKind, ProduceRecord, Producer, RecordValue};
use mqbridge::transport::memory::InMemoryBroker;
use mqbridge::{Destination, Monitoring, StageContext, Tags};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
    sensor: String,
    celsius: f32,
}

#[tokio::test]
async fn test_objects_survive_the_trip() {
    init_logging();
    let broker = InMemoryBroker::new();
    let context = StageContext::new("round-trip", "objects");

    let consumer: ConsumerStage<Reading> = ConsumerStage::new(
        ConsumerReader::for_queues(broker.connection_factory(), ["readings"]),
        Arc::new(ObjectDeserializer::<Reading>::new()),
        Monitoring::disabled(),
    );
    let producer = Producer::new(broker.connection_factory(), Monitoring::disabled());
    consumer.start(&context).await.unwrap();
    producer.start(&context).await.unwrap();

    let readings = vec![
        Reading {
            sensor: "north".to_string(),
            celsius: 21.5,
        },
        Reading {
            sensor: "south".to_string(),
            celsius: -3.0,
        },
    ];
    let records: Vec<_> = readings
        .iter()
        .cloned()
        .map(|r| ProduceRecord::new(Destination::queue("readings"), MessageKind::Object, RecordValue::object(r)))
        .collect();
    let meters = producer.execute(&context, &records, &Tags::new()).await.unwrap();
    assert_eq!(meters.produced_records, 2);
    assert_eq!(meters.produced_bytes, 0);

    for expected in &readings {
        let result = consumer.next().await.unwrap();
        assert_eq!(&result.record.value, expected);
        assert_eq!(result.meters.consumed_bytes, 0);
    }

    producer.stop(&context).await;
    consumer.stop(&context).await;
}

#[tokio::test]
async fn test_topic_reaches_every_subscriber_stage() {
    init_logging();
    let broker = InMemoryBroker::new();
    let context = StageContext::new("round-trip", "fan-out");

    let subscribers: Vec<ConsumerStage<String>> = (0..2)
        .map(|_| {
            ConsumerStage::new(
                ConsumerReader::for_topics(broker.connection_factory(), ["alerts"]),
                Arc::new(StringDeserializer),
                Monitoring::disabled(),
            )
        })
        .collect();
    for subscriber in &subscribers {
        subscriber.start(&context).await.unwrap();
    }

    let producer = Producer::new(broker.connection_factory(), Monitoring::disabled());
    producer.start(&context).await.unwrap();
    producer
        .execute(
            &context,
            &[ProduceRecord::auto(Destination::topic("alerts"), b"disk full".to_vec())],
            &Tags::new(),
        )
        .await
        .unwrap();

    for subscriber in &subscribers {
        let result = subscriber.next().await.unwrap();
        assert_eq!(result.record.value, "disk full");
        assert_eq!(result.meters.consumed_bytes, 9);
        assert_eq!(result.record.offset, 1);
    }

    producer.stop(&context).await;
    for subscriber in &subscribers {
        subscriber.stop(&context).await;
    }
    assert_eq!(broker.open_receivers(), 0);
}

#[tokio::test]
async fn test_queue_backlog_is_consumed_after_start() {
    init_logging();
    let broker = InMemoryBroker::new();
    let context = StageContext::new("round-trip", "backlog");

    let producer = Producer::new(broker.connection_factory(), Monitoring::disabled());
    producer.start(&context).await.unwrap();
    let records: Vec<_> = ["one", "two", "three"]
        .into_iter()
        .map(|v| ProduceRecord::auto(Destination::queue("jobs"), v))
        .collect();
    producer.execute(&context, &records, &Tags::new()).await.unwrap();
    assert_eq!(broker.backlog(&Destination::queue("jobs")), 3);

    let consumer: ConsumerStage<String> = ConsumerStage::new(
        ConsumerReader::for_queues(broker.connection_factory(), ["jobs"]),
        Arc::new(StringDeserializer),
        Monitoring::disabled(),
    );
    consumer.start(&context).await.unwrap();

    let mut values = Vec::new();
    while values.len() < 3 && consumer.has_next() {
        values.push(consumer.next().await.unwrap().record.value);
    }
    assert_eq!(values, vec!["one", "two", "three"]);
    assert_eq!(broker.backlog(&Destination::queue("jobs")), 0);

    producer.stop(&context).await;
    consumer.stop(&context).await;
}
