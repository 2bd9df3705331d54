//! Consumer receiving what a publisher sent.

use anyhow::Result;
use futures::StreamExt;
use quafka_consumer::Consumer;
use quafka_core::{config::ConsumerConfig, message::PayloadKind};
use quafka_tests::TestBroker;
use std::{collections::BTreeSet, time::Duration};
use tokio::time::timeout;

fn consumer_config(partitions: impl IntoIterator<Item = u32>) -> ConsumerConfig {
    ConsumerConfig::new("it-group", "default-topic")
        .with_partitions(partitions)
        .with_poll_interval(Duration::from_millis(5))
        .with_error_backoff(Duration::from_millis(20))
}

#[tokio::test]
async fn test_consumer_receives_published_messages() -> Result<()> {
    let broker = TestBroker::start(3).await?;
    let publisher = broker.publisher()?;
    for payload in ["TEXT:a", "JSON:{\"b\":1}", "c"] {
        publisher.publish_text(payload).await?;
    }

    let consumer = Consumer::connect(consumer_config([0, 1, 2]), broker.endpoint())?;
    let mut messages = consumer.start().await?;

    let mut received = BTreeSet::new();
    while received.len() < 3 {
        let message = timeout(Duration::from_secs(5), messages.next()).await?.unwrap();
        if message.payload.starts_with("JSON:") {
            assert_eq!(message.kind(), PayloadKind::Json);
        }
        received.insert(message.payload);
    }
    assert_eq!(
        received,
        ["TEXT:a", "JSON:{\"b\":1}", "c"].into_iter().map(String::from).collect::<BTreeSet<_>>()
    );
    assert_eq!(broker.broker().store().message_count("default-topic"), 0);

    consumer.stop().await;
    assert!(!consumer.is_running());
    assert!(consumer.offsets().pending().is_empty());

    publisher.close().await;
    broker.stop().await
}

#[tokio::test]
async fn test_consumer_keeps_polling_after_idle() -> Result<()> {
    let broker = TestBroker::start(1).await?;
    let consumer = Consumer::connect(consumer_config([0]), broker.endpoint())?;
    let mut messages = consumer.start().await?;

    tokio::time::sleep(Duration::from_millis(30)).await;
    broker.publisher()?.publish_text("late").await?;

    let message = timeout(Duration::from_secs(5), messages.next()).await?.unwrap();
    assert_eq!(message.payload, "late");

    consumer.stop().await;
    broker.stop().await
}
