//! Publisher, pool and balancer against live brokers.

use anyhow::Result;
use proptest::prelude::*;
use quafka_core::{
    config::{LoadBalancerConfig, LoadBalancingStrategy, PoolConfig},
    ErrorKind, PartitionId,
};
use quafka_publisher::{ConnectionFactory, ConnectionPool, Publisher, PublisherConfig};
use quafka_tests::TestBroker;
use std::{sync::Arc, time::Duration};

#[tokio::test]
async fn test_publish_poll_commit() -> Result<()> {
    let broker = TestBroker::start(1).await?;
    let publisher = broker.publisher()?;

    let first = publisher.publish_text("merhaba").await?;
    let second = publisher.publish_text("dünya").await?;
    assert_eq!(first.partition, PartitionId(0));
    assert_eq!((first.offset.value(), second.offset.value()), (0, 1));

    let (payload, offset) = publisher.poll("default-topic", PartitionId(0)).await?.unwrap();
    assert_eq!((payload.as_str(), offset.value()), ("merhaba", 1));
    publisher.poll("default-topic", PartitionId(0)).await?.unwrap();
    assert!(publisher.poll("default-topic", PartitionId(0)).await?.is_none());

    publisher.commit("billing").await?;

    let stats = publisher.stats();
    assert_eq!(stats[0].created, 1);
    assert_eq!((stats[0].active, stats[0].idle), (0, 1));

    publisher.close().await;
    broker.stop().await
}

#[tokio::test]
async fn test_pool_of_one_serializes_borrowers() -> Result<()> {
    let broker = TestBroker::start(1).await?;
    let pool = Arc::new(ConnectionPool::new(
        broker.endpoint(),
        PoolConfig::default().with_max_pool_size(1).with_borrow_timeout(Duration::from_secs(5)),
        ConnectionFactory::default(),
    ));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let connection = pool.borrow().await?;
                let response = connection.send(&format!("TEXT:m{i}")).await;
                pool.release(connection).await;
                response
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await??.starts_with("OK: "));
    }
    assert_eq!(pool.created_connections(), 1);
    assert_eq!(broker.broker().store().message_count("default-topic"), 8);

    pool.close().await;
    broker.stop().await
}

#[tokio::test]
async fn test_pool_borrow_times_out() -> Result<()> {
    let broker = TestBroker::start(1).await?;
    let pool = ConnectionPool::new(
        broker.endpoint(),
        PoolConfig::default().with_max_pool_size(1).with_borrow_timeout(Duration::from_millis(50)),
        ConnectionFactory::default(),
    );

    let held = pool.borrow().await?;
    let err = pool.borrow().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PoolFull);

    pool.release(held).await;
    pool.borrow().await?;
    broker.stop().await
}

#[tokio::test]
async fn test_round_robin_spreads_over_brokers() -> Result<()> {
    let first = TestBroker::start(1).await?;
    let second = TestBroker::start(1).await?;
    let config = PublisherConfig::single(first.endpoint())
        .with_endpoint(second.endpoint())
        .with_load_balancer(LoadBalancerConfig {
            strategy: LoadBalancingStrategy::RoundRobin,
            ..LoadBalancerConfig::default()
        });
    let publisher = Publisher::new(config)?;

    for i in 0..4 {
        publisher.publish_text(&format!("m{i}")).await?;
    }

    assert_eq!(first.broker().store().message_count("default-topic"), 2);
    assert_eq!(second.broker().store().message_count("default-topic"), 2);

    publisher.close().await;
    first.stop().await?;
    second.stop().await
}

#[tokio::test]
async fn test_unreachable_broker_fails_publish() -> Result<()> {
    let broker = TestBroker::start(1).await?;
    let endpoint = broker
        .endpoint()
        .with_max_retries(1)
        .with_retry_delays(Duration::from_millis(1), Duration::from_millis(1));
    broker.stop().await?;

    let mut config = PublisherConfig::single(endpoint);
    config.reconnect.max_attempts = 1;
    config.reconnect.initial_backoff = Duration::from_millis(1);
    config.reconnect.max_backoff = Duration::from_millis(1);
    let publisher = Publisher::new(config)?;

    let err = publisher.publish_text("lost").await.unwrap_err();
    assert!(
        matches!(err.kind(), ErrorKind::NetworkError | ErrorKind::ConnectionTimeout),
        "{err}"
    );
    assert_eq!(publisher.stats()[0].active, 0);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_published_text_polls_back(content in "[a-zA-Z0-9 ]{1,40}") {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let polled = runtime.block_on(async {
            let broker = TestBroker::start(1).await?;
            let publisher = broker.publisher()?;
            publisher.publish_text(&content).await?;
            let polled = publisher.poll("default-topic", PartitionId(0)).await?;
            publisher.close().await;
            broker.stop().await?;
            anyhow::Ok(polled)
        }).unwrap();

        prop_assert_eq!(polled.map(|(payload, _)| payload), Some(content));
    }
}
