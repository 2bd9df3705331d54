//! Raw line protocol over TCP.

use anyhow::Result;
use quafka_core::{
    protocol::{constants::DEFAULT_TOPIC, Command, Response},
    ErrorKind, Offset, PartitionId, PartitionOffset,
};
use quafka_publisher::ConnectionController;
use quafka_tests::TestBroker;

async fn connected(broker: &TestBroker) -> Result<ConnectionController> {
    let connection = ConnectionController::new(broker.endpoint());
    connection.connect().await?;
    Ok(connection)
}

#[tokio::test]
async fn test_text_offsets_increase_per_partition() -> Result<()> {
    let broker = TestBroker::start(1).await?;
    let connection = connected(&broker).await?;

    assert_eq!(
        connection.send("TEXT:hello").await?,
        "OK: Mesaj topic'e eklendi (partition: 0, offset: 0)"
    );
    let second = Response::parse(Command::Text, &connection.send("TEXT:world").await?)?;
    assert_eq!(second, Response::Published(PartitionOffset::new(PartitionId(0), Offset(1))));

    assert_eq!(connection.send("POLL:default-topic:0").await?, "OK: hello (offset: 1)");
    assert_eq!(connection.send("POLL:default-topic:0").await?, "OK: world (offset: 1)");

    connection.disconnect().await?;
    broker.stop().await
}

#[tokio::test]
async fn test_offsets_start_at_zero_per_partition() -> Result<()> {
    let broker = TestBroker::start(3).await?;
    let connection = connected(&broker).await?;
    let mut next_offset = [0u64; 3];

    for _ in 0..30 {
        let Response::Published(placed) =
            Response::parse(Command::Text, &connection.send("TEXT:hello").await?)?
        else {
            anyhow::bail!("publish was not acknowledged");
        };
        let slot = &mut next_offset[placed.partition.index()];
        assert_eq!(placed.offset, Offset(*slot), "partition {}", placed.partition);
        *slot += 1;
    }
    assert_eq!(next_offset.iter().sum::<u64>(), 30);

    broker.stop().await
}

#[tokio::test]
async fn test_poll_empty_partition() -> Result<()> {
    let broker = TestBroker::start(3).await?;
    let connection = connected(&broker).await?;

    assert_eq!(connection.send("POLL:default-topic:0").await?, "OK: Mesaj bulunamadı");
    assert_eq!(connection.send("POLL:nowhere:9").await?, "OK: Mesaj bulunamadı");

    broker.stop().await
}

#[tokio::test]
async fn test_malformed_requests_keep_session_open() -> Result<()> {
    let broker = TestBroker::start(1).await?;
    let connection = connected(&broker).await?;

    let cases = [
        ("bozuk", "HATA: Geçersiz mesaj formatı"),
        ("POLL:default-topic", "HATA: Geçersiz POLL formatı (topic:partition)"),
        ("POLL:default-topic:x", "HATA: Geçersiz partition: x"),
        ("PUSH:x", "HATA: Bilinmeyen komut: PUSH"),
    ];
    for (line, expected) in cases {
        assert_eq!(connection.send(line).await?, expected, "request {line:?}");
    }

    assert_eq!(connection.send("COMMIT:g1").await?, "OK: g1 için commit başarılı");
    assert!(connection.is_connected());

    broker.stop().await
}

#[tokio::test]
async fn test_multiline_content_keeps_responses_paired() -> Result<()> {
    let broker = TestBroker::start(1).await?;
    let publisher = broker.publisher()?;

    let err = publisher.publish_text("a\nb").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolError);
    assert_eq!(broker.broker().store().message_count(DEFAULT_TOPIC), 0);

    publisher.commit("g").await?;
    assert_eq!(publisher.send_raw("COMMIT:h").await?, "OK: h için commit başarılı");

    let connection = connected(&broker).await?;
    let err = connection.send("TEXT:x\r\nCOMMIT:z").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolError);
    assert_eq!(connection.send("COMMIT:z").await?, "OK: z için commit başarılı");

    publisher.close().await;
    broker.stop().await
}

#[tokio::test]
async fn test_sessions_are_counted() -> Result<()> {
    let broker = TestBroker::start(1).await?;
    let first = connected(&broker).await?;
    let second = connected(&broker).await?;
    first.send("COMMIT:a").await?;
    second.send("COMMIT:b").await?;

    let stats = broker.broker().stats();
    assert!(stats.running);
    assert_eq!(stats.total_sessions, 2);

    broker.stop().await
}
