//! Producer runs over real files and the decoder on the other side.

use std::io::Write;
use std::sync::Arc;

use clipstream_core::{decode, Message, Record};
use clipstream_producer::{BatchFramer, FramerConfig};
use clipstream_transport::{MemoryBroker, Subscription, Transport};
use tempfile::NamedTempFile;
use tokio::io::BufReader;

#[tokio::test]
async fn test_framing_then_decoding_preserves_every_record() {
    let mut file = NamedTempFile::new().unwrap();
    let mut expected = Vec::new();
    for i in 0..1234 {
        let line = match i % 4 {
            0 => format!("2024-01-01T00:00:{:02} REGISTER {} SG 10.0.0.{}", i % 60, i, i % 255),
            1 => format!("2024-01-01T00:00:{:02} UPLOAD {} {}", i % 60, i, i),
            _ => format!("2024-01-01T00:00:{:02} WATCH {} {}", i % 60, i, i % 17),
        };
        writeln!(file, "{}", line).unwrap();
        expected.push(line);
    }
    file.flush().unwrap();

    let broker = MemoryBroker::new();
    let input = tokio::fs::File::open(file.path()).await.unwrap();
    let stats = BatchFramer::new(
        Arc::new(broker.clone()),
        FramerConfig {
            batch_size: 100,
            ..Default::default()
        },
    )
    .run(BufReader::new(input))
    .await
    .unwrap();

    assert_eq!(stats.lines, 1234);
    assert_eq!(stats.batches_sent, 13);
    assert_eq!(broker.published("events"), 15);

    broker.close("events");
    let mut sub = broker.subscribe("events").await.unwrap();
    let mut decoded: Vec<Record> = Vec::new();
    let mut controls = 0;
    while let Some(delivery) = sub.next().await.unwrap() {
        match decode(&delivery.payload).unwrap() {
            Message::Control(_) => controls += 1,
            Message::Batch(records) => decoded.extend(records),
        }
        delivery.ack();
    }

    assert_eq!(controls, 2);
    let lines: Vec<String> = decoded.iter().map(|r| r.to_string()).collect();
    assert_eq!(lines, expected);
}

#[tokio::test]
async fn test_crlf_input() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"t1 WATCH 49 100\r\nt2 WATCH 50 100\r\n").unwrap();
    file.flush().unwrap();

    let broker = MemoryBroker::new();
    let input = tokio::fs::File::open(file.path()).await.unwrap();
    let stats = BatchFramer::new(Arc::new(broker), FramerConfig::default())
        .run(BufReader::new(input))
        .await
        .unwrap();

    assert_eq!(stats.errors, 0);
    assert_eq!(stats.records.watch, 2);
}
