//! Integration tests for the full pipeline.
//!
//! These tests verify end-to-end behavior for both variants:
//! generate -> persist -> buffer -> resolve -> report, and
//! generate -> frame -> TCP -> decode -> report, with verification that the
//! consumer sees exactly what the producer generated, in order.

use pipeline_sim_core::{
    generator::{GeneratorConfig, RandomRecords},
    report::CollectSink,
    socket::{self, SocketConfig, StreamEnd},
    stop::{join_timeout, StopSignal},
    BoundedBuffer, Consumer, ConsumerConfig, PipelineMetrics, Producer, ProducerConfig, Record,
    RecordStore, StoreConfig,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const SEED: u64 = 2024;

fn expected_records(config: GeneratorConfig, count: usize) -> Vec<Record> {
    let mut source = RandomRecords::new(config, SEED).expect("generator");
    (0..count).map(|_| source.generate().expect("record")).collect()
}

fn open_store(dir: &TempDir) -> RecordStore {
    RecordStore::open(StoreConfig {
        dir: dir.path().to_path_buf(),
        ..StoreConfig::default()
    })
    .expect("store")
}

/// Producer and consumer threads over a small buffer, wrapping identifiers.
#[test]
fn test_threaded_pipeline_delivers_in_order() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let buffer = Arc::new(BoundedBuffer::new(3, Duration::from_secs(5)).unwrap());
    let metrics = Arc::new(PipelineMetrics::new());
    let stop = StopSignal::new();
    let sink = CollectSink::new();

    let producer = Producer::new(
        ProducerConfig {
            delay_ms: 0,
            insert_timeout_ms: 5_000,
            max_files: 8,
            max_items: Some(12),
            error_pause_ms: 0,
        },
        Arc::clone(&buffer),
        store.clone(),
        RandomRecords::new(GeneratorConfig::default(), SEED).unwrap(),
        Arc::clone(&metrics),
    )
    .unwrap();
    let consumer = Consumer::new(
        ConsumerConfig {
            delay_ms: 5,
            remove_timeout_ms: 50,
        },
        Arc::clone(&buffer),
        store.clone(),
        sink.clone(),
        Arc::clone(&metrics),
    );

    let producer = producer.spawn(stop.clone()).unwrap();
    let consumer = consumer.spawn(stop.clone()).unwrap();

    // The producer stops on its own at the cap; closing lets the consumer drain.
    let produced = join_timeout(producer, Duration::from_secs(30)).expect("producer finished");
    buffer.close();
    let consumed = join_timeout(consumer, Duration::from_secs(30)).expect("consumer finished");

    assert_eq!(produced.produced, 12);
    assert_eq!(produced.dropped, 0);
    assert_eq!(consumed.processed, 12);
    assert_eq!(consumed.failed, 0);

    let received = sink.records();
    let labels: Vec<_> = received.iter().map(|(label, _)| label.as_str()).collect();
    let expected_labels: Vec<_> = (1..=8)
        .chain(1..=4)
        .map(|id| format!("student{id:03}.json"))
        .collect();
    assert_eq!(labels, expected_labels);

    let records: Vec<_> = received.into_iter().map(|(_, record)| record).collect();
    assert_eq!(records, expected_records(GeneratorConfig::default(), 12));

    // Every processed file is deleted.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let snap = metrics.snapshot();
    assert_eq!(snap.produced, 12);
    assert_eq!(snap.consumed, 12);
    assert_eq!(snap.backlog(), 0);
}

/// A fast producer against a slow consumer is held back by the buffer.
#[test]
fn test_threaded_pipeline_backpressure() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let buffer = Arc::new(BoundedBuffer::with_capacity(2).unwrap());
    let metrics = Arc::new(PipelineMetrics::new());
    let stop = StopSignal::new();
    let sink = CollectSink::new();

    // Sample the buffer size while the pipeline runs.
    let sampling = Arc::new(AtomicBool::new(true));
    let sampler = thread::spawn({
        let buffer = Arc::clone(&buffer);
        let sampling = Arc::clone(&sampling);
        move || {
            let mut max_seen = 0;
            while sampling.load(Ordering::SeqCst) {
                max_seen = max_seen.max(buffer.size());
                thread::yield_now();
            }
            max_seen
        }
    });

    let producer = Producer::new(
        ProducerConfig {
            delay_ms: 0,
            insert_timeout_ms: 5_000,
            max_files: 6,
            max_items: Some(10),
            error_pause_ms: 0,
        },
        Arc::clone(&buffer),
        store.clone(),
        RandomRecords::new(GeneratorConfig::default(), SEED).unwrap(),
        Arc::clone(&metrics),
    )
    .unwrap()
    .spawn(stop.clone())
    .unwrap();
    let consumer = Consumer::new(
        ConsumerConfig {
            delay_ms: 20,
            remove_timeout_ms: 50,
        },
        Arc::clone(&buffer),
        store,
        sink.clone(),
        Arc::clone(&metrics),
    )
    .spawn(stop.clone())
    .unwrap();

    let produced = join_timeout(producer, Duration::from_secs(30)).expect("producer finished");
    buffer.close();
    let consumed = join_timeout(consumer, Duration::from_secs(30)).expect("consumer finished");
    sampling.store(false, Ordering::SeqCst);
    let max_seen = sampler.join().unwrap();

    assert_eq!(produced.produced, 10);
    assert_eq!(produced.dropped, 0);
    assert_eq!(consumed.processed, 10);
    assert!(max_seen <= 2, "buffer held {max_seen} items");
    assert_eq!(sink.len(), 10);
}

/// Stopping mid-run ends both roles within a bounded time.
#[test]
fn test_threaded_pipeline_stops_on_signal() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let buffer = Arc::new(BoundedBuffer::with_capacity(4).unwrap());
    let metrics = Arc::new(PipelineMetrics::new());
    let stop = StopSignal::new();

    let producer = Producer::new(
        ProducerConfig {
            delay_ms: 10,
            insert_timeout_ms: 100,
            max_files: 10,
            max_items: None,
            error_pause_ms: 0,
        },
        Arc::clone(&buffer),
        store.clone(),
        RandomRecords::new(GeneratorConfig::default(), SEED).unwrap(),
        Arc::clone(&metrics),
    )
    .unwrap()
    .spawn(stop.clone())
    .unwrap();
    let consumer = Consumer::new(
        ConsumerConfig {
            delay_ms: 10,
            remove_timeout_ms: 100,
        },
        Arc::clone(&buffer),
        store,
        CollectSink::new(),
        Arc::clone(&metrics),
    )
    .spawn(stop.clone())
    .unwrap();

    thread::sleep(Duration::from_millis(200));
    stop.stop();

    let produced = join_timeout(producer, Duration::from_secs(5)).expect("producer stopped");
    let consumed = join_timeout(consumer, Duration::from_secs(5)).expect("consumer stopped");

    assert!(produced.produced > 0);
    // Whatever was published is either consumed or still queued.
    assert_eq!(
        produced.produced,
        consumed.processed + consumed.failed + buffer.size() as u64
    );
}

/// Socket producer and consumer over loopback.
#[test]
fn test_socket_pipeline_delivers_in_order() {
    let config = SocketConfig {
        port: 0,
        delay_ms: 0,
        max_messages: Some(6),
        connect_attempts: 20,
        connect_backoff_ms: 25,
        ..SocketConfig::default()
    };
    let listener = socket::bind(&config).unwrap();
    let port = listener.local_addr().unwrap().port();
    let metrics = Arc::new(PipelineMetrics::new());

    let producer = thread::spawn({
        let config = config.clone();
        let metrics = Arc::clone(&metrics);
        move || {
            let mut source = RandomRecords::new(GeneratorConfig::socket_defaults(), SEED).unwrap();
            socket::serve_one(&listener, &config, &mut source, &StopSignal::new(), &metrics)
        }
    });

    let mut channel = socket::connect(&SocketConfig { port, ..config }).unwrap();
    let mut sink = CollectSink::new();
    let summary = socket::consume_stream(&mut channel, &mut sink, &metrics);
    let sent = producer.join().unwrap().unwrap();

    assert_eq!(sent.sent, 6);
    assert!(!sent.peer_closed);
    assert_eq!(summary.received, 6);
    assert_eq!(summary.end, StreamEnd::Closed);

    let records: Vec<_> = sink.records().into_iter().map(|(_, r)| r).collect();
    assert_eq!(records, expected_records(GeneratorConfig::socket_defaults(), 6));

    let snap = metrics.snapshot();
    assert_eq!(snap.frames_sent, 6);
    assert_eq!(snap.frames_received, 6);
    assert_eq!(snap.bytes_sent, snap.bytes_received);
}
