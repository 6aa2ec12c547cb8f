//! Consumer role for the in-memory buffer variant.
//!
//! Each iteration withdraws an identifier, resolves it to its persisted
//! record, reports it, and deletes the file. Resolution and deletion faults
//! are logged and counted but never re-queued: the handle is gone once
//! removed from the buffer.

use crate::buffer::BoundedBuffer;
use crate::error::Result;
use crate::metrics::PipelineMetrics;
use crate::report::RecordSink;
use crate::stop::StopSignal;
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// Consumer tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Pause after each processed item in milliseconds
    pub delay_ms: u64,

    /// How long one remove may wait for an item, in milliseconds
    pub remove_timeout_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1_200,
            remove_timeout_ms: 2_000,
        }
    }
}

impl ConsumerConfig {
    /// Pause after each processed record.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Longest wait for a filled slot before checking stop again.
    pub fn remove_timeout(&self) -> Duration {
        Duration::from_millis(self.remove_timeout_ms)
    }
}

/// Counts reported when a consumer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerSummary {
    pub processed: u64,
    pub failed: u64,
    pub delete_failures: u64,
}

/// Withdraws ids, resolves them through the store and reports the records.
pub struct Consumer<K> {
    config: ConsumerConfig,
    buffer: Arc<BoundedBuffer<u32>>,
    store: RecordStore,
    sink: K,
    metrics: Arc<PipelineMetrics>,
}

impl<K: RecordSink> Consumer<K> {
    pub fn new(
        config: ConsumerConfig,
        buffer: Arc<BoundedBuffer<u32>>,
        store: RecordStore,
        sink: K,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        info!(delay_ms = config.delay_ms, "consumer initialized");
        Self {
            config,
            buffer,
            store,
            sink,
            metrics,
        }
    }

    /// Run until `stop` is observed, or the buffer is closed and drained.
    pub fn run(&mut self, stop: &StopSignal) -> ConsumerSummary {
        info!("consumer started");
        let mut summary = ConsumerSummary::default();

        while !stop.is_stopped() {
            let Some(id) = self.buffer.remove_timeout(self.config.remove_timeout()) else {
                if self.buffer.is_closed() && self.buffer.is_empty() {
                    info!("buffer closed and drained");
                    break;
                }
                continue;
            };

            match self.process(id) {
                Ok(deleted) => {
                    summary.processed += 1;
                    if !deleted {
                        summary.delete_failures += 1;
                    }
                }
                Err(e) => {
                    warn!(file = %self.store.file_name(id), error = %e, "failed to process record");
                    self.metrics.record_consume_failure();
                    summary.failed += 1;
                }
            }

            if stop.sleep(self.config.delay()) {
                break;
            }
        }

        info!(
            processed = summary.processed,
            failed = summary.failed,
            delete_failures = summary.delete_failures,
            "consumer finished"
        );
        summary
    }

    /// Resolve, report and delete one item. Returns whether the delete worked.
    fn process(&mut self, id: u32) -> Result<bool> {
        let file = self.store.file_name(id);
        let record = self.store.load(id)?;

        self.sink.accept(&file, &record);
        self.metrics.record_consumed();
        info!(file = %file, student = %record, average = record.average(), "consumed record");

        match self.store.remove(id) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(file = %file, error = %e, "could not delete processed file");
                self.metrics.record_delete_failure();
                Ok(false)
            }
        }
    }
}

impl<K: RecordSink + 'static> Consumer<K> {
    /// Run on a dedicated thread named `consumer`.
    pub fn spawn(mut self, stop: StopSignal) -> Result<JoinHandle<ConsumerSummary>> {
        let handle = thread::Builder::new()
            .name("consumer".to_string())
            .spawn(move || self.run(&stop))?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::report::CollectSink;
    use crate::store::StoreConfig;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        buffer: Arc<BoundedBuffer<u32>>,
        store: RecordStore,
        sink: CollectSink,
        metrics: Arc<PipelineMetrics>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let store = RecordStore::open(StoreConfig {
                dir: dir.path().to_path_buf(),
                ..StoreConfig::default()
            })
            .unwrap();
            Self {
                _dir: dir,
                buffer: Arc::new(BoundedBuffer::with_capacity(5).unwrap()),
                store,
                sink: CollectSink::new(),
                metrics: Arc::new(PipelineMetrics::new()),
            }
        }

        fn consumer(&self) -> Consumer<CollectSink> {
            let config = ConsumerConfig {
                delay_ms: 0,
                remove_timeout_ms: 20,
            };
            Consumer::new(
                config,
                Arc::clone(&self.buffer),
                self.store.clone(),
                self.sink.clone(),
                Arc::clone(&self.metrics),
            )
        }
    }

    fn record(name: &str) -> Record {
        Record::new(name, "1", "BSc IT", vec!["CSC101".to_string()], vec![65]).unwrap()
    }

    #[test]
    fn test_drains_closed_buffer() {
        let fx = Fixture::new();
        for (id, name) in [(1, "Aisha"), (2, "Sipho"), (3, "James")] {
            fx.store.save(id, &record(name)).unwrap();
            assert!(fx.buffer.insert(id));
        }
        fx.buffer.close();

        let summary = fx.consumer().run(&StopSignal::new());

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.failed, 0);
        let names: Vec<_> = fx
            .sink
            .records()
            .into_iter()
            .map(|(file, r)| (file, r.name().to_string()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("student001.json".to_string(), "Aisha".to_string()),
                ("student002.json".to_string(), "Sipho".to_string()),
                ("student003.json".to_string(), "James".to_string()),
            ]
        );
        assert_eq!(fs::read_dir(fx.store.dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_file_is_not_fatal() {
        let fx = Fixture::new();
        assert!(fx.buffer.insert(9));
        fx.store.save(10, &record("Zanele")).unwrap();
        assert!(fx.buffer.insert(10));
        fx.buffer.close();

        let summary = fx.consumer().run(&StopSignal::new());

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(fx.metrics.snapshot().consume_failures, 1);
        assert_eq!(fx.sink.len(), 1);
    }

    /// Deletes the file behind `label` while reporting it, so the consumer's
    /// own delete finds nothing.
    struct DeletingSink {
        store: RecordStore,
        seen: Vec<String>,
    }

    impl RecordSink for DeletingSink {
        fn accept(&mut self, label: &str, _record: &Record) {
            if label == self.store.file_name(5) {
                self.store.remove(5).unwrap();
            }
            self.seen.push(label.to_string());
        }
    }

    #[test]
    fn test_delete_failure_is_counted_not_fatal() {
        let fx = Fixture::new();
        for (id, name) in [(5, "Thabo"), (6, "Nokuthula")] {
            fx.store.save(id, &record(name)).unwrap();
            assert!(fx.buffer.insert(id));
        }
        fx.buffer.close();

        let sink = DeletingSink {
            store: fx.store.clone(),
            seen: Vec::new(),
        };
        let config = ConsumerConfig {
            delay_ms: 0,
            remove_timeout_ms: 20,
        };
        let mut consumer = Consumer::new(
            config,
            Arc::clone(&fx.buffer),
            fx.store.clone(),
            sink,
            Arc::clone(&fx.metrics),
        );
        let summary = consumer.run(&StopSignal::new());

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.delete_failures, 1);
        assert_eq!(consumer.sink.seen, vec!["student005.json", "student006.json"]);

        let snapshot = fx.metrics.snapshot();
        assert_eq!(snapshot.consumed, 2);
        assert_eq!(snapshot.delete_failures, 1);
        assert_eq!(snapshot.consume_failures, 0);
        assert!(!fx.store.exists(6));
    }

    #[test]
    fn test_malformed_file_is_not_fatal() {
        let fx = Fixture::new();
        fs::write(fx.store.path_for(4), "{}").unwrap();
        assert!(fx.buffer.insert(4));
        fx.buffer.close();

        let summary = fx.consumer().run(&StopSignal::new());
        assert_eq!(summary.failed, 1);
        assert!(fx.sink.is_empty());
    }

    #[test]
    fn test_stops_on_signal_while_idle() {
        let fx = Fixture::new();
        let stop = StopSignal::new();
        let handle = fx.consumer().spawn(stop.clone()).unwrap();

        thread::sleep(Duration::from_millis(60));
        stop.stop();

        let summary = handle.join().unwrap();
        assert_eq!(summary, ConsumerSummary::default());
    }
}
