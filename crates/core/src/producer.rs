//! Producer role for the in-memory buffer variant.
//!
//! Each iteration generates a record, persists it under the next identifier,
//! then publishes the identifier through the [`BoundedBuffer`]. Persisting
//! strictly before publishing is what lets a consumer trust that every id it
//! withdraws resolves to a complete file.
//!
//! Delivery is at-most-once and best-effort: a record whose insert times out
//! is dropped (its file removed) and never retried. The sequence only
//! advances on a successful publish, so the next record reuses the free
//! identifier and at most `capacity + 2` identifiers are ever live. The
//! pacing delay between iterations is not backpressure; the blocking insert
//! is.

use crate::buffer::BoundedBuffer;
use crate::error::{Error, Result};
use crate::generator::RecordSource;
use crate::metrics::PipelineMetrics;
use crate::stop::StopSignal;
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

/// Producer tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Pause between iterations in milliseconds
    pub delay_ms: u64,

    /// How long one insert may wait for a free slot, in milliseconds
    pub insert_timeout_ms: u64,

    /// Identifiers cycle through 1..=max_files
    pub max_files: u32,

    /// Stop after this many published items (None = until stopped)
    pub max_items: Option<u64>,

    /// Pause after a failed iteration in milliseconds
    pub error_pause_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            delay_ms: 800,
            insert_timeout_ms: 5_000,
            max_files: 20,
            max_items: Some(100),
            error_pause_ms: 1_000,
        }
    }
}

impl ProducerConfig {
    /// Pause after each produced record.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Longest wait for a free slot before the record is dropped.
    pub fn insert_timeout(&self) -> Duration {
        Duration::from_millis(self.insert_timeout_ms)
    }

    /// Back-off after a failed save.
    pub fn error_pause(&self) -> Duration {
        Duration::from_millis(self.error_pause_ms)
    }
}

/// Cycling file identifiers: 1, 2, ..., max, 1, 2, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSequence {
    next: u32,
    max: u32,
}

impl FileSequence {
    /// # Errors
    /// `Error::Config` if `max` is zero.
    pub fn new(max: u32) -> Result<Self> {
        if max == 0 {
            return Err(Error::Config("max_files must be positive".to_string()));
        }
        Ok(Self { next: 1, max })
    }

    /// Return the current identifier and advance, wrapping after `max`.
    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next = id % self.max + 1;
        id
    }

    pub fn peek(&self) -> u32 {
        self.next
    }
}

/// Counts reported when a producer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerSummary {
    pub produced: u64,
    pub dropped: u64,
    pub failed: u64,
}

/// Outcome of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Published {
    Yes,
    Dropped,
}

/// Generates records, persists them, and publishes their ids.
pub struct Producer<S> {
    config: ProducerConfig,
    buffer: Arc<BoundedBuffer<u32>>,
    store: RecordStore,
    source: S,
    metrics: Arc<PipelineMetrics>,
    sequence: FileSequence,
}

impl<S: RecordSource> Producer<S> {
    /// # Errors
    /// `Error::Config` if `max_files` is zero, or so small that a wrapped id
    /// could overwrite a file still queued or being consumed
    /// (`max_files < capacity + 2`).
    pub fn new(
        config: ProducerConfig,
        buffer: Arc<BoundedBuffer<u32>>,
        store: RecordStore,
        source: S,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<Self> {
        let sequence = FileSequence::new(config.max_files)?;
        let required = buffer.capacity().checked_add(2).ok_or_else(|| {
            Error::Config(format!("buffer capacity {} is too large", buffer.capacity()))
        })?;
        if (config.max_files as usize) < required {
            return Err(Error::Config(format!(
                "max_files {} must be at least buffer capacity + 2 ({})",
                config.max_files, required
            )));
        }

        info!(delay_ms = config.delay_ms, max_files = config.max_files, "producer initialized");

        Ok(Self {
            config,
            buffer,
            store,
            source,
            metrics,
            sequence,
        })
    }

    /// Run until `stop` is observed or the item cap is reached.
    pub fn run(&mut self, stop: &StopSignal) -> ProducerSummary {
        info!("producer started");
        let mut summary = ProducerSummary::default();

        while !stop.is_stopped() && !self.cap_reached(&summary) {
            match self.produce_one() {
                Ok(Published::Yes) => summary.produced += 1,
                Ok(Published::Dropped) => summary.dropped += 1,
                Err(e) => {
                    error!(error = %e, "error in producer loop");
                    self.metrics.record_produce_failure();
                    summary.failed += 1;
                    if stop.sleep(self.config.error_pause()) {
                        break;
                    }
                    continue;
                }
            }

            if stop.sleep(self.config.delay()) {
                break;
            }
        }

        info!(
            produced = summary.produced,
            dropped = summary.dropped,
            failed = summary.failed,
            "producer finished"
        );
        summary
    }

    fn cap_reached(&self, summary: &ProducerSummary) -> bool {
        self.config
            .max_items
            .is_some_and(|cap| summary.produced >= cap)
    }

    fn produce_one(&mut self) -> Result<Published> {
        let record = self.source.next_record()?;
        let id = self.sequence.peek();
        let file = self.store.file_name(id);

        self.store.save(id, &record)?;

        if self.buffer.insert_timeout(id, self.config.insert_timeout()) {
            self.sequence.next_id();
            info!(file = %file, student = %record, "produced record");
            self.metrics.record_produced();
            return Ok(Published::Yes);
        }

        warn!(file = %file, "failed to insert into buffer; dropping record");
        if let Err(e) = self.store.remove(id) {
            warn!(file = %file, error = %e, "could not delete dropped record file");
        }
        self.metrics.record_dropped();
        Ok(Published::Dropped)
    }
}

impl<S: RecordSource + 'static> Producer<S> {
    /// Run on a dedicated thread named `producer`.
    pub fn spawn(mut self, stop: StopSignal) -> Result<JoinHandle<ProducerSummary>> {
        let handle = thread::Builder::new()
            .name("producer".to_string())
            .spawn(move || self.run(&stop))?;
        Ok(handle)
    }
}
