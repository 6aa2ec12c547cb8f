//! Threaded variant: one producer and one consumer thread sharing a
//! bounded buffer of record file ids.
//!
//! Shutdown order:
//! 1. Wait for the runtime to elapse (or an interrupt).
//! 2. Stop the producer and join it with a bounded wait.
//! 3. With `drain`, close the buffer and let the consumer empty it; a second
//!    interrupt cuts the drain short.
//! 4. Stop the consumer and join it with a bounded wait.
//!
//! A role that does not stop in time is reported and left detached; the
//! process exits anyway.

use crate::config::Config;
use anyhow::{Context, Result};
use pipeline_sim_core::stop::{join_timeout, JoinOutcome};
use pipeline_sim_core::{
    BoundedBuffer, Consumer, MetricsSnapshot, PipelineMetrics, Producer, RandomRecords,
    RecordStore, StdoutSink, StopSignal,
};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const WAIT_POLL: Duration = Duration::from_millis(100);

/// Run the threaded pipeline until the runtime elapses or `interrupt` fires.
pub fn run(config: &Config, interrupt: &StopSignal) -> Result<MetricsSnapshot> {
    let seed = config.resolve_seed();
    let pipeline = &config.pipeline;

    let store = RecordStore::open(config.store.clone())
        .with_context(|| format!("opening record directory {}", config.store.dir.display()))?;
    let buffer = Arc::new(BoundedBuffer::new(pipeline.capacity, pipeline.buffer_timeout())?);
    let metrics = Arc::new(PipelineMetrics::new());
    let source = RandomRecords::new(config.generator.clone(), seed)?;

    info!(
        seed,
        capacity = pipeline.capacity,
        runtime_ms = pipeline.runtime_ms,
        dir = %config.store.dir.display(),
        "starting threaded pipeline"
    );

    let producer_stop = StopSignal::new();
    let consumer_stop = StopSignal::new();

    let producer = Producer::new(
        config.producer.clone(),
        Arc::clone(&buffer),
        store.clone(),
        source,
        Arc::clone(&metrics),
    )?
    .spawn(producer_stop.clone())?;

    let consumer = Consumer::new(
        config.consumer.clone(),
        Arc::clone(&buffer),
        store,
        StdoutSink {
            threshold: pipeline.pass_threshold,
        },
        Arc::clone(&metrics),
    )
    .spawn(consumer_stop.clone())?;

    wait_for_runtime(config, interrupt, &producer);

    info!("stopping producer");
    producer_stop.stop();
    match join_timeout(producer, pipeline.join_timeout()) {
        Ok(summary) => info!(
            produced = summary.produced,
            dropped = summary.dropped,
            failed = summary.failed,
            "producer stopped"
        ),
        Err(outcome) => report_unjoined("producer", outcome),
    }

    if pipeline.drain && !interrupt.is_stopped() {
        info!(queued = buffer.size(), "draining buffer");
        buffer.close();
        while !consumer.is_finished() && !interrupt.sleep(WAIT_POLL) {}
    }

    info!("stopping consumer");
    consumer_stop.stop();
    match join_timeout(consumer, pipeline.join_timeout()) {
        Ok(summary) => info!(
            processed = summary.processed,
            failed = summary.failed,
            delete_failures = summary.delete_failures,
            "consumer stopped"
        ),
        Err(outcome) => report_unjoined("consumer", outcome),
    }

    let left = buffer.size();
    if left > 0 {
        warn!(left, dir = %config.store.dir.display(), "records left unconsumed on disk");
    }

    Ok(metrics.snapshot())
}

/// Block until the runtime elapses or an interrupt arrives. With `drain`, a
/// producer that reached its cap also ends the wait.
fn wait_for_runtime<T>(config: &Config, interrupt: &StopSignal, producer: &JoinHandle<T>) {
    let deadline = Instant::now() + config.pipeline.runtime();
    loop {
        let now = Instant::now();
        if now >= deadline {
            info!("runtime elapsed");
            return;
        }
        if interrupt.sleep((deadline - now).min(WAIT_POLL)) {
            info!("interrupted");
            return;
        }
        if config.pipeline.drain && producer.is_finished() {
            info!("producer finished early");
            return;
        }
    }
}

fn report_unjoined<T>(role: &str, outcome: JoinOutcome<T>) {
    match outcome {
        JoinOutcome::TimedOut(_) => warn!(role, "did not stop in time; leaving it detached"),
        JoinOutcome::Panicked => error!(role, "thread panicked"),
    }
}
