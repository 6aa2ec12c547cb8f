//! Metrics collection and reporting for the pipeline.
//!
//! Both roles update a shared [`PipelineMetrics`] through relaxed atomic
//! counters; nothing here synchronizes the roles with each other. Take a
//! [`MetricsSnapshot`] for reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters shared by producer and consumer (wrap in `Arc`).
#[derive(Debug)]
pub struct PipelineMetrics {
    start_time: Instant,

    // === Producer ===
    produced: AtomicU64,
    dropped: AtomicU64,
    produce_failures: AtomicU64,

    // === Consumer ===
    consumed: AtomicU64,
    consume_failures: AtomicU64,
    delete_failures: AtomicU64,

    // === Transport ===
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

macro_rules! counter {
    ($($(#[$doc:meta])* $name:ident => $field:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            produced: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            produce_failures: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            consume_failures: AtomicU64::new(0),
            delete_failures: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    counter! {
        /// An item was published to the buffer.
        record_produced => produced;
        /// An item was generated but not published (insert timed out).
        record_dropped => dropped;
        /// Generating or persisting an item failed.
        record_produce_failure => produce_failures;
        /// An item was resolved and reported.
        record_consumed => consumed;
        /// A withdrawn handle could not be resolved.
        record_consume_failure => consume_failures;
        /// A processed source could not be deleted.
        record_delete_failure => delete_failures;
    }

    /// A frame carrying `payload_len` bytes was written.
    pub fn record_frame_sent(&self, payload_len: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent
            .fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    /// A frame carrying `payload_len` bytes was read.
    pub fn record_frame_received(&self, payload_len: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            duration: self.start_time.elapsed(),
            produced: self.produced.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            produce_failures: self.produce_failures.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
            consume_failures: self.consume_failures.load(Ordering::Relaxed),
            delete_failures: self.delete_failures.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub duration: Duration,
    pub produced: u64,
    pub dropped: u64,
    pub produce_failures: u64,
    pub consumed: u64,
    pub consume_failures: u64,
    pub delete_failures: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl MetricsSnapshot {
    /// Share of generated items that were dropped on insert timeout.
    pub fn drop_rate(&self) -> f64 {
        let attempted = self.produced + self.dropped;
        if attempted == 0 {
            0.0
        } else {
            self.dropped as f64 / attempted as f64
        }
    }

    /// Consumed items per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.consumed as f64 / secs
        }
    }

    /// Items published but not (yet) consumed.
    pub fn backlog(&self) -> u64 {
        self.produced.saturating_sub(self.consumed + self.consume_failures)
    }

    /// Print a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("PIPELINE SUMMARY");
        println!("{}", "=".repeat(60));
        println!("Duration: {} ms", self.duration.as_millis());
        println!();
        println!("Produced: {}", self.produced);
        println!("Dropped: {} ({:.2}%)", self.dropped, self.drop_rate() * 100.0);
        println!("Produce failures: {}", self.produce_failures);
        println!();
        println!("Consumed: {}", self.consumed);
        println!("Consume failures: {}", self.consume_failures);
        println!("Delete failures: {}", self.delete_failures);
        println!("Left unconsumed: {}", self.backlog());
        if self.frames_sent > 0 || self.frames_received > 0 {
            println!();
            println!("Frames sent: {} ({} bytes)", self.frames_sent, self.bytes_sent);
            println!(
                "Frames received: {} ({} bytes)",
                self.frames_received, self.bytes_received
            );
        }
        println!();
        println!("Throughput: {:.2} records/s", self.throughput());
        println!("{}", "=".repeat(60));
    }

    /// Export as `key=value` lines (for parsing/testing).
    pub fn export_text(&self) -> String {
        format!(
            "duration_ms={}\n\
             produced={}\n\
             dropped={}\n\
             produce_failures={}\n\
             consumed={}\n\
             consume_failures={}\n\
             delete_failures={}\n\
             frames_sent={}\n\
             frames_received={}\n\
             bytes_sent={}\n\
             bytes_received={}\n",
            self.duration.as_millis(),
            self.produced,
            self.dropped,
            self.produce_failures,
            self.consumed,
            self.consume_failures,
            self.delete_failures,
            self.frames_sent,
            self.frames_received,
            self.bytes_sent,
            self.bytes_received,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counters() {
        let metrics = PipelineMetrics::new();
        metrics.record_produced();
        metrics.record_produced();
        metrics.record_dropped();
        metrics.record_consumed();
        metrics.record_frame_sent(100);

        let snap = metrics.snapshot();
        assert_eq!(snap.produced, 2);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.consumed, 1);
        assert_eq!(snap.frames_sent, 1);
        assert_eq!(snap.bytes_sent, 100);
        assert_eq!(snap.backlog(), 1);
    }

    #[test]
    fn test_drop_rate() {
        let snap = MetricsSnapshot {
            produced: 3,
            dropped: 1,
            ..MetricsSnapshot::default()
        };
        assert_eq!(snap.drop_rate(), 0.25);
        assert_eq!(MetricsSnapshot::default().drop_rate(), 0.0);
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = Arc::new(PipelineMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.record_consumed();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().consumed, 4000);
    }

    #[test]
    fn test_export_text() {
        let snap = MetricsSnapshot {
            produced: 10,
            consumed: 9,
            delete_failures: 1,
            ..MetricsSnapshot::default()
        };
        let text = snap.export_text();
        assert!(text.contains("produced=10"));
        assert!(text.contains("consumed=9"));
        assert!(text.contains("delete_failures=1"));
    }
}
