//! pipeline-sim-core: producer/consumer pipeline over a bounded buffer
//!
//! This library provides the core components for a learning-focused system
//! that moves student records from one producer to one consumer:
//! - Over a bounded, blocking, FIFO buffer of file identifiers (threaded)
//! - Over a length-prefixed TCP stream (two processes)
//!
//! # Architecture
//!
//! - `record`: the validated student record and its text format
//! - `semaphore`: counting permits with timeouts
//! - `buffer`: bounded blocking FIFO built from two permit pools and a lock
//! - `store`: persisted record files keyed by a cycling identifier
//! - `generator`: seeded random records
//! - `producer` / `consumer`: the roles of the threaded variant
//! - `report`: rendering processed records
//! - `channel`: length-prefixed message framing
//! - `socket`: the roles of the socket variant
//! - `stop`: cooperative shutdown and bounded joins
//! - `metrics`: observable pipeline behavior
//!
//! # Design Principles
//!
//! - **No panics**: All errors are structured and recoverable
//! - **Bounded memory**: The buffer and frame sizes have fixed limits
//! - **Persist before publish**: An identifier is only visible once its file is complete
//! - **Deterministic**: Seeded randomness makes runs reproducible

pub mod buffer;
pub mod channel;
pub mod consumer;
pub mod error;
pub mod generator;
pub mod metrics;
pub mod producer;
pub mod record;
pub mod report;
pub mod semaphore;
pub mod socket;
pub mod stop;
pub mod store;

// Re-export commonly used types
pub use buffer::BoundedBuffer;
pub use channel::FramedChannel;
pub use consumer::{Consumer, ConsumerConfig, ConsumerSummary};
pub use error::{Error, Result};
pub use generator::{GeneratorConfig, RandomRecords, RecordSource};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use producer::{Producer, ProducerConfig, ProducerSummary};
pub use record::Record;
pub use report::{RecordSink, StdoutSink};
pub use socket::SocketConfig;
pub use stop::StopSignal;
pub use store::{RecordStore, StoreConfig};
