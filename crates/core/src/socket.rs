//! Socket variant: producer and consumer in separate processes.
//!
//! The producer listens, accepts exactly one consumer, then streams one
//! serialized [`Record`](crate::record::Record) per iteration through a
//! [`FramedChannel`]. There is no buffer and no store on this path; TCP flow
//! control is the only backpressure.

use crate::channel::FramedChannel;
use crate::error::{Error, FrameError, Result};
use crate::generator::RecordSource;
use crate::metrics::PipelineMetrics;
use crate::record::Record;
use crate::report::RecordSink;
use crate::stop::StopSignal;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Accept poll interval while waiting for the consumer to connect
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Endpoint and pacing for the socket variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Address the producer binds and the consumer connects to
    pub host: String,

    /// TCP port (0 = any free port when binding)
    pub port: u16,

    /// Pause between sent messages in milliseconds
    pub delay_ms: u64,

    /// Stop after this many sent messages (None = until stopped)
    pub max_messages: Option<u64>,

    /// Consumer connect attempts before giving up
    pub connect_attempts: u32,

    /// Pause between connect attempts in milliseconds
    pub connect_backoff_ms: u64,

    /// Consumer read timeout in milliseconds (None = block until data or EOF)
    pub read_timeout_ms: Option<u64>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9009,
            delay_ms: 1_000,
            max_messages: None,
            connect_attempts: 10,
            connect_backoff_ms: 500,
            read_timeout_ms: None,
        }
    }
}

impl SocketConfig {
    /// `host:port`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Pause between sent messages.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Pause between connect attempts.
    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }

    /// Consumer read timeout, if any.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

/// Counts reported when the socket producer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocketProducerSummary {
    pub sent: u64,
    pub failed: u64,
    /// The consumer went away (reset or broken pipe) before we stopped
    pub peer_closed: bool,
}

/// Bind the producer's listening socket.
pub fn bind(config: &SocketConfig) -> Result<TcpListener> {
    let listener = TcpListener::bind(config.addr())?;
    info!(addr = %listener.local_addr()?, "socket producer listening");
    Ok(listener)
}

/// Accept a single consumer, then stream records to it.
///
/// Waiting for the connection observes `stop`; once connected the loop runs
/// until `stop`, the message cap, or the peer disconnecting. A generation
/// failure skips that iteration.
///
/// # Errors
/// Accept failures and transport faults other than a peer disconnect.
pub fn serve_one<S: RecordSource>(
    listener: &TcpListener,
    config: &SocketConfig,
    source: &mut S,
    stop: &StopSignal,
    metrics: &PipelineMetrics,
) -> Result<SocketProducerSummary> {
    let mut summary = SocketProducerSummary::default();

    let Some(stream) = accept(listener, stop)? else {
        info!("stopped before a consumer connected");
        return Ok(summary);
    };
    let mut channel = FramedChannel::new(stream);

    while !stop.is_stopped() && !config.max_messages.is_some_and(|cap| summary.sent >= cap) {
        let payload = match source.next_record().and_then(|r| r.to_text()) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "failed to generate record");
                metrics.record_produce_failure();
                summary.failed += 1;
                if stop.sleep(config.delay()) {
                    break;
                }
                continue;
            }
        };

        match channel.send(payload.as_bytes()) {
            Ok(()) => {
                summary.sent += 1;
                metrics.record_produced();
                metrics.record_frame_sent(payload.len());
                info!(bytes = payload.len(), "sent one record");
            }
            Err(e) if e.is_disconnect() => {
                info!(error = %e, "connection closed by consumer");
                summary.peer_closed = true;
                break;
            }
            Err(e) => return Err(e.into()),
        }

        if stop.sleep(config.delay()) {
            break;
        }
    }

    info!(sent = summary.sent, failed = summary.failed, "socket producer finished");
    Ok(summary)
}

/// Wait for one connection, polling so `stop` is honoured.
fn accept(listener: &TcpListener, stop: &StopSignal) -> Result<Option<TcpStream>> {
    listener.set_nonblocking(true)?;
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                info!(%peer, "consumer connected");
                return Ok(Some(stream));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if stop.sleep(ACCEPT_POLL) {
                    return Ok(None);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
}

/// Connect to the producer, retrying while it starts up.
///
/// # Errors
/// The last connect error once `connect_attempts` are used up.
pub fn connect(config: &SocketConfig) -> Result<FramedChannel<TcpStream>> {
    let addr = config.addr();
    let attempts = config.connect_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match TcpStream::connect(&addr) {
            Ok(stream) => {
                stream.set_read_timeout(config.read_timeout())?;
                info!(%addr, attempt, "connected to producer");
                return Ok(FramedChannel::new(stream));
            }
            Err(e) => {
                debug!(%addr, attempt, error = %e, "connect failed");
                last_error = Some(e);
                if attempt < attempts {
                    std::thread::sleep(config.connect_backoff());
                }
            }
        }
    }

    warn!(%addr, attempts, "could not connect; is the producer running?");
    Err(last_error
        .map(Error::Io)
        .unwrap_or_else(|| Error::Config(format!("no connect attempts made to {addr}"))))
}

/// How a consumed stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Peer closed between messages
    Closed,
    /// Peer closed part way through a message
    Truncated,
    /// Transport error (reset, timeout, oversized frame)
    Fault,
}

/// Counts reported when the socket consumer stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub received: u64,
    pub rejected: u64,
    pub end: StreamEnd,
}

/// Receive and report records until the stream ends.
///
/// Payloads that are not UTF-8 or do not parse as a valid record are logged
/// and skipped; the stream stays usable since framing is intact.
pub fn consume_stream<S, K>(
    channel: &mut FramedChannel<S>,
    sink: &mut K,
    metrics: &PipelineMetrics,
) -> StreamSummary
where
    S: Read + Write,
    K: RecordSink + ?Sized,
{
    let mut received = 0u64;
    let mut rejected = 0u64;

    let end = loop {
        let payload = match channel.receive() {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                info!("producer closed the stream");
                break StreamEnd::Closed;
            }
            Err(FrameError::Truncated { expected, received: got }) => {
                warn!(expected, received = got, "stream ended mid-message");
                break StreamEnd::Truncated;
            }
            Err(e) => {
                error!(error = %e, "receive failed");
                break StreamEnd::Fault;
            }
        };
        metrics.record_frame_received(payload.len());

        match Record::from_bytes(&payload) {
            Ok(record) => {
                received += 1;
                sink.accept(&format!("socket message {received}"), &record);
                metrics.record_consumed();
                debug!(student = %record, "received record");
            }
            Err(e) => {
                warn!(bytes = payload.len(), error = %e, "discarding undecodable message");
                metrics.record_consume_failure();
                rejected += 1;
            }
        }
    };

    info!(received, rejected, ?end, "socket consumer finished");
    StreamSummary {
        received,
        rejected,
        end,
    }
}
