//! Socket variant runners: producer process, consumer process, or both in
//! one process (producer on a background thread).

use crate::config::Config;
use anyhow::{bail, Context, Result};
use pipeline_sim_core::socket::{self, StreamEnd, StreamSummary};
use pipeline_sim_core::stop::{join_timeout, JoinOutcome};
use pipeline_sim_core::{
    FramedChannel, MetricsSnapshot, PipelineMetrics, RandomRecords, StdoutSink, StopSignal,
};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const WATCH_POLL: Duration = Duration::from_millis(50);

/// Listen, serve one consumer, and return once it leaves or we are stopped.
pub fn run_producer(config: &Config, interrupt: &StopSignal) -> Result<MetricsSnapshot> {
    let listener = socket::bind(&config.socket)
        .with_context(|| format!("binding {}", config.socket.addr()))?;
    let metrics = PipelineMetrics::new();
    serve(config, &listener, interrupt, &metrics)?;
    Ok(metrics.snapshot())
}

fn serve(
    config: &Config,
    listener: &TcpListener,
    stop: &StopSignal,
    metrics: &PipelineMetrics,
) -> Result<()> {
    let mut source = RandomRecords::new(config.socket_generator.clone(), config.resolve_seed())?;
    let summary = socket::serve_one(listener, &config.socket, &mut source, stop, metrics)?;
    if summary.peer_closed {
        info!(sent = summary.sent, "consumer disconnected");
    }
    Ok(())
}

/// Connect to a running producer and report records until the stream ends.
pub fn run_consumer(config: &Config, interrupt: &StopSignal) -> Result<MetricsSnapshot> {
    let metrics = PipelineMetrics::new();
    let mut channel = socket::connect(&config.socket)
        .with_context(|| format!("connecting to {}", config.socket.addr()))?;
    consume(config, &mut channel, interrupt, &metrics)?;
    Ok(metrics.snapshot())
}

/// Run `consume_stream`, shutting the socket down if `interrupt` fires so the
/// blocked read returns.
fn consume(
    config: &Config,
    channel: &mut FramedChannel<TcpStream>,
    interrupt: &StopSignal,
    metrics: &PipelineMetrics,
) -> Result<StreamSummary> {
    let stream = channel.get_ref().try_clone().context("cloning consumer socket")?;
    let done = StopSignal::new();
    let watcher = thread::Builder::new().name("interrupt-watch".to_string()).spawn({
        let interrupt = interrupt.clone();
        let done = done.clone();
        move || {
            while !done.is_stopped() {
                if interrupt.sleep(WATCH_POLL) {
                    let _ = stream.shutdown(Shutdown::Both);
                    return;
                }
            }
        }
    })?;

    let mut sink = StdoutSink {
        threshold: config.pipeline.pass_threshold,
    };
    let summary = socket::consume_stream(channel, &mut sink, metrics);
    done.stop();
    let _ = watcher.join();

    match summary.end {
        StreamEnd::Closed => {}
        _ if interrupt.is_stopped() => info!("consumer interrupted"),
        StreamEnd::Truncated => warn!("producer went away mid-message"),
        StreamEnd::Fault => bail!("socket consumer failed after {} records", summary.received),
    }
    Ok(summary)
}

/// Producer on a background thread, consumer on the calling thread.
pub fn run_combined(config: &Config, interrupt: &StopSignal) -> Result<MetricsSnapshot> {
    let listener = socket::bind(&config.socket)
        .with_context(|| format!("binding {}", config.socket.addr()))?;
    let mut consumer_config = config.clone();
    consumer_config.socket.port = listener.local_addr()?.port();

    let metrics = Arc::new(PipelineMetrics::new());
    let producer_stop = StopSignal::new();

    let producer = thread::Builder::new().name("socket-producer".to_string()).spawn({
        let config = config.clone();
        let metrics = Arc::clone(&metrics);
        let stop = producer_stop.clone();
        move || serve(&config, &listener, &stop, &metrics)
    })?;

    let consumed = socket::connect(&consumer_config.socket)
        .context("connecting to in-process producer")
        .and_then(|mut channel| consume(&consumer_config, &mut channel, interrupt, &metrics));

    producer_stop.stop();
    match join_timeout(producer, config.pipeline.join_timeout()) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "socket producer failed"),
        Err(JoinOutcome::TimedOut(_)) => warn!("socket producer did not stop in time"),
        Err(JoinOutcome::Panicked) => warn!("socket producer panicked"),
    }

    consumed?;
    Ok(metrics.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> Config {
        let mut config = Config {
            seed: Some(11),
            ..Config::default()
        };
        config.socket.port = 0;
        config.socket.delay_ms = 0;
        config.socket.max_messages = Some(3);
        config.socket.connect_backoff_ms = 20;
        config
    }

    #[test]
    fn test_combined_run() {
        let snapshot = run_combined(&local_config(), &StopSignal::new()).unwrap();
        assert_eq!(snapshot.frames_sent, 3);
        assert_eq!(snapshot.frames_received, 3);
        assert_eq!(snapshot.consumed, 3);
    }

    #[test]
    fn test_consumer_without_producer_fails() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut config = local_config();
        config.socket.port = port;
        config.socket.connect_attempts = 2;

        assert!(run_consumer(&config, &StopSignal::new()).is_err());
    }
}
