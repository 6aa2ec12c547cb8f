//! Configuration for the pipeline-sim application.
//!
//! Values are resolved in three layers, later ones winning:
//! 1. Built-in defaults (the tool works with ZERO arguments)
//! 2. An optional TOML file (`--config`)
//! 3. Command-line flags
//!
//! The resolved configuration is validated once and then handed to each
//! component by value; nothing reads configuration from global state.
//! Use `--print-config` to see exactly what a run used.

use anyhow::{bail, Context, Result};
use clap::Args;
use pipeline_sim_core::record::{DEFAULT_PASS_THRESHOLD, MAX_MARK, MIN_MARK};
use pipeline_sim_core::{ConsumerConfig, GeneratorConfig, ProducerConfig, SocketConfig, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete configuration for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seed for record generation (None = time-based)
    pub seed: Option<u64>,

    /// Log level and destinations
    pub log: LogConfig,

    /// Buffer and run-length settings for the threaded variant
    pub pipeline: PipelineConfig,

    /// Threaded producer pacing, file cycling and cap
    pub producer: ProducerConfig,

    /// Threaded consumer pacing
    pub consumer: ConsumerConfig,

    /// Record file directory and naming
    pub store: StoreConfig,

    /// Catalogue and ranges used by the threaded producer
    pub generator: GeneratorConfig,

    /// Endpoint and pacing for the socket variant
    pub socket: SocketConfig,

    /// Catalogue and ranges used by the socket producer
    pub socket_generator: GeneratorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: None,
            log: LogConfig::default(),
            pipeline: PipelineConfig::default(),
            producer: ProducerConfig::default(),
            consumer: ConsumerConfig::default(),
            store: StoreConfig::default(),
            generator: GeneratorConfig::default(),
            socket: SocketConfig::default(),
            socket_generator: GeneratorConfig::socket_defaults(),
        }
    }
}

/// Logging destinations and verbosity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `pipeline_sim_core=debug` (RUST_LOG wins)
    pub level: String,

    /// Also append log lines to this file
    pub file: Option<PathBuf>,

    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
        }
    }
}

/// Settings for the threaded run as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Buffer slots
    pub capacity: usize,

    /// Default wait for buffer operations in milliseconds
    pub buffer_timeout_ms: u64,

    /// How long the threaded run lasts in milliseconds
    pub runtime_ms: u64,

    /// How long to wait for each role to stop in milliseconds
    pub join_timeout_ms: u64,

    /// Mark at or above which a course (and a record's average) passes
    pub pass_threshold: f64,

    /// On shutdown, let the consumer empty the buffer before stopping it
    pub drain: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            buffer_timeout_ms: 5_000,
            runtime_ms: 30_000,
            join_timeout_ms: 5_000,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            drain: false,
        }
    }
}

impl PipelineConfig {
    /// `buffer_timeout_ms` as a `Duration`.
    pub fn buffer_timeout(&self) -> Duration {
        Duration::from_millis(self.buffer_timeout_ms)
    }

    /// How long the threaded variant runs before stopping.
    pub fn runtime(&self) -> Duration {
        Duration::from_millis(self.runtime_ms)
    }

    /// Grace period for each worker to finish after stop.
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

/// Command-line overrides. Every flag is optional and global, so it may be
/// given before or after the subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Random seed for reproducible record generation
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Log filter directive (RUST_LOG takes precedence)
    #[arg(long, global = true, env = "PIPELINE_SIM_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Also append logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Buffer capacity
    #[arg(long, global = true)]
    pub capacity: Option<usize>,

    /// Number of distinct record file names before wrapping
    #[arg(long, global = true)]
    pub max_files: Option<u32>,

    /// Directory for record files
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Stop the producer after this many published records (0 = no cap)
    #[arg(long, global = true)]
    pub max_items: Option<u64>,

    /// Threaded run length, e.g. `30s`
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub runtime: Option<Duration>,

    /// Pause between produced records, e.g. `800ms`
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub produce_delay: Option<Duration>,

    /// Pause after each consumed record, e.g. `1.2s`
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub consume_delay: Option<Duration>,

    /// Default wait for buffer inserts, e.g. `5s`
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub buffer_timeout: Option<Duration>,

    /// Pass mark (0-100)
    #[arg(long, global = true)]
    pub threshold: Option<f64>,

    /// Socket host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Socket port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Pause between messages sent by the socket producer, e.g. `1s`
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub socket_delay: Option<Duration>,

    /// Stop the socket producer after this many messages
    #[arg(long, global = true)]
    pub max_messages: Option<u64>,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Load defaults, then the TOML file at `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply command-line overrides on top of the loaded values.
    pub fn apply(&mut self, o: &Overrides) {
        if o.seed.is_some() {
            self.seed = o.seed;
        }
        if let Some(level) = &o.log_level {
            self.log.level = level.clone();
        }
        if let Some(file) = &o.log_file {
            self.log.file = Some(file.clone());
        }
        self.log.json |= o.json;

        if let Some(capacity) = o.capacity {
            self.pipeline.capacity = capacity;
        }
        if let Some(max_files) = o.max_files {
            self.producer.max_files = max_files;
        }
        if let Some(dir) = &o.dir {
            self.store.dir = dir.clone();
        }
        if let Some(cap) = o.max_items {
            self.producer.max_items = (cap > 0).then_some(cap);
        }
        if let Some(runtime) = o.runtime {
            self.pipeline.runtime_ms = millis(runtime);
        }
        if let Some(delay) = o.produce_delay {
            self.producer.delay_ms = millis(delay);
        }
        if let Some(delay) = o.consume_delay {
            self.consumer.delay_ms = millis(delay);
        }
        if let Some(timeout) = o.buffer_timeout {
            self.pipeline.buffer_timeout_ms = millis(timeout);
            self.producer.insert_timeout_ms = millis(timeout);
        }
        if let Some(threshold) = o.threshold {
            self.pipeline.pass_threshold = threshold;
        }

        if let Some(host) = &o.host {
            self.socket.host = host.clone();
        }
        if let Some(port) = o.port {
            self.socket.port = port;
        }
        if let Some(delay) = o.socket_delay {
            self.socket.delay_ms = millis(delay);
        }
        if o.max_messages.is_some() {
            self.socket.max_messages = o.max_messages;
        }
    }

    /// Reject values no run could work with.
    pub fn validate(&self) -> Result<()> {
        let pipeline = &self.pipeline;
        if pipeline.capacity == 0 {
            bail!("capacity must be at least 1");
        }
        let threshold = pipeline.pass_threshold;
        if !(f64::from(MIN_MARK)..=f64::from(MAX_MARK)).contains(&threshold) {
            bail!("pass threshold {threshold} must lie within {MIN_MARK}..={MAX_MARK}");
        }
        let Some(required) = pipeline.capacity.checked_add(2) else {
            bail!("capacity {} is too large", pipeline.capacity);
        };
        if (self.producer.max_files as usize) < required {
            bail!(
                "max_files {} must be at least capacity + 2 ({required}) so a wrapped file \
                 name never replaces one still queued or being consumed",
                self.producer.max_files
            );
        }
        if self.store.prefix.is_empty() && self.store.extension.is_empty() {
            bail!("store needs a file prefix or an extension");
        }
        if self.socket.host.trim().is_empty() {
            bail!("socket host must not be empty");
        }

        self.generator.validate().context("invalid generator settings")?;
        self.socket_generator
            .validate()
            .context("invalid socket generator settings")?;
        Ok(())
    }

    /// The configured seed, or one derived from the clock.
    pub fn resolve_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default()
        })
    }

    /// Print the configuration in human-readable form.
    pub fn print(&self) {
        let cap = |c: Option<u64>| c.map_or("none".to_string(), |n| n.to_string());

        println!("=== Configuration ===");
        let seed = self.seed.map_or("(time-based)".to_string(), |s| s.to_string());
        println!("Seed: {seed}");
        println!("Log level: {}", self.log.level);
        if let Some(file) = &self.log.file {
            println!("Log file: {}", file.display());
        }
        println!();
        println!("=== Threaded Pipeline ===");
        println!("Buffer capacity: {}", self.pipeline.capacity);
        println!("Buffer timeout: {} ms", self.pipeline.buffer_timeout_ms);
        println!("Runtime: {} ms", self.pipeline.runtime_ms);
        println!("Drain on shutdown: {}", self.pipeline.drain);
        println!("Pass threshold: {:.1}", self.pipeline.pass_threshold);
        println!("Record directory: {}", self.store.dir.display());
        println!(
            "File names: {}NNN.{} (max {})",
            self.store.prefix, self.store.extension, self.producer.max_files
        );
        println!("Produce delay: {} ms", self.producer.delay_ms);
        println!("Producer cap: {}", cap(self.producer.max_items));
        println!("Consume delay: {} ms", self.consumer.delay_ms);
        println!();
        println!("=== Socket ===");
        println!("Address: {}", self.socket.addr());
        println!("Send delay: {} ms", self.socket.delay_ms);
        println!("Message cap: {}", cap(self.socket.max_messages));
        println!(
            "Connect attempts: {} ({} ms apart)",
            self.socket.connect_attempts, self.socket.connect_backoff_ms
        );
        println!();
    }
}
