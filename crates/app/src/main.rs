//! pipeline-sim: bounded-buffer producer/consumer pipeline for student records
//!
//! Subcommands:
//! - `threaded`: producer and consumer threads sharing an in-memory buffer
//! - `socket-producer` / `socket-consumer`: the two processes of the TCP variant
//! - `socket`: both TCP roles in one process

mod config;
mod logging;
mod socket;
mod threaded;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{Config, Overrides};
use pipeline_sim_core::StopSignal;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "pipeline-sim", version, about = "Producer/consumer pipeline simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file
    #[arg(long, global = true, env = "PIPELINE_SIM_CONFIG")]
    config: Option<PathBuf>,

    /// Print the resolved configuration before running
    #[arg(long, global = true)]
    print_config: bool,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Producer and consumer threads over a bounded buffer
    Threaded {
        /// Let the consumer empty the buffer before stopping
        #[arg(long)]
        drain: bool,
    },
    /// Listen and stream records to one consumer
    SocketProducer,
    /// Connect to a producer and report the records it sends
    SocketConsumer,
    /// Socket producer and consumer in one process
    Socket,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply(&cli.overrides);
    if let Command::Threaded { drain: true } = cli.command {
        config.pipeline.drain = true;
    }
    config.validate().context("invalid configuration")?;

    logging::init(&config.log)?;

    if cli.print_config {
        config.print();
    }

    let interrupt = StopSignal::new();
    ctrlc::set_handler({
        let interrupt = interrupt.clone();
        move || {
            info!("interrupt received; stopping");
            interrupt.stop();
        }
    })
    .context("installing Ctrl+C handler")?;

    let snapshot = match cli.command {
        Command::Threaded { .. } => threaded::run(&config, &interrupt)?,
        Command::SocketProducer => socket::run_producer(&config, &interrupt)?,
        Command::SocketConsumer => socket::run_consumer(&config, &interrupt)?,
        Command::Socket => socket::run_combined(&config, &interrupt)?,
    };

    snapshot.print_summary();
    Ok(())
}
