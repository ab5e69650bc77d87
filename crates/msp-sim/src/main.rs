//! Headless verification CLI: runs a scripted OBC session against a real
//! [`Engine`] over an in-memory loopback and logs the frame exchange.
//!
//! This is not the I2C transport — there is no hardware here, just the
//! engine and a model OBC driving it, useful for eyeballing a transaction
//! without a spacecraft attached.

use clap::{Parser, Subcommand};
use msp_core::{Engine, ExperimentConfig};
use msp_harness::{ObcSession, RecordingHandlers};
use msp_proto::standard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// MSP transaction engine simulator
#[derive(Parser, Debug)]
#[command(name = "msp-sim")]
#[command(about = "Drives the MSP experiment engine through a scripted OBC session")]
#[command(version)]
struct Args {
    /// Experiment I2C address (7 bits)
    #[arg(long, default_value_t = 0x35)]
    addr: u8,

    /// Maximum transfer unit, in bytes
    #[arg(long, default_value_t = 507)]
    mtu: u32,

    #[command(subcommand)]
    scenario: Scenario,
}

#[derive(Subcommand, Debug)]
enum Scenario {
    /// Send a System-family command and observe the syscommand upcall.
    SysCommand,
    /// Push a Send-family payload to the experiment in chunks.
    Send {
        /// Payload size in bytes
        #[arg(long, default_value_t = 4096)]
        len: usize,
    },
    /// Pull a Request-family response from the experiment.
    Request {
        /// Response size in bytes the scripted handler will serve
        #[arg(long, default_value_t = 4096)]
        len: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "msp_sim=info,msp_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ExperimentConfig::new(args.addr, args.mtu)?;
    let mut handlers = RecordingHandlers::new();

    match &args.scenario {
        Scenario::SysCommand => {
            let mut engine = Engine::new(config, handlers);
            let session = ObcSession::new(config.addr());
            session.run_system_command(&mut engine, standard::SLEEP, 0)?;
            log_events(&engine);
        }
        Scenario::Send { len } => {
            let payload: Vec<u8> = (0..*len as u32).map(|i| (i % 256) as u8).collect();
            let mut engine = Engine::new(config, handlers);
            let session = ObcSession::new(config.addr());
            session.run_send_transaction(&mut engine, standard::SEND_TIME, 0, &payload, args.mtu as usize)?;
            log_events(&engine);
        }
        Scenario::Request { len } => {
            let body: Vec<u8> = (0..*len as u32).map(|i| (i % 256) as u8).collect();
            handlers.queue_response(standard::REQ_PAYLOAD, body);
            let mut engine = Engine::new(config, handlers);
            let session = ObcSession::new(config.addr());
            let response = session.run_request(&mut engine, standard::REQ_PAYLOAD, args.mtu as usize)?;
            tracing::info!(received = response.len(), "request complete");
            log_events(&engine);
        }
    }

    Ok(())
}

fn log_events(engine: &Engine<RecordingHandlers>) {
    for event in engine.handlers().events() {
        tracing::info!(?event, "upcall");
    }
    let violations = msp_harness::check_all(engine.handlers());
    for violation in &violations {
        tracing::warn!(%violation, "invariant violated");
    }
    if violations.is_empty() {
        tracing::info!("all invariants held");
    }
}
