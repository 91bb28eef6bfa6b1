// src/main.rs - plotter-host entry point.
//
// The drawing engine is synchronous and runs on a blocking task; the async
// side of the process only drains the host event channel into the wire.
use clap::Parser;
use thiserror::Error;

use cabledraw::clock::{MonotonicClock, SimClock};
use cabledraw::comms::{self, WireSink};
use cabledraw::config::{Config, ConfigError};
use cabledraw::events::EventSink;
use cabledraw::hardware::SimulatorIo;
use cabledraw::plotter::{Plotter, PlotterError};

/// Step interval the simulated clock advances per poll, microseconds.
const SIM_CLOCK_QUANTUM_US: u64 = 5;

/// Events buffered between the stepping loop and the wire before the
/// channel starts shedding.
const EVENT_CHANNEL_CAPACITY: usize = 4096;

#[derive(Parser)]
#[command(name = "plotter-host", version, about = "Suspended plotter motion controller")]
struct Cli {
    /// Configuration file, TOML or legacy `key value` format
    #[arg(short, long, default_value = "plotter.toml")]
    config: String,

    /// Drawing file to plot (G-code or SVG); overrides the configured one
    drawing: Option<String>,

    /// Run against the simulated clock at full speed
    #[arg(long)]
    simulate: bool,
}

#[derive(Debug, Error)]
enum HostError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Plotter(#[from] PlotterError),
    #[error("host link: {0}")]
    Link(#[from] std::io::Error),
    #[error("no drawing file given on the command line or in the configuration")]
    NoDrawing,
    #[error("drawing task panicked: {0}")]
    Job(#[from] tokio::task::JoinError),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    if let Err(err) = run(Cli::parse()).await {
        tracing::error!("{err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), HostError> {
    let (events, event_rx) = EventSink::channel(EVENT_CHANNEL_CAPACITY);

    let config = Config::load(&cli.config, &events)?;

    let sink = match &config.comms.port {
        Some(port) => WireSink::serial(port, config.comms.baud)?,
        None => WireSink::stdout(),
    };
    let drain = tokio::spawn(comms::drain(event_rx, sink));

    let drawing = cli
        .drawing
        .or_else(|| config.drawing.file_name.clone())
        .ok_or(HostError::NoDrawing)?;

    let simulate = cli.simulate;
    let job = tokio::task::spawn_blocking(move || {
        if simulate {
            run_job(SimClock::new(SIM_CLOCK_QUANTUM_US), config, events, &drawing)
        } else {
            run_job(MonotonicClock::new(), config, events, &drawing)
        }
    })
    .await?;

    // All senders are gone once the job returns; let the wire finish.
    drain.await?;
    job?;
    Ok(())
}

fn run_job<C: cabledraw::clock::Clock>(
    clock: C,
    config: Config,
    events: EventSink,
    drawing: &str,
) -> Result<(), PlotterError> {
    let mut plotter = match Plotter::new(SimulatorIo::new(), clock, config, events.clone()) {
        Ok(plotter) => plotter,
        Err(err) => {
            events.error(err.device_code(), err.to_string());
            return Err(err);
        }
    };

    match plotter.draw_file(drawing) {
        Ok(()) => {
            plotter.end();
            Ok(())
        }
        Err(err) => {
            plotter.fail(&err);
            Err(err)
        }
    }
}
