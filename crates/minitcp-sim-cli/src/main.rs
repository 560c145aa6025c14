use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use minitcp_abstract::{SimConfig, TcpConfig};
use minitcp_simulator::{SimulationReport, Simulator, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Deterministic TCP loopback simulator")]
struct Args {
    /// Load a scenario from disk. Channel and TCP flags are ignored when set.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Text written by the sending application. Defaults to a short demo message.
    #[arg(long)]
    message: Option<String>,

    /// Read the sending application's data from a file instead.
    #[arg(long, conflicts_with = "message")]
    input: Option<PathBuf>,

    #[arg(long, default_value_t = 0.1)]
    loss_rate: f64,
    #[arg(long, default_value_t = 0.0)]
    duplicate_rate: f64,
    #[arg(long, default_value_t = 10)]
    min_latency: u64,
    #[arg(long, default_value_t = 100)]
    max_latency: u64,
    #[arg(long, default_value_t = 10)]
    tick_ms: u64,
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = TcpConfig::DEFAULT_CAPACITY)]
    capacity: u64,
    #[arg(long, default_value_t = TcpConfig::MAX_PAYLOAD_SIZE)]
    max_payload_size: usize,
    #[arg(long, default_value_t = TcpConfig::TIMEOUT_DFLT)]
    rt_timeout_ms: u64,
    #[arg(long, default_value_t = TcpConfig::MAX_RETX_ATTEMPTS)]
    max_retx_attempts: u64,
    /// Fix the sender's ISN instead of drawing it from the seeded generator.
    #[arg(long)]
    isn: Option<u32>,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();
    info!("minitcp-sim-cli starting…");

    let report = if let Some(path) = &args.scenario {
        scenario_runner::run_scenario(path)?
    } else {
        run_default_sim(&args)?
    };

    info!(
        duration_ms = report.duration_ms,
        delivered = report.delivered_data.len(),
        packets = report.sender_packet_count,
        retransmissions = report.retransmissions,
        finished = report.stream_finished,
        aborted = report.aborted,
        "simulation complete"
    );

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    if report.aborted {
        anyhow::bail!(
            "connection aborted after {} retransmissions",
            report.retransmissions
        );
    }
    Ok(())
}

impl Args {
    fn sim_config(&self) -> SimConfig {
        SimConfig {
            loss_rate: self.loss_rate,
            duplicate_rate: self.duplicate_rate,
            min_latency: self.min_latency,
            max_latency: self.max_latency,
            tick_ms: self.tick_ms,
            seed: self.seed,
        }
    }

    fn tcp_config(&self) -> TcpConfig {
        TcpConfig {
            capacity: self.capacity,
            max_payload_size: self.max_payload_size,
            rt_timeout_ms: self.rt_timeout_ms,
            max_retx_attempts: self.max_retx_attempts,
            fixed_isn: self.isn,
        }
    }

    fn payload(&self) -> Result<Vec<u8>> {
        if let Some(path) = &self.input {
            return fs::read(path)
                .with_context(|| format!("Failed to read input file {}", path.display()));
        }
        Ok(self
            .message
            .clone()
            .unwrap_or_else(|| "Packet 1, Packet 2, Packet 3".to_string())
            .into_bytes())
    }
}

fn run_default_sim(args: &Args) -> Result<SimulationReport> {
    let data = args.payload()?;
    let mut sim = Simulator::new(args.sim_config(), args.tcp_config())?;
    sim.schedule_app_send(0, data);
    sim.schedule_app_close(0);

    info!("Starting headless simulation…");
    sim.run_until_complete();
    Ok(sim.export_report())
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
