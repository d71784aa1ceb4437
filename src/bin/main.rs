//! `srt-balancer` — drives the control loop against a simulated transport.
//!
//! A real deployment would bind the `TransportAdapter`/`EncoderAdapter`
//! traits to libsrt and a GStreamer encoder element; neither is this crate's
//! concern. This binary wires the balancer core to `SimTransportAdapter` so
//! the whole startup → run → reload → shutdown path is exercisable end to
//! end.

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use srt_balancer::adapters::{NullEncoderAdapter, SimTransportAdapter, TracingOverlayAdapter};
use srt_balancer::cli::{self, CliArgs, CliError};
use srt_balancer::clock::MonotonicClock;
use srt_balancer::config::{self, Config};
use srt_balancer::control_loop::{ControlLoop, LoopState, SignalFlags};
use srt_balancer::error::LoopFatal;
use srt_balancer::runner::Runner;
use srt_balancer::signals;

const LOG_PREFIX: &str = "srt-balancer";
const REDUCED_PKT_SIZE: usize = 188 * 6;
const STANDARD_PKT_SIZE: usize = 188 * 7;
const CONNECT_BACKOFF_MS: u64 = 500;
const TICK_INTERVAL: Duration = Duration::from_millis(20);

fn main() -> ExitCode {
    srt_balancer::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match cli::parse(&args) {
        Ok(cli) => cli,
        Err(CliError::PrintVersionAndExit(version)) => {
            println!("{version}");
            return ExitCode::SUCCESS;
        }
        Err(e) => return fatal(&e),
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fatal(&e),
    }
}

fn fatal(err: &dyn std::fmt::Display) -> ExitCode {
    eprintln!("{LOG_PREFIX}: {err}");
    ExitCode::FAILURE
}

fn run(cli: CliArgs) -> anyhow::Result<()> {
    let pkt_size = if cli.reduced_pkt_size {
        REDUCED_PKT_SIZE
    } else {
        STANDARD_PKT_SIZE
    } as u64;

    let config_path = cli.config_file.as_ref().map(PathBuf::from);
    let mut config = match &config_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("failed to read config file {:?}: {e}", path))?;
            Config::parse(&text)?
        }
        None => Config::defaults(),
    };

    // Legacy `-b` bounds win over `[general]` when both are present — the
    // last-write-wins choice recorded in DESIGN.md, applied here after the
    // config file so it really is "last".
    if let Some(legacy_path) = &cli.legacy_bitrate_file {
        let text = std::fs::read_to_string(legacy_path)
            .map_err(|e| anyhow::anyhow!("failed to read legacy bitrate file {legacy_path:?}: {e}"))?;
        let (min_bps, max_bps) = config::load_legacy_bitrate_file(&text)?;
        config.min_bitrate_kbps = min_bps / 1000;
        config.max_bitrate_kbps = max_bps / 1000;
    }

    tracing::trace!(config = %config.to_json_debug(), "resolved configuration");
    tracing::info!(
        pipeline_file = %cli.pipeline_file,
        host = %cli.host,
        port = cli.port,
        stream_id = ?cli.stream_id,
        av_offset_ms = ?cli.av_offset_ms,
        latency_ms = cli.latency_ms,
        pkt_size,
        balancer = %cli.balancer_override.as_deref().unwrap_or(&config.balancer_name),
        "srt-balancer starting"
    );

    let runner = Runner::new(
        &config,
        cli.balancer_override.as_deref(),
        cli.latency_ms,
        pkt_size,
    )?;

    let signal_flags = SignalFlags::new();
    signals::install(signal_flags.clone());

    let mut control_loop = ControlLoop::new(
        SimTransportAdapter::new(),
        NullEncoderAdapter,
        TracingOverlayAdapter,
        MonotonicClock::new(),
        runner,
        config_path,
        signal_flags,
    );

    loop {
        match control_loop.connect(
            &cli.host,
            cli.port,
            cli.stream_id.as_deref(),
            cli.latency_ms,
            pkt_size as usize,
        ) {
            Ok(()) => break,
            Err(e) => {
                tracing::warn!(error = %e, "connect failed, retrying in 500ms");
                thread::sleep(Duration::from_millis(CONNECT_BACKOFF_MS));
            }
        }
    }

    // No real media pipeline is wired into this binary (out of scope per
    // spec Non-goals), so there is no genuine progress counter to poll here.
    // This placeholder always advances, which means `tick`'s stall detector
    // can never fire through this binary — it is only exercised by
    // `control_loop`'s own unit tests, which drive a flat counter directly.
    let mut progress_indicator: u64 = 0;
    loop {
        if control_loop.state() == LoopState::Draining {
            break;
        }
        thread::sleep(TICK_INTERVAL);
        progress_indicator = progress_indicator.wrapping_add(1);
        match control_loop.tick(progress_indicator) {
            Ok(()) => {}
            Err(LoopFatal::AckTimeout) | Err(LoopFatal::PipelineStall) => break,
            Err(e) => {
                tracing::error!(error = %e, "fatal control loop error");
                break;
            }
        }
    }

    control_loop.drain();
    Ok(())
}
