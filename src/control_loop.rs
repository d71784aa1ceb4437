//! The periodic collaborator around the balancer core: pulls telemetry,
//! calls `Runner::step`, and pushes the decision out to the encoder and
//! overlay adapters. Stall and ACK-timeout detection and reload handling
//! live here; the balancer itself stays ignorant of all of it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::adapters::{EncoderAdapter, OverlayAdapter, SessionHandle, TransportAdapter};
use crate::balancer::Sample;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::LoopFatal;
use crate::runner::Runner;

const TICK_INTERVAL_MS: u64 = 20;
const STALL_CHECK_INTERVAL_MS: u64 = 1000;
const ACK_TIMEOUT_MS: u64 = 6000;

/// `Disconnected → Connecting → Running → (Reloading → Running)* → Draining
/// → Terminated`. `step` may only be called while `Running` or `Reloading`;
/// `Reloading` is a sub-state of `Running` during which one bounds update is
/// applied atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Disconnected,
    Connecting,
    Running,
    Reloading,
    Draining,
    Terminated,
}

/// Atomic flags set from the signal path. Setting them must never perform
/// I/O or allocation — the cooperative loop checks them at tick boundaries.
#[derive(Clone, Default)]
pub struct SignalFlags {
    pub reload: Arc<AtomicBool>,
    pub stop: Arc<AtomicBool>,
}

impl SignalFlags {
    pub fn new() -> Self {
        Self::default()
    }
}

struct ProgressWatch {
    last_checked_ms: u64,
    last_value: u64,
}

struct AckWatch {
    last_count: u64,
    last_seen_ms: Option<u64>,
}

pub struct ControlLoop<T, E, O, C>
where
    T: TransportAdapter,
    E: EncoderAdapter,
    O: OverlayAdapter,
    C: Clock,
{
    transport: T,
    encoder: E,
    overlay: O,
    clock: C,
    runner: Runner,
    handle: Option<SessionHandle>,
    state: LoopState,
    last_applied_bitrate: Option<u64>,
    progress: ProgressWatch,
    ack: AckWatch,
    config_path: Option<PathBuf>,
    signals: SignalFlags,
}

impl<T, E, O, C> ControlLoop<T, E, O, C>
where
    T: TransportAdapter,
    E: EncoderAdapter,
    O: OverlayAdapter,
    C: Clock,
{
    pub fn new(
        transport: T,
        encoder: E,
        overlay: O,
        clock: C,
        runner: Runner,
        config_path: Option<PathBuf>,
        signals: SignalFlags,
    ) -> Self {
        let now = clock.now_ms();
        ControlLoop {
            transport,
            encoder,
            overlay,
            clock,
            runner,
            handle: None,
            state: LoopState::Disconnected,
            last_applied_bitrate: None,
            progress: ProgressWatch {
                last_checked_ms: now,
                last_value: 0,
            },
            ack: AckWatch {
                last_count: 0,
                last_seen_ms: None,
            },
            config_path,
            signals,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// One connect attempt. The caller is responsible for the 500ms
    /// back-off retry loop around this — connect errors are categorized
    /// and retried indefinitely rather than treated as fatal.
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        stream_id: Option<&str>,
        latency_ms: u64,
        pkt_size: usize,
    ) -> Result<(), crate::error::TransportError> {
        self.state = LoopState::Connecting;
        match self
            .transport
            .connect(host, port, stream_id, latency_ms, pkt_size)
        {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = LoopState::Running;
                info!("transport connected");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "connect attempt failed");
                self.state = LoopState::Disconnected;
                Err(e)
            }
        }
    }

    /// One 20ms tick: telemetry acquisition, a single `runner.step`, and the
    /// encoder/overlay writes. `progress_indicator` is a monotonically
    /// increasing counter the caller derives from the media pipeline (e.g.
    /// bytes muxed); it only needs to move for the stall detector to be
    /// satisfied.
    pub fn tick(&mut self, progress_indicator: u64) -> Result<(), LoopFatal> {
        debug_assert!(matches!(self.state, LoopState::Running | LoopState::Reloading));

        if self.signals.stop.load(Ordering::Relaxed) {
            self.state = LoopState::Draining;
            return Ok(());
        }

        if self.signals.reload.swap(false, Ordering::Relaxed) {
            self.handle_reload()?;
        }

        let now = self.clock.now_ms();
        let Some(handle) = self.handle.as_ref().map(|h| SessionHandle(h.0)) else {
            return Ok(());
        };

        let stats = match self.transport.stats(&handle) {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "stats acquisition failed, skipping tick");
                return Ok(());
            }
        };
        let buffer_size = match self.transport.get_buffer_size(&handle) {
            Ok(b) => b,
            Err(e) => {
                debug!(error = %e, "buffer size acquisition failed, skipping tick");
                return Ok(());
            }
        };

        if stats.ack_count > self.ack.last_count {
            self.ack.last_count = stats.ack_count;
            self.ack.last_seen_ms = Some(now);
        } else if let Some(last_seen) = self.ack.last_seen_ms {
            if now.saturating_sub(last_seen) > ACK_TIMEOUT_MS {
                error!("no acknowledgement observed for 6s");
                return Err(LoopFatal::AckTimeout);
            }
        }

        let sample = Sample {
            timestamp_ms: now,
            rtt_ms: stats.rtt_ms,
            buffer_size,
            send_rate_mbps: stats.send_rate_mbps,
            pkt_loss_total: stats.pkt_loss_total,
            pkt_retrans_total: stats.pkt_retrans_total,
        };
        let output = self.runner.step(now, &sample);

        if Some(output.new_bitrate) != self.last_applied_bitrate {
            self.encoder.set_bitrate(output.new_bitrate);
            self.last_applied_bitrate = Some(output.new_bitrate);
        }
        self.overlay.update(
            output.new_bitrate,
            output.throughput,
            output.rtt,
            output.rtt_th_min,
            output.rtt_th_max,
            output.bs,
            output.bs_th1,
            output.bs_th2,
            output.bs_th3,
        );

        self.check_progress(now, progress_indicator)
    }

    fn check_progress(&mut self, now: u64, progress_indicator: u64) -> Result<(), LoopFatal> {
        if now.saturating_sub(self.progress.last_checked_ms) < STALL_CHECK_INTERVAL_MS {
            return Ok(());
        }
        let stalled = progress_indicator == self.progress.last_value;
        self.progress.last_value = progress_indicator;
        self.progress.last_checked_ms = now;
        if stalled {
            error!("pipeline made no progress for 1s");
            return Err(LoopFatal::PipelineStall);
        }
        Ok(())
    }

    /// Reparses the config file and applies a single bounds update
    /// atomically. A parse failure is recoverable — it keeps the current
    /// snapshot and logs. A failure to reinitialize the algorithm's state
    /// with the new bounds is fatal and propagates to the caller as a
    /// drain request.
    fn handle_reload(&mut self) -> Result<(), LoopFatal> {
        let Some(path) = self.config_path.clone() else {
            return Ok(());
        };
        self.state = LoopState::Reloading;
        let result = match std::fs::read_to_string(&path).and_then(|text| {
            Config::parse(&text).map_err(|e| std::io::Error::other(e.to_string()))
        }) {
            Ok(cfg) => {
                let min_bps = cfg.min_bitrate_kbps as i64 * 1000;
                let max_bps = cfg.max_bitrate_kbps as i64 * 1000;
                match self.runner.update_bounds(min_bps, max_bps) {
                    Ok(()) => {
                        info!(min_bps, max_bps, "config reloaded");
                        Ok(())
                    }
                    Err(e) => {
                        error!(error = %e, "reload init failed, draining");
                        Err(LoopFatal::InitFailure(e))
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "config reload failed, keeping current state");
                Ok(())
            }
        };
        self.state = LoopState::Running;
        result
    }

    pub fn drain(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.transport.close(handle);
        }
        self.state = LoopState::Terminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{NullEncoderAdapter, NullOverlayAdapter, SimTransportAdapter, TransportStats};
    use crate::clock::FakeClock;
    use crate::config::Config;

    fn make_loop() -> ControlLoop<SimTransportAdapter, NullEncoderAdapter, NullOverlayAdapter, FakeClock> {
        let cfg = Config::defaults();
        let runner = Runner::new(&cfg, Some("fixed"), 2000, 1316).unwrap();
        let mut loop_ = ControlLoop::new(
            SimTransportAdapter::new(),
            NullEncoderAdapter,
            NullOverlayAdapter,
            FakeClock::new(),
            runner,
            None,
            SignalFlags::new(),
        );
        loop_.connect("127.0.0.1", 9000, None, 2000, 1316).unwrap();
        loop_
    }

    #[test]
    fn connect_transitions_to_running() {
        let loop_ = make_loop();
        assert_eq!(loop_.state(), LoopState::Running);
    }

    #[test]
    fn tick_with_no_stats_does_not_panic() {
        let mut loop_ = make_loop();
        loop_.transport.push_stats(TransportStats::default());
        loop_.transport.push_buffer_size(0);
        assert!(loop_.tick(1).is_ok());
    }

    #[test]
    fn stop_flag_moves_loop_to_draining() {
        let mut loop_ = make_loop();
        loop_.signals.stop.store(true, Ordering::Relaxed);
        loop_.tick(1).unwrap();
        assert_eq!(loop_.state(), LoopState::Draining);
    }

    #[test]
    fn ack_timeout_after_6s_of_silence_is_fatal() {
        let mut loop_ = make_loop();
        loop_.transport.push_stats(TransportStats {
            ack_count: 1,
            ..Default::default()
        });
        loop_.transport.push_buffer_size(0);
        loop_.tick(1).unwrap();

        loop_.clock.advance(6001);
        loop_.transport.push_stats(TransportStats {
            ack_count: 1,
            ..Default::default()
        });
        loop_.transport.push_buffer_size(0);
        let result = loop_.tick(2);
        assert!(matches!(result, Err(LoopFatal::AckTimeout)));
    }

    #[test]
    fn stall_detected_after_two_identical_progress_checks_1s_apart() {
        let mut loop_ = make_loop();
        loop_.transport.push_stats(TransportStats::default());
        loop_.transport.push_buffer_size(0);
        loop_.tick(5).unwrap();

        loop_.clock.advance(1001);
        loop_.transport.push_stats(TransportStats::default());
        loop_.transport.push_buffer_size(0);
        loop_.tick(5).unwrap();

        loop_.clock.advance(1001);
        loop_.transport.push_stats(TransportStats::default());
        loop_.transport.push_buffer_size(0);
        let result = loop_.tick(5);
        assert!(matches!(result, Err(LoopFatal::PipelineStall)));
    }

    #[test]
    fn reload_flag_reparses_file_and_applies_new_bounds() {
        let path = std::env::temp_dir().join(format!(
            "srt-balancer-reload-test-{}.ini",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "[general]\nmin_bitrate = 1000\nmax_bitrate = 3000\nbalancer = fixed\n",
        )
        .unwrap();

        let cfg = Config::defaults();
        let runner = Runner::new(&cfg, Some("fixed"), 2000, 1316).unwrap();
        let mut loop_ = ControlLoop::new(
            SimTransportAdapter::new(),
            NullEncoderAdapter,
            NullOverlayAdapter,
            FakeClock::new(),
            runner,
            Some(path.clone()),
            SignalFlags::new(),
        );
        loop_.connect("127.0.0.1", 9000, None, 2000, 1316).unwrap();

        loop_.signals.reload.store(true, Ordering::Relaxed);
        loop_.transport.push_stats(TransportStats::default());
        loop_.transport.push_buffer_size(0);
        let out_ms = loop_.tick(1);
        assert!(out_ms.is_ok());
        assert_eq!(loop_.state(), LoopState::Running);
        assert_eq!(loop_.runner.name(), "fixed");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn reload_with_unparseable_file_keeps_current_state() {
        let path = std::env::temp_dir().join(format!(
            "srt-balancer-reload-bad-{}.ini",
            std::process::id()
        ));
        std::fs::write(&path, "[general]\nmin_bitrate = not-a-number\n").unwrap();

        let mut loop_ = make_loop();
        loop_.config_path = Some(path.clone());
        loop_.signals.reload.store(true, Ordering::Relaxed);
        loop_.transport.push_stats(TransportStats::default());
        loop_.transport.push_buffer_size(0);
        assert!(loop_.tick(1).is_ok());
        assert_eq!(loop_.state(), LoopState::Running);

        std::fs::remove_file(&path).ok();
    }
}
