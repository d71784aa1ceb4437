//! Trait boundaries the control loop drives but this crate does not bind to
//! a real transport/encoder/overlay implementation for — those live outside
//! this crate's scope. Each trait ships a no-op or in-memory stand-in used
//! by tests and as a runnable demonstration.

use crate::error::TransportError;

/// An opaque handle to a connected transport session.
pub struct SessionHandle(pub u64);

/// Telemetry pulled from the transport once per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportStats {
    pub rtt_ms: f64,
    pub send_rate_mbps: f64,
    pub pkt_loss_total: u64,
    pub pkt_retrans_total: u64,
    pub ack_count: u64,
}

/// The operations the control loop needs from an SRT-like session. A real
/// implementation would wrap a libsrt (or equivalent) socket; the contract
/// here only commits to these five operations and their categorized
/// connect-time failures.
pub trait TransportAdapter {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        stream_id: Option<&str>,
        latency_ms: u64,
        pkt_size: usize,
    ) -> Result<SessionHandle, TransportError>;

    fn send(&mut self, handle: &SessionHandle, bytes: &[u8]) -> Result<usize, TransportError>;

    fn stats(&mut self, handle: &SessionHandle) -> Result<TransportStats, TransportError>;

    fn get_buffer_size(&mut self, handle: &SessionHandle) -> Result<i64, TransportError>;

    fn close(&mut self, handle: SessionHandle);
}

/// Applies a newly decided bitrate to the encoder. May be silently ignored
/// if no dynamic-control element is bound.
pub trait EncoderAdapter {
    fn set_bitrate(&mut self, bps: u64);
}

/// Renders the balancer's observability fields to a human-readable surface.
/// Silently no-op if no overlay binding exists; formatting is adapter-owned.
pub trait OverlayAdapter {
    #[allow(clippy::too_many_arguments)]
    fn update(
        &mut self,
        new_bitrate: u64,
        throughput: f64,
        rtt: i64,
        rtt_th_min: f64,
        rtt_th_max: f64,
        bs: i64,
        bs_th1: f64,
        bs_th2: f64,
        bs_th3: f64,
    );
}

/// Encoder adapter that drops every write. The default when no dynamic
/// bitrate control element is bound.
#[derive(Default)]
pub struct NullEncoderAdapter;

impl EncoderAdapter for NullEncoderAdapter {
    fn set_bitrate(&mut self, _bps: u64) {}
}

/// Overlay adapter that drops every write.
#[derive(Default)]
pub struct NullOverlayAdapter;

impl OverlayAdapter for NullOverlayAdapter {
    fn update(
        &mut self,
        _new_bitrate: u64,
        _throughput: f64,
        _rtt: i64,
        _rtt_th_min: f64,
        _rtt_th_max: f64,
        _bs: i64,
        _bs_th1: f64,
        _bs_th2: f64,
        _bs_th3: f64,
    ) {
    }
}

/// Overlay adapter that logs the balancer's observability fields at `info`
/// level — this crate has no on-screen overlay surface, so the log line is
/// the whole of the "human-readable stats" contract.
#[derive(Default)]
pub struct TracingOverlayAdapter;

impl OverlayAdapter for TracingOverlayAdapter {
    fn update(
        &mut self,
        new_bitrate: u64,
        throughput: f64,
        rtt: i64,
        rtt_th_min: f64,
        rtt_th_max: f64,
        bs: i64,
        bs_th1: f64,
        bs_th2: f64,
        bs_th3: f64,
    ) {
        tracing::info!(
            new_bitrate,
            throughput,
            rtt,
            rtt_th_min,
            rtt_th_max,
            bs,
            bs_th1,
            bs_th2,
            bs_th3,
            "balancer tick"
        );
    }
}

/// In-memory transport used by tests and the demo binary: connect always
/// succeeds, send always succeeds, and stats/buffer are driven by whatever
/// a test has queued up via `push_stats`/`push_buffer_size`.
#[derive(Default)]
pub struct SimTransportAdapter {
    next_handle: u64,
    queued_stats: std::collections::VecDeque<TransportStats>,
    queued_buffer_sizes: std::collections::VecDeque<i64>,
}

impl SimTransportAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_stats(&mut self, stats: TransportStats) {
        self.queued_stats.push_back(stats);
    }

    pub fn push_buffer_size(&mut self, bs: i64) {
        self.queued_buffer_sizes.push_back(bs);
    }
}

impl TransportAdapter for SimTransportAdapter {
    fn connect(
        &mut self,
        _host: &str,
        _port: u16,
        _stream_id: Option<&str>,
        _latency_ms: u64,
        _pkt_size: usize,
    ) -> Result<SessionHandle, TransportError> {
        self.next_handle += 1;
        Ok(SessionHandle(self.next_handle))
    }

    fn send(&mut self, _handle: &SessionHandle, bytes: &[u8]) -> Result<usize, TransportError> {
        Ok(bytes.len())
    }

    fn stats(&mut self, _handle: &SessionHandle) -> Result<TransportStats, TransportError> {
        Ok(self.queued_stats.pop_front().unwrap_or_default())
    }

    fn get_buffer_size(&mut self, _handle: &SessionHandle) -> Result<i64, TransportError> {
        Ok(self.queued_buffer_sizes.pop_front().unwrap_or(0))
    }

    fn close(&mut self, _handle: SessionHandle) {}
}
