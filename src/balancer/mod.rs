//! The balancer lifecycle contract (name, description, init, step, cleanup)
//! and the registry that binds algorithm names to constructors.
//!
//! `cleanup` has no explicit method here: a balancer's `Drop` impl plays that
//! role, and since none of the three built-in algorithms hold anything but
//! plain scalars, the derived drop glue is already idempotent against a
//! half-built or already-dropped value.

pub mod adaptive;
pub mod aimd;
pub mod fixed;

use crate::error::RunnerError;

/// One telemetry observation handed to a balancer's `step`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sample {
    pub timestamp_ms: u64,
    pub rtt_ms: f64,
    pub buffer_size: i64,
    pub send_rate_mbps: f64,
    pub pkt_loss_total: u64,
    pub pkt_retrans_total: u64,
}

/// The per-tick decision, plus the observability fields the overlay adapter
/// renders. All units are consumer-facing (bits/s, ms, packets).
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub new_bitrate: u64,
    pub throughput: f64,
    pub rtt: i64,
    pub rtt_th_min: f64,
    pub rtt_th_max: f64,
    pub bs: i64,
    pub bs_th1: f64,
    pub bs_th2: f64,
    pub bs_th3: f64,
}

/// Tuning knobs specific to the adaptive algorithm, already resolved to
/// runtime units (bits, milliseconds) by the config loader.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveTuning {
    pub incr_step_bps: i64,
    pub decr_step_bps: i64,
    pub incr_interval_ms: u64,
    pub decr_interval_ms: u64,
}

/// Tuning knobs specific to the AIMD algorithm.
#[derive(Debug, Clone, Copy)]
pub struct AimdTuning {
    pub incr_step_bps: i64,
    pub decr_mult: f64,
    pub incr_interval_ms: u64,
    pub decr_interval_ms: u64,
}

/// Everything a balancer's constructor needs. Built by the runner from the
/// resolved [`crate::config::Config`] plus the transport latency/packet size
/// in effect for the session.
#[derive(Debug, Clone, Copy)]
pub struct AlgoConfig {
    pub min_bitrate_bps: i64,
    pub max_bitrate_bps: i64,
    pub srt_latency_ms: u64,
    pub srt_pkt_size: u64,
    pub adaptive: AdaptiveTuning,
    pub aimd: AimdTuning,
}

/// A balancer algorithm: owns its state for the life of one session and
/// turns each telemetry sample into a bitrate decision.
///
/// `step` must be pure with respect to external side effects — no I/O, no
/// suspension — and total: it always returns an `Output`, never an error.
pub trait Balancer: Send {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn step(&mut self, now_ms: u64, sample: &Sample) -> Output;
}

type Factory = fn(&AlgoConfig) -> Result<Box<dyn Balancer>, String>;

struct RegistryEntry {
    name: &'static str,
    description: &'static str,
    factory: Factory,
}

/// Fixed, name-unique, order-stable list of known algorithms. The first
/// entry is the default; registration happens at construction, not at
/// runtime — there is no API to add an algorithm after the fact.
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            entries: vec![
                RegistryEntry {
                    name: "adaptive",
                    description: "telemetry-smoothed four-tier congestion control",
                    factory: |cfg| Ok(Box::new(adaptive::AdaptiveBalancer::new(cfg))),
                },
                RegistryEntry {
                    name: "aimd",
                    description: "additive-increase/multiplicative-decrease with an RTT baseline",
                    factory: |cfg| Ok(Box::new(aimd::AimdBalancer::new(cfg))),
                },
                RegistryEntry {
                    name: "fixed",
                    description: "passthrough of the configured maximum bitrate",
                    factory: |cfg| Ok(Box::new(fixed::FixedBalancer::new(cfg))),
                },
            ],
        }
    }

    /// Name of the first registered entry.
    pub fn default_name(&self) -> &'static str {
        self.entries[0].name
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Order-stable enumeration of (name, description) pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.entries.iter().map(|e| (e.name, e.description))
    }

    /// Build a balancer by name. Unknown names are the caller's concern
    /// (the runner distinguishes "no such override" from "fall back to
    /// default" — this method just does the lookup).
    pub fn create(
        &self,
        name: &str,
        config: &AlgoConfig,
    ) -> Result<Box<dyn Balancer>, RunnerError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| RunnerError::UnknownAlgorithm(name.to_string()))?;
        (entry.factory)(config).map_err(RunnerError::InitFailure)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Rounds down to the nearest 100 kbit/s multiple. Internal state carries
/// the unrounded bitrate; only the published `Output` is quantized.
pub(crate) fn round_down_100k(bps: i64) -> u64 {
    let bps = bps.max(0);
    (bps - (bps % 100_000)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_default_is_adaptive_and_order_stable() {
        let reg = Registry::new();
        assert_eq!(reg.default_name(), "adaptive");
        let names: Vec<_> = reg.entries().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["adaptive", "aimd", "fixed"]);
    }

    #[test]
    fn registry_lookup_is_case_sensitive_and_reports_unknown() {
        let reg = Registry::new();
        assert!(reg.contains("adaptive"));
        assert!(!reg.contains("Adaptive"));
        assert!(!reg.contains("bogus"));
    }

    #[test]
    fn round_down_100k_truncates_toward_zero() {
        assert_eq!(round_down_100k(6_000_000), 6_000_000);
        assert_eq!(round_down_100k(6_049_999), 6_000_000);
        assert_eq!(round_down_100k(6_100_000), 6_100_000);
        assert_eq!(round_down_100k(-5), 0);
    }
}
