//! Owns the bound balancer's opaque state for one session and mediates the
//! one operation allowed to reset it mid-session: a bounds reload.

use tracing::info;

use crate::balancer::{AlgoConfig, Balancer, Output, Registry, Sample};
use crate::config::Config;
use crate::error::RunnerError;

/// Resolves an algorithm (override, or the config's choice, or the registry
/// default), owns its state, and forwards `step` calls to it.
pub struct Runner {
    registry: Registry,
    balancer: Box<dyn Balancer>,
    algo_config: AlgoConfig,
}

impl Runner {
    /// Resolves the algorithm name and builds its initial state.
    ///
    /// An explicit `algo_override` that names an unknown algorithm is a hard
    /// failure. If no override is given and the config's `balancer_name` is
    /// unknown, this falls back to the registry default rather than failing
    /// — only an explicit, deliberate override is held to strict naming.
    pub fn new(
        config: &Config,
        algo_override: Option<&str>,
        srt_latency_ms: u64,
        srt_pkt_size: u64,
    ) -> Result<Self, RunnerError> {
        let registry = Registry::new();
        let name = match algo_override {
            Some(name) => {
                if !registry.contains(name) {
                    return Err(RunnerError::UnknownAlgorithm(name.to_string()));
                }
                name.to_string()
            }
            None if registry.contains(&config.balancer_name) => config.balancer_name.clone(),
            None => registry.default_name().to_string(),
        };

        let algo_config = build_algo_config(config, srt_latency_ms, srt_pkt_size);
        let balancer = registry.create(&name, &algo_config)?;
        info!(algorithm = %name, "balancer initialized");

        Ok(Runner {
            registry,
            balancer,
            algo_config,
        })
    }

    pub fn step(&mut self, now_ms: u64, sample: &Sample) -> Output {
        self.balancer.step(now_ms, sample)
    }

    pub fn name(&self) -> &'static str {
        self.balancer.name()
    }

    /// Replaces the min/max bounds and reinitializes the bound algorithm's
    /// state from scratch. This is the only sanctioned mid-session mutation
    /// of algorithm state; every other field of the runner's config snapshot
    /// is untouched.
    pub fn update_bounds(&mut self, min_bps: i64, max_bps: i64) -> Result<(), RunnerError> {
        self.algo_config.min_bitrate_bps = min_bps;
        self.algo_config.max_bitrate_bps = max_bps;
        let name = self.balancer.name().to_string();
        // Drop releases the previous state (cleanup); the registry's factory
        // is the init half of the reset.
        self.balancer = self.registry.create(&name, &self.algo_config)?;
        info!(min_bps, max_bps, "bounds reloaded, algorithm state reset");
        Ok(())
    }
}

fn build_algo_config(config: &Config, srt_latency_ms: u64, srt_pkt_size: u64) -> AlgoConfig {
    AlgoConfig {
        min_bitrate_bps: config.min_bitrate_kbps as i64 * 1000,
        max_bitrate_bps: config.max_bitrate_kbps as i64 * 1000,
        srt_latency_ms,
        srt_pkt_size,
        adaptive: config.adaptive.to_tuning(),
        aimd: config.aimd.to_tuning(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::Sample;
    use crate::config::Config;

    fn good_sample(ts: u64) -> Sample {
        Sample {
            timestamp_ms: ts,
            rtt_ms: 20.0,
            buffer_size: 5,
            send_rate_mbps: 5.0,
            pkt_loss_total: 0,
            pkt_retrans_total: 0,
        }
    }

    #[test]
    fn unknown_override_is_rejected() {
        let cfg = Config::defaults();
        let err = Runner::new(&cfg, Some("nonexistent"), 2000, 1316).unwrap_err();
        assert!(matches!(err, RunnerError::UnknownAlgorithm(n) if n == "nonexistent"));
    }

    #[test]
    fn unknown_config_balancer_falls_back_to_default() {
        let mut cfg = Config::defaults();
        cfg.balancer_name = "nonexistent".to_string();
        let runner = Runner::new(&cfg, None, 2000, 1316).unwrap();
        assert_eq!(runner.name(), "adaptive");
    }

    #[test]
    fn update_bounds_resets_state_to_new_max() {
        let mut cfg = Config::defaults();
        cfg.min_bitrate_kbps = 500;
        cfg.max_bitrate_kbps = 6000;
        let mut runner = Runner::new(&cfg, Some("adaptive"), 2000, 1316).unwrap();
        runner.step(0, &good_sample(0));
        runner.update_bounds(1_000_000, 3_000_000).unwrap();
        let out = runner.step(0, &good_sample(0));
        assert_eq!(out.new_bitrate, 3_000_000);
    }

    #[test]
    fn name_reflects_bound_algorithm() {
        let cfg = Config::defaults();
        let runner = Runner::new(&cfg, Some("fixed"), 2000, 1316).unwrap();
        assert_eq!(runner.name(), "fixed");
    }
}
