//! Passthrough balancer: publishes the configured maximum on every tick,
//! unconditionally. Useful as a baseline and for operators who want to
//! disable adaptation entirely.

use super::{round_down_100k, AlgoConfig, Balancer, Output, Sample};

pub struct FixedBalancer {
    fixed_bitrate: u64,
}

impl FixedBalancer {
    pub fn new(config: &AlgoConfig) -> Self {
        FixedBalancer {
            fixed_bitrate: round_down_100k(config.max_bitrate_bps),
        }
    }
}

impl Balancer for FixedBalancer {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn description(&self) -> &'static str {
        "passthrough of the configured maximum bitrate"
    }

    fn step(&mut self, _now_ms: u64, sample: &Sample) -> Output {
        Output {
            new_bitrate: self.fixed_bitrate,
            throughput: 0.0,
            rtt: sample.rtt_ms.round() as i64,
            rtt_th_min: 0.0,
            rtt_th_max: 0.0,
            bs: sample.buffer_size,
            bs_th1: 0.0,
            bs_th2: 0.0,
            bs_th3: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::{AdaptiveTuning, AimdTuning};

    fn config() -> AlgoConfig {
        AlgoConfig {
            min_bitrate_bps: 500_000,
            max_bitrate_bps: 4_000_000,
            srt_latency_ms: 2000,
            srt_pkt_size: 1316,
            adaptive: AdaptiveTuning {
                incr_step_bps: 30_000,
                decr_step_bps: 100_000,
                incr_interval_ms: 500,
                decr_interval_ms: 200,
            },
            aimd: AimdTuning {
                incr_step_bps: 50_000,
                decr_mult: 0.75,
                incr_interval_ms: 500,
                decr_interval_ms: 200,
            },
        }
    }

    #[test]
    fn ignores_sample_content() {
        let mut b = FixedBalancer::new(&config());
        let calm = Sample {
            timestamp_ms: 0,
            rtt_ms: 20.0,
            buffer_size: 1,
            send_rate_mbps: 5.0,
            pkt_loss_total: 0,
            pkt_retrans_total: 0,
        };
        let stormy = Sample {
            timestamp_ms: 1000,
            rtt_ms: 600.0,
            buffer_size: 9000,
            send_rate_mbps: 0.1,
            pkt_loss_total: 10_000,
            pkt_retrans_total: 10_000,
        };
        assert_eq!(b.step(0, &calm).new_bitrate, 4_000_000);
        assert_eq!(b.step(1000, &stormy).new_bitrate, 4_000_000);
    }
}
