//! Additive-increase/multiplicative-decrease balancer with a slow RTT
//! baseline, modeled on the same congestion-classification shape as the
//! adaptive algorithm but without telemetry smoothing beyond the baseline.

use super::{round_down_100k, AlgoConfig, Balancer, Output, Sample};

const FIXED_BUFFER_THRESHOLD: i64 = 100;

pub struct AimdBalancer {
    min_bitrate_bps: i64,
    max_bitrate_bps: i64,
    srt_latency_ms: u64,
    incr_step_bps: i64,
    decr_mult: f64,
    incr_interval_ms: u64,
    decr_interval_ms: u64,

    cur_bitrate: i64,
    rtt_baseline: Option<f64>,
    next_incr_ts: u64,
    next_decr_ts: u64,
}

impl AimdBalancer {
    pub fn new(config: &AlgoConfig) -> Self {
        AimdBalancer {
            min_bitrate_bps: config.min_bitrate_bps,
            max_bitrate_bps: config.max_bitrate_bps,
            srt_latency_ms: config.srt_latency_ms,
            incr_step_bps: config.aimd.incr_step_bps,
            decr_mult: config.aimd.decr_mult,
            incr_interval_ms: config.aimd.incr_interval_ms,
            decr_interval_ms: config.aimd.decr_interval_ms,

            cur_bitrate: config.max_bitrate_bps,
            rtt_baseline: None,
            next_incr_ts: 0,
            next_decr_ts: 0,
        }
    }
}

impl Balancer for AimdBalancer {
    fn name(&self) -> &'static str {
        "aimd"
    }

    fn description(&self) -> &'static str {
        "RTT-baseline additive-increase/multiplicative-decrease"
    }

    fn step(&mut self, now_ms: u64, sample: &Sample) -> Output {
        let rtt = sample.rtt_ms;
        let baseline = match self.rtt_baseline {
            None => rtt,
            Some(b) if rtt < b => rtt,
            Some(b) => 0.95 * b + 0.05 * rtt,
        };
        self.rtt_baseline = Some(baseline);
        let rtt_threshold = baseline * 1.5;

        let latency_emergency = rtt.round() as u64 >= self.srt_latency_ms / 3;
        let congested = if latency_emergency {
            self.cur_bitrate = self.min_bitrate_bps;
            self.next_decr_ts = now_ms + self.decr_interval_ms;
            true
        } else {
            rtt > rtt_threshold || sample.buffer_size > FIXED_BUFFER_THRESHOLD
        };

        if !latency_emergency {
            if congested && now_ms > self.next_decr_ts {
                self.cur_bitrate = (self.cur_bitrate as f64 * self.decr_mult) as i64;
                self.next_decr_ts = now_ms + self.decr_interval_ms;
            } else if !congested && now_ms > self.next_incr_ts {
                self.cur_bitrate += self.incr_step_bps;
                self.next_incr_ts = now_ms + self.incr_interval_ms;
            }
        }

        self.cur_bitrate = self.cur_bitrate.clamp(self.min_bitrate_bps, self.max_bitrate_bps);
        let new_bitrate = round_down_100k(self.cur_bitrate);

        Output {
            new_bitrate,
            throughput: 0.0,
            rtt: rtt.round() as i64,
            rtt_th_min: baseline,
            rtt_th_max: rtt_threshold,
            bs: sample.buffer_size,
            bs_th1: FIXED_BUFFER_THRESHOLD as f64,
            bs_th2: FIXED_BUFFER_THRESHOLD as f64,
            bs_th3: FIXED_BUFFER_THRESHOLD as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::{AdaptiveTuning, AimdTuning};

    fn config(min: i64, max: i64, incr_step: i64, decr_mult: f64) -> AlgoConfig {
        AlgoConfig {
            min_bitrate_bps: min,
            max_bitrate_bps: max,
            srt_latency_ms: 2000,
            srt_pkt_size: 1316,
            adaptive: AdaptiveTuning {
                incr_step_bps: 30_000,
                decr_step_bps: 100_000,
                incr_interval_ms: 500,
                decr_interval_ms: 200,
            },
            aimd: AimdTuning {
                incr_step_bps: incr_step,
                decr_mult,
                incr_interval_ms: 500,
                decr_interval_ms: 200,
            },
        }
    }

    #[test]
    fn arithmetic_climb_steps_by_incr_step_per_interval() {
        let cfg = config(500_000, 6_000_000, 100_000, 0.75);
        let mut b = AimdBalancer::new(&cfg);
        // Park at a non-max starting point so increases are observable.
        b.cur_bitrate = 1_000_000;
        let good = Sample {
            timestamp_ms: 0,
            rtt_ms: 20.0,
            buffer_size: 5,
            send_rate_mbps: 5.0,
            pkt_loss_total: 0,
            pkt_retrans_total: 0,
        };
        let mut now = 0u64;
        let mut prev = b.step(now, &good).new_bitrate;
        for _ in 0..10 {
            now += 500;
            let out = b.step(now, &good).new_bitrate;
            let diff = out as i64 - prev as i64;
            assert!(diff == 0 || (50_000..=150_000).contains(&diff));
            prev = out;
        }
    }

    #[test]
    fn multiplicative_decrease_on_sustained_congestion() {
        let cfg = config(500_000, 6_000_000, 100_000, 0.75);
        let mut b = AimdBalancer::new(&cfg);
        b.cur_bitrate = 3_000_000;
        b.rtt_baseline = Some(30.0);
        let out = b.step(
            1,
            &Sample {
                timestamp_ms: 1,
                rtt_ms: 500.0,
                buffer_size: 200,
                send_rate_mbps: 5.0,
                pkt_loss_total: 0,
                pkt_retrans_total: 0,
            },
        );
        // rtt 500 < srt_latency/3 (666), so this is ordinary congestion, not
        // the latency-emergency clamp to min.
        let b_val = 3_000_000.0;
        assert!(out.new_bitrate as f64 >= 0.60 * b_val);
        assert!(out.new_bitrate as f64 <= 0.85 * b_val);
    }

    #[test]
    fn latency_emergency_clamps_to_min_immediately() {
        let cfg = config(500_000, 6_000_000, 100_000, 0.75);
        let mut b = AimdBalancer::new(&cfg);
        b.cur_bitrate = 4_000_000;
        let out = b.step(
            0,
            &Sample {
                timestamp_ms: 0,
                rtt_ms: 700.0,
                buffer_size: 10,
                send_rate_mbps: 5.0,
                pkt_loss_total: 0,
                pkt_retrans_total: 0,
            },
        );
        assert_eq!(out.new_bitrate, 500_000);
    }
}
