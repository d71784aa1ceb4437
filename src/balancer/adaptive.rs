//! The default balancer: EMA-smoothed buffer/RTT/throughput telemetry feeding
//! a four-tier priority decision (Emergency > Heavy > Light > Stable > hold).
//!
//! Buffer occupancy, RTT, and throughput are each tracked as an exponential
//! moving average alongside a decaying jitter envelope; the envelopes widen
//! the decision thresholds under noisy telemetry and narrow them once the
//! link settles, so the four tiers below react to sustained trends rather
//! than single noisy samples.

use super::{round_down_100k, AlgoConfig, Balancer, Output, Sample};

const FAST_DECR_INTERVAL_MS: u64 = 250;

pub struct AdaptiveBalancer {
    min_bitrate_bps: i64,
    max_bitrate_bps: i64,
    srt_latency_ms: u64,
    srt_pkt_size: u64,
    incr_step_bps: i64,
    decr_step_bps: i64,
    incr_interval_ms: u64,
    decr_interval_ms: u64,

    cur_bitrate: i64,

    bs_avg: f64,
    bs_jitter: f64,
    prev_bs: i64,

    rtt_avg: f64,
    rtt_min: f64,
    rtt_jitter: f64,
    rtt_avg_delta: f64,
    prev_rtt: i64,

    throughput: f64,
    loss_rate: f64,

    next_incr_ts: u64,
    next_decr_ts: u64,

    prev_pkt_loss: u64,
    prev_pkt_retrans: u64,
}

impl AdaptiveBalancer {
    pub fn new(config: &AlgoConfig) -> Self {
        AdaptiveBalancer {
            min_bitrate_bps: config.min_bitrate_bps,
            max_bitrate_bps: config.max_bitrate_bps,
            srt_latency_ms: config.srt_latency_ms,
            srt_pkt_size: config.srt_pkt_size,
            incr_step_bps: config.adaptive.incr_step_bps,
            decr_step_bps: config.adaptive.decr_step_bps,
            incr_interval_ms: config.adaptive.incr_interval_ms,
            decr_interval_ms: config.adaptive.decr_interval_ms,

            cur_bitrate: config.max_bitrate_bps,

            bs_avg: 0.0,
            bs_jitter: 0.0,
            prev_bs: 0,

            rtt_avg: 0.0,
            rtt_min: 200.0,
            rtt_jitter: 0.0,
            rtt_avg_delta: 0.0,
            prev_rtt: 300,

            throughput: 0.0,
            loss_rate: 0.0,

            next_incr_ts: 0,
            next_decr_ts: 0,

            prev_pkt_loss: 0,
            prev_pkt_retrans: 0,
        }
    }
}

impl Balancer for AdaptiveBalancer {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn description(&self) -> &'static str {
        "telemetry-smoothed four-tier congestion control"
    }

    fn step(&mut self, now_ms: u64, sample: &Sample) -> Output {
        // 1. Cumulative-loss deltas. A retrograde counter (session restart,
        // wraparound) reads as zero rather than widening loss_rate.
        let loss_delta = sample
            .pkt_loss_total
            .saturating_sub(self.prev_pkt_loss) as f64;
        let retrans_delta = sample
            .pkt_retrans_total
            .saturating_sub(self.prev_pkt_retrans) as f64;
        self.prev_pkt_loss = sample.pkt_loss_total;
        self.prev_pkt_retrans = sample.pkt_retrans_total;
        if loss_delta > 0.0 || retrans_delta > 0.0 {
            self.loss_rate = 0.9 * self.loss_rate + 0.1 * (loss_delta + retrans_delta);
        } else {
            self.loss_rate *= 0.9;
        }
        let pkt_loss_congestion = self.loss_rate > 0.5;

        // 2. Buffer size.
        let buffer_size = sample.buffer_size as f64;
        self.bs_avg = 0.99 * self.bs_avg + 0.01 * buffer_size;
        self.bs_jitter *= 0.99;
        if buffer_size - self.prev_bs as f64 > self.bs_jitter {
            self.bs_jitter = buffer_size - self.prev_bs as f64;
        }
        self.prev_bs = sample.buffer_size;

        // 3. RTT.
        let rtt = sample.rtt_ms;
        if self.rtt_avg == 0.0 {
            self.rtt_avg = rtt;
        } else {
            self.rtt_avg = 0.99 * self.rtt_avg + 0.01 * rtt;
        }
        let delta_rtt = rtt - self.prev_rtt as f64;
        self.rtt_avg_delta = 0.8 * self.rtt_avg_delta + 0.2 * delta_rtt;
        let rtt_rounded = rtt.round() as i64;
        self.prev_rtt = rtt_rounded;
        self.rtt_min *= 1.001;
        if rtt_rounded != 100 && rtt < self.rtt_min && self.rtt_avg_delta < 1.0 {
            self.rtt_min = rtt;
        }
        self.rtt_jitter *= 0.99;
        if delta_rtt > self.rtt_jitter {
            self.rtt_jitter = delta_rtt;
        }

        // 4. Throughput.
        self.throughput = 0.97 * self.throughput + 0.03 * (sample.send_rate_mbps * 1e6 / 1024.0);

        // 5. Thresholds.
        let bs_th3 = (self.bs_avg + self.bs_jitter) * 4.0;
        let mut bs_th2 = (self.bs_avg + (self.bs_jitter * 3.0).max(self.bs_avg)).max(50.0);
        let bs_th2_cap = (self.throughput / 8.0) * (self.srt_latency_ms as f64 / 2.0)
            / self.srt_pkt_size as f64;
        bs_th2 = bs_th2.min(bs_th2_cap);
        let bs_th1 = (self.bs_avg + self.bs_jitter * 2.5).max(50.0);
        let rtt_th_max = self.rtt_avg + (self.rtt_jitter * 4.0).max(self.rtt_avg * 0.15);
        let rtt_th_min = self.rtt_min + (self.rtt_jitter * 2.0).max(1.0);

        // 6. Decide, in strict priority order.
        if self.cur_bitrate > self.min_bitrate_bps
            && (rtt_rounded as u64 >= self.srt_latency_ms / 3
                || sample.buffer_size as f64 > bs_th3)
        {
            self.cur_bitrate = self.min_bitrate_bps;
            self.next_decr_ts = now_ms + self.decr_interval_ms;
        } else if now_ms > self.next_decr_ts
            && (rtt_rounded as u64 > self.srt_latency_ms / 5
                || sample.buffer_size as f64 > bs_th2
                || pkt_loss_congestion)
        {
            self.cur_bitrate -= self.decr_step_bps + self.cur_bitrate / 10;
            self.next_decr_ts = now_ms + FAST_DECR_INTERVAL_MS;
        } else if now_ms > self.next_decr_ts
            && (rtt_rounded as f64 > rtt_th_max || sample.buffer_size as f64 > bs_th1)
        {
            self.cur_bitrate -= self.decr_step_bps;
            self.next_decr_ts = now_ms + self.decr_interval_ms;
        } else if now_ms > self.next_incr_ts
            && (rtt_rounded as f64) < rtt_th_min
            && self.rtt_avg_delta < 0.01
            && !pkt_loss_congestion
        {
            self.cur_bitrate += self.incr_step_bps + self.cur_bitrate / 30;
            self.next_incr_ts = now_ms + self.incr_interval_ms;
        }

        self.cur_bitrate = self.cur_bitrate.clamp(self.min_bitrate_bps, self.max_bitrate_bps);
        let new_bitrate = round_down_100k(self.cur_bitrate);

        Output {
            new_bitrate,
            throughput: self.throughput,
            rtt: rtt_rounded,
            rtt_th_min,
            rtt_th_max,
            bs: sample.buffer_size,
            bs_th1,
            bs_th2,
            bs_th3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::{AdaptiveTuning, AimdTuning};

    fn config(min: i64, max: i64) -> AlgoConfig {
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
                incr_step_bps: 50_000,
                decr_mult: 0.75,
                incr_interval_ms: 500,
                decr_interval_ms: 200,
            },
        }
    }

    fn good_sample(ts: u64) -> Sample {
        Sample {
            timestamp_ms: ts,
            rtt_ms: 30.0,
            buffer_size: 10,
            send_rate_mbps: 5.0,
            pkt_loss_total: 0,
            pkt_retrans_total: 0,
        }
    }

    #[test]
    fn min_equals_max_pins_output_every_tick() {
        let cfg = config(1_000_000, 1_000_000);
        let mut b = AdaptiveBalancer::new(&cfg);
        for i in 0..20u64 {
            let out = b.step(i * 500, &good_sample(i * 500));
            assert_eq!(out.new_bitrate, 1_000_000);
        }
    }

    #[test]
    fn sustained_good_samples_climb_to_max() {
        let cfg = config(500_000, 6_000_000);
        let mut b = AdaptiveBalancer::new(&cfg);
        let mut prev = 0u64;
        let mut now = 0u64;
        for _ in 0..40 {
            let out = b.step(now, &good_sample(now));
            assert!(out.new_bitrate >= prev);
            prev = out.new_bitrate;
            now += 500;
        }
        assert_eq!(prev, 6_000_000);
    }

    #[test]
    fn emergency_condition_drops_to_min_next_tick() {
        let cfg = config(500_000, 6_000_000);
        let mut b = AdaptiveBalancer::new(&cfg);
        let mut now = 0u64;
        for _ in 0..20 {
            b.step(now, &good_sample(now));
            now += 500;
        }
        let out = b.step(
            now,
            &Sample {
                timestamp_ms: now,
                rtt_ms: 700.0,
                buffer_size: 50,
                send_rate_mbps: 5.0,
                pkt_loss_total: 0,
                pkt_retrans_total: 0,
            },
        );
        assert_eq!(out.new_bitrate, 500_000);
    }

    #[test]
    fn loss_only_congestion_prevents_increase_and_reduces_bitrate() {
        let cfg = config(500_000, 6_000_000);
        let mut b = AdaptiveBalancer::new(&cfg);
        let mut now = 0u64;
        for _ in 0..20 {
            b.step(now, &good_sample(now));
            now += 500;
        }
        let pre_loss = b.step(now, &good_sample(now)).new_bitrate;
        now += 500;
        let mut loss_total = 0u64;
        let mut retrans_total = 0u64;
        let mut last = pre_loss;
        for _ in 0..10 {
            loss_total += 5;
            retrans_total += 3;
            let out = b.step(
                now,
                &Sample {
                    timestamp_ms: now,
                    rtt_ms: 30.0,
                    buffer_size: 10,
                    send_rate_mbps: 5.0,
                    pkt_loss_total: loss_total,
                    pkt_retrans_total: retrans_total,
                },
            );
            assert!(out.new_bitrate <= last);
            last = out.new_bitrate;
            now += 500;
        }
        assert!(last < pre_loss);
    }

    #[test]
    fn retrograde_counters_do_not_widen_loss_rate() {
        let cfg = config(500_000, 6_000_000);
        let mut b = AdaptiveBalancer::new(&cfg);
        b.step(
            0,
            &Sample {
                timestamp_ms: 0,
                rtt_ms: 30.0,
                buffer_size: 10,
                send_rate_mbps: 5.0,
                pkt_loss_total: 1000,
                pkt_retrans_total: 500,
            },
        );
        let before = b.loss_rate;
        b.step(
            500,
            &Sample {
                timestamp_ms: 500,
                rtt_ms: 30.0,
                buffer_size: 10,
                send_rate_mbps: 5.0,
                pkt_loss_total: 10,
                pkt_retrans_total: 5,
            },
        );
        assert!(b.loss_rate <= before);
    }

    #[test]
    fn heavy_decrease_is_rate_limited_to_fast_decr_interval() {
        let cfg = config(500_000, 6_000_000);
        let mut b = AdaptiveBalancer::new(&cfg);
        let congested = Sample {
            timestamp_ms: 0,
            rtt_ms: 500.0,
            buffer_size: 10,
            send_rate_mbps: 5.0,
            pkt_loss_total: 0,
            pkt_retrans_total: 0,
        };
        b.step(0, &congested);
        let first_decrease = b.step(50, &congested).new_bitrate;
        let still_limited = b.step(150, &congested).new_bitrate;
        assert_eq!(
            first_decrease, still_limited,
            "a tick inside the 250ms fast_decr_interval must not decrease again"
        );
        let after_interval = b.step(400, &congested).new_bitrate;
        assert!(after_interval <= still_limited);
    }
}
