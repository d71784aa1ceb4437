//! Closed-loop bitrate controller for SRT-style live-video sessions.
//!
//! The balancer family (`balancer::adaptive`, `balancer::aimd`,
//! `balancer::fixed`) and the [`runner::Runner`] that owns one of them per
//! session are the load-bearing core; [`control_loop`], [`config`], [`cli`],
//! and [`adapters`] are the thin, testable collaborators around it.

pub mod adapters;
pub mod balancer;
pub mod cli;
pub mod clock;
pub mod config;
pub mod control_loop;
pub mod error;
pub mod runner;
pub mod signals;

/// Initializes `tracing-subscriber` from `RUST_LOG`, falling back to
/// `"info"`. Call once, at process start.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();
}
