//! Typed configuration snapshot plus a hand-rolled INI-like loader.
//!
//! The file format superficially resembles TOML (`[section]`, `key = value`)
//! but isn't: it accepts `;` comments and case-insensitive section names,
//! neither of which real TOML allows, so this is parsed by hand rather than
//! through the `toml` crate — following the same "Input struct (all
//! optional, defaulted) → `.resolve()` → typed struct" shape this project's
//! wider family of config loaders uses, just with a parser of its own.

use std::collections::HashMap;

use crate::balancer::{AdaptiveTuning, AimdTuning};
use crate::error::ConfigError;

const MIN_BITRATE_CORRIDOR_KBPS: (u64, u64) = (300, 30_000);
const LATENCY_CORRIDOR_MS: (u64, u64) = (100, 10_000);

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AdaptiveConfig {
    pub incr_step_kbps: u64,
    pub decr_step_kbps: u64,
    pub incr_interval_ms: u64,
    pub decr_interval_ms: u64,
    pub loss_threshold: f64,
}

impl AdaptiveConfig {
    fn defaults() -> Self {
        AdaptiveConfig {
            incr_step_kbps: 30,
            decr_step_kbps: 100,
            incr_interval_ms: 500,
            decr_interval_ms: 200,
            loss_threshold: 0.5,
        }
    }

    pub(crate) fn to_tuning(&self) -> AdaptiveTuning {
        AdaptiveTuning {
            incr_step_bps: self.incr_step_kbps as i64 * 1000,
            decr_step_bps: self.decr_step_kbps as i64 * 1000,
            incr_interval_ms: self.incr_interval_ms,
            decr_interval_ms: self.decr_interval_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AimdConfig {
    pub incr_step_kbps: u64,
    pub decr_mult: f64,
    pub incr_interval_ms: u64,
    pub decr_interval_ms: u64,
}

impl AimdConfig {
    fn defaults() -> Self {
        AimdConfig {
            incr_step_kbps: 50,
            decr_mult: 0.75,
            incr_interval_ms: 500,
            decr_interval_ms: 200,
        }
    }

    pub(crate) fn to_tuning(&self) -> AimdTuning {
        AimdTuning {
            incr_step_bps: self.incr_step_kbps as i64 * 1000,
            decr_mult: self.decr_mult,
            incr_interval_ms: self.incr_interval_ms,
            decr_interval_ms: self.decr_interval_ms,
        }
    }
}

/// A resolved, validated configuration snapshot. Serialized values are
/// always kilobits per second; the translation to runtime bits-per-second
/// happens once, in [`crate::runner::Runner::new`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Config {
    pub min_bitrate_kbps: u64,
    pub max_bitrate_kbps: u64,
    pub balancer_name: String,
    pub srt_latency_ms: u64,
    pub adaptive: AdaptiveConfig,
    pub aimd: AimdConfig,
}

impl Config {
    pub fn defaults() -> Self {
        Config {
            min_bitrate_kbps: 300,
            max_bitrate_kbps: 6000,
            balancer_name: "adaptive".to_string(),
            srt_latency_ms: 2000,
            adaptive: AdaptiveConfig::defaults(),
            aimd: AimdConfig::defaults(),
        }
    }

    /// Parses and validates a configuration file's contents.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let raw = parse_sections(input);
        resolve(&raw)
    }

    /// Serializes back into the same textual format `parse` accepts. Only
    /// keys this loader recognizes are ever written, so
    /// `parse(serialize(c)) == c` for any value produced by `parse`.
    pub fn serialize(&self) -> String {
        format!(
            "[general]\n\
             min_bitrate = {min}\n\
             max_bitrate = {max}\n\
             balancer = {balancer}\n\
             [srt]\n\
             latency = {latency}\n\
             [adaptive]\n\
             incr_step = {a_incr}\n\
             decr_step = {a_decr}\n\
             incr_interval = {a_incr_int}\n\
             decr_interval = {a_decr_int}\n\
             loss_threshold = {a_loss}\n\
             [aimd]\n\
             incr_step = {m_incr}\n\
             decr_mult = {m_mult}\n\
             incr_interval = {m_incr_int}\n\
             decr_interval = {m_decr_int}\n",
            min = self.min_bitrate_kbps,
            max = self.max_bitrate_kbps,
            balancer = self.balancer_name,
            latency = self.srt_latency_ms,
            a_incr = self.adaptive.incr_step_kbps,
            a_decr = self.adaptive.decr_step_kbps,
            a_incr_int = self.adaptive.incr_interval_ms,
            a_decr_int = self.adaptive.decr_interval_ms,
            a_loss = self.adaptive.loss_threshold,
            m_incr = self.aimd.incr_step_kbps,
            m_mult = self.aimd.decr_mult,
            m_incr_int = self.aimd.incr_interval_ms,
            m_decr_int = self.aimd.decr_interval_ms,
        )
    }

    /// Compact JSON rendering for the single `trace!`-level dump emitted at
    /// startup — not the wire format (that's `serialize`/`parse`), just a
    /// structured-logging convenience.
    pub fn to_json_debug(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

type RawSections = HashMap<String, HashMap<String, String>>;

fn parse_sections(input: &str) -> RawSections {
    let mut sections: RawSections = HashMap::new();
    let mut current = String::new();
    sections.insert(current.clone(), HashMap::new());

    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix('[') {
            if let Some(name) = stripped.strip_suffix(']') {
                current = name.trim().to_lowercase();
                sections.entry(current.clone()).or_default();
                continue;
            }
        }
        if let Some((key, value)) = line.split_once('=') {
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    sections
}

fn get<'a>(raw: &'a RawSections, section: &str, key: &str) -> Option<&'a str> {
    raw.get(section).and_then(|s| s.get(key)).map(|v| v.as_str())
}

fn parse_u64(
    raw: &RawSections,
    section: &str,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match get(raw, section, key) {
        None => Ok(default),
        Some(text) => text.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
            section: leak_section(section),
            key,
            text: text.to_string(),
        }),
    }
}

fn parse_f64(
    raw: &RawSections,
    section: &str,
    key: &'static str,
    default: f64,
) -> Result<f64, ConfigError> {
    match get(raw, section, key) {
        None => Ok(default),
        Some(text) => text.parse::<f64>().map_err(|_| ConfigError::InvalidValue {
            section: leak_section(section),
            key,
            text: text.to_string(),
        }),
    }
}

/// Section names are always one of a fixed, known set, so a `&'static str`
/// is safe to hand back for error messages without actually leaking memory
/// per call.
fn leak_section(section: &str) -> &'static str {
    match section {
        "general" => "general",
        "srt" => "srt",
        "adaptive" => "adaptive",
        "aimd" => "aimd",
        _ => "unknown",
    }
}

fn resolve(raw: &RawSections) -> Result<Config, ConfigError> {
    let min_bitrate_kbps = parse_u64(raw, "general", "min_bitrate", 300)?;
    let max_bitrate_kbps = parse_u64(raw, "general", "max_bitrate", 6000)?;
    let balancer_name = get(raw, "general", "balancer")
        .unwrap_or("adaptive")
        .to_string();
    let srt_latency_ms = parse_u64(raw, "srt", "latency", 2000)?;

    check_corridor(
        "min_bitrate",
        min_bitrate_kbps,
        MIN_BITRATE_CORRIDOR_KBPS.0,
        MIN_BITRATE_CORRIDOR_KBPS.1,
    )?;
    check_corridor(
        "max_bitrate",
        max_bitrate_kbps,
        MIN_BITRATE_CORRIDOR_KBPS.0,
        MIN_BITRATE_CORRIDOR_KBPS.1,
    )?;
    if min_bitrate_kbps > max_bitrate_kbps {
        return Err(ConfigError::MinExceedsMax {
            min: min_bitrate_kbps * 1000,
            max: max_bitrate_kbps * 1000,
        });
    }
    check_corridor(
        "latency",
        srt_latency_ms,
        LATENCY_CORRIDOR_MS.0,
        LATENCY_CORRIDOR_MS.1,
    )?;

    let defaults_a = AdaptiveConfig::defaults();
    let adaptive = AdaptiveConfig {
        incr_step_kbps: nonzero_or_default(
            parse_u64(raw, "adaptive", "incr_step", defaults_a.incr_step_kbps)?,
            defaults_a.incr_step_kbps,
        ),
        decr_step_kbps: nonzero_or_default(
            parse_u64(raw, "adaptive", "decr_step", defaults_a.decr_step_kbps)?,
            defaults_a.decr_step_kbps,
        ),
        incr_interval_ms: nonzero_or_default(
            parse_u64(raw, "adaptive", "incr_interval", defaults_a.incr_interval_ms)?,
            defaults_a.incr_interval_ms,
        ),
        decr_interval_ms: nonzero_or_default(
            parse_u64(raw, "adaptive", "decr_interval", defaults_a.decr_interval_ms)?,
            defaults_a.decr_interval_ms,
        ),
        loss_threshold: parse_f64(raw, "adaptive", "loss_threshold", defaults_a.loss_threshold)?,
    };

    let defaults_m = AimdConfig::defaults();
    let aimd = AimdConfig {
        incr_step_kbps: nonzero_or_default(
            parse_u64(raw, "aimd", "incr_step", defaults_m.incr_step_kbps)?,
            defaults_m.incr_step_kbps,
        ),
        decr_mult: {
            let v = parse_f64(raw, "aimd", "decr_mult", defaults_m.decr_mult)?;
            if v <= 0.0 {
                defaults_m.decr_mult
            } else {
                v
            }
        },
        incr_interval_ms: nonzero_or_default(
            parse_u64(raw, "aimd", "incr_interval", defaults_m.incr_interval_ms)?,
            defaults_m.incr_interval_ms,
        ),
        decr_interval_ms: nonzero_or_default(
            parse_u64(raw, "aimd", "decr_interval", defaults_m.decr_interval_ms)?,
            defaults_m.decr_interval_ms,
        ),
    };

    Ok(Config {
        min_bitrate_kbps,
        max_bitrate_kbps,
        balancer_name,
        srt_latency_ms,
        adaptive,
        aimd,
    })
}

fn nonzero_or_default(value: u64, default: u64) -> u64 {
    if value == 0 {
        default
    } else {
        value
    }
}

fn check_corridor(field: &'static str, value: u64, lo: u64, hi: u64) -> Result<(), ConfigError> {
    if value < lo || value > hi {
        return Err(ConfigError::OutOfRange {
            field,
            value: value as i64,
            lo: lo as i64,
            hi: hi as i64,
        });
    }
    Ok(())
}

/// Loads the legacy two-line `min\nmax` bitrate file (already bits per
/// second, unlike the INI format's kilobits).
pub fn load_legacy_bitrate_file(contents: &str) -> Result<(u64, u64), ConfigError> {
    let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() != 2 {
        return Err(ConfigError::LegacyLineCount(lines.len()));
    }
    let min = parse_legacy_line(lines[0], 1)?;
    let max = parse_legacy_line(lines[1], 2)?;
    const LO: u64 = 300_000;
    const HI: u64 = 30_000_000;
    for (field, value) in [("min", min), ("max", max)] {
        if value < LO || value > HI {
            return Err(ConfigError::OutOfRange {
                field: if field == "min" { "legacy_min_bps" } else { "legacy_max_bps" },
                value: value as i64,
                lo: LO as i64,
                hi: HI as i64,
            });
        }
    }
    Ok((min, max))
}

fn parse_legacy_line(line: &str, line_no: usize) -> Result<u64, ConfigError> {
    line.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::LegacyParse {
            line: line_no,
            text: line.to_string(),
        })
}
