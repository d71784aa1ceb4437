//! Hand-rolled argument parsing, matching the style this family of daemon
//! binaries uses elsewhere: a manual `while` loop over `std::env::args()`
//! rather than a derive-macro framework, since the surface here is small and
//! fixed.

const HELP: &str = "\
Usage: srt-balancer [OPTIONS] PIPELINE_FILE HOST PORT

Options:
  -v              print version and exit
  -c FILE         configuration file
  -d MS           audio/video presentation offset, integer in [-10000, 10000]
  -s STRINGID     opaque session identifier
  -l MS           requested transport latency, integer in [100, 10000] (default 2000)
  -r              select the reduced 6-packet frame size
  -b FILE         legacy two-line min/max bitrate file (bits per second)
  -a NAME         balancer algorithm override
";

const VERSION: &str = concat!("srt-balancer ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub pipeline_file: String,
    pub host: String,
    pub port: u16,
    pub config_file: Option<String>,
    pub av_offset_ms: Option<i64>,
    pub stream_id: Option<String>,
    pub latency_ms: u64,
    pub reduced_pkt_size: bool,
    pub legacy_bitrate_file: Option<String>,
    pub balancer_override: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    PrintVersionAndExit(String),
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),
    #[error("{flag} expects a value")]
    MissingValue { flag: &'static str },
    #[error("{flag} value out of range: {value} (expected {lo}..={hi})")]
    OutOfRange {
        flag: &'static str,
        value: i64,
        lo: i64,
        hi: i64,
    },
    #[error("{flag} value is not a valid integer: {text:?}")]
    NotAnInteger { flag: &'static str, text: String },
    #[error("unrecognized argument: {0}")]
    Unrecognized(String),
}

pub fn help_text() -> &'static str {
    HELP
}

/// Parses `args` (expected to be `std::env::args().skip(1)`). `-v` takes
/// priority over everything else and is reported via
/// `CliError::PrintVersionAndExit` so the caller can print to stdout and
/// exit 0 without this function needing access to stdout itself.
pub fn parse(args: &[String]) -> Result<CliArgs, CliError> {
    let mut out = CliArgs {
        latency_ms: 2000,
        ..Default::default()
    };
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "-v" => return Err(CliError::PrintVersionAndExit(VERSION.to_string())),
            "-c" => {
                out.config_file = Some(next_value(args, &mut i, "-c")?);
            }
            "-d" => {
                let v = next_int(args, &mut i, "-d")?;
                check_range("-d", v, -10_000, 10_000)?;
                out.av_offset_ms = Some(v);
            }
            "-s" => {
                out.stream_id = Some(next_value(args, &mut i, "-s")?);
            }
            "-l" => {
                let v = next_int(args, &mut i, "-l")?;
                check_range("-l", v, 100, 10_000)?;
                out.latency_ms = v as u64;
            }
            "-r" => {
                out.reduced_pkt_size = true;
                i += 1;
            }
            "-b" => {
                out.legacy_bitrate_file = Some(next_value(args, &mut i, "-b")?);
            }
            "-a" => {
                out.balancer_override = Some(next_value(args, &mut i, "-a")?);
            }
            other if other.starts_with('-') && other.len() > 1 => {
                return Err(CliError::Unrecognized(other.to_string()));
            }
            other => {
                positional.push(other.to_string());
                i += 1;
            }
        }
    }

    if positional.len() != 3 {
        return Err(CliError::MissingArgument("PIPELINE_FILE HOST PORT"));
    }
    out.pipeline_file = positional[0].clone();
    out.host = positional[1].clone();
    out.port = positional[2]
        .parse::<u16>()
        .map_err(|_| CliError::NotAnInteger {
            flag: "PORT",
            text: positional[2].clone(),
        })?;

    Ok(out)
}

fn next_value(args: &[String], i: &mut usize, flag: &'static str) -> Result<String, CliError> {
    let idx = *i + 1;
    if idx >= args.len() {
        return Err(CliError::MissingValue { flag });
    }
    *i = idx + 1;
    Ok(args[idx].clone())
}

fn next_int(args: &[String], i: &mut usize, flag: &'static str) -> Result<i64, CliError> {
    let text = next_value(args, i, flag)?;
    text.parse::<i64>().map_err(|_| CliError::NotAnInteger { flag, text })
}

fn check_range(flag: &'static str, value: i64, lo: i64, hi: i64) -> Result<(), CliError> {
    if value < lo || value > hi {
        return Err(CliError::OutOfRange { flag, value, lo, hi });
    }
    Ok(())
}
