// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling with a parse-then-validate split:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. parse_cli()                     │  Parse CLI with clap
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. Cli::validate()                 │  Range/format validation
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. ValidatedCli                    │  Safe, validated config
//! └─────────────────────────────────────┘
//! ```
//!
//! Everything the analyzer consumes downstream is typed here: the
//! `--freq=<soc>[:<core>]` pair is split and range-checked, the overlap
//! mode is matched against the known strategies, and `--event_limits`
//! must at least be a JSON object.

use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

/// CLI validation errors.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no input traces given")]
    NoInput,
    #[error("invalid --freq value '{0}': expected <soc>[:<core>] in MHz")]
    InvalidFreq(String),
    #[error("invalid --overlap mode '{0}': expected drop|tid|async|warn|shift")]
    InvalidOverlap(String),
    #[error("--event_limits is not a JSON object: {0}")]
    InvalidEventLimits(String),
}

/// Raw CLI surface of the `acelyzer` binary.
#[derive(Debug, Parser)]
#[command(
    name = "acelyzer",
    version,
    about = "AIU trace post-processing and analysis tool"
)]
pub struct Cli {
    /// Input trace file(s), comma-separated Chrome Trace Event JSON
    #[arg(short = 'i', long = "input", value_delimiter = ',', required = true)]
    pub input: Vec<String>,

    /// Output file (Chrome/Perfetto JSON, or TB trace base name)
    #[arg(short = 'o', long = "output", default_value = "acelyzer_out.json")]
    pub output: String,

    /// SoC frequency in MHz, optionally with a core frequency: <soc>[:<core>]
    #[arg(long = "freq", default_value = "560")]
    pub freq: String,

    /// Produce TensorBoard-compatible per-worker trace files
    #[arg(long)]
    pub tb: bool,

    /// Overlap resolution strategy
    #[arg(long, default_value = "warn")]
    pub overlap: String,

    /// JSON object with keys {skip, count, ts_start, ts_end, no_count_types}
    #[arg(long = "event_limits")]
    pub event_limits: Option<String>,

    /// Do not write output files (library/buffer mode)
    #[arg(long)]
    pub disable_file: bool,

    /// Comma-separated drop filters: <dotted.path>:<regex>
    #[arg(long, default_value = "")]
    pub filter: String,

    /// Continue past critical trace inconsistencies (with warnings)
    #[arg(long)]
    pub ignore_crit: bool,

    /// Shift the whole trace so it starts at t=0
    #[arg(long)]
    pub zero_align: bool,

    /// Keep original event names (skip TB function-index stripping)
    #[arg(long)]
    pub keep_names: bool,

    /// Compiler log file(s) with Ideal/Total Cycles tables, comma-separated
    #[arg(short = 'c', long = "compiler_log")]
    pub compiler_log: Option<String>,

    /// Stage profile JSON (defaults to the built-in everything profile)
    #[arg(long = "profile")]
    pub profile: Option<PathBuf>,

    /// Verbose logging (equivalent to RUST_LOG=debug)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// CLI arguments after validation; frequencies are numeric and the
/// overlap mode is known-good.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub input: Vec<String>,
    pub output: String,
    pub soc_frequency: f64,
    pub core_frequency: f64,
    pub tb: bool,
    pub overlap: String,
    pub event_limits: Option<String>,
    pub disable_file: bool,
    pub filter: String,
    pub ignore_crit: bool,
    pub zero_align: bool,
    pub keep_names: bool,
    pub compiler_logs: Vec<String>,
    pub profile: Option<PathBuf>,
    pub verbose: bool,
}

const OVERLAP_MODES: [&str; 5] = ["drop", "tid", "async", "warn", "shift"];

impl Cli {
    /// Validates the raw arguments into a [`ValidatedCli`].
    pub fn validate(self) -> Result<ValidatedCli, ParseError> {
        if self.input.is_empty() {
            return Err(ParseError::NoInput);
        }

        let (soc_frequency, core_frequency) = parse_freq(&self.freq)?;

        if !OVERLAP_MODES.contains(&self.overlap.as_str()) {
            return Err(ParseError::InvalidOverlap(self.overlap));
        }

        if let Some(limits) = &self.event_limits {
            match serde_json::from_str::<serde_json::Value>(limits) {
                Ok(serde_json::Value::Object(_)) => {}
                Ok(_) => {
                    return Err(ParseError::InvalidEventLimits(
                        "top-level value must be an object".to_string(),
                    ))
                }
                Err(e) => return Err(ParseError::InvalidEventLimits(e.to_string())),
            }
        }

        let compiler_logs = self
            .compiler_log
            .map(|logs| logs.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        Ok(ValidatedCli {
            input: self.input,
            output: self.output,
            soc_frequency,
            core_frequency,
            tb: self.tb,
            overlap: self.overlap,
            event_limits: self.event_limits,
            disable_file: self.disable_file,
            filter: self.filter,
            ignore_crit: self.ignore_crit,
            zero_align: self.zero_align,
            keep_names: self.keep_names,
            compiler_logs,
            profile: self.profile,
            verbose: self.verbose,
        })
    }
}

fn parse_freq(freq: &str) -> Result<(f64, f64), ParseError> {
    let invalid = || ParseError::InvalidFreq(freq.to_string());
    let mut parts = freq.split(':');
    let soc: f64 = parts
        .next()
        .and_then(|p| p.trim().parse().ok())
        .ok_or_else(invalid)?;
    let core: f64 = match parts.next() {
        Some(core) => core.trim().parse().map_err(|_| invalid())?,
        None => soc,
    };
    if parts.next().is_some() || soc <= 0.0 || core <= 0.0 {
        return Err(invalid());
    }
    Ok((soc, core))
}

/// Parses argv (or any iterator of args) and validates.
pub fn parse_and_validate<I, T>(args: I) -> Result<ValidatedCli, anyhow::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::try_parse_from(args)?;
    Ok(cli.validate()?)
}
