// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `acelyzer` Binary
//!
//! Thin entry point: bootstrap parses and validates the CLI, the
//! application service does the run, and errors map onto sysexits-style
//! exit codes.

use clap::Parser;
use trace_analyzer::{Analyzer, AnalyzerConfig};
use trace_analyzer_bootstrap::{Cli, ExitCode, ShutdownFlag};
use trace_analyzer_domain::AnalysisError;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = Cli::parse();
    let cli = match cli.validate() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("acelyzer: {e}");
            return ExitCode::UsageError.code();
        }
    };

    trace_analyzer::infrastructure::logging::init(cli.verbose);
    let shutdown = ShutdownFlag::install();

    let config = match AnalyzerConfig::from_cli(cli, Some(shutdown)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e:#}");
            return ExitCode::UsageError.code();
        }
    };

    let mut analyzer = Analyzer::new(config);
    match analyzer.run() {
        Ok(()) => ExitCode::Success.code(),
        Err(e) => {
            tracing::error!("{e:#}");
            exit_code_for(&e).code()
        }
    }
}

/// Maps run failures onto exit codes: broken trace invariants and
/// aborts are software errors, filesystem problems are I/O errors, and
/// everything else counts as malformed input.
fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    if let Some(analysis) = error.downcast_ref::<AnalysisError>() {
        let root = match analysis {
            AnalysisError::Stage { source, .. } => source.as_ref(),
            other => other,
        };
        return match root {
            AnalysisError::Monotonicity(_) | AnalysisError::Aborted => ExitCode::SoftwareError,
            AnalysisError::InvalidConfiguration(_) => ExitCode::UsageError,
            _ => ExitCode::DataError,
        };
    }
    if error.downcast_ref::<std::io::Error>().is_some() {
        return ExitCode::IoError;
    }
    ExitCode::DataError
}
