// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging Setup
//!
//! Initializes the tracing subscriber and flushes the pipeline's
//! finalize-time diagnostics. The domain never logs; every summary line
//! passes through [`emit_diagnostics`] exactly once, prefixed with its
//! stage tag.

use trace_analyzer_domain::{Diagnostic, Severity};
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. `RUST_LOG` wins over the
/// verbosity flag; repeated initialization (tests) is a no-op.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Logs each diagnostic once at its severity, `TAG: message`.
pub fn emit_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        match diagnostic.severity {
            Severity::Info => tracing::info!("{}: {}", diagnostic.tag, diagnostic.message),
            Severity::Warning => tracing::warn!("{}: {}", diagnostic.tag, diagnostic.message),
            Severity::Error => tracing::error!("{}: {}", diagnostic.tag, diagnostic.message),
        }
    }
}
