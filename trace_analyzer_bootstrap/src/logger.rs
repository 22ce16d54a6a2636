// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Logger
//!
//! Lightweight logging abstraction for the bootstrap phase, before the
//! application's tracing subscriber exists. Trait-based so tests can
//! swap in a no-op implementation.

/// Bootstrap logging abstraction
///
/// Provides a simple logging interface for bootstrap operations.
/// Implementations can use tracing, stderr, or custom backends.
pub trait BootstrapLogger: Send + Sync {
    /// Log an error message
    ///
    /// Used for fatal errors during bootstrap that will cause termination.
    fn error(&self, message: &str);

    /// Log a warning message
    fn warn(&self, message: &str);

    /// Log an info message
    fn info(&self, message: &str);

    /// Log a debug message
    fn debug(&self, message: &str);
}

/// Console logger implementation using tracing
///
/// Routes bootstrap logs through the tracing crate for consistent logging.
pub struct ConsoleLogger {
    prefix: String,
}

impl ConsoleLogger {
    /// Create a new console logger with the default prefix
    pub fn new() -> Self {
        Self::with_prefix("bootstrap")
    }

    /// Create a console logger with a custom prefix
    pub fn with_prefix(prefix: &str) -> Self {
        ConsoleLogger {
            prefix: prefix.to_string(),
        }
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        ConsoleLogger::new()
    }
}

impl BootstrapLogger for ConsoleLogger {
    fn error(&self, message: &str) {
        tracing::error!("[{}] {}", self.prefix, message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!("[{}] {}", self.prefix, message);
    }

    fn info(&self, message: &str) {
        tracing::info!("[{}] {}", self.prefix, message);
    }

    fn debug(&self, message: &str) {
        tracing::debug!("[{}] {}", self.prefix, message);
    }
}

/// No-op logger for tests
pub struct NoopLogger;

impl BootstrapLogger for NoopLogger {
    fn error(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn debug(&self, _message: &str) {}
}
