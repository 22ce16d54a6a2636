// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Diagnostics
//!
//! The domain layer never logs. Stages accumulate warnings and hand back
//! [`Diagnostic`] records from `finalize()`; the application layer emits
//! them exactly once, prefixed with the stage tag (`OVC`, `UTL`, `FLOWS`,
//! `FREQ`, `NORM`, `CAT`, `TBR`, ...).

use std::fmt;

/// Severity of a diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One finalize-time diagnostic from a pipeline stage.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub tag: &'static str,
    pub message: String,
}

impl Diagnostic {
    pub fn info(tag: &'static str, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Info,
            tag,
            message: message.into(),
        }
    }

    pub fn warning(tag: &'static str, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            tag,
            message: message.into(),
        }
    }

    pub fn error(tag: &'static str, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            tag,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tag, self.message)
    }
}
