// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Codes
//!
//! sysexits-style process exit codes. The application maps its error
//! taxonomy onto these; the binary's `main` converts the enum into the
//! process exit status.

/// Process exit codes (BSD sysexits subset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful completion.
    Success,
    /// Command-line usage error.
    UsageError,
    /// Malformed input data (bad JSON, broken invariants).
    DataError,
    /// Internal software error (assertion failures, aborted runs).
    SoftwareError,
    /// Input/output error (missing or unwritable files).
    IoError,
}

impl ExitCode {
    /// Numeric process exit status.
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::UsageError => 64,
            ExitCode::DataError => 65,
            ExitCode::SoftwareError => 70,
            ExitCode::IoError => 74,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code.code()
    }
}
