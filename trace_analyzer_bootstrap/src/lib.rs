// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Bootstrap Module
//!
//! The bootstrap module sits **outside** the enterprise application
//! layers (domain, application, infrastructure) and provides:
//!
//! - **Argument parsing** - clap CLI with a validation pass
//! - **Signal handling** - cooperative shutdown flag (SIGINT/SIGTERM)
//! - **Error handling** - Unix exit code mapping
//! - **Logging** - minimal trait-based logger for the bootstrap phase
//!
//! Bootstrap can be depended on by the application binary; the domain
//! layer never sees it.
//!
//! ## Module Structure
//!
//! - `cli` - argument parsing and validation
//! - `exit_code` - sysexits-style exit code enumeration
//! - `logger` - bootstrap-specific logging
//! - `shutdown` - cooperative shutdown flag

pub mod cli;
pub mod exit_code;
pub mod logger;
pub mod shutdown;

pub use cli::{parse_and_validate, Cli, ParseError, ValidatedCli};
pub use exit_code::ExitCode;
pub use logger::{BootstrapLogger, ConsoleLogger, NoopLogger};
pub use shutdown::ShutdownFlag;
