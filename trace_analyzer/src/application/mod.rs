// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Layer
//!
//! Use-case orchestration on top of the domain pipeline. The only
//! service today is the [`services::Analyzer`], which wires ingestion,
//! the stage pipeline, exporters, and reporting into one run.

pub mod services;

pub use services::{Analyzer, AnalyzerConfig};
