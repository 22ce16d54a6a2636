// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # AIU Trace Analyzer
//!
//! Post-processing for raw AIU execution traces: normalization with
//! 32-bit hardware-counter overflow reconstruction, dialect-aware event
//! classification, flow synthesis, kernel-utilization analysis against
//! compiler ideal-cycle tables, and export for Chrome/Perfetto or
//! TensorBoard.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Bootstrap                                │
//! │  (CLI parsing, signals, exit codes)                         │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Application Layer                          │
//! │  (Analyzer service: ingest → pipeline → export)             │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! │  (Events, Dialects, Pipeline Stages, Utilization Engine)    │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Infrastructure Layer                         │
//! │  (Ingestion, Exporters, Profiles, Reports, Logging)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//!
//! `ingest → normalize → classify → sort → overlap → flows →
//! utilization → derived events → TB refine → export`
//!
//! ## Library Use
//!
//! The binary is a thin wrapper; the same run is available in-process
//! through [`application::Analyzer`] with buffer sources and
//! `write_files = false`, reading the result via `output_data()`.

pub mod application;
pub mod infrastructure;

pub use application::{Analyzer, AnalyzerConfig};
pub use infrastructure::ingest::TraceSource;
