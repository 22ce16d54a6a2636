// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # AIU Trace Analyzer - Domain Layer
//!
//! Pure event-processing logic for AIU execution traces: no I/O, no
//! logging, no clocks. The application layer feeds Chrome Trace Event
//! records in, receives the transformed stream plus finalize-time
//! diagnostics, and owns every side effect.
//!
//! ## Architecture
//!
//! Following Domain-Driven Design, the crate is organized as:
//!
//! - **Entities** ([`entities`]): the [`entities::TraceEvent`] wire
//!   record, the FLEX/TORCH dialect tables, the per-run job registry,
//!   and compiler-emitted ideal-cycle tables.
//! - **Value Objects** ([`value_objects`]): event classes, rolling
//!   frequency statistics, kernel-stream fingerprints, warning
//!   accumulators, composite sort keys.
//! - **Services** ([`services`]): the pipeline stages - normalization
//!   with 32-bit counter-overflow reconstruction, dialect-aware
//!   classification, sort/overlap resolution, flow synthesis, the
//!   utilization engine, derived-event synthesis, and TensorBoard
//!   refinement.
//! - **Aggregates** ([`aggregates`]): the [`aggregates::EventPipeline`]
//!   driver that owns the ordered stage list.
//! - **Pipeline** ([`pipeline`]): the stage trait, bucketed queues, the
//!   two-phase barrier, and diagnostics.
//!
//! ## Execution Model
//!
//! Single-threaded, cooperative, event-at-a-time. A stage is a
//! transformation `(event) → 0..N events` plus exclusively owned state;
//! stages that need global statistics buffer their input behind a
//! two-phase barrier and transform it during the drain. See
//! [`pipeline::stage::PipelineStage`] for the full contract.

pub mod aggregates;
pub mod entities;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod value_objects;

pub use aggregates::EventPipeline;
pub use entities::{DialectKind, JobRegistry, Phase, Tid, TraceEvent};
pub use error::AnalysisError;
pub use pipeline::{Diagnostic, PipelineStage, Severity};
pub use value_objects::EventClass;
