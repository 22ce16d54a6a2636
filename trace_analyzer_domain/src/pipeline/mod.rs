// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Pipeline machinery shared by every stage: the stage trait, the
//! bucketed queue container, the two-phase barrier, and finalize-time
//! diagnostics.

pub mod barrier;
pub mod diagnostic;
pub mod hash_queue;
pub mod stage;

pub use barrier::{BarrierPhase, TwoPhaseBuffer};
pub use diagnostic::{Diagnostic, Severity};
pub use hash_queue::{HashQueues, QueueKey};
pub use stage::PipelineStage;
