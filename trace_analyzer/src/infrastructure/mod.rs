// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Layer
//!
//! Everything with a side effect: file ingestion, trace exporters,
//! profile configuration, category-report rendering, and logging setup.
//! The domain crate stays pure; this layer adapts it to the filesystem
//! and the terminal.

pub mod config;
pub mod export;
pub mod ingest;
pub mod logging;
pub mod report;
