// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Trace Exporters
//!
//! The pipeline core emits a sequence of event records; exporters own
//! the serialization and file writing:
//!
//! - [`chrome_trace::ChromeTraceExporter`] - one Chrome/Perfetto JSON
//!   document
//! - [`tensorboard::TensorBoardExporter`] - per-worker
//!   `_worker_<N>.pt.trace.json` files plus an aggregate
//! - [`dataframe::DataframeExporter`] - a tabular view of the complete
//!   events
//!
//! All exporters buffer in memory until [`TraceExporter::flush`], so
//! `--disable_file` runs can read the serialized result through
//! [`TraceExporter::output_data`] without touching the filesystem.

pub mod chrome_trace;
pub mod dataframe;
pub mod tensorboard;
pub mod trace_view;

use serde_json::{Map, Value};
use trace_analyzer_domain::services::DeviceRecord;
use trace_analyzer_domain::TraceEvent;

pub use chrome_trace::ChromeTraceExporter;
pub use dataframe::DataframeExporter;
pub use tensorboard::TensorBoardExporter;
pub use trace_view::TraceView;

/// Common exporter contract.
pub trait TraceExporter {
    /// Registers an accelerator device descriptor.
    fn add_device(&mut self, device: &DeviceRecord);

    /// Adds a key to the document's metadata section.
    fn export_meta(&mut self, key: &str, value: Value);

    /// Accepts one event leaving the pipeline.
    fn export_event(&mut self, event: &TraceEvent) -> anyhow::Result<()>;

    /// Writes the accumulated output to its target file(s).
    fn flush(&mut self) -> anyhow::Result<()>;

    /// Serialized output without touching the filesystem.
    fn output_data(&self) -> anyhow::Result<String>;
}

/// Standard `otherData` for a run: tool name, command line, settings.
pub fn standard_metadata(output: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert(
        "Application".to_string(),
        Value::from("Acelyzer: Trace Post-Processing Tool"),
    );
    meta.insert(
        "CmdLine".to_string(),
        Value::from(std::env::args().collect::<Vec<_>>().join(" ")),
    );
    let mut settings = Map::new();
    settings.insert("output".to_string(), Value::from(output));
    meta.insert("Settings".to_string(), Value::Object(settings));
    meta.insert(
        "ExportedAt".to_string(),
        Value::from(chrono::Utc::now().to_rfc3339()),
    );
    meta
}

/// Serializes a device record for the `deviceProperties` list.
pub fn device_json(device: &DeviceRecord) -> Value {
    serde_json::json!({
        "id": device.id,
        "type": device.device_type,
        "name": device.name,
        "core": device.core,
    })
}
