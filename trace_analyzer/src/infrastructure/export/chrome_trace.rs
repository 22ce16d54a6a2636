// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chrome Trace Exporter
//!
//! Accumulates exported events into a [`TraceView`] and dumps the whole
//! document as JSON on flush, ready for chrome://tracing or Perfetto.

use super::{device_json, standard_metadata, TraceExporter, TraceView};
use anyhow::Context;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use trace_analyzer_domain::services::DeviceRecord;
use trace_analyzer_domain::TraceEvent;

/// JSON file exporter for Chrome/Perfetto.
pub struct ChromeTraceExporter {
    target: PathBuf,
    view: TraceView,
    devices: Vec<Value>,
    write_file: bool,
}

impl ChromeTraceExporter {
    pub fn new(target: &str, write_file: bool) -> Self {
        ChromeTraceExporter {
            target: PathBuf::from(target),
            view: TraceView::new("ms", standard_metadata(target)),
            devices: Vec::new(),
            write_file,
        }
    }
}

impl TraceExporter for ChromeTraceExporter {
    fn add_device(&mut self, device: &DeviceRecord) {
        self.devices.push(device_json(device));
    }

    fn export_meta(&mut self, key: &str, value: Value) {
        self.view.add_metadata(key, value);
    }

    fn export_event(&mut self, event: &TraceEvent) -> anyhow::Result<()> {
        self.view.append_trace_event(serde_json::to_value(event)?);
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.view.set_device_data(self.devices.clone());
        if self.write_file {
            fs::write(&self.target, self.view.dump()?)
                .with_context(|| format!("writing trace to {}", self.target.display()))?;
            tracing::info!("EXPORT: trace written to {}", self.target.display());
        }
        Ok(())
    }

    fn output_data(&self) -> anyhow::Result<String> {
        let mut view = self.view.clone();
        view.set_device_data(self.devices.clone());
        view.dump()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trace_analyzer_domain::TraceEvent;

    #[test]
    fn test_buffered_export_without_file() {
        let mut exporter = ChromeTraceExporter::new("unused.json", false);
        exporter
            .export_event(&TraceEvent::complete("k", 1.0, 2.0, 0, 0))
            .unwrap();
        exporter.add_device(&DeviceRecord {
            id: 0,
            device_type: "AIU".to_string(),
            name: "AIU".to_string(),
            core: "PT Array".to_string(),
        });
        exporter.flush().unwrap();

        let data: serde_json::Value =
            serde_json::from_str(&exporter.output_data().unwrap()).unwrap();
        assert_eq!(data["traceEvents"].as_array().unwrap().len(), 1);
        assert_eq!(data["deviceProperties"][0]["core"], "PT Array");
        assert!(data["otherData"]["Application"]
            .as_str()
            .unwrap()
            .contains("Acelyzer"));
    }

    #[test]
    fn test_flush_writes_target_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.json");
        let mut exporter = ChromeTraceExporter::new(target.to_str().unwrap(), true);
        exporter
            .export_event(&TraceEvent::complete("k", 1.0, 2.0, 0, 0))
            .unwrap();
        exporter.flush().unwrap();

        let text = std::fs::read_to_string(&target).unwrap();
        let data: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(data["displayTimeUnit"], "ms");
    }
}
