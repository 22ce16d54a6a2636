// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # TensorBoard Exporter
//!
//! Writes per-worker `.pt.trace.json` files so the TensorBoard profiler
//! plugin shows one worker per rank. Worker id is `pid mod 1000` - a pid
//! of 1000 or more marks a host proxy process folded back onto its
//! device's worker. The reserved CollectiveBW pid (−1) only appears in
//! the aggregate document.

use super::{device_json, standard_metadata, TraceExporter, TraceView};
use anyhow::Context;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use trace_analyzer_domain::services::DeviceRecord;
use trace_analyzer_domain::TraceEvent;

const TB_EXTENSION: &str = ".pt.trace.json";

/// TensorBoard per-worker trace exporter.
pub struct TensorBoardExporter {
    target: PathBuf,
    view: TraceView,
    devices: Vec<Value>,
    worker_events: BTreeMap<i64, Vec<Value>>,
    write_file: bool,
}

impl TensorBoardExporter {
    pub fn new(target: &str, write_file: bool) -> Self {
        TensorBoardExporter {
            target: PathBuf::from(target),
            view: TraceView::new("ms", standard_metadata(target)),
            devices: Vec::new(),
            worker_events: BTreeMap::new(),
            write_file,
        }
    }

    fn worker_of(pid: i64) -> Option<i64> {
        // the collective-bandwidth track belongs to no single worker
        (pid >= 0).then(|| pid % 1000)
    }

    fn aggregate_path(&self) -> PathBuf {
        let name = self.target.to_string_lossy();
        if name.ends_with(TB_EXTENSION) {
            self.target.clone()
        } else if let Some(base) = name.strip_suffix(".json") {
            PathBuf::from(format!("{base}{TB_EXTENSION}"))
        } else {
            PathBuf::from(format!("{name}{TB_EXTENSION}"))
        }
    }

    fn worker_path(&self, worker: i64) -> PathBuf {
        let name = self.target.to_string_lossy();
        let base = name
            .strip_suffix(TB_EXTENSION)
            .or_else(|| name.strip_suffix(".json"))
            .unwrap_or(&name)
            .to_string();
        PathBuf::from(format!("{base}_worker_{worker}{TB_EXTENSION}"))
    }

    fn worker_view(&self, worker: i64) -> TraceView {
        let mut view = TraceView::new(&self.view.display_time_unit, self.view.other_data.clone());
        view.trace_events = self
            .worker_events
            .get(&worker)
            .cloned()
            .unwrap_or_default();
        view.set_device_data(
            self.devices
                .iter()
                .filter(|d| d["id"].as_i64().map(|id| id % 1000) == Some(worker))
                .cloned()
                .collect(),
        );
        view
    }
}

impl TraceExporter for TensorBoardExporter {
    fn add_device(&mut self, device: &DeviceRecord) {
        self.devices.push(device_json(device));
    }

    fn export_meta(&mut self, key: &str, value: Value) {
        self.view.add_metadata(key, value);
    }

    fn export_event(&mut self, event: &TraceEvent) -> anyhow::Result<()> {
        let serialized = serde_json::to_value(event)?;
        if let Some(worker) = Self::worker_of(event.pid) {
            self.worker_events
                .entry(worker)
                .or_default()
                .push(serialized.clone());
        }
        self.view.append_trace_event(serialized);
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.view.set_device_data(self.devices.clone());
        if !self.write_file {
            return Ok(());
        }

        let aggregate = self.aggregate_path();
        fs::write(&aggregate, self.view.dump()?)
            .with_context(|| format!("writing trace to {}", aggregate.display()))?;

        if self.worker_events.len() <= 1 {
            tracing::warn!("TB_EXPORTER: Only 1 AIU is used, no distributed view");
            return Ok(());
        }

        let workers: Vec<i64> = self.worker_events.keys().copied().collect();
        for worker in workers {
            let path = self.worker_path(worker);
            fs::write(&path, self.worker_view(worker).dump()?)
                .with_context(|| format!("writing trace to {}", path.display()))?;
            tracing::info!("TB_EXPORTER: worker trace written to {}", path.display());
        }
        Ok(())
    }

    fn output_data(&self) -> anyhow::Result<String> {
        let mut view = self.view.clone();
        view.set_device_data(self.devices.clone());
        view.dump()
    }
}
