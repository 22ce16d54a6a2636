// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dataframe Exporter
//!
//! Tabular view of the complete events: one row per `X` event with the
//! columns `(Timestamp, Duration, Category, Event Name, PT_Active)`.
//! Column values are extracted by dotted path from the serialized event,
//! so the default map can be replaced for ad-hoc reporting.

use super::TraceExporter;
use crate::infrastructure::report::render_table;
use anyhow::Context;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use trace_analyzer_domain::services::DeviceRecord;
use trace_analyzer_domain::{Phase, TraceEvent};

/// Column spec: dotted event path, column title, default value.
pub type ColumnMap = Vec<(&'static str, &'static str, Value)>;

fn default_columns() -> ColumnMap {
    vec![
        ("ts", "Timestamp", Value::from(0.0)),
        ("dur", "Duration", Value::from(0.0)),
        ("cat", "Category", Value::from("other")),
        ("name", "Event Name", Value::from("NoName")),
        ("args.pt_active", "PT_Active", Value::from(0.0)),
    ]
}

/// Vertical-table exporter over complete events.
pub struct DataframeExporter {
    target: PathBuf,
    columns: ColumnMap,
    rows: Vec<Vec<String>>,
    write_file: bool,
}

impl DataframeExporter {
    pub fn new(target: &str, write_file: bool) -> Self {
        Self::with_columns(target, write_file, default_columns())
    }

    pub fn with_columns(target: &str, write_file: bool, columns: ColumnMap) -> Self {
        DataframeExporter {
            target: PathBuf::from(target),
            columns,
            rows: Vec::new(),
            write_file,
        }
    }

    fn extract(value: &Value, path: &str, default: &Value) -> String {
        let mut current = value;
        for key in path.split('.') {
            match current.get(key) {
                Some(next) => current = next,
                None => return render_value(default),
            }
        }
        render_value(current)
    }

    fn render(&self) -> String {
        let headers: Vec<&str> = self.columns.iter().map(|(_, title, _)| *title).collect();
        render_table(&headers, &self.rows)
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl TraceExporter for DataframeExporter {
    fn add_device(&mut self, _device: &DeviceRecord) {
        // device descriptors have no column in the tabular view
    }

    fn export_meta(&mut self, _key: &str, _value: Value) {}

    fn export_event(&mut self, event: &TraceEvent) -> anyhow::Result<()> {
        if event.ph != Phase::Complete {
            return Ok(());
        }
        let serialized = serde_json::to_value(event)?;
        let row = self
            .columns
            .iter()
            .map(|(path, _, default)| Self::extract(&serialized, path, default))
            .collect();
        self.rows.push(row);
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        if self.write_file {
            fs::write(&self.target, self.render())
                .with_context(|| format!("writing table to {}", self.target.display()))?;
        }
        Ok(())
    }

    fn output_data(&self) -> anyhow::Result<String> {
        Ok(self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_for_complete_events_only() {
        let mut exporter = DataframeExporter::new("unused.txt", false);
        let mut event = TraceEvent::complete("sen_add Cmpt Exec", 3.5, 2.0, 0, 0);
        event.cat = Some("kernel".to_string());
        event.set_arg("pt_active", 0.25);
        exporter.export_event(&event).unwrap();
        exporter
            .export_event(&TraceEvent::counter("Power", 1.0, 0, "Watts", 5.0))
            .unwrap();

        let table = exporter.output_data().unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2); // header + one row
        assert!(lines[0].contains("PT_Active"));
        assert!(lines[1].contains("sen_add Cmpt Exec"));
        assert!(lines[1].contains("0.25"));
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let mut exporter = DataframeExporter::new("unused.txt", false);
        exporter
            .export_event(&TraceEvent::complete("bare", 1.0, 1.0, 0, 0))
            .unwrap();
        let table = exporter.output_data().unwrap();
        assert!(table.contains("other")); // default category
        assert!(table.contains("0")); // default pt_active
    }
}
