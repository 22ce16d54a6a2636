// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Trace View Document
//!
//! The JSON document shape shared by the Chrome/Perfetto and TensorBoard
//! exporters: `traceEvents`, `displayTimeUnit`, `otherData`, and
//! `deviceProperties`.

use serde_json::{json, Map, Value};

/// An in-memory Chrome trace document being assembled for export.
#[derive(Debug, Clone)]
pub struct TraceView {
    pub trace_events: Vec<Value>,
    pub display_time_unit: String,
    pub other_data: Map<String, Value>,
    pub device_properties: Vec<Value>,
}

impl TraceView {
    pub fn new(display_time_unit: &str, other_data: Map<String, Value>) -> Self {
        TraceView {
            trace_events: Vec::new(),
            display_time_unit: display_time_unit.to_string(),
            other_data,
            device_properties: Vec::new(),
        }
    }

    /// Appends one already-serialized trace event.
    pub fn append_trace_event(&mut self, event: Value) {
        self.trace_events.push(event);
    }

    /// Adds metadata to the `otherData` section.
    pub fn add_metadata(&mut self, key: &str, value: Value) {
        self.other_data.insert(key.to_string(), value);
    }

    /// Replaces the device descriptor list.
    pub fn set_device_data(&mut self, devices: Vec<Value>) {
        self.device_properties = devices;
    }

    /// The complete document.
    pub fn to_json(&self) -> Value {
        json!({
            "traceEvents": self.trace_events,
            "displayTimeUnit": self.display_time_unit,
            "otherData": Value::Object(self.other_data.clone()),
            "deviceProperties": self.device_properties,
        })
    }

    /// Serialized document text.
    pub fn dump(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }
}
