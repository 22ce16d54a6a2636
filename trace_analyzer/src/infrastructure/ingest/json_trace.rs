// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chrome Trace Ingestion
//!
//! Reads one or more Chrome Trace Event JSON documents - an object with
//! a `traceEvents` array, or a bare event array - from files or
//! in-memory buffers. Every event is stamped with its source's
//! `jobhash`, and each source's dialect is detected from its first
//! events so downstream predicates resolve against the right table.

use anyhow::Context;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use trace_analyzer_domain::{DialectKind, JobRegistry, TraceEvent};

/// Events inspected for dialect detection.
const DETECTION_WINDOW: usize = 64;

/// One input trace.
#[derive(Debug, Clone)]
pub enum TraceSource {
    File(PathBuf),
    /// In-memory document (library/buffer mode; `name` stands in for the
    /// file name in the job registry).
    Buffer { name: String, data: String },
}

impl TraceSource {
    pub fn uri(&self) -> String {
        match self {
            TraceSource::File(path) => path.to_string_lossy().into_owned(),
            TraceSource::Buffer { name, .. } => name.clone(),
        }
    }
}

/// Result of ingesting all sources.
#[derive(Debug)]
pub struct IngestResult {
    pub events: Vec<TraceEvent>,
    pub registry: JobRegistry,
}

/// TORCH traces carry the framework bridge's `aiu*` API names; anything
/// else is treated as a native FLEX trace.
pub fn detect_dialect(events: &[TraceEvent]) -> DialectKind {
    for event in events.iter().take(DETECTION_WINDOW) {
        if event.name.starts_with("aiu") {
            return DialectKind::Torch;
        }
    }
    DialectKind::Flex
}

/// Distinct string-pid examples carried into the summary warning.
const STRING_PID_EXAMPLES: usize = 4;

fn parse_document(text: &str, uri: &str) -> anyhow::Result<Vec<TraceEvent>> {
    let document: Value =
        serde_json::from_str(text).with_context(|| format!("parsing trace JSON from {uri}"))?;
    let raw_events = match &document {
        Value::Object(map) => map
            .get("traceEvents")
            .and_then(Value::as_array)
            .cloned()
            .with_context(|| format!("{uri}: missing 'traceEvents' array"))?,
        Value::Array(events) => events.clone(),
        _ => anyhow::bail!("{uri}: not a trace document"),
    };

    let mut string_pids = 0usize;
    let mut string_pid_examples: Vec<String> = Vec::new();
    let mut events = Vec::with_capacity(raw_events.len());
    for (index, raw) in raw_events.into_iter().enumerate() {
        if let Some(Value::String(pid)) = raw.get("pid") {
            string_pids += 1;
            if string_pid_examples.len() < STRING_PID_EXAMPLES
                && !string_pid_examples.iter().any(|p| p == pid)
            {
                string_pid_examples.push(pid.clone());
            }
        }
        let event: TraceEvent = serde_json::from_value(raw)
            .with_context(|| format!("{uri}: bad trace event at index {index}"))?;
        events.push(event);
    }
    if string_pids > 0 {
        tracing::warn!(
            "INGEST: {uri}: {string_pids} events carry string pids \
             (e.g. {string_pid_examples:?}); folded into the reserved 10000+ range"
        );
    }
    Ok(events)
}

/// Reads every source, detects dialects, registers jobs, and stamps
/// `args["jobhash"]` on each event.
pub fn ingest(sources: &[TraceSource]) -> anyhow::Result<IngestResult> {
    let mut registry = JobRegistry::new();
    let mut all_events = Vec::new();

    for source in sources {
        let uri = source.uri();
        let text = match source {
            TraceSource::File(path) => fs::read_to_string(path)
                .with_context(|| format!("reading trace file {}", path.display()))?,
            TraceSource::Buffer { data, .. } => data.clone(),
        };
        let mut events = parse_document(&text, &uri)?;
        let dialect = detect_dialect(&events);
        let jobhash = registry.add_job(&uri, dialect);
        tracing::debug!(
            "INGEST: {} events from {} (dialect {}, jobhash {})",
            events.len(),
            uri,
            dialect.as_str(),
            jobhash
        );
        for event in &mut events {
            if !event.args.contains_key("jobhash") {
                event.set_arg("jobhash", jobhash);
            }
        }
        all_events.append(&mut events);
    }

    Ok(IngestResult {
        events: all_events,
        registry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLEX_DOC: &str = r#"{"traceEvents": [
        {"ph": "X", "ts": 1.0, "dur": 2.0, "pid": 0, "name": "sen_add Cmpt Exec"},
        {"ph": "C", "ts": 1.0, "pid": 0, "name": "Power", "args": {"Watts": 40}}
    ]}"#;

    const TORCH_DOC: &str = r#"[
        {"ph": "X", "ts": 1.0, "dur": 2.0, "pid": 0, "name": "aiuLaunchSuperNode"}
    ]"#;

    #[test]
    fn test_object_and_array_documents() {
        let result = ingest(&[
            TraceSource::Buffer {
                name: "flex.json".to_string(),
                data: FLEX_DOC.to_string(),
            },
            TraceSource::Buffer {
                name: "torch.json".to_string(),
                data: TORCH_DOC.to_string(),
            },
        ])
        .unwrap();

        assert_eq!(result.events.len(), 3);
        assert_eq!(result.registry.len(), 2);

        let flex_hash = result.events[0].arg_i64("jobhash").unwrap() as u64;
        assert_eq!(result.registry.dialect_of(flex_hash), DialectKind::Flex);

        let torch_hash = result.events[2].arg_i64("jobhash").unwrap() as u64;
        assert_eq!(result.registry.dialect_of(torch_hash), DialectKind::Torch);
        assert_ne!(flex_hash, torch_hash);
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let bad = TraceSource::Buffer {
            name: "bad.json".to_string(),
            data: "{\"noTraceEvents\": []}".to_string(),
        };
        assert!(ingest(&[bad]).is_err());

        let not_json = TraceSource::Buffer {
            name: "text.json".to_string(),
            data: "hello".to_string(),
        };
        assert!(ingest(&[not_json]).is_err());
    }

    #[test]
    fn test_string_pids_are_folded_on_ingest() {
        let doc = r#"[
            {"ph": "X", "ts": 0, "pid": "worker-a", "name": "x"},
            {"ph": "X", "ts": 1, "pid": "17", "name": "y"}
        ]"#;
        let result = ingest(&[TraceSource::Buffer {
            name: "string_pids.json".to_string(),
            data: doc.to_string(),
        }])
        .unwrap();
        assert!((10000..20000).contains(&result.events[0].pid));
        assert_eq!(result.events[1].pid, 17);
    }

    #[test]
    fn test_existing_jobhash_is_kept() {
        let doc = r#"[{"ph": "X", "ts": 0, "pid": 0, "name": "x", "args": {"jobhash": 77}}]"#;
        let result = ingest(&[TraceSource::Buffer {
            name: "stamped.json".to_string(),
            data: doc.to_string(),
        }])
        .unwrap();
        assert_eq!(result.events[0].arg_i64("jobhash"), Some(77));
    }
}
