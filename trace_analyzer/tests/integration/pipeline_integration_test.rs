// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Multi-stage pipeline integration: stages composed the way the
//! analyzer composes them, without the file-backed outer shell.

use std::sync::{Arc, Mutex};
use trace_analyzer::infrastructure::export::{ChromeTraceExporter, TraceExporter};
use trace_analyzer::infrastructure::ingest::{ingest, TraceSource};
use trace_analyzer_domain::services::{
    BandwidthStage, CategorizeStage, CategoryReport, NormalizeConfig, NormalizeStage, SortStage,
    UtilizationConfig, UtilizationStage,
};
use trace_analyzer_domain::value_objects::SortKey;
use trace_analyzer_domain::{EventPipeline, Phase, TraceEvent};

const COMPILER_LOG: &str = "\
 Ideal/Total Cycles \n\
sen_add-opCat-Add  5000\n\
Total  5000\n\
====== Perf Summary End ======\n";

fn flex_buffer(events: &str) -> TraceSource {
    TraceSource::Buffer {
        name: "flex_trace.json".to_string(),
        data: format!("{{\"traceEvents\": {events}}}"),
    }
}

fn run_pipeline(pipeline: &mut EventPipeline, events: Vec<TraceEvent>) -> Vec<TraceEvent> {
    let mut out = Vec::new();
    pipeline
        .run(events, &mut |event| out.push(event))
        .expect("pipeline run");
    out
}

#[test]
fn test_normalize_categorize_sort_chain() {
    let ingested = ingest(&[flex_buffer(
        r#"[
            {"ph": "X", "ts": 30.0, "dur": 5.0, "pid": 1, "tid": 1,
             "name": "sen_add Cmpt Exec",
             "args": {"TS1": "0x10", "TS2": "0x20", "TS3": "0x30", "TS4": "0x40", "TS5": "0x50"}},
            {"ph": "X", "ts": 10.0, "dur": 5.0, "pid": 1, "tid": 1, "name": "ScheduleCompute"}
        ]"#,
    )])
    .unwrap();
    let registry = Arc::new(ingested.registry);

    let mut pipeline = EventPipeline::new();
    pipeline.add_stage(Box::new(
        NormalizeStage::new(
            NormalizeConfig {
                soc_frequency: 1000.0,
                ignore_crit: false,
                filter: String::new(),
                limits: None,
            },
            Arc::clone(&registry),
        )
        .unwrap(),
    ));
    pipeline.add_stage(Box::new(CategorizeStage::new(Arc::clone(&registry), false)));
    pipeline.add_stage(Box::new(SortStage::new(
        Some(vec![Phase::Complete]),
        SortKey::parse("ts").unwrap(),
        false,
    )));

    let out = run_pipeline(&mut pipeline, ingested.events);
    assert_eq!(out.len(), 2);
    // sorted by ts within the (1,1) queue
    assert_eq!(out[0].name, "ScheduleCompute");
    assert_eq!(out[0].arg_str("class"), Some("OTHER"));
    assert_eq!(out[1].arg_str("class"), Some("COMPUTE_EXEC"));
    // hex counters decimal after normalization
    assert_eq!(out[1].arg_str("TS1"), Some("16"));
    assert_eq!(out[1].arg_i64("OVC"), Some(0));
}

#[test]
fn test_utilization_and_bandwidth_stage_chain() {
    let ingested = ingest(&[flex_buffer(
        r#"[
            {"ph": "X", "ts": 0.0, "dur": 10.0, "pid": 1, "tid": 1,
             "name": "sen_add Cmpt Exec",
             "args": {"TS1": "1", "TS2": "2", "TS3": "3", "TS4": "4", "TS5": "5"}},
            {"ph": "X", "ts": 20.0, "dur": 2.0, "pid": 1, "tid": 1,
             "name": "Sen DmaI pull",
             "args": {"memory bandwidth (GB/s)": 9.0}}
        ]"#,
    )])
    .unwrap();
    let registry = Arc::new(ingested.registry);
    let sink = Arc::new(Mutex::new(CategoryReport::default()));

    let mut pipeline = EventPipeline::new();
    pipeline.add_stage(Box::new(CategorizeStage::new(Arc::clone(&registry), false)));
    pipeline.add_stage(Box::new(
        UtilizationStage::new(
            &[COMPILER_LOG.to_string()],
            UtilizationConfig {
                core_frequency: 1000.0,
            },
            Arc::clone(&sink),
        )
        .unwrap(),
    ));
    pipeline.add_stage(Box::new(BandwidthStage::new()));

    let out = run_pipeline(&mut pipeline, ingested.events);

    // compute event annotated, counter pair follows it
    let exec = out.iter().find(|e| e.name.contains("Cmpt Exec")).unwrap();
    assert_eq!(exec.arg_f64("pt_active"), Some(0.5));
    let pt_counters: Vec<&TraceEvent> = out.iter().filter(|e| e.name == "PT Active").collect();
    assert_eq!(pt_counters.len(), 2);

    // transfer event produced a bandwidth pair
    let bw_counters: Vec<&TraceEvent> = out.iter().filter(|e| e.name == "Memory BW").collect();
    assert_eq!(bw_counters.len(), 2);
    assert_eq!(bw_counters[0].arg_f64("GB/s"), Some(9.0));

    // category roll-up reached the shared sink at finalize
    let report = sink.lock().unwrap();
    assert!(report.rows.iter().any(|r| r.category == "Add"));
}

#[test]
fn test_exporter_round_trip_preserves_events() {
    let ingested = ingest(&[flex_buffer(
        r#"[{"ph": "X", "ts": 7.5, "dur": 1.5, "pid": 3, "tid": 2, "name": "keepme"}]"#,
    )])
    .unwrap();

    let mut exporter = ChromeTraceExporter::new("unused.json", false);
    for event in &ingested.events {
        exporter.export_event(event).unwrap();
    }
    let document: serde_json::Value =
        serde_json::from_str(&exporter.output_data().unwrap()).unwrap();

    let round_tripped: Vec<TraceEvent> =
        serde_json::from_value(document["traceEvents"].clone()).unwrap();
    assert_eq!(round_tripped.len(), 1);
    assert_eq!(round_tripped[0].name, "keepme");
    assert_eq!(round_tripped[0].ts, 7.5);
    assert_eq!(round_tripped[0].dur, Some(1.5));
    assert_eq!(round_tripped[0].pid, 3);
}
