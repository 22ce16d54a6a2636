// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Whole-analyzer end-to-end scenarios, exercised in buffer mode
//! (`write_files = false`) so no filesystem state leaks between runs.

use serde_json::Value;
use std::io::Write;
use trace_analyzer::{Analyzer, AnalyzerConfig, TraceSource};
use trace_analyzer_domain::services::{EventLimits, OverlapMode};

fn buffer(data: &str) -> TraceSource {
    TraceSource::Buffer {
        name: "e2e_trace.json".to_string(),
        data: data.to_string(),
    }
}

fn config(sources: Vec<TraceSource>) -> AnalyzerConfig {
    AnalyzerConfig {
        sources,
        output: "e2e_out.json".to_string(),
        soc_frequency: 1000.0,
        core_frequency: 1000.0,
        tb: false,
        overlap: OverlapMode::Warn,
        event_limits: None,
        write_files: false,
        filter: String::new(),
        ignore_crit: false,
        zero_align: false,
        keep_names: false,
        compiler_logs: Vec::new(),
        profile: None,
        shutdown: None,
    }
}

fn run_to_document(config: AnalyzerConfig) -> Value {
    let mut analyzer = Analyzer::new(config);
    analyzer.run().expect("analyzer run");
    serde_json::from_str(&analyzer.output_data().expect("output data")).expect("output JSON")
}

fn events_of(document: &Value) -> &Vec<Value> {
    document["traceEvents"].as_array().expect("traceEvents")
}

fn find_by_name<'a>(document: &'a Value, name: &str) -> &'a Value {
    events_of(document)
        .iter()
        .find(|e| e["name"] == name)
        .unwrap_or_else(|| panic!("no event named {name}"))
}

#[test]
fn test_output_document_shape() {
    let document = run_to_document(config(vec![buffer(
        r#"{"traceEvents": [
            {"ph": "X", "ts": 1.0, "dur": 2.0, "pid": 0, "tid": 0, "name": "probe"}
        ]}"#,
    )]));
    assert!(document.get("traceEvents").is_some());
    assert!(document.get("displayTimeUnit").is_some());
    assert!(document.get("otherData").is_some());
    assert!(document.get("deviceProperties").is_some());
}

#[test]
fn test_hex_normalization_scenario() {
    let document = run_to_document(config(vec![buffer(
        r#"{"traceEvents": [
            {"ph": "X", "ts": 0.0, "dur": 1.0, "pid": 0, "tid": 0, "name": "x",
             "args": {"TS1": "0x10", "TS2": "0x20", "TS3": "0x30",
                      "TS4": "0x40", "TS5": "0x50", "jobhash": 0}}
        ]}"#,
    )]));
    let event = find_by_name(&document, "x");
    for (key, want) in [("TS1", "16"), ("TS2", "32"), ("TS3", "48"), ("TS4", "64"), ("TS5", "80")] {
        assert_eq!(event["args"][key], want, "{key}");
    }
    assert!(event["args"].get("TSxOF").is_none());
}

#[test]
fn test_intra_event_overflow_scenario() {
    let document = run_to_document(config(vec![buffer(
        r#"{"traceEvents": [
            {"ph": "X", "ts": 0.0, "dur": 1.0, "pid": 0, "tid": 0, "name": "x",
             "args": {"TS1": "1000", "TS2": "2000", "TS3": "500",
                      "TS4": "2500", "TS5": "3000", "jobhash": 0}}
        ]}"#,
    )]));
    let event = find_by_name(&document, "x");
    assert_eq!(event["args"]["TSxOF"], "TS3");
    assert_eq!(event["args"]["TS3"], "4294967796");

    // invariant: corrected counters are monotonically non-decreasing
    let mut prev: i64 = 0;
    for key in ["TS1", "TS2", "TS3", "TS4", "TS5"] {
        let value: i64 = event["args"][key].as_str().unwrap().parse().unwrap();
        assert!(value >= prev);
        prev = value;
    }
}

#[test]
fn test_classification_scenarios() {
    let document = run_to_document(config(vec![buffer(
        r#"{"traceEvents": [
            {"ph": "X", "ts": 0.0, "dur": 1.0, "pid": 0, "tid": 0,
             "name": "Cmpt Exec add_0", "args": {"TS1": "1", "TS2": "2",
             "TS3": "3", "TS4": "4", "TS5": "5"}},
            {"ph": "X", "ts": 5.0, "dur": 1.0, "pid": 0, "tid": 0,
             "name": "HCOLL Signal data", "args": {"CollGroup": 1}}
        ]}"#,
    )]));
    assert_eq!(
        find_by_name(&document, "Cmpt Exec add_0")["args"]["class"],
        "COMPUTE_EXEC"
    );
    assert_eq!(
        find_by_name(&document, "HCOLL Signal data")["args"]["class"],
        "MAIU_HDMA_PROTOCOL_SIGNAL_DATA"
    );
}

#[test]
fn test_second_pass_data_promotion_scenario() {
    let document = run_to_document(config(vec![buffer(
        r#"{"traceEvents": [
            {"ph": "X", "ts": 10.0, "dur": 1.0, "pid": 0, "tid": 0,
             "name": "a Cmpt Exec", "args": {"TS1": "1", "TS2": "1", "TS3": "1", "TS4": "1", "TS5": "1"}},
            {"ph": "X", "ts": 20.0, "dur": 1.0, "pid": 0, "tid": 0,
             "name": "b Cmpt Exec", "args": {"TS1": "2", "TS2": "2", "TS3": "2", "TS4": "2", "TS5": "2"}},
            {"ph": "X", "ts": 30.0, "dur": 1.0, "pid": 0, "tid": 0,
             "name": "c Cmpt Exec", "args": {"TS1": "3", "TS2": "3", "TS3": "3", "TS4": "3", "TS5": "3"}},
            {"ph": "X", "ts": 15.0, "dur": 1.0, "pid": 0, "tid": 0, "name": "chunk DmaI"}
        ]}"#,
    )]));
    assert_eq!(
        find_by_name(&document, "chunk DmaI")["args"]["class"],
        "MAIU_PROTOCOL_RECV_DATA"
    );
}

#[test]
fn test_flow_synthesis_scenario() {
    let document = run_to_document(config(vec![buffer(
        r#"{"traceEvents": [
            {"ph": "s", "id": 42, "pid": 1, "tid": 1, "ts": 100.0, "name": "launch"},
            {"ph": "X", "pid": 1, "tid": 2, "ts": 200.0, "dur": 5.0,
             "name": "kern", "cat": "kernel", "args": {"correlation": 42}}
        ]}"#,
    )]));

    let finish = events_of(&document)
        .iter()
        .find(|e| e["ph"] == "f")
        .expect("flow finish");
    assert_eq!(finish["ts"], 200.0);
    assert_eq!(finish["bp"], "e");
    let finish_id = finish["id"].as_i64().unwrap();
    assert!(finish_id > 42, "fresh flow id expected");

    let start = events_of(&document)
        .iter()
        .find(|e| e["ph"] == "s" && e["id"].as_i64() == Some(finish_id))
        .expect("matching flow start");
    assert_eq!(start["ts"], 100.0);
}

#[test]
fn test_pt_active_scenario_with_compiler_log() {
    let mut log = tempfile::NamedTempFile::new().unwrap();
    write!(
        log,
        " Ideal/Total Cycles \n\
         kern-opCat-MatMul  5000\n\
         Total  5000\n\
         ====== Perf Summary End ======\n"
    )
    .unwrap();

    let mut cfg = config(vec![buffer(
        r#"{"traceEvents": [
            {"ph": "X", "ts": 0.0, "dur": 10.0, "pid": 0, "tid": 0,
             "name": "kern Cmpt Exec",
             "args": {"TS1": "1", "TS2": "2", "TS3": "3", "TS4": "4", "TS5": "5"}}
        ]}"#,
    )]);
    cfg.compiler_logs = vec![log.path().to_path_buf()];

    let mut analyzer = Analyzer::new(cfg);
    analyzer.run().unwrap();
    let document: Value = serde_json::from_str(&analyzer.output_data().unwrap()).unwrap();

    let event = find_by_name(&document, "kern Cmpt Exec");
    assert_eq!(event["args"]["pt_active"], 0.5);
    assert_eq!(event["args"]["user_cat"], "MatMul");

    let counters: Vec<&Value> = events_of(&document)
        .iter()
        .filter(|e| e["name"] == "PT Active")
        .collect();
    assert_eq!(counters.len(), 2);
    assert_eq!(counters[0]["args"]["Percent"], 50.0);
    assert_eq!(counters[1]["ts"], 10.0);

    let report = analyzer.category_report().unwrap();
    assert!(report.rows.iter().any(|r| r.category == "MatMul"));
}

#[test]
fn test_zero_align_starts_trace_at_zero() {
    let mut cfg = config(vec![buffer(
        r#"{"traceEvents": [
            {"ph": "X", "ts": 500.0, "dur": 1.0, "pid": 0, "tid": 0, "name": "a"},
            {"ph": "X", "ts": 700.0, "dur": 1.0, "pid": 0, "tid": 0, "name": "b"}
        ]}"#,
    )]);
    cfg.zero_align = true;
    let document = run_to_document(cfg);

    let ts: Vec<f64> = events_of(&document)
        .iter()
        .filter(|e| e["ph"] == "X")
        .map(|e| e["ts"].as_f64().unwrap())
        .collect();
    assert!(ts.contains(&0.0));
    assert!(ts.iter().all(|&t| t >= 0.0));
    assert!(ts.contains(&200.0));
}

#[test]
fn test_event_limits_window() {
    let mut cfg = config(vec![buffer(
        r#"{"traceEvents": [
            {"ph": "X", "ts": 1.0, "dur": 1.0, "pid": 0, "tid": 0, "name": "e0"},
            {"ph": "X", "ts": 2.0, "dur": 1.0, "pid": 0, "tid": 0, "name": "e1"},
            {"ph": "X", "ts": 3.0, "dur": 1.0, "pid": 0, "tid": 0, "name": "e2"}
        ]}"#,
    )]);
    cfg.event_limits = Some(EventLimits::from_json(r#"{"skip": 1, "count": 1}"#).unwrap());
    let document = run_to_document(cfg);

    let names: Vec<&str> = events_of(&document)
        .iter()
        .filter(|e| e["ph"] == "X")
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["e1"]);
}

#[test]
fn test_run_is_idempotent() {
    let source = r#"{"traceEvents": [
        {"ph": "X", "ts": 3.0, "dur": 2.0, "pid": 1, "tid": 1,
         "name": "sen_add Cmpt Exec",
         "args": {"TS1": "1", "TS2": "2", "TS3": "3", "TS4": "4", "TS5": "5"}},
        {"ph": "C", "ts": 1.0, "pid": 1, "name": "Power", "args": {"Watts": 40}},
        {"ph": "C", "ts": 9.0, "pid": 1, "name": "Power", "args": {"Watts": 35}}
    ]}"#;

    let first = run_to_document(config(vec![buffer(source)]));
    let second = run_to_document(config(vec![buffer(source)]));
    // wall-clock metadata may differ; the event stream must not
    assert_eq!(first["traceEvents"], second["traceEvents"]);
    assert_eq!(first["deviceProperties"], second["deviceProperties"]);
}

#[test]
fn test_tensorboard_mode_refines_events() {
    let mut cfg = config(vec![buffer(
        r#"{"traceEvents": [
            {"ph": "X", "ts": 1.0, "dur": 2.0, "pid": 2, "tid": 3,
             "name": "sen_add Cmpt Exec_7",
             "args": {"TS1": "1", "TS2": "2", "TS3": "3", "TS4": "4", "TS5": "5", "rank": 2}}
        ]}"#,
    )]);
    cfg.tb = true;
    let document = run_to_document(cfg);

    let event = events_of(&document)
        .iter()
        .find(|e| e["ph"] == "X")
        .unwrap();
    // function index replaced by the grouping marker, original preserved
    assert_eq!(event["name"], "sen_add Cmpt Exec_[N]");
    assert_eq!(event["args"]["orig_name"], "sen_add Cmpt Exec_7");
    assert_eq!(event["args"]["fn_idx"], "7");
    // tids spread per pid
    assert_eq!(event["tid"], 2 * 100000 + 3);
    assert_eq!(event["args"]["device"], 2);

    // process metadata and device descriptors emitted
    assert!(events_of(&document)
        .iter()
        .any(|e| e["ph"] == "M" && e["name"] == "process_name"));
    let devices = document["deviceProperties"].as_array().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["id"], 2);
}

#[test]
fn test_multi_epoch_gap_repaired_end_to_end() {
    // TS3 lies more than one full 2^32 epoch below TS2
    let document = run_to_document(config(vec![buffer(
        r#"{"traceEvents": [
            {"ph": "X", "ts": 0.0, "dur": 1.0, "pid": 0, "tid": 0, "name": "bad",
             "args": {"TS1": "1000", "TS2": "17179869194", "TS3": "500",
                      "TS4": "600", "TS5": "700"}}
        ]}"#,
    )]));

    let event = find_by_name(&document, "bad");
    assert_eq!(event["args"]["TSxOF"], "TS3");
    let mut prev: i64 = 0;
    for key in ["TS1", "TS2", "TS3", "TS4", "TS5"] {
        let value: i64 = event["args"][key].as_str().unwrap().parse().unwrap();
        assert!(value >= prev, "{key} regressed");
        prev = value;
    }
}
