// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # TensorBoard Refinement Stage
//!
//! Rewrites pid/tid/cat into the shape the TensorBoard trace viewer
//! expects and emits the per-process metadata events on drain.
//!
//! Two rewrite intensities:
//!
//! - **Heavy** (disabled by `--keep_names`): replaces the first
//!   `_<digits>` function index in the event name with a `_[N]` grouping
//!   marker (the original name is preserved in `args["orig_name"]`, the
//!   index digits in `args["fn_idx"]`), coerces `coll<digit>` string
//!   tids to `10000 + digit`, and spreads tids as `pid · 100000 + tid`
//!   so processes never share thread lanes.
//! - **Light** (always on): accelerator events get a viewer category and
//!   a `device` annotation and register their pid as an AIU device;
//!   host-side events move to `pid + 1000`, get `gpu_memcpy` /
//!   `user_annotation` / `cpu_op` categories, and non-FLEX tids shrink.
//!   TORCH events restore their original pid/tid from
//!   `args["opid"]`/`args["otid"]` and skip metadata generation.

use crate::entities::dialect::{dialect, Dialect, DialectKind};
use crate::entities::job_registry::JobRegistry;
use crate::entities::trace_event::{Phase, Tid, TraceEvent};
use crate::error::AnalysisError;
use crate::pipeline::stage::PipelineStage;
use crate::services::counters::COLL_BW_COUNTER_NAME;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

static NAME_INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_-]\d+").expect("regex"));

const DMA_IN: &str = "DmaI";
const DMA_OUT: &str = "DmaO";
const RDMA: &str = "Rdma";
const COLL_DATA_SIZE: &str = "Coll_data_size";
const ALL_REDUCE: &str = "AllReduce_all_reduce";

/// Device descriptor registered for every AIU pid; the exporter turns
/// these into the `deviceProperties` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub id: i64,
    pub device_type: String,
    pub name: String,
    pub core: String,
}

/// Shared device registry read by the exporter after the run.
pub type DeviceSink = Arc<Mutex<Vec<DeviceRecord>>>;

#[derive(Debug, Clone)]
struct ProcessMeta {
    name: String,
    sort_index: i64,
    label: String,
    ts: f64,
}

/// The TensorBoard refinement stage (C11).
pub struct TbRefinementStage {
    registry: Arc<JobRegistry>,
    keep_names: bool,
    processes: BTreeMap<i64, ProcessMeta>,
    meta_emitted: bool,
    has_coll_bw: bool,
    devices: DeviceSink,
}

impl TbRefinementStage {
    pub fn new(registry: Arc<JobRegistry>, keep_names: bool, devices: DeviceSink) -> Self {
        TbRefinementStage {
            registry,
            keep_names,
            processes: BTreeMap::new(),
            meta_emitted: false,
            has_coll_bw: false,
            devices,
        }
    }

    fn dialect_for(&self, event: &TraceEvent) -> &'static Dialect {
        let kind = event
            .arg_i64("jobhash")
            .map(|j| self.registry.dialect_of(j as u64))
            .unwrap_or(DialectKind::Flex);
        dialect(kind)
    }

    /// Name/tid rewriting that groups function calls regardless of index.
    ///
    /// Only the first `_<digits>` run is touched; it becomes the literal
    /// `_[N]` marker so the viewer groups calls by name.
    fn update_event_data_heavy(&mut self, event: &mut TraceEvent) {
        if let Some(first) = NAME_INDEX.find(&event.name) {
            let digits = event.name[first.start() + 1..first.end()].to_string();
            let grouped = NAME_INDEX.replace(&event.name, "_[N]").into_owned();
            event.set_arg("fn_idx", digits);
            event.set_arg("orig_name", event.name.clone());
            event.name = grouped;
        }

        if let Some(named) = event.tid.as_named() {
            if let Some(digit) = named
                .strip_prefix("coll")
                .and_then(|rest| rest.chars().next())
                .and_then(|c| c.to_digit(10))
            {
                event.tid = Tid::Int(10000 + digit as i64);
            }
        }

        // events with different pids must land on different tids
        event.tid = Tid::Int(event.pid * 100000 + event.tid.as_i64());
    }

    fn category_for_accelerator_event(&self, event: &TraceEvent) -> String {
        if event.name.contains(DMA_IN) || event.name.contains(DMA_OUT) {
            if event.name.contains(RDMA) {
                "user_annotation".to_string()
            } else {
                "gpu_memcpy".to_string()
            }
        } else if event.name.contains(ALL_REDUCE) && event.name.contains("Cmpt Exec") {
            "user_annotation".to_string()
        } else {
            self.dialect_for(event).kernel_category().to_string()
        }
    }

    fn register_process(&mut self, pid: i64, ts: f64, is_accelerator: bool) {
        if self.processes.contains_key(&pid) {
            return;
        }
        if is_accelerator {
            self.processes.insert(
                pid,
                ProcessMeta {
                    name: format!("AIU Device{pid}"),
                    sort_index: pid * 2 + 1,
                    label: "AIU".to_string(),
                    ts,
                },
            );
            if let Ok(mut devices) = self.devices.lock() {
                devices.push(DeviceRecord {
                    id: pid,
                    device_type: "AIU".to_string(),
                    name: "AIU".to_string(),
                    core: "PT Array".to_string(),
                });
            }
        } else {
            self.processes.insert(
                pid,
                ProcessMeta {
                    name: format!("Host{pid}"),
                    sort_index: pid * 2,
                    label: "cpu".to_string(),
                    ts,
                },
            );
        }
    }

    fn update_event_data_light(&mut self, event: &mut TraceEvent) {
        let d = self.dialect_for(event);
        let is_torch = d.kind() == DialectKind::Torch;

        if is_torch {
            // the bridge recorded the framework's own ids; restore them
            let opid = event.arg_i64("opid");
            let otid = event.arg_i64("otid");
            if let (Some(opid), Some(otid)) = (opid, otid) {
                event.pid = opid;
                event.tid = Tid::Int(otid);
                return;
            }
        }

        if d.is_accelerator_event(event) {
            event.cat = Some(self.category_for_accelerator_event(event));
            let device = event.arg_i64("rank").unwrap_or(event.pid);
            event.set_arg("device", device);
            self.register_process(event.pid, event.ts, true);
        } else {
            if event.args.contains_key(COLL_DATA_SIZE) && event.name.contains(ALL_REDUCE) {
                if event.cat.is_none() {
                    event.cat = Some("user_annotation".to_string());
                }
                event.name = "gloo:all_reduce".to_string();
                if let Some(fn_idx) = event.args.remove("fn_idx") {
                    event.extra.insert("external id".to_string(), fn_idx);
                }
            } else if event.cat.is_none() {
                event.cat = Some("cpu_op".to_string());
            }

            self.register_process(event.pid, event.ts, false);
            event.pid += 1000;

            // non-FLEX host events appear at the top: shrink the tid
            if d.kind() != DialectKind::Flex {
                let tid = event.tid.as_i64();
                event.tid = Tid::Int(tid / 10 + tid % 10);
            }
        }
    }

    fn metadata_events(&self) -> Vec<TraceEvent> {
        let mut events = Vec::new();
        for (pid, meta) in &self.processes {
            let mut name_args = serde_json::Map::new();
            name_args.insert("name".to_string(), serde_json::Value::from(meta.name.clone()));
            events.push(TraceEvent::metadata("process_name", *pid, meta.ts, name_args));

            let mut label_args = serde_json::Map::new();
            label_args.insert(
                "name".to_string(),
                serde_json::Value::from(meta.label.clone()),
            );
            events.push(TraceEvent::metadata(
                "process_label",
                *pid,
                meta.ts,
                label_args,
            ));

            let mut sort_args = serde_json::Map::new();
            sort_args.insert(
                "sort_index".to_string(),
                serde_json::Value::from(meta.sort_index + 10),
            );
            events.push(TraceEvent::metadata(
                "process_sort_index",
                *pid,
                meta.ts,
                sort_args,
            ));
        }

        if self.has_coll_bw {
            let mut name_args = serde_json::Map::new();
            name_args.insert(
                "name".to_string(),
                serde_json::Value::from("CollectiveBW"),
            );
            events.push(TraceEvent::metadata("process_name", -1, 0.0, name_args));

            let mut sort_args = serde_json::Map::new();
            sort_args.insert("sort_index".to_string(), serde_json::Value::from(0));
            events.push(TraceEvent::metadata("process_sort_index", -1, 0.0, sort_args));
        }
        events
    }
}

impl PipelineStage for TbRefinementStage {
    fn name(&self) -> &'static str {
        "tb_refinement"
    }

    fn tag(&self) -> &'static str {
        "TBR"
    }

    fn process(&mut self, mut event: TraceEvent) -> Result<Vec<TraceEvent>, AnalysisError> {
        if event.ph == Phase::Complete {
            if !self.keep_names {
                self.update_event_data_heavy(&mut event);
            }
            self.update_event_data_light(&mut event);
        }
        if event.ph == Phase::Counter && !self.has_coll_bw {
            self.has_coll_bw = event.name == COLL_BW_COUNTER_NAME;
        }
        Ok(vec![event])
    }

    fn drain(&mut self) -> Result<Vec<TraceEvent>, AnalysisError> {
        // metadata export is idempotent
        if self.meta_emitted {
            return Ok(Vec::new());
        }
        self.meta_emitted = true;
        Ok(self.metadata_events())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (Arc<JobRegistry>, u64) {
        let mut registry = JobRegistry::new();
        let jobhash = registry.add_job("test_frame_flex.json", DialectKind::Flex);
        (Arc::new(registry), jobhash)
    }

    fn stage() -> (TbRefinementStage, DeviceSink, u64) {
        let (registry, jobhash) = registry();
        let sink: DeviceSink = Arc::new(Mutex::new(Vec::new()));
        (
            TbRefinementStage::new(registry, false, Arc::clone(&sink)),
            sink,
            jobhash,
        )
    }

    fn acc_event(name: &str, pid: i64, tid: i64, jobhash: u64) -> TraceEvent {
        let mut event = TraceEvent::complete(name, 1.0, 1.0, pid, tid);
        event.set_arg("TS1", "12345");
        event.set_arg("jobhash", jobhash);
        event
    }

    #[test]
    fn test_heavy_groups_function_index() {
        let (mut s, _, jobhash) = stage();
        let mut event = acc_event("event_123", 1, 1, jobhash);
        s.update_event_data_heavy(&mut event);
        assert_eq!(event.name, "event_[N]");
        assert_eq!(event.arg_str("orig_name"), Some("event_123"));
        assert_eq!(event.arg_str("fn_idx"), Some("123"));
    }

    #[test]
    fn test_heavy_replaces_only_the_first_index() {
        let (mut s, _, jobhash) = stage();
        let mut event = acc_event("event_123[sync=sgroup_0_s2_321]", 1, 1, jobhash);
        s.update_event_data_heavy(&mut event);
        assert_eq!(event.name, "event_[N][sync=sgroup_0_s2_321]");
        assert_eq!(
            event.arg_str("orig_name"),
            Some("event_123[sync=sgroup_0_s2_321]")
        );
        assert_eq!(event.arg_str("fn_idx"), Some("123"));
    }

    #[test]
    fn test_heavy_requires_an_index_separator() {
        // bare digit runs carry no `_`/`-` prefix and are not indices
        let (mut s, _, jobhash) = stage();
        let mut event = acc_event("AllReduce2", 1, 1, jobhash);
        s.update_event_data_heavy(&mut event);
        assert_eq!(event.name, "AllReduce2");
        assert!(event.arg("orig_name").is_none());
        assert!(event.arg("fn_idx").is_none());
    }

    #[test]
    fn test_heavy_overwrites_existing_orig_name() {
        let (mut s, _, jobhash) = stage();
        let mut event = acc_event("event_123", 1, 1, jobhash);
        event.set_arg("orig_name", "event_321");
        s.update_event_data_heavy(&mut event);
        assert_eq!(event.arg_str("orig_name"), Some("event_123"));
    }

    #[test]
    fn test_heavy_leaves_plain_names_alone() {
        let (mut s, _, jobhash) = stage();
        let mut event = acc_event("eventname", 1, 1, jobhash);
        s.update_event_data_heavy(&mut event);
        assert_eq!(event.name, "eventname");
        assert!(event.arg("orig_name").is_none());
    }

    #[test]
    fn test_heavy_coerces_coll_tids() {
        let (mut s, _, jobhash) = stage();
        let mut event = acc_event("event_123", 1, 0, jobhash);
        event.tid = Tid::Named("coll1".to_string());
        s.update_event_data_heavy(&mut event);
        // 10000 + 1, then spread by pid
        assert_eq!(event.tid, Tid::Int(1 * 100000 + 10001));
    }

    #[test]
    fn test_heavy_spreads_tids_by_pid() {
        let (mut s, _, jobhash) = stage();
        let mut event = acc_event("eventname", 3, 7, jobhash);
        s.update_event_data_heavy(&mut event);
        assert_eq!(event.tid, Tid::Int(300007));
    }

    #[test]
    fn test_light_accelerator_event_registers_device() {
        let (mut s, sink, jobhash) = stage();
        let mut event = acc_event("sen_add Cmpt Exec", 2, 1, jobhash);
        event.set_arg("rank", 5);
        s.update_event_data_light(&mut event);

        assert_eq!(event.cat.as_deref(), Some("kernel"));
        assert_eq!(event.arg_i64("device"), Some(5));
        let devices = sink.lock().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, 2);
        assert_eq!(devices[0].core, "PT Array");
    }

    #[test]
    fn test_light_memcpy_categories() {
        let (mut s, _, jobhash) = stage();
        let mut plain = acc_event("Sen DmaI block", 2, 1, jobhash);
        s.update_event_data_light(&mut plain);
        assert_eq!(plain.cat.as_deref(), Some("gpu_memcpy"));

        let mut rdma = acc_event("Rdma DmaO block", 2, 1, jobhash);
        s.update_event_data_light(&mut rdma);
        assert_eq!(rdma.cat.as_deref(), Some("user_annotation"));
    }

    #[test]
    fn test_light_host_event_moves_pid() {
        let (mut s, _, jobhash) = stage();
        let mut event = TraceEvent::complete("ScheduleCompute", 1.0, 1.0, 2, 4);
        event.set_arg("jobhash", jobhash);
        s.update_event_data_light(&mut event);
        assert_eq!(event.pid, 1002);
        assert_eq!(event.cat.as_deref(), Some("cpu_op"));
        // FLEX host events keep their tid
        assert_eq!(event.tid, Tid::Int(4));
    }

    #[test]
    fn test_metadata_emitted_once() {
        let (mut s, _, jobhash) = stage();
        s.process(acc_event("sen_add Cmpt Exec", 2, 1, jobhash))
            .unwrap();
        let meta = s.drain().unwrap();
        let names: Vec<&str> = meta.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["process_name", "process_label", "process_sort_index"]
        );
        assert_eq!(meta[0].args.get("name"), Some(&serde_json::Value::from("AIU Device2")));
        assert_eq!(
            meta[2].args.get("sort_index"),
            Some(&serde_json::Value::from(2 * 2 + 1 + 10))
        );
        assert!(s.drain().unwrap().is_empty());
    }

    #[test]
    fn test_coll_bw_track_metadata() {
        let (mut s, _, _) = stage();
        s.process(TraceEvent::counter(COLL_BW_COUNTER_NAME, 0.0, -1, "GB/s", 1.0))
            .unwrap();
        let meta = s.drain().unwrap();
        assert!(meta
            .iter()
            .any(|e| e.pid == -1 && e.args.get("name") == Some(&serde_json::Value::from("CollectiveBW"))));
    }

    #[test]
    fn test_torch_events_restore_original_ids() {
        let mut registry = JobRegistry::new();
        let jobhash = registry.add_job("torch_trace.json", DialectKind::Torch);
        let sink: DeviceSink = Arc::new(Mutex::new(Vec::new()));
        let mut s = TbRefinementStage::new(Arc::new(registry), true, Arc::clone(&sink));

        let mut event = TraceEvent::complete("aiuLaunchSuperNode", 1.0, 1.0, 9, 9);
        event.set_arg("jobhash", jobhash);
        event.set_arg("opid", 4);
        event.set_arg("otid", 6);
        let out = s.process(event).unwrap();
        assert_eq!(out[0].pid, 4);
        assert_eq!(out[0].tid, Tid::Int(6));
        // no metadata generated for restored torch events
        assert!(s.drain().unwrap().is_empty());
    }
}
