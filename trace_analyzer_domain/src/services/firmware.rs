// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Firmware Event Stage
//!
//! Events whose `args` carry `fw_begin_time`/`fw_end_time` cycles (plus
//! `TS5`) describe work the firmware performed on behalf of the host
//! event. This stage synthesizes a companion `FW_<name>` event whose end
//! aligns with the host event's end, pairs the two with a `fw2e` flow,
//! and tracks the spread between the firmware's own clock and the
//! aligned placement (`ts_diff`). A spread beyond 50 μs indicates
//! timing/alignment issues and is reported at finalize.

use crate::entities::trace_event::{Phase, TraceEvent};
use crate::error::AnalysisError;
use crate::pipeline::diagnostic::Diagnostic;
use crate::pipeline::stage::PipelineStage;

/// FW companions render on a widely separated lane of the same process.
const FW_TID_FACTOR: i64 = 10000;

/// Acceptable min/max spread of `fw_ts - ev_ts` in microseconds.
const OFFSET_WINDOW_TOLERANCE_US: f64 = 50.0;

/// The firmware-event stage (C8).
pub struct FirmwareStage {
    soc_frequency: f64,
    min_offset: f64,
    max_offset: f64,
    flow_id_seq: i64,
}

impl FirmwareStage {
    pub fn new(soc_frequency: f64) -> Self {
        FirmwareStage {
            soc_frequency,
            min_offset: f64::INFINITY,
            max_offset: f64::NEG_INFINITY,
            flow_id_seq: 0,
        }
    }

    fn is_relevant(event: &TraceEvent) -> bool {
        event.ph == Phase::Complete
            && event.args.contains_key("fw_begin_time")
            && event.args.contains_key("TS5")
    }

    fn collect_offset(&mut self, ts_diff: f64) {
        self.min_offset = self.min_offset.min(ts_diff);
        self.max_offset = self.max_offset.max(ts_diff);
    }

    fn next_flow_id(&mut self) -> i64 {
        self.flow_id_seq += 1;
        self.flow_id_seq
    }
}

impl PipelineStage for FirmwareStage {
    fn name(&self) -> &'static str {
        "firmware"
    }

    fn tag(&self) -> &'static str {
        "FW_FLOW"
    }

    fn process(&mut self, event: TraceEvent) -> Result<Vec<TraceEvent>, AnalysisError> {
        if !Self::is_relevant(&event) {
            return Ok(vec![event]);
        }
        let (Some(fw_begin), Some(fw_end)) =
            (event.arg_f64("fw_begin_time"), event.arg_f64("fw_end_time"))
        else {
            return Ok(vec![event]);
        };

        let fw_orig_ts = fw_begin / self.soc_frequency;
        let fw_dur = fw_end / self.soc_frequency - fw_orig_ts;
        let fw_ts = event.end_ts() - fw_dur;
        let ts_diff = fw_orig_ts - fw_ts;
        self.collect_offset(ts_diff);

        let flow_id = self.next_flow_id();
        let fw_tid = event.tid.as_i64() * FW_TID_FACTOR;

        let mut fw_event = TraceEvent::complete(
            &format!("FW_{}", event.name),
            fw_ts,
            fw_dur,
            event.pid,
            fw_tid,
        );
        fw_event.args = event.args.clone();
        fw_event.set_arg("ts_diff", ts_diff);

        // the host event starts first (the companion is end-aligned), so
        // the arrow runs host -> firmware to keep start <= finish
        let flow_start = TraceEvent::flow(
            Phase::FlowStart,
            event.pid,
            event.tid.as_i64(),
            "fw2e",
            Some("fw2e"),
            event.ts,
            flow_id,
        );
        let mut flow_finish = TraceEvent::flow(
            Phase::FlowFinish,
            event.pid,
            fw_tid,
            "fw2e",
            Some("fw2e"),
            fw_ts.max(event.ts),
            flow_id,
        );
        flow_finish.bp = Some("e".to_string());

        Ok(vec![event, fw_event, flow_start, flow_finish])
    }

    fn finalize(&mut self) -> Vec<Diagnostic> {
        if self.flow_id_seq == 0 {
            return Vec::new();
        }
        let window = (self.min_offset - self.max_offset).abs();
        let message = format!("min/max offset window (fw_ts - ev_ts): {window:.3}.");
        if window > OFFSET_WINDOW_TOLERANCE_US {
            vec![Diagnostic::warning(
                "FW_FLOW",
                format!("{message} May indicate timing/alignment issues of FW and Regular events."),
            )]
        } else {
            vec![Diagnostic::info("FW_FLOW", message)]
        }
    }
}
