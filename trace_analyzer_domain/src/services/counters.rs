// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bandwidth Counter Stage
//!
//! Transfer-class events reporting `memory bandwidth (GB/s)` get a
//! counter pair: the bandwidth value at `ts` and a reset to zero at
//! `ts + dur`. Collective transfers (AllReduce) land on the reserved
//! `CollectiveBW` track at pid −1 so TensorBoard shows one aggregate
//! bandwidth lane.

use crate::entities::trace_event::{Phase, TraceEvent};
use crate::error::AnalysisError;
use crate::pipeline::stage::PipelineStage;
use crate::value_objects::event_class::EventClass;

/// Argument key carrying the measured bandwidth.
pub const BANDWIDTH_ARG: &str = "memory bandwidth (GB/s)";

/// Counter name of the collective-bandwidth track (pid −1).
pub const COLL_BW_COUNTER_NAME: &str = "BW allreduce";

/// Counter name of per-process memory bandwidth.
pub const MEM_BW_COUNTER_NAME: &str = "Memory BW";

/// Counter unit (single args key).
pub const BW_COUNTER_UNIT: &str = "GB/s";

/// Reserved pid of the collective-bandwidth track.
pub const COLL_BW_PID: i64 = -1;

/// The bandwidth-counter stage (C10).
#[derive(Debug, Default)]
pub struct BandwidthStage;

impl BandwidthStage {
    pub fn new() -> Self {
        BandwidthStage
    }

    fn transfer_class(event: &TraceEvent) -> Option<EventClass> {
        let class = event.arg_str("class")?.parse::<EventClass>().ok()?;
        class.is_transfer().then_some(class)
    }
}

impl PipelineStage for BandwidthStage {
    fn name(&self) -> &'static str {
        "bandwidth"
    }

    fn tag(&self) -> &'static str {
        "BW"
    }

    fn process(&mut self, event: TraceEvent) -> Result<Vec<TraceEvent>, AnalysisError> {
        if event.ph != Phase::Complete || Self::transfer_class(&event).is_none() {
            return Ok(vec![event]);
        }
        let Some(bandwidth) = event.arg_f64(BANDWIDTH_ARG) else {
            return Ok(vec![event]);
        };
        if bandwidth <= 0.0 {
            return Ok(vec![event]);
        }

        let collective = event.name.contains("AllReduce");
        let (name, pid) = if collective {
            (COLL_BW_COUNTER_NAME, COLL_BW_PID)
        } else {
            (MEM_BW_COUNTER_NAME, event.pid)
        };

        let rise = TraceEvent::counter(name, event.ts, pid, BW_COUNTER_UNIT, bandwidth);
        let fall = TraceEvent::counter(name, event.end_ts(), pid, BW_COUNTER_UNIT, 0.0);
        Ok(vec![event, rise, fall])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_event(name: &str, class: EventClass, bandwidth: f64) -> TraceEvent {
        let mut event = TraceEvent::complete(name, 5.0, 2.0, 3, 0);
        event.set_arg("class", class.as_str());
        event.set_arg(BANDWIDTH_ARG, bandwidth);
        event
    }

    #[test]
    fn test_counter_pair_for_transfer() {
        let mut stage = BandwidthStage::new();
        let out = stage
            .process(transfer_event("DmaI chunk", EventClass::DataIn, 12.5))
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].name, MEM_BW_COUNTER_NAME);
        assert_eq!(out[1].arg_f64(BW_COUNTER_UNIT), Some(12.5));
        assert_eq!(out[1].pid, 3);
        assert_eq!(out[2].ts, 7.0);
        assert_eq!(out[2].arg_f64(BW_COUNTER_UNIT), Some(0.0));
    }

    #[test]
    fn test_collective_transfer_uses_reserved_pid() {
        let mut stage = BandwidthStage::new();
        let out = stage
            .process(transfer_event(
                "AllReduce_all_reduce DmaO",
                EventClass::MaiuProtocolSendData,
                8.0,
            ))
            .unwrap();
        assert_eq!(out[1].name, COLL_BW_COUNTER_NAME);
        assert_eq!(out[1].pid, COLL_BW_PID);
    }

    #[test]
    fn test_zero_bandwidth_is_ignored() {
        let mut stage = BandwidthStage::new();
        let out = stage
            .process(transfer_event("DmaI chunk", EventClass::DataIn, 0.0))
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_non_transfer_class_is_ignored() {
        let mut stage = BandwidthStage::new();
        let mut event = TraceEvent::complete("sen_add Cmpt Exec", 0.0, 1.0, 3, 0);
        event.set_arg("class", EventClass::ComputeExec.as_str());
        event.set_arg(BANDWIDTH_ARG, 4.0);
        let out = stage.process(event).unwrap();
        assert_eq!(out.len(), 1);
    }
}
