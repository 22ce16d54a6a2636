// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Classifier Stage
//!
//! Assigns an [`EventClass`] to every complete event by evaluating
//! dialect predicates in priority order - later rules override earlier
//! ones, so the compiled rule list replaces a hand-written branch
//! cascade. Collective events (those carrying `CollGroup`) get a
//! protocol sub-classification by first-match-wins name patterns.
//!
//! The stage is two-phase:
//!
//! - **Collect**: classify, stamp `args["class"]`, track the global
//!   minimum timestamp and each job's `COMPUTE_EXEC` window.
//! - **Apply** (drain): optionally zero-align timestamps, and promote
//!   `DATA_IN`/`DATA_OUT` events whose timestamp falls strictly inside
//!   their job's compute window to the direction-only
//!   `MAIU_PROTOCOL_{RECV,SEND}_DATA` classes.

use crate::entities::dialect::{dialect, Dialect};
use crate::entities::job_registry::JobRegistry;
use crate::entities::trace_event::{Phase, TraceEvent};
use crate::error::AnalysisError;
use crate::pipeline::barrier::TwoPhaseBuffer;
use crate::pipeline::diagnostic::Diagnostic;
use crate::pipeline::stage::PipelineStage;
use crate::value_objects::event_class::EventClass;
use std::collections::HashMap;
use std::sync::Arc;

/// Base classification rules, evaluated in order with overwrite
/// semantics. `Category` consults the event's dialect table; `Name` is a
/// plain substring probe.
enum BaseRule {
    Category(&'static str, EventClass),
    CategoryAny(&'static [&'static str], EventClass),
    Name(&'static str, EventClass),
}

static BASE_RULES: &[BaseRule] = &[
    BaseRule::Category("acc_rdma_prep_sync", EventClass::MaiuWireup),
    BaseRule::Category("acc_barrier", EventClass::MaiuBarrier),
    BaseRule::CategoryAny(
        &["acc_supernode_exec", "acc_supernode_launch"],
        EventClass::RoundtripFlex,
    ),
    BaseRule::Name("AIU Roundtrip", EventClass::RoundtripAiu),
];

/// Collective protocol patterns under the `Host DMA`/`HCOLL` prefix,
/// first match wins.
static HDMA_PROTOCOL_RULES: &[(&[&str], EventClass)] = &[
    (
        &[
            "Wdone DmaI",
            "Wait for Data Avail Notice",
            "Wait for Notice (gather notifications)",
            "R5 Wait DATA",
        ],
        EventClass::MaiuHdmaProtocolWaitData,
    ),
    (
        &["Wait for ACK", "R5 Wait ACK"],
        EventClass::MaiuHdmaProtocolWaitAck,
    ),
    (
        &["Send ACK Instruction", "R5 Send ACK"],
        EventClass::MaiuHdmaProtocolSignalAck,
    ),
    (
        &["Send Instruction", "HCOLL Signal", "R5 Send DATA"],
        EventClass::MaiuHdmaProtocolSignalData,
    ),
    (
        &["Wait for Notice", "Wait for Delivery Notice"],
        EventClass::MaiuHdmaProtocolMonitorNotice,
    ),
];

/// The classifier stage (C6).
pub struct CategorizeStage {
    registry: Arc<JobRegistry>,
    zero_align: bool,
    first_ts: f64,
    // per jobhash: (first, last) COMPUTE_EXEC timestamp
    job_windows: HashMap<u64, (f64, f64)>,
    barrier: TwoPhaseBuffer,
    misordered: u64,
}

impl CategorizeStage {
    pub fn new(registry: Arc<JobRegistry>, zero_align: bool) -> Self {
        CategorizeStage {
            registry,
            zero_align,
            first_ts: f64::INFINITY,
            job_windows: HashMap::new(),
            barrier: TwoPhaseBuffer::new(),
            misordered: 0,
        }
    }

    fn dialect_for(&self, event: &TraceEvent) -> &'static Dialect {
        let kind = event
            .arg_i64("jobhash")
            .map(|j| self.registry.dialect_of(j as u64))
            .unwrap_or_else(|| self.registry.dialect_of(u64::MAX));
        dialect(kind)
    }

    /// Classifies one event. Empty names are `OTHER` outright.
    pub fn classify(&self, event: &TraceEvent) -> EventClass {
        if event.name.is_empty() {
            return EventClass::Other;
        }
        let d = self.dialect_for(event);
        let name = event.name.as_str();

        let mut class = EventClass::Other;
        if d.is_category(event, "acc_compute_prep") {
            class = EventClass::ComputePrep;
        } else if d.is_category(event, "acc_kernel") {
            class = EventClass::ComputeExec;
        } else if d.is_category(event, "acc_datatransfer_HtoD") {
            // the cleanup wait rides on an inbound-DMA name
            if name.contains("Cleanup Host DMA Wait for ACK") {
                class = EventClass::MaiuHdmaProtocolWaitAck;
            } else {
                class = EventClass::DataIn;
            }
        } else if d.is_category(event, "acc_datatransfer_DtoH") {
            class = EventClass::DataOut;
        }

        if name.contains("Compute of") && !name.contains("SenFusedDeviceNode") {
            class = EventClass::SenDataConvert;
        }
        for rule in BASE_RULES {
            match rule {
                BaseRule::Category(category, result) => {
                    if d.is_category(event, category) {
                        class = *result;
                    }
                }
                BaseRule::CategoryAny(categories, result) => {
                    if categories.iter().any(|c| d.is_category(event, c)) {
                        class = *result;
                    }
                }
                BaseRule::Name(needle, result) => {
                    if name.contains(needle) {
                        class = *result;
                    }
                }
            }
        }

        if !d.is_category(event, "acc_collective") {
            return class;
        }
        self.refine_collective(name, class)
    }

    /// Protocol sub-classification for collective events.
    fn refine_collective(&self, name: &str, base: EventClass) -> EventClass {
        if name.contains("Host DMA") || name.contains("HCOLL") {
            for (needles, result) in HDMA_PROTOCOL_RULES {
                if needles.iter().any(|n| name.contains(n)) {
                    return *result;
                }
            }
            return match base {
                EventClass::DataOut => EventClass::MaiuHdmaProtocolSendData,
                EventClass::DataIn => EventClass::MaiuHdmaProtocolRecvData,
                other => other,
            };
        }
        // DLM Wait lacks the 'Host DMA' prefix; assume it waits on data
        if name.contains("DLM Wait") {
            return EventClass::MaiuHdmaProtocolWaitData;
        }
        if name.contains("Set BcList") || name.contains("Xseg to rank") {
            return EventClass::MaiuProtocolSerial;
        }
        match base {
            EventClass::DataOut => EventClass::MaiuP2prdmaProtocolSendData,
            EventClass::DataIn => EventClass::MaiuP2prdmaProtocolRecvData,
            other => other,
        }
    }

    fn collect_stats(&mut self, event: &TraceEvent, class: EventClass) {
        self.first_ts = self.first_ts.min(event.ts);
        if class == EventClass::ComputeExec {
            if let Some(jobhash) = event.arg_i64("jobhash") {
                let window = self
                    .job_windows
                    .entry(jobhash as u64)
                    .or_insert((event.ts, event.ts));
                window.0 = window.0.min(event.ts);
                window.1 = window.1.max(event.ts);
            }
        }
    }

    fn apply_stats(&mut self, event: &mut TraceEvent) {
        if self.first_ts <= event.ts {
            if self.zero_align {
                event.ts -= self.first_ts;
            }
        } else {
            self.misordered += 1;
        }

        let Some(class) = event
            .arg_str("class")
            .and_then(|c| c.parse::<EventClass>().ok())
        else {
            return;
        };
        let direction = match class {
            EventClass::DataIn => EventClass::MaiuProtocolRecvData,
            EventClass::DataOut => EventClass::MaiuProtocolSendData,
            _ => return,
        };
        let Some(jobhash) = event.arg_i64("jobhash") else {
            return;
        };
        if let Some(&(first, last)) = self.job_windows.get(&(jobhash as u64)) {
            // promotion keys off the pre-alignment window
            let ts = if self.zero_align {
                event.ts + self.first_ts
            } else {
                event.ts
            };
            if first < ts && ts < last {
                event.set_arg("class", direction.as_str());
            }
        }
    }
}

impl PipelineStage for CategorizeStage {
    fn name(&self) -> &'static str {
        "categorize"
    }

    fn tag(&self) -> &'static str {
        "CAT"
    }

    fn process(&mut self, mut event: TraceEvent) -> Result<Vec<TraceEvent>, AnalysisError> {
        if event.ph == Phase::Complete {
            let class = self.classify(&event);
            self.collect_stats(&event, class);
            event.set_arg("class", class.as_str());
        }
        self.barrier.push(event);
        Ok(Vec::new())
    }

    fn drain(&mut self) -> Result<Vec<TraceEvent>, AnalysisError> {
        let mut events = self.barrier.take();
        for event in &mut events {
            if event.ph == Phase::Complete {
                self.apply_stats(event);
            }
        }
        Ok(events)
    }

    fn finalize(&mut self) -> Vec<Diagnostic> {
        if self.misordered > 0 {
            vec![Diagnostic::error(
                "CAT",
                format!(
                    "{} events carried a ts smaller than the collected minimum; \
                     zero-align kept them unshifted",
                    self.misordered
                ),
            )]
        } else {
            Vec::new()
        }
    }
}
