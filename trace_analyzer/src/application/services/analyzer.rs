// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Analyzer Application Service
//!
//! Orchestrates one analysis run: ingest the trace sources, read the
//! compiler logs, assemble the stage pipeline from the profile, execute
//! it into the configured exporter, flush diagnostics and the category
//! report. The domain does the work; this service owns every side
//! effect around it.

use crate::infrastructure::config::stage_profile::StageProfile;
use crate::infrastructure::export::{
    ChromeTraceExporter, DataframeExporter, TensorBoardExporter, TraceExporter,
};
use crate::infrastructure::ingest::json_trace::{ingest, TraceSource};
use crate::infrastructure::{logging, report};
use anyhow::Context;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use trace_analyzer_bootstrap::ValidatedCli;
use trace_analyzer_domain::services::{
    BandwidthStage, CategorizeStage, CategoryReport, CategoryReportSink, DeviceSink,
    EventLimits, FirmwareStage, LaunchFlowStage, NormalizeConfig, NormalizeStage, OverlapMode,
    OverlapStage, PowerStatsStage, SortStage, TbRefinementStage, UtilizationConfig,
    UtilizationStage,
};
use trace_analyzer_domain::value_objects::SortKey;
use trace_analyzer_domain::{EventPipeline, Phase};

/// Reserved tid the overlap stage recombines CPU-side events onto.
const CPU_STREAM_TID: i64 = 1000;

/// Fully resolved analyzer configuration.
pub struct AnalyzerConfig {
    pub sources: Vec<TraceSource>,
    pub output: String,
    pub soc_frequency: f64,
    pub core_frequency: f64,
    pub tb: bool,
    pub overlap: OverlapMode,
    pub event_limits: Option<EventLimits>,
    pub write_files: bool,
    pub filter: String,
    pub ignore_crit: bool,
    pub zero_align: bool,
    pub keep_names: bool,
    pub compiler_logs: Vec<PathBuf>,
    pub profile: Option<PathBuf>,
    pub shutdown: Option<Arc<AtomicBool>>,
}

impl AnalyzerConfig {
    /// Builds a configuration from validated CLI arguments.
    pub fn from_cli(
        cli: ValidatedCli,
        shutdown: Option<Arc<AtomicBool>>,
    ) -> anyhow::Result<Self> {
        let overlap = OverlapMode::parse(&cli.overlap)?;
        let event_limits = cli
            .event_limits
            .as_deref()
            .map(EventLimits::from_json)
            .transpose()?;
        Ok(AnalyzerConfig {
            sources: cli.input.iter().map(|p| TraceSource::File(p.into())).collect(),
            output: cli.output,
            soc_frequency: cli.soc_frequency,
            core_frequency: cli.core_frequency,
            tb: cli.tb,
            overlap,
            event_limits,
            write_files: !cli.disable_file,
            filter: cli.filter,
            ignore_crit: cli.ignore_crit,
            zero_align: cli.zero_align,
            keep_names: cli.keep_names,
            compiler_logs: cli.compiler_logs.iter().map(PathBuf::from).collect(),
            profile: cli.profile,
            shutdown,
        })
    }
}

/// One analysis run: ingest → pipeline → export.
pub struct Analyzer {
    config: AnalyzerConfig,
    exporter: Box<dyn TraceExporter>,
    report_sink: CategoryReportSink,
    device_sink: DeviceSink,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let exporter: Box<dyn TraceExporter> = if config.tb {
            Box::new(TensorBoardExporter::new(&config.output, config.write_files))
        } else if config.output.ends_with(".txt") {
            Box::new(DataframeExporter::new(&config.output, config.write_files))
        } else {
            Box::new(ChromeTraceExporter::new(&config.output, config.write_files))
        };
        Analyzer {
            config,
            exporter,
            report_sink: Arc::new(Mutex::new(CategoryReport::default())),
            device_sink: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn read_compiler_logs(&self) -> Vec<String> {
        let mut texts = Vec::new();
        for path in &self.config.compiler_logs {
            match fs::read_to_string(path) {
                Ok(text) => texts.push(text),
                Err(e) => {
                    tracing::warn!("UTL: Unable to open log file {}: {e}", path.display());
                }
            }
        }
        texts
    }

    fn build_pipeline(
        &self,
        registry: &Arc<trace_analyzer_domain::JobRegistry>,
        profile: &StageProfile,
        log_texts: &[String],
    ) -> anyhow::Result<EventPipeline> {
        let mut pipeline = EventPipeline::new();
        if let Some(flag) = &self.config.shutdown {
            pipeline = pipeline.with_shutdown_flag(Arc::clone(flag));
        }

        for stage in profile.stages() {
            match stage.as_str() {
                "normalize" => pipeline.add_stage(Box::new(NormalizeStage::new(
                    NormalizeConfig {
                        soc_frequency: self.config.soc_frequency,
                        ignore_crit: self.config.ignore_crit,
                        filter: self.config.filter.clone(),
                        limits: self.config.event_limits.clone(),
                    },
                    Arc::clone(registry),
                )?)),
                "categorize" => pipeline.add_stage(Box::new(CategorizeStage::new(
                    Arc::clone(registry),
                    self.config.zero_align,
                ))),
                "sort" => pipeline.add_stage(Box::new(SortStage::new(
                    Some(vec![Phase::Complete, Phase::Counter]),
                    SortKey::parse("ts")?,
                    false,
                ))),
                "overlap" => pipeline.add_stage(Box::new(OverlapStage::new(
                    self.config.overlap,
                    CPU_STREAM_TID,
                )?)),
                "launch_flow" => pipeline.add_stage(Box::new(LaunchFlowStage::new()?)),
                "firmware" => {
                    pipeline.add_stage(Box::new(FirmwareStage::new(self.config.soc_frequency)))
                }
                "utilization" => pipeline.add_stage(Box::new(UtilizationStage::new(
                    log_texts,
                    UtilizationConfig {
                        core_frequency: self.config.core_frequency,
                    },
                    Arc::clone(&self.report_sink),
                )?)),
                "bandwidth" => pipeline.add_stage(Box::new(BandwidthStage::new())),
                "power_stats" => pipeline.add_stage(Box::new(PowerStatsStage::new())),
                "tb_refinement" => {
                    if self.config.tb {
                        pipeline.add_stage(Box::new(TbRefinementStage::new(
                            Arc::clone(registry),
                            self.config.keep_names,
                            Arc::clone(&self.device_sink),
                        )));
                    }
                }
                unknown => tracing::warn!("PIPELINE: unknown stage '{unknown}' in profile"),
            }
        }
        Ok(pipeline)
    }

    /// Executes the run.
    pub fn run(&mut self) -> anyhow::Result<()> {
        let ingested = ingest(&self.config.sources)?;
        let registry = Arc::new(ingested.registry);
        tracing::info!(
            "INGEST: {} events from {} source(s)",
            ingested.events.len(),
            registry.len()
        );

        let log_texts = self.read_compiler_logs();
        let profile = match &self.config.profile {
            Some(path) => StageProfile::from_file(path)?,
            None => StageProfile::everything(),
        };

        let mut pipeline = self.build_pipeline(&registry, &profile, &log_texts)?;

        let exporter = &mut self.exporter;
        let mut export_error: Option<anyhow::Error> = None;
        let diagnostics = pipeline.run(ingested.events, &mut |event| {
            if export_error.is_none() {
                if let Err(e) = exporter.export_event(&event) {
                    export_error = Some(e);
                }
            }
        })?;
        if let Some(e) = export_error {
            return Err(e.context("exporting events"));
        }

        logging::emit_diagnostics(&diagnostics);

        let devices = self
            .device_sink
            .lock()
            .map_err(|_| anyhow::anyhow!("device sink poisoned"))?
            .clone();
        for device in &devices {
            self.exporter.add_device(device);
        }

        let category_report = self.category_report()?;
        if !category_report.rows.is_empty() && self.config.write_files {
            report::write_category_report(&category_report, &self.config.output)?;
        }

        self.exporter.flush().context("flushing exporter")?;
        Ok(())
    }

    /// Serialized exporter output (buffer mode).
    pub fn output_data(&self) -> anyhow::Result<String> {
        self.exporter.output_data()
    }

    /// The utilization roll-up of the finished run.
    pub fn category_report(&self) -> anyhow::Result<CategoryReport> {
        Ok(self
            .report_sink
            .lock()
            .map_err(|_| anyhow::anyhow!("report sink poisoned"))?
            .clone())
    }
}
