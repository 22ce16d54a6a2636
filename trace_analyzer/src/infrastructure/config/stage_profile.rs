// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Profiles
//!
//! Which pipeline stages run, and in which order, is external JSON
//! configuration:
//!
//! ```json
//! {"stages": [{"normalize": true}, {"categorize": true}, ...]}
//! ```
//!
//! An empty profile document means "run everything" (the embedded
//! default). [`StageProfileChecker`] supports order-preserving forward
//! lookups over the enabled stage list.

use anyhow::Context;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// The built-in profile enabling every stage.
const EVERYTHING_PROFILE: &str = include_str!("../../../profiles/everything.json");

/// Ordered list of enabled pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProfile {
    stages: Vec<String>,
}

impl StageProfile {
    /// The embedded everything profile.
    pub fn everything() -> Self {
        StageProfile::from_json(EVERYTHING_PROFILE)
            .unwrap_or_else(|e| panic!("embedded everything profile: {e}"))
    }

    /// Parses a profile document; an empty object enables everything.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let data: Value = serde_json::from_str(text).context("parsing stage profile JSON")?;
        let object = data
            .as_object()
            .context("stage profile must be a JSON object")?;
        if object.is_empty() {
            return Ok(StageProfile::everything());
        }

        let stage_list = object
            .get("stages")
            .and_then(Value::as_array)
            .context("profile data is missing 'stages' list")?;

        let mut stages = Vec::new();
        for entry in stage_list {
            let map = entry
                .as_object()
                .context("each stage entry must be a single-key object")?;
            let (name, enabled) = map
                .iter()
                .next()
                .context("each stage entry must carry one stage name")?;
            if enabled.as_bool().unwrap_or(false) {
                stages.push(name.clone());
            }
        }
        Ok(StageProfile { stages })
    }

    /// Loads a profile from a JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading stage profile {}", path.display()))?;
        StageProfile::from_json(&text)
    }

    /// Enabled stages, in execution order.
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    pub fn is_enabled(&self, stage: &str) -> bool {
        self.stages.iter().any(|s| s == stage)
    }
}

/// Order-preserving forward search over a profile.
pub struct StageProfileChecker {
    profile: StageProfile,
    reg_idx: usize,
}

impl StageProfileChecker {
    pub fn new(profile: StageProfile) -> Self {
        StageProfileChecker {
            profile,
            reg_idx: 0,
        }
    }

    /// Finds `stage` at or after the current position; on success the
    /// position advances to the match.
    pub fn fwd_find_stage(&mut self, stage: &str) -> bool {
        for (increment, candidate) in self.profile.stages[self.reg_idx..].iter().enumerate() {
            if candidate == stage {
                self.reg_idx += increment;
                return true;
            }
        }
        false
    }

    pub fn position(&self) -> usize {
        self.reg_idx
    }
}
