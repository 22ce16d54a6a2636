// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Category Report Rendering
//!
//! Turns the utilization engine's [`CategoryReport`] into a CSV file and
//! an aligned text table next to the requested output path. Rendering is
//! infrastructure; the roll-up numbers come from the domain.

use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use trace_analyzer_domain::services::CategoryReport;

const COLUMNS: [&str; 10] = [
    "Pid",
    "Phase",
    "Category",
    "Kernel_Time",
    "Frac_Time",
    "Calls",
    "Ideal_Time",
    "Ideal_Cyc",
    "Frac_Ideal",
    "PT_Util",
];

/// Renders an aligned text table (right-aligned columns, single header).
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut out = String::new();
    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{header:>width$}", width = widths[i]));
    }
    out.push('\n');
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&format!("{cell:>width$}", width = widths[i]));
        }
        out.push('\n');
    }
    out
}

fn report_rows(report: &CategoryReport) -> Vec<Vec<String>> {
    report
        .rows
        .iter()
        .map(|row| {
            vec![
                row.pid.to_string(),
                row.phase.clone(),
                row.category.clone(),
                format!("{:.1}", row.kernel_time),
                format!("{:.4}", row.frac_time),
                row.calls.to_string(),
                format!("{:.1}", row.ideal_time),
                format!("{:.0}", row.ideal_cycles),
                format!("{:.4}", row.frac_ideal),
                format!("{:.4}", row.pt_util),
            ]
        })
        .collect()
}

/// Derives `<base>_categories.<ext>` from the output path.
pub fn category_file_name(output: &str, extension: &str) -> PathBuf {
    let path = Path::new(output);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "acelyzer".to_string());
    let file = format!("{stem}_categories.{extension}");
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(file),
        _ => PathBuf::from(file),
    }
}

/// Writes the roll-up as CSV and text table; returns the paths written.
pub fn write_category_report(
    report: &CategoryReport,
    output: &str,
) -> anyhow::Result<(PathBuf, PathBuf)> {
    let csv_path = category_file_name(output, "csv");
    let txt_path = category_file_name(output, "txt");

    let mut csv = COLUMNS.join(",");
    csv.push('\n');
    for row in report_rows(report) {
        csv.push_str(&row.join(","));
        csv.push('\n');
    }
    fs::write(&csv_path, csv)
        .with_context(|| format!("writing category CSV to {}", csv_path.display()))?;

    let table = render_table(&COLUMNS, &report_rows(report));
    fs::write(&txt_path, table)
        .with_context(|| format!("writing category table to {}", txt_path.display()))?;

    tracing::info!("UTL: category table(s) created as CSV: {}", csv_path.display());
    tracing::info!("UTL: category table(s) created as TXT: {}", txt_path.display());
    Ok((csv_path, txt_path))
}
