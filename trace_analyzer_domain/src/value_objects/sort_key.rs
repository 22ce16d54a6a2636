// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Composite Sort Keys
//!
//! The sort stage orders events by a comma-separated key list such as
//! `ts` or `ts,dur:r`. Each field may carry a `:r` suffix for descending
//! order. Comparison is done with an explicit per-field comparator -
//! never by numerically negating key values, which would corrupt
//! non-numeric fields.

use crate::entities::trace_event::TraceEvent;
use crate::error::AnalysisError;
use std::cmp::Ordering;

/// Sort direction of one key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A parsed composite sort key.
#[derive(Debug, Clone)]
pub struct SortKey {
    fields: Vec<(String, Direction)>,
}

impl SortKey {
    /// Parses `field[:r][,field[:r]...]`.
    pub fn parse(spec: &str) -> Result<Self, AnalysisError> {
        let invalid = |reason: &str| AnalysisError::InvalidSortKey {
            key: spec.to_string(),
            reason: reason.to_string(),
        };

        let mut fields = Vec::new();
        for part in spec.split(',') {
            let mut segments = part.split(':');
            let field = segments.next().unwrap_or("").trim();
            if field.is_empty() {
                return Err(invalid("empty field name"));
            }
            let direction = match segments.next() {
                None => Direction::Ascending,
                Some("r") => Direction::Descending,
                Some(other) => {
                    return Err(invalid(&format!("unknown direction suffix '{other}'")));
                }
            };
            if segments.next().is_some() {
                return Err(invalid("too many ':' separators"));
            }
            fields.push((field.to_string(), direction));
        }
        if fields.is_empty() {
            return Err(invalid("no fields"));
        }
        Ok(SortKey { fields })
    }

    /// Name of the primary key field.
    pub fn primary_field(&self) -> &str {
        &self.fields[0].0
    }

    /// Whether the event carries the primary key field. Missing secondary
    /// fields are treated as 0 during comparison.
    pub fn applies_to(&self, event: &TraceEvent) -> bool {
        field_value(event, self.primary_field()).is_some()
    }

    /// Lexicographic comparison over the key fields with per-field
    /// direction.
    pub fn compare(&self, a: &TraceEvent, b: &TraceEvent) -> Ordering {
        for (field, direction) in &self.fields {
            let va = field_value(a, field).unwrap_or(0.0);
            let vb = field_value(b, field).unwrap_or(0.0);
            let ordering = va.partial_cmp(&vb).unwrap_or(Ordering::Equal);
            let ordering = match direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn field_value(event: &TraceEvent, field: &str) -> Option<f64> {
    match field {
        "ts" => Some(event.ts),
        "dur" => event.dur,
        "pid" => Some(event.pid as f64),
        "tid" => Some(event.tid.as_i64() as f64),
        "id" => event.id.map(|v| v as f64),
        other => event.arg_f64(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ts: f64, dur: f64) -> TraceEvent {
        TraceEvent::complete("e", ts, dur, 0, 0)
    }

    #[test]
    fn test_parse_directions() {
        let key = SortKey::parse("ts,dur:r").unwrap();
        assert_eq!(key.primary_field(), "ts");
        assert_eq!(key.fields[1], ("dur".to_string(), Direction::Descending));

        assert!(SortKey::parse("").is_err());
        assert!(SortKey::parse("ts:x").is_err());
        assert!(SortKey::parse("ts:r:r").is_err());
    }

    #[test]
    fn test_compare_secondary_descending() {
        let key = SortKey::parse("ts,dur:r").unwrap();
        let a = event(1.0, 5.0);
        let b = event(1.0, 9.0);
        // equal primary key, longer duration first
        assert_eq!(key.compare(&a, &b), Ordering::Greater);
        assert_eq!(key.compare(&b, &a), Ordering::Less);
    }

    #[test]
    fn test_missing_secondary_field_reads_zero() {
        let key = SortKey::parse("ts,dur").unwrap();
        let mut a = event(1.0, 1.0);
        a.dur = None;
        let b = event(1.0, 1.0);
        assert_eq!(key.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_sort_is_stable_under_key() {
        let key = SortKey::parse("ts").unwrap();
        let mut events = vec![event(3.0, 0.0), event(1.0, 1.0), event(3.0, 2.0), event(0.5, 0.0)];
        events.sort_by(|a, b| key.compare(a, b));
        let ts: Vec<f64> = events.iter().map(|e| e.ts).collect();
        assert_eq!(ts, vec![0.5, 1.0, 3.0, 3.0]);
        // stable: the dur=0.0 event at ts=3.0 stays ahead of dur=2.0
        assert_eq!(events[2].dur, Some(0.0));
    }
}
