// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Trace Event Entity
//!
//! The wire record of the whole system: one entry of a Chrome Trace Event
//! JSON document. Every pipeline stage consumes and produces values of
//! [`TraceEvent`].
//!
//! ## Design Notes
//!
//! - **Lossless round-trip**: recognized fields are typed; everything else
//!   lands in the flattened `extra` map and is re-serialized verbatim.
//! - **Loose identifiers**: some runtimes emit string `tid`s such as
//!   `"coll1"` (collective streams). [`Tid`] keeps those intact until the
//!   TensorBoard refinement stage coerces them; numeric contexts read 0.
//!   String `pid`s are folded to integers at deserialization time.
//! - **Cycle counters**: `args["TS1".."TS5"]` arrive as hex or decimal
//!   strings; [`parse_int_prefixed`] mirrors a base-autodetecting integer
//!   parse (`0x`/`0o`/`0b` prefixes, decimal otherwise).

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Phase tag of a trace event (the `ph` field).
///
/// The closed set the pipeline interprets, plus a lossless catch-all for
/// phases that are only carried through (e.g. instant events).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Phase {
    /// `X` - complete event with a duration
    Complete,
    /// `B` - duration begin
    Begin,
    /// `E` - duration end
    End,
    /// `b` - async begin
    AsyncBegin,
    /// `e` - async end
    AsyncEnd,
    /// `(` - frame begin
    FrameBegin,
    /// `)` - frame end
    FrameEnd,
    /// `C` - counter sample
    Counter,
    /// `s` - flow start
    FlowStart,
    /// `f` - flow finish
    FlowFinish,
    /// `M` - metadata
    Metadata,
    /// Any other phase string, preserved verbatim
    Other(String),
}

impl Phase {
    /// Wire representation of the phase tag.
    pub fn as_str(&self) -> &str {
        match self {
            Phase::Complete => "X",
            Phase::Begin => "B",
            Phase::End => "E",
            Phase::AsyncBegin => "b",
            Phase::AsyncEnd => "e",
            Phase::FrameBegin => "(",
            Phase::FrameEnd => ")",
            Phase::Counter => "C",
            Phase::FlowStart => "s",
            Phase::FlowFinish => "f",
            Phase::Metadata => "M",
            Phase::Other(s) => s.as_str(),
        }
    }

    fn from_str_tag(tag: &str) -> Phase {
        match tag {
            "X" => Phase::Complete,
            "B" => Phase::Begin,
            "E" => Phase::End,
            "b" => Phase::AsyncBegin,
            "e" => Phase::AsyncEnd,
            "(" => Phase::FrameBegin,
            ")" => Phase::FrameEnd,
            "C" => Phase::Counter,
            "s" => Phase::FlowStart,
            "f" => Phase::FlowFinish,
            "M" => Phase::Metadata,
            other => Phase::Other(other.to_string()),
        }
    }
}

impl Serialize for Phase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Phase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Phase::from_str_tag(&tag))
    }
}

/// Thread identifier - integer in the common case, but collective streams
/// arrive as strings like `"coll1"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tid {
    Int(i64),
    Named(String),
}

impl Tid {
    /// Numeric view; named tids read as 0 until refinement resolves them.
    pub fn as_i64(&self) -> i64 {
        match self {
            Tid::Int(v) => *v,
            Tid::Named(_) => 0,
        }
    }

    /// Returns the name for string-valued tids.
    pub fn as_named(&self) -> Option<&str> {
        match self {
            Tid::Named(s) => Some(s.as_str()),
            Tid::Int(_) => None,
        }
    }
}

impl Default for Tid {
    fn default() -> Self {
        Tid::Int(0)
    }
}

impl From<i64> for Tid {
    fn from(v: i64) -> Self {
        Tid::Int(v)
    }
}

fn deserialize_pid<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| D::Error::custom("pid out of integer range")),
        Value::String(s) => Ok(fold_string_pid(&s)),
        Value::Null => Ok(0),
        other => Err(D::Error::custom(format!("unsupported pid value: {other}"))),
    }
}

/// Folds a string pid into the reserved 10000..20000 range unless it parses
/// as a plain integer.
///
/// Deserialization has no diagnostic channel, so the fold itself is
/// silent; ingestion inspects the raw document and reports string pids
/// before events reach the pipeline.
pub fn fold_string_pid(s: &str) -> i64 {
    s.parse::<i64>()
        .unwrap_or_else(|_| (stable_hash(s) % 10000 + 10000) as i64)
}

/// Process-stable string hash (fixed-key SipHash via `DefaultHasher::new`).
///
/// jobhashes and fingerprints depend on this being identical across two
/// runs of the same binary; a randomized hasher would break idempotence.
pub fn stable_hash(data: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    hasher.finish()
}

/// Base-autodetecting integer parse: `0x` hex, `0o` octal, `0b` binary,
/// decimal otherwise. Accepts a leading sign.
pub fn parse_int_prefixed(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let value = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(oct) = body.strip_prefix("0o").or_else(|| body.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8).ok()?
    } else if let Some(bin) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()?
    } else {
        body.parse::<i64>().ok()?
    };
    Some(if negative { -value } else { value })
}

/// A single trace event in the Chrome Trace Event format.
///
/// Recognized fields are typed; unrecognized top-level fields are preserved
/// in `extra` and serialized back untouched, so the pipeline never loses
/// information it does not interpret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Phase tag (`X`, `B`/`E`, `b`/`e`, `(`/`)`, `C`, `s`/`f`, `M`, ...).
    pub ph: Phase,

    /// Wall-clock timestamp in microseconds.
    #[serde(default)]
    pub ts: f64,

    /// Duration in microseconds; only complete (`X`) events carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dur: Option<f64>,

    /// Process id. String pids are folded into 10000 + hash mod 10000.
    #[serde(default, deserialize_with = "deserialize_pid")]
    pub pid: i64,

    /// Thread id; absent reads as 0.
    #[serde(default, skip_serializing_if = "is_default_tid")]
    pub tid: Tid,

    /// Event name.
    #[serde(default)]
    pub name: String,

    /// Event category (comma-separated list in the wire format).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cat: Option<String>,

    /// Flow/async pairing id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Flow binding point (`e` = enclosing slice).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bp: Option<String>,

    /// Nested argument map.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,

    /// Legacy argument map; normalization folds this into `args`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<Map<String, Value>>,

    /// Unrecognized top-level fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_default_tid(tid: &Tid) -> bool {
    matches!(tid, Tid::Int(0))
}

impl TraceEvent {
    /// Creates a bare event of the given phase at ts 0.
    pub fn new(ph: Phase) -> Self {
        TraceEvent {
            ph,
            ts: 0.0,
            dur: None,
            pid: 0,
            tid: Tid::default(),
            name: String::new(),
            cat: None,
            id: None,
            bp: None,
            args: Map::new(),
            attr: None,
            extra: Map::new(),
        }
    }

    /// Creates a complete (`X`) event.
    pub fn complete(name: &str, ts: f64, dur: f64, pid: i64, tid: i64) -> Self {
        let mut event = TraceEvent::new(Phase::Complete);
        event.name = name.to_string();
        event.ts = ts;
        event.dur = Some(dur);
        event.pid = pid;
        event.tid = Tid::Int(tid);
        event
    }

    /// Creates a counter (`C`) event with a single-key args map whose key
    /// names the counter unit.
    pub fn counter(name: &str, ts: f64, pid: i64, unit: &str, value: f64) -> Self {
        let mut event = TraceEvent::new(Phase::Counter);
        event.name = name.to_string();
        event.ts = ts;
        event.pid = pid;
        event.args.insert(unit.to_string(), Value::from(value));
        event
    }

    /// Creates a flow start/finish event.
    pub fn flow(
        ph: Phase,
        pid: i64,
        tid: i64,
        name: &str,
        cat: Option<&str>,
        ts: f64,
        id: i64,
    ) -> Self {
        let mut event = TraceEvent::new(ph);
        event.pid = pid;
        event.tid = Tid::Int(tid);
        event.name = name.to_string();
        event.cat = cat.map(str::to_string);
        event.ts = ts;
        event.id = Some(id);
        event
    }

    /// Creates a metadata (`M`) event.
    pub fn metadata(name: &str, pid: i64, ts: f64, args: Map<String, Value>) -> Self {
        let mut event = TraceEvent::new(Phase::Metadata);
        event.name = name.to_string();
        event.pid = pid;
        event.ts = ts;
        event.args = args;
        event
    }

    /// End timestamp; `ts + dur` for complete events, `ts` otherwise.
    pub fn end_ts(&self) -> f64 {
        self.ts + self.dur.unwrap_or(0.0)
    }

    /// Whether the event carries the hardware cycle counters.
    pub fn has_cycle_counters(&self) -> bool {
        self.args.contains_key("TS1")
    }

    /// Raw argument lookup.
    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }

    /// String view of an argument (numbers are not stringified).
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    /// Integer view of an argument, accepting JSON numbers as well as
    /// hex/decimal strings.
    pub fn arg_i64(&self, key: &str) -> Option<i64> {
        match self.args.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => parse_int_prefixed(s),
            _ => None,
        }
    }

    /// Float view of an argument, accepting numbers and numeric strings.
    pub fn arg_f64(&self, key: &str) -> Option<f64> {
        match self.args.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Inserts or replaces an argument.
    pub fn set_arg(&mut self, key: &str, value: impl Into<Value>) {
        self.args.insert(key.to_string(), value.into());
    }

    /// Resolves a dotted path against the event.
    ///
    /// The first path element may name a typed field (`name`, `cat`, `pid`,
    /// `tid`, `ts`, `dur`, `ph`, `args`) or an `extra` key; `args.<k>.<k2>`
    /// descends into the argument map.
    pub fn value_at_path(&self, path: &[&str]) -> Option<Value> {
        let (head, rest) = path.split_first()?;
        let node: Value = match *head {
            "name" => Value::from(self.name.clone()),
            "cat" => Value::from(self.cat.clone()?),
            "ph" => Value::from(self.ph.as_str()),
            "pid" => Value::from(self.pid),
            "tid" => match &self.tid {
                Tid::Int(v) => Value::from(*v),
                Tid::Named(s) => Value::from(s.clone()),
            },
            "ts" => Value::from(self.ts),
            "dur" => Value::from(self.dur?),
            "args" => Value::Object(self.args.clone()),
            other => self.extra.get(other)?.clone(),
        };
        let mut current = node;
        for key in rest {
            current = current.get(*key)?.clone();
        }
        Some(current)
    }

    /// Whether a dotted path resolves to any value.
    pub fn has_path(&self, path: &[&str]) -> bool {
        self.value_at_path(path).is_some()
    }

    /// Short single-line rendering for error contexts.
    pub fn summary(&self) -> String {
        format!(
            "{{ph: {}, name: {:?}, pid: {}, ts: {}}}",
            self.ph.as_str(),
            self.name,
            self.pid,
            self.ts
        )
    }
}
