//! Live sampling through a viewer's "value at time" interface
//!
//! When no dump file is reachable, the sampler polls an external point-query
//! interface at fixed steps and rebuilds a transition log shaped like the
//! parser's output. Polling stops early when responses stop carrying
//! information: either a run of empty responses (past the end of data) or a
//! run of unchanged values without a confirmed edge (held values padded past
//! the end of the simulation).
//!
//! The unchanged-value rule cannot tell a quiet subset of tracked signals
//! from the end of the simulation. If every tracked signal idles for
//! `unchanged_streak_limit` steps while untracked logic keeps running,
//! sampling stops early anyway.

use crate::names::strip_bit_range;
use crate::types::{
    DumpMetadata, Result, SignalInfo, TimeWindow, Transition, WaveformDump, UNKNOWN_VALUE,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, trace};

/// Nested string encodings deeper than this are taken literally
const MAX_DECODE_DEPTH: usize = 4;

// ============================================================================
// Configuration
// ============================================================================

/// Limits for one sampling run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    /// Upper bound on polls per run; the step is coarsened to respect it
    pub max_iterations: u64,
    /// Consecutive fully-empty responses that end the run
    pub empty_streak_limit: u32,
    /// Consecutive no-change, no-edge responses that end the run
    pub unchanged_streak_limit: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            empty_streak_limit: 5,
            unchanged_streak_limit: 5,
        }
    }
}

// ============================================================================
// Query boundary
// ============================================================================

/// One `{path, value}` entry as reported by the viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointValue {
    pub path: String,
    #[serde(default)]
    pub value: Value,
}

/// External point-query interface: values of `paths` at `time` in the
/// waveform identified by `uri`
pub trait PointQuery {
    fn values_at(&mut self, uri: &str, time: u64, paths: &[String]) -> Result<Vec<PointValue>>;
}

/// A reported value, decoded once at the boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleValue {
    /// Current value only
    Single(String),
    /// The value changed exactly at the queried tick
    Edge { previous: String, current: String },
}

impl SampleValue {
    /// Decode a raw reported value. `None` means the viewer had no data.
    ///
    /// Accepts a plain scalar, a `[previous, current]` array, or either of
    /// those JSON-encoded inside a string. The last array element is always
    /// the current value.
    pub fn decode(raw: &Value) -> Option<Self> {
        decode_at(raw, 0)
    }

    pub fn current(&self) -> &str {
        match self {
            SampleValue::Single(v) => v,
            SampleValue::Edge { current, .. } => current,
        }
    }

    pub fn into_current(self) -> String {
        match self {
            SampleValue::Single(v) => v,
            SampleValue::Edge { current, .. } => current,
        }
    }

    #[inline]
    pub fn is_edge(&self) -> bool {
        matches!(self, SampleValue::Edge { .. })
    }
}

fn decode_at(raw: &Value, depth: usize) -> Option<SampleValue> {
    match raw {
        Value::Null => None,
        Value::Bool(b) => Some(SampleValue::Single(b.to_string())),
        Value::Number(n) => Some(SampleValue::Single(n.to_string())),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if depth < MAX_DECODE_DEPTH && (s.starts_with('[') || s.starts_with('"')) {
                if let Ok(inner) = serde_json::from_str::<Value>(s) {
                    return decode_at(&inner, depth + 1);
                }
            }
            Some(SampleValue::Single(s.to_string()))
        }
        Value::Array(items) => {
            let (last, rest) = items.split_last()?;
            let current = decode_at(last, depth + 1)?.into_current();
            match rest.last() {
                // A pair confirms an edge even when the previous slot is empty.
                Some(prev) => Some(SampleValue::Edge {
                    previous: decode_at(prev, depth + 1)
                        .map_or_else(|| UNKNOWN_VALUE.to_string(), SampleValue::into_current),
                    current,
                }),
                None => Some(SampleValue::Single(current)),
            }
        }
        Value::Object(_) => Some(SampleValue::Single(raw.to_string())),
    }
}

/// Cooperative cancellation, checked once per sampling step
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ============================================================================
// Sampling
// ============================================================================

/// What to sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRequest {
    pub uri: String,
    pub window: TimeWindow,
    pub step: u64,
    pub signals: Vec<String>,
}

/// Why a sampling run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// Reached the end of the window
    Completed,
    /// Too many consecutive empty responses
    EndOfData,
    /// Too many consecutive unchanged responses without an edge
    HeldValue,
    /// The cancel flag was raised; results are partial
    Cancelled,
}

/// Result of a sampling run
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub dump: WaveformDump,
    pub stop: StopReason,
    pub iterations: u64,
    /// Step actually used after coarsening
    pub step: u64,
}

/// Step that keeps the number of polls over `span` within `max_iterations`
pub fn capped_step(span: u64, step: u64, max_iterations: u64) -> u64 {
    let step = step.max(1);
    let max_gaps = max_iterations.saturating_sub(1).max(1);
    if span / step > max_gaps {
        span.div_ceil(max_gaps)
    } else {
        step
    }
}

/// Bit string length for `0/1/x/z` values, else 1
fn infer_width(value: &str) -> u32 {
    let is_bits = value
        .bytes()
        .all(|b| matches!(b, b'0' | b'1' | b'x' | b'X' | b'z' | b'Z'));
    if is_bits && !value.is_empty() {
        value.len() as u32
    } else {
        1
    }
}

/// Normalized, de-duplicated signal paths in request order
fn query_paths(signals: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    signals
        .iter()
        .map(|s| strip_bit_range(s).to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

/// Poll `query` across the request window and collect transitions.
///
/// Empty responses are never errors; only a failing transport is.
/// Cancellation returns everything gathered so far.
#[instrument(skip_all, fields(uri = %request.uri, window = %request.window))]
pub fn sample_signals<Q: PointQuery + ?Sized>(
    query: &mut Q,
    request: &SampleRequest,
    config: &SamplerConfig,
    cancel: &CancelFlag,
) -> Result<SampleOutcome> {
    let TimeWindow { start, end } = request.window;
    let paths = query_paths(&request.signals);
    let step = capped_step(request.window.span(), request.step, config.max_iterations);
    if step != request.step.max(1) {
        debug!(requested = request.step, used = step, "Sampling step coarsened");
    }

    let mut last_values: HashMap<String, String> = HashMap::new();
    let mut signals: Vec<SignalInfo> = Vec::new();
    let mut transitions: Vec<Transition> = Vec::new();
    let mut empty_streak = 0u32;
    let mut unchanged_streak = 0u32;
    let mut informative_seen = false;
    let mut last_data_time = start;
    let mut iterations = 0u64;

    if paths.is_empty() {
        return Ok(SampleOutcome {
            dump: WaveformDump::default(),
            stop: StopReason::Completed,
            iterations,
            step,
        });
    }

    info!(signals = paths.len(), step, "Live sampling started");

    let mut time = start;
    let stop = loop {
        if cancel.is_cancelled() {
            break StopReason::Cancelled;
        }
        iterations += 1;

        let samples: Vec<(String, SampleValue)> = query
            .values_at(&request.uri, time, &paths)?
            .into_iter()
            .filter_map(|p| {
                SampleValue::decode(&p.value).map(|v| (strip_bit_range(&p.path).to_string(), v))
            })
            .collect();

        if samples.is_empty() {
            empty_streak += 1;
            trace!(time, empty_streak, "Empty sample");
            if empty_streak >= config.empty_streak_limit {
                break StopReason::EndOfData;
            }
        } else {
            empty_streak = 0;
            last_data_time = time;

            let mut changed = false;
            let mut edge = false;
            for (path, value) in samples {
                edge |= value.is_edge();
                let current = value.into_current();
                if last_values.get(&path) == Some(&current) {
                    continue;
                }
                if !last_values.contains_key(&path) {
                    signals.push(SignalInfo {
                        path: path.clone(),
                        width: infer_width(&current),
                    });
                }
                transitions.push(Transition::new(time, path.clone(), current.clone()));
                last_values.insert(path, current);
                changed = true;
            }

            if changed || edge {
                unchanged_streak = 0;
            } else if informative_seen {
                unchanged_streak += 1;
                trace!(time, unchanged_streak, "Unchanged sample");
                if unchanged_streak >= config.unchanged_streak_limit {
                    break StopReason::HeldValue;
                }
            }
            informative_seen = true;
        }

        match time.checked_add(step) {
            Some(next) if next <= end => time = next,
            _ => break StopReason::Completed,
        }
    };

    info!(
        ?stop,
        iterations,
        transitions = transitions.len(),
        "Live sampling finished"
    );

    Ok(SampleOutcome {
        dump: WaveformDump {
            signals,
            transitions,
            metadata: DumpMetadata {
                end_time: last_data_time,
                ..DumpMetadata::default()
            },
        },
        stop,
        iterations,
        step,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WaveError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Viewer stand-in answering every path with the same scripted value
    struct Scripted<F: FnMut(u64) -> Option<Value>> {
        respond: F,
        calls: Vec<u64>,
        last_paths: Vec<String>,
    }

    impl<F: FnMut(u64) -> Option<Value>> Scripted<F> {
        fn new(respond: F) -> Self {
            Self {
                respond,
                calls: Vec::new(),
                last_paths: Vec::new(),
            }
        }
    }

    impl<F: FnMut(u64) -> Option<Value>> PointQuery for Scripted<F> {
        fn values_at(&mut self, _uri: &str, time: u64, paths: &[String]) -> Result<Vec<PointValue>> {
            self.calls.push(time);
            self.last_paths = paths.to_vec();
            Ok(match (self.respond)(time) {
                Some(value) => paths
                    .iter()
                    .map(|p| PointValue {
                        path: p.clone(),
                        value: value.clone(),
                    })
                    .collect(),
                None => Vec::new(),
            })
        }
    }

    fn request(start: u64, end: u64, step: u64) -> SampleRequest {
        SampleRequest {
            uri: "file:///sim.vcd".into(),
            window: TimeWindow::new(start, end),
            step,
            signals: vec!["tb.count[3:0]".into()],
        }
    }

    #[test]
    fn test_decode_variants() {
        assert_eq!(SampleValue::decode(&json!(null)), None);
        assert_eq!(SampleValue::decode(&json!("")), None);
        assert_eq!(SampleValue::decode(&json!([])), None);
        assert_eq!(
            SampleValue::decode(&json!("1010")),
            Some(SampleValue::Single("1010".into()))
        );
        assert_eq!(
            SampleValue::decode(&json!(7)),
            Some(SampleValue::Single("7".into()))
        );
        assert_eq!(
            SampleValue::decode(&json!(["0", "1"])),
            Some(SampleValue::Edge {
                previous: "0".into(),
                current: "1".into()
            })
        );
        assert_eq!(
            SampleValue::decode(&json!("[\"x\",\"0\"]")).map(|v| v.current().to_string()),
            Some("0".to_string())
        );
        // JSON string holding a JSON-encoded pair
        let nested = json!("\"[\\\"1\\\",\\\"0\\\"]\"");
        assert!(SampleValue::decode(&nested).is_some_and(|v| v.is_edge() && v.current() == "0"));
        assert_eq!(
            SampleValue::decode(&json!("[3:0]")),
            Some(SampleValue::Single("[3:0]".into()))
        );
    }

    #[test]
    fn test_decode_pair_with_empty_slot() {
        // Empty current slot means no data at this tick, not the old value.
        assert_eq!(SampleValue::decode(&json!(["0", null])), None);
        assert_eq!(SampleValue::decode(&json!(["0", ""])), None);
        assert_eq!(
            SampleValue::decode(&json!([null, "1"])),
            Some(SampleValue::Edge {
                previous: UNKNOWN_VALUE.into(),
                current: "1".into()
            })
        );
        assert_eq!(
            SampleValue::decode(&json!(["x", "z", "1"])),
            Some(SampleValue::Edge {
                previous: "z".into(),
                current: "1".into()
            })
        );
    }

    #[test]
    fn test_capped_step() {
        assert_eq!(capped_step(100, 10, 2000), 10);
        assert_eq!(capped_step(100, 0, 2000), 1);
        let step = capped_step(1_000_000, 1, 2000);
        assert!(1_000_000 / step + 1 <= 2000);
    }

    #[test]
    fn test_wide_range_is_coarsened() {
        let mut viewer = Scripted::new(|t| Some(json!(t.to_string())));
        let outcome = sample_signals(
            &mut viewer,
            &request(0, 10_000_000, 1),
            &SamplerConfig::default(),
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(outcome.stop, StopReason::Completed);
        assert!(outcome.step > 1);
        assert!(viewer.calls.len() as u64 <= SamplerConfig::default().max_iterations);
        assert_eq!(outcome.iterations, viewer.calls.len() as u64);
    }

    #[test]
    fn test_empty_streak_stops_early() {
        let mut viewer = Scripted::new(|t| (t < 30).then(|| json!(t.to_string())));
        let outcome = sample_signals(
            &mut viewer,
            &request(0, 10_000, 10),
            &SamplerConfig::default(),
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(outcome.stop, StopReason::EndOfData);
        assert_eq!(viewer.calls, vec![0, 10, 20, 30, 40, 50, 60, 70]);
        assert_eq!(outcome.dump.transitions.len(), 3);
        assert_eq!(outcome.dump.metadata.end_time, 20);
    }

    #[test]
    fn test_unchanged_streak_stops_early() {
        let mut viewer = Scripted::new(|t| Some(json!((t.min(50) / 10).to_string())));
        let outcome = sample_signals(
            &mut viewer,
            &request(0, 10_000, 10),
            &SamplerConfig::default(),
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(outcome.stop, StopReason::HeldValue);
        assert_eq!(viewer.calls.last(), Some(&100));
        let times: Vec<u64> = outcome.dump.transitions.iter().map(|t| t.time).collect();
        assert_eq!(times, vec![0, 10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_confirmed_edges_keep_sampling() {
        // Step aligned with clock edges: value looks constant, but each
        // response is an edge pair.
        let mut viewer = Scripted::new(|t| (t <= 100).then(|| json!(["0", "1"])));
        let outcome = sample_signals(
            &mut viewer,
            &request(0, 1_000, 10),
            &SamplerConfig::default(),
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(outcome.stop, StopReason::EndOfData);
        assert_eq!(
            outcome.dump.transitions,
            vec![Transition::new(0, "tb.count", "1")]
        );
        assert_eq!(viewer.calls.last(), Some(&150));
    }

    #[test]
    fn test_cancellation_keeps_partial_results() {
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        let mut viewer = Scripted::new(move |t| {
            if t == 30 {
                trigger.cancel();
            }
            Some(json!(t.to_string()))
        });
        let outcome =
            sample_signals(&mut viewer, &request(0, 1_000, 10), &SamplerConfig::default(), &cancel)
                .unwrap();
        assert_eq!(outcome.stop, StopReason::Cancelled);
        assert_eq!(outcome.dump.transitions.len(), 4);
        assert_eq!(outcome.iterations, 4);
    }

    #[test]
    fn test_paths_are_normalized_before_querying() {
        let mut viewer = Scripted::new(|_| Some(json!("1010")));
        let mut req = request(0, 0, 1);
        req.signals.push("tb.count".into());
        let outcome =
            sample_signals(&mut viewer, &req, &SamplerConfig::default(), &CancelFlag::new()).unwrap();
        assert_eq!(viewer.last_paths, vec!["tb.count".to_string()]);
        assert_eq!(
            outcome.dump.signals,
            vec![SignalInfo {
                path: "tb.count".into(),
                width: 4
            }]
        );
    }

    #[test]
    fn test_transport_failure_propagates() {
        struct Broken;
        impl PointQuery for Broken {
            fn values_at(&mut self, _: &str, _: u64, _: &[String]) -> Result<Vec<PointValue>> {
                Err(WaveError::Query("connection refused".into()))
            }
        }
        let err = sample_signals(
            &mut Broken,
            &request(0, 100, 10),
            &SamplerConfig::default(),
            &CancelFlag::new(),
        )
        .unwrap_err();
        assert!(matches!(err, WaveError::Query(_)));
    }
}
