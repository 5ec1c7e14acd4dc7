//! Per-signal transition index
//!
//! Buckets keep the order the log was produced in. Parser and sampler both
//! emit in time order, so buckets are never re-sorted; feeding an
//! out-of-order log gives unspecified query results.

use crate::names::strip_bit_range;
use crate::types::{Transition, WaveformDump, UNKNOWN_VALUE};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Catalog row returned by [`TransitionIndex::list_signals`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalSummary {
    pub name: String,
    pub transition_count: usize,
}

/// One entry of a signal's bucket
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    time: u64,
    value: String,
}

/// Immutable per-signal index over a transition log
#[derive(Debug, Default)]
pub struct TransitionIndex {
    buckets: HashMap<String, Vec<Entry>>,
    /// Signal names in first-seen order
    order: Vec<String>,
}

impl TransitionIndex {
    /// Build an index from a time-ordered transition log
    pub fn from_transitions(transitions: &[Transition]) -> Self {
        let mut buckets: HashMap<String, Vec<Entry>> = HashMap::new();
        let mut order = Vec::new();
        for t in transitions {
            let bucket = buckets.entry(t.signal.clone()).or_insert_with(|| {
                order.push(t.signal.clone());
                Vec::new()
            });
            bucket.push(Entry {
                time: t.time,
                value: t.value.clone(),
            });
        }
        debug!(
            signals = order.len(),
            transitions = transitions.len(),
            "Transition index built"
        );
        Self { buckets, order }
    }

    pub fn from_dump(dump: &WaveformDump) -> Self {
        Self::from_transitions(&dump.transitions)
    }

    #[inline]
    fn bucket(&self, signal: &str) -> Option<&[Entry]> {
        self.buckets
            .get(signal)
            .or_else(|| self.buckets.get(strip_bit_range(signal)))
            .map(Vec::as_slice)
    }

    pub fn contains(&self, signal: &str) -> bool {
        self.bucket(signal).is_some()
    }

    pub fn signal_count(&self) -> usize {
        self.order.len()
    }

    /// Every indexed signal with its transition count
    pub fn list_signals(&self) -> Vec<SignalSummary> {
        self.order
            .iter()
            .map(|name| SignalSummary {
                name: name.clone(),
                transition_count: self.buckets.get(name).map_or(0, Vec::len),
            })
            .collect()
    }

    /// Transitions of `signal` with `start <= time <= end`, at most `cap` of them.
    ///
    /// Overflow is thinned by an even index stride that keeps the first and
    /// last matching transition. Unknown signals give an empty result.
    pub fn query_transitions(
        &self,
        signal: &str,
        start: u64,
        end: u64,
        cap: usize,
    ) -> Vec<Transition> {
        let Some(bucket) = self.bucket(signal) else {
            return Vec::new();
        };
        if start > end || cap == 0 {
            return Vec::new();
        }

        let lo = bucket.partition_point(|e| e.time < start);
        let hi = bucket.partition_point(|e| e.time <= end);
        let hits = &bucket[lo..hi.max(lo)];

        let name = self.canonical_name(signal);
        let to_transition = |e: &Entry| Transition::new(e.time, name, e.value.clone());

        if hits.len() <= cap {
            return hits.iter().map(to_transition).collect();
        }
        stride_indices(hits.len(), cap)
            .map(|i| to_transition(&hits[i]))
            .collect()
    }

    /// Number of transitions of `signal` in `[start, end]`, uncapped
    pub fn count_transitions(&self, signal: &str, start: u64, end: u64) -> usize {
        match self.bucket(signal) {
            Some(bucket) if start <= end => {
                let lo = bucket.partition_point(|e| e.time < start);
                let hi = bucket.partition_point(|e| e.time <= end);
                hi.saturating_sub(lo)
            }
            _ => 0,
        }
    }

    /// Value of `signal` at `time`: the last transition at or before it.
    ///
    /// Returns [`UNKNOWN_VALUE`] before the first transition or for
    /// unknown signals.
    pub fn value_at(&self, signal: &str, time: u64) -> &str {
        let Some(bucket) = self.bucket(signal) else {
            return UNKNOWN_VALUE;
        };
        match bucket.partition_point(|e| e.time <= time) {
            0 => UNKNOWN_VALUE,
            n => &bucket[n - 1].value,
        }
    }

    fn canonical_name<'a>(&'a self, signal: &'a str) -> &'a str {
        if self.buckets.contains_key(signal) {
            signal
        } else {
            strip_bit_range(signal)
        }
    }
}

/// `cap` indices spread evenly over `0..len`, first and last included.
///
/// Requires `len > cap > 0`.
fn stride_indices(len: usize, cap: usize) -> impl Iterator<Item = usize> {
    let last = len - 1;
    (0..cap).map(move |i| {
        if cap == 1 {
            0
        } else {
            i * last / (cap - 1)
        }
    })
}
