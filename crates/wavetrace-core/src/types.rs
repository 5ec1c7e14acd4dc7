//! Common types, errors, and constants for waveform dump operations

use serde::Serialize;
use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Timescale reported when a dump does not declare one
pub const DEFAULT_TIMESCALE: &str = "1ns";

/// Sentinel returned by point lookups that have no value to report
pub const UNKNOWN_VALUE: &str = "unknown";

/// Maximum entries returned by a single range query
pub const DEFAULT_RANGE_CAP: usize = 150;

/// External program used to turn FST dumps into VCD text
pub const DEFAULT_CONVERTER: &str = "fst2vcd";

/// Scope separator used when building hierarchical signal paths
pub const SCOPE_SEPARATOR: char = '.';

// ============================================================================
// Enums
// ============================================================================

/// On-disk dump format, detected from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    /// Value Change Dump, line-oriented text
    Vcd,
    /// Fast Signal Trace, binary; needs an external converter
    Fst,
}

impl DumpFormat {
    pub fn from_path(path: &std::path::Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("fst") => DumpFormat::Fst,
            _ => DumpFormat::Vcd,
        }
    }
}

impl fmt::Display for DumpFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpFormat::Vcd => write!(f, "vcd"),
            DumpFormat::Fst => write!(f, "fst"),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error type for waveform operations.
///
/// Malformed dump content is never reported here; the parser skips what it
/// cannot read. Only I/O, the external converter and the live query
/// transport surface errors.
#[derive(Debug, thiserror::Error)]
pub enum WaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("converter `{program}` not found; install it (it ships with GTKWave) or configure another converter")]
    ConverterMissing { program: String },

    #[error("conversion with `{program}` failed: {reason}")]
    ConverterFailed { program: String, reason: String },

    #[error("point query failed: {0}")]
    Query(String),
}

impl WaveError {
    /// True for the error class a caller may fix by installing a tool
    pub fn is_converter_missing(&self) -> bool {
        matches!(self, WaveError::ConverterMissing { .. })
    }
}

pub type Result<T> = std::result::Result<T, WaveError>;

// ============================================================================
// Data Structures
// ============================================================================

/// One observed change of a signal to a new distinct value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub time: u64,
    pub signal: String,
    pub value: String,
}

impl Transition {
    pub fn new(time: u64, signal: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            time,
            signal: signal.into(),
            value: value.into(),
        }
    }
}

/// Catalog entry for a signal that changed at least once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalInfo {
    pub path: String,
    pub width: u32,
}

/// Header and trailer facts gathered while parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpMetadata {
    pub end_time: u64,
    pub timescale: String,
    pub date: Option<String>,
    pub version: Option<String>,
}

impl Default for DumpMetadata {
    fn default() -> Self {
        Self {
            end_time: 0,
            timescale: DEFAULT_TIMESCALE.to_string(),
            date: None,
            version: None,
        }
    }
}

/// Parsed or sampled waveform: catalog, time-ordered log and metadata
#[derive(Debug, Clone, Default, Serialize)]
pub struct WaveformDump {
    pub signals: Vec<SignalInfo>,
    pub transitions: Vec<Transition>,
    pub metadata: DumpMetadata,
}

impl WaveformDump {
    /// Look up a cataloged signal by path
    pub fn signal(&self, path: &str) -> Option<&SignalInfo> {
        self.signals.iter().find(|s| s.path == path)
    }

    /// Transitions for one signal, in time order
    pub fn transitions_for<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Transition> {
        self.transitions.iter().filter(move |t| t.signal == path)
    }
}

/// Closed time window `[start, end]`, always with `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: u64,
    pub end: u64,
}

impl TimeWindow {
    /// Build a window from two bounds in either order
    pub fn new(a: u64, b: u64) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    #[inline]
    pub fn contains(&self, time: u64) -> bool {
        self.start <= time && time <= self.end
    }

    #[inline]
    pub fn span(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
