//! # Waveform Transition Index - Core Library
//!
//! Extracts signal-transition histories from hardware simulation dumps and
//! serves time-bounded, size-capped slices of them.
//!
//! ## Supported Sources
//!
//! - VCD text dumps, parsed in-process
//! - FST binary dumps, converted to VCD by an external tool (`fst2vcd`)
//! - Live waveform viewers exposing a "value at time" query
//!
//! ## Features
//!
//! - Tolerant parser: truncated or hand-edited dumps never fail to parse
//! - Per-signal index with O(log n) point lookups and capped range queries
//! - Live sampler with step capping, early exit and cooperative cancellation
//! - Structured logging via `tracing` for diagnostics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wavetrace_core::{read, TransitionIndex};
//!
//! let dump = read("sim.vcd").unwrap();
//! println!("Timescale: {}", dump.metadata.timescale);
//!
//! let index = TransitionIndex::from_dump(&dump);
//! for signal in index.list_signals() {
//!     println!("{}: {} transitions", signal.name, signal.transition_count);
//! }
//! println!("clk @ 100 = {}", index.value_at("tb.clk", 100));
//! ```
//!
//! ## Sessions
//!
//! ```rust,no_run
//! use wavetrace_core::{ConverterConfig, Markers, Session};
//!
//! let mut session = Session::open("sim.fst", &ConverterConfig::default()).unwrap();
//! let window = session.window(Markers::new(Some(120), Some(80)), 0, 10_000);
//! let slice = session.transitions_in("tb.dut.state", window);
//! session.reload().unwrap();
//! ```
//!
//! ## Enabling Logging
//!
//! This library uses `tracing` for structured logging. To see log output,
//! initialize a tracing subscriber in your application:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! let dump = wavetrace_core::read("sim.vcd").unwrap();
//! ```

mod convert;
mod index;
mod names;
mod parser;
mod range;
mod sampler;
mod session;
mod summary;
mod types;

use std::path::Path;

pub use types::{
    DumpFormat,
    DumpMetadata,
    Result,
    SignalInfo,
    TimeWindow,
    Transition,
    WaveError,
    WaveformDump,
    // Constants
    DEFAULT_CONVERTER,
    DEFAULT_RANGE_CAP,
    DEFAULT_TIMESCALE,
    SCOPE_SEPARATOR,
    UNKNOWN_VALUE,
};

pub use convert::{convert_to_vcd, ConverterConfig};
pub use index::{SignalSummary, TransitionIndex};
pub use names::strip_bit_range;
pub use parser::{format_bits, parse_vcd_bytes};
pub use range::{resolve_window, Markers, WindowDefaults};
pub use sampler::{
    capped_step, sample_signals, CancelFlag, PointQuery, PointValue, SampleOutcome, SampleRequest,
    SampleValue, SamplerConfig, StopReason,
};
pub use session::{load_dump, Session, SessionSource};
pub use summary::{render_summary, SummaryOptions};

// ============================================================================
// Public API Functions
// ============================================================================

/// Read a dump file, dispatching on its extension.
///
/// `.fst` files go through the default converter; everything else is
/// parsed as VCD text.
///
/// # Example
/// ```rust,no_run
/// let dump = wavetrace_core::read("sim.vcd").unwrap();
/// println!("{} signals changed", dump.signals.len());
/// ```
pub fn read<P: AsRef<Path>>(path: P) -> Result<WaveformDump> {
    load_dump(path.as_ref(), &ConverterConfig::default())
}

/// Read a dump file with an explicit converter configuration
pub fn read_with<P: AsRef<Path>>(path: P, converter: &ConverterConfig) -> Result<WaveformDump> {
    load_dump(path.as_ref(), converter)
}

/// Parse VCD text already held in memory.
///
/// Never fails: unreadable records are skipped.
pub fn read_vcd_str(text: &str) -> WaveformDump {
    parser::parse_vcd_str(text)
}
