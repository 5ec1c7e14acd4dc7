//! Caller-owned analysis session
//!
//! A session ties one data source to its index. Nothing here is global:
//! callers may hold as many sessions as they like. Reloading builds a new
//! index and swaps the `Arc`, so anyone still holding the previous index
//! keeps a complete, unchanging view.

use crate::convert::{read_fst_impl, ConverterConfig};
use crate::index::TransitionIndex;
use crate::parser::read_vcd_impl;
use crate::range::{resolve_window, Markers, WindowDefaults};
use crate::sampler::{sample_signals, CancelFlag, PointQuery, SampleRequest, SamplerConfig, StopReason};
use crate::types::{
    DumpFormat, DumpMetadata, Result, SignalInfo, TimeWindow, Transition, WaveformDump,
    DEFAULT_RANGE_CAP,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

/// Where a session's transitions came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSource {
    File { path: PathBuf, format: DumpFormat },
    Live { uri: String },
}

/// Load a dump file, converting it first when needed
pub fn load_dump(path: &Path, converter: &ConverterConfig) -> Result<WaveformDump> {
    match DumpFormat::from_path(path) {
        DumpFormat::Vcd => read_vcd_impl(path),
        DumpFormat::Fst => read_fst_impl(path, converter),
    }
}

#[derive(Debug)]
pub struct Session {
    source: SessionSource,
    converter: ConverterConfig,
    metadata: DumpMetadata,
    signals: Vec<SignalInfo>,
    index: Arc<TransitionIndex>,
}

impl Session {
    /// Open a file-backed session
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P, converter: &ConverterConfig) -> Result<Self> {
        let path = path.as_ref();
        let dump = load_dump(path, converter)?;
        let source = SessionSource::File {
            path: path.to_path_buf(),
            format: DumpFormat::from_path(path),
        };
        let mut session = Self::from_dump(dump, source);
        session.converter = converter.clone();
        Ok(session)
    }

    /// Wrap an already parsed or sampled dump
    pub fn from_dump(dump: WaveformDump, source: SessionSource) -> Self {
        let index = Arc::new(TransitionIndex::from_dump(&dump));
        Self {
            source,
            converter: ConverterConfig::default(),
            metadata: dump.metadata,
            signals: dump.signals,
            index,
        }
    }

    /// Build a live session by sampling through `query`
    pub fn sample<Q: PointQuery + ?Sized>(
        query: &mut Q,
        request: &SampleRequest,
        config: &SamplerConfig,
        cancel: &CancelFlag,
    ) -> Result<(Self, StopReason)> {
        let outcome = sample_signals(query, request, config, cancel)?;
        let source = SessionSource::Live {
            uri: request.uri.clone(),
        };
        Ok((Self::from_dump(outcome.dump, source), outcome.stop))
    }

    /// Re-read a file-backed session and replace its index.
    ///
    /// Returns `false` for live sessions, which have nothing to re-read.
    pub fn reload(&mut self) -> Result<bool> {
        let SessionSource::File { path, .. } = &self.source else {
            return Ok(false);
        };
        let dump = load_dump(path, &self.converter)?;
        info!(
            path = %path.display(),
            transitions = dump.transitions.len(),
            "Session reloaded"
        );
        self.index = Arc::new(TransitionIndex::from_dump(&dump));
        self.metadata = dump.metadata;
        self.signals = dump.signals;
        Ok(true)
    }

    pub fn source(&self) -> &SessionSource {
        &self.source
    }

    pub fn metadata(&self) -> &DumpMetadata {
        &self.metadata
    }

    pub fn signals(&self) -> &[SignalInfo] {
        &self.signals
    }

    /// Shared handle to the current index
    pub fn index(&self) -> Arc<TransitionIndex> {
        Arc::clone(&self.index)
    }

    /// Resolve markers against this session's defaults and end time
    pub fn window(&self, markers: Markers, default_start: u64, default_end: u64) -> TimeWindow {
        let has_data = self.index.signal_count() > 0 || self.metadata.end_time > 0;
        let reported_end = has_data.then_some(self.metadata.end_time);
        resolve_window(
            markers,
            WindowDefaults {
                start: default_start,
                end: default_end,
                reported_end,
            },
        )
    }

    /// Range query with the default cap
    pub fn transitions_in(&self, signal: &str, window: TimeWindow) -> Vec<Transition> {
        self.index
            .query_transitions(signal, window.start, window.end, DEFAULT_RANGE_CAP)
    }

    pub fn value_at(&self, signal: &str, time: u64) -> String {
        self.index.value_at(signal, time).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UNKNOWN_VALUE;
    use std::io::Write;

    fn vcd_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".vcd")
            .tempfile()
            .expect("create temp file");
        file.write_all(body.as_bytes()).expect("write");
        file
    }

    const HEADER: &str = "$var wire 1 ! a $end\n$enddefinitions $end\n";

    #[test]
    fn test_reload_replaces_index_wholesale() {
        let mut file = vcd_file(&format!("{HEADER}#0\n1!\n"));
        let mut session = Session::open(file.path(), &ConverterConfig::default()).unwrap();
        let before = session.index();
        assert_eq!(before.value_at("a", 50), "1");

        file.write_all(b"#40\n0!\n").unwrap();
        assert!(session.reload().unwrap());

        // Old handle still sees the old, complete index.
        assert_eq!(before.value_at("a", 50), "1");
        assert_eq!(session.value_at("a", 50), "0");
        assert_eq!(session.metadata().end_time, 40);
        assert!(!Arc::ptr_eq(&before, &session.index()));
    }

    #[test]
    fn test_window_uses_reported_end() {
        let file = vcd_file(&format!("{HEADER}#0\n1!\n#500\n0!\n"));
        let session = Session::open(file.path(), &ConverterConfig::default()).unwrap();
        assert_eq!(
            session.window(Markers::default(), 0, 10_000),
            TimeWindow::new(0, 500)
        );
        assert_eq!(
            session.window(Markers::new(Some(120), Some(80)), 0, 10_000),
            TimeWindow::new(80, 120)
        );
    }

    #[test]
    fn test_live_session_does_not_reload() {
        let mut session = Session::from_dump(
            WaveformDump::default(),
            SessionSource::Live {
                uri: "viewer://1".into(),
            },
        );
        assert!(!session.reload().unwrap());
        assert_eq!(session.value_at("a", 0), UNKNOWN_VALUE);
        assert_eq!(
            session.window(Markers::default(), 0, 10_000),
            TimeWindow::new(0, 10_000)
        );
    }
}
