//! FST to VCD conversion through an external converter
//!
//! FST is a compressed binary format. Rather than decoding it in-process we
//! run a converter (GTKWave's `fst2vcd` by default) and parse its VCD output.

use crate::parser::parse_vcd_bytes;
use crate::types::{Result, WaveError, WaveformDump, DEFAULT_CONVERTER};
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, instrument, warn};

/// External converter invocation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterConfig {
    /// Program name or path; resolved through `PATH` when bare
    pub program: String,
    /// Arguments placed before the input path
    pub extra_args: Vec<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_CONVERTER.to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl ConverterConfig {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }
}

/// Run the converter on `path` and return the VCD text it writes to stdout.
///
/// The call blocks until the converter exits; there is no timeout.
#[instrument(skip(config), fields(program = %config.program, input = %path.display()))]
pub fn convert_to_vcd(path: &Path, config: &ConverterConfig) -> Result<Vec<u8>> {
    // Report a missing input as I/O rather than as a converter failure.
    std::fs::metadata(path)?;

    info!("Running dump converter");
    let output = Command::new(&config.program)
        .args(&config.extra_args)
        .arg(path)
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => WaveError::ConverterMissing {
                program: config.program.clone(),
            },
            _ => WaveError::ConverterFailed {
                program: config.program.clone(),
                reason: e.to_string(),
            },
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, "Converter exited with failure");
        return Err(WaveError::ConverterFailed {
            program: config.program.clone(),
            reason: format!("{}: {}", output.status, stderr.trim()),
        });
    }

    if output.stdout.iter().all(u8::is_ascii_whitespace) {
        warn!("Converter produced no output");
        return Err(WaveError::ConverterFailed {
            program: config.program.clone(),
            reason: "converter produced no output".to_string(),
        });
    }

    debug!(bytes = output.stdout.len(), "Conversion complete");
    Ok(output.stdout)
}

/// Convert an FST file and parse the result
pub fn read_fst_impl(path: &Path, config: &ConverterConfig) -> Result<WaveformDump> {
    let text = convert_to_vcd(path, config)?;
    let dump = parse_vcd_bytes(&text);
    info!(
        signals = dump.signals.len(),
        transitions = dump.transitions.len(),
        "Converted dump parsed"
    );
    Ok(dump)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fst_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".fst")
            .tempfile()
            .expect("create temp file");
        file.write_all(contents.as_bytes()).expect("write temp file");
        file
    }

    #[test]
    fn test_missing_converter_is_distinguished() {
        let file = fst_file("irrelevant");
        let config = ConverterConfig::with_program("wavetrace-no-such-converter-7f3a");
        let err = convert_to_vcd(file.path(), &config).unwrap_err();
        assert!(err.is_converter_missing(), "got {err:?}");
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let config = ConverterConfig::default();
        let err = convert_to_vcd(Path::new("/definitely/not/here.fst"), &config).unwrap_err();
        assert!(matches!(err, WaveError::Io(_)), "got {err:?}");
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_converter() {
        let file = fst_file("irrelevant");
        let err = convert_to_vcd(file.path(), &ConverterConfig::with_program("false")).unwrap_err();
        assert!(matches!(err, WaveError::ConverterFailed { .. }), "got {err:?}");
    }

    #[cfg(unix)]
    #[test]
    fn test_empty_output_is_failure() {
        let file = fst_file("");
        let err = convert_to_vcd(file.path(), &ConverterConfig::with_program("cat")).unwrap_err();
        assert!(matches!(err, WaveError::ConverterFailed { .. }), "got {err:?}");
    }

    #[cfg(unix)]
    #[test]
    fn test_converted_text_is_parsed() {
        // `cat` stands in for a converter that already emits VCD.
        let file = fst_file("$var wire 1 ! clk $end\n$enddefinitions $end\n#0\n0!\n#4\n1!\n");
        let dump = read_fst_impl(file.path(), &ConverterConfig::with_program("cat")).unwrap();
        assert_eq!(dump.transitions.len(), 2);
        assert_eq!(dump.metadata.end_time, 4);
    }
}
