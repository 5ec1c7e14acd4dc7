//! VCD text dump parser
//!
//! Turns a value change dump into a time-ordered transition log, a catalog
//! of signals that actually changed, and end-time/timescale metadata.
//! Parsing never fails on content: truncated or hand-edited dumps yield
//! whatever could be read, and unreadable records are skipped.

use crate::names::join_path;
use crate::types::*;
use memmap2::Mmap;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;
use std::str::SplitWhitespace;
use tracing::{debug, info, instrument, trace};

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

// ============================================================================
// Value formatting
// ============================================================================

/// Left-extend a bit string to the declared width.
///
/// Values starting with `x` extend with `x`, everything else with `0`.
fn pad_bits(raw: &str, width: u32) -> String {
    let width = width as usize;
    if raw.len() >= width {
        return raw.to_string();
    }
    let fill = match raw.as_bytes().first() {
        Some(b'x' | b'X') => 'x',
        _ => '0',
    };
    let mut padded = String::with_capacity(width);
    padded.extend(std::iter::repeat(fill).take(width - raw.len()));
    padded.push_str(raw);
    padded
}

/// Convert a pure `0`/`1` string to upper-case hex without leading zeros
fn bits_to_hex(bits: &str) -> String {
    let bytes = bits.as_bytes();
    let mut digits = Vec::with_capacity(bytes.len() / 4 + 1);
    let mut end = bytes.len();
    while end > 0 {
        let start = end.saturating_sub(4);
        let nibble = bytes[start..end]
            .iter()
            .fold(0usize, |acc, &b| (acc << 1) | usize::from(b == b'1'));
        digits.push(HEX_DIGITS[nibble]);
        end = start;
    }
    while digits.len() > 1 && digits.last() == Some(&b'0') {
        digits.pop();
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Format a scalar or vector value the way it is stored in the log.
///
/// Multi-bit values made only of `0`/`1` get a hex annotation, e.g.
/// `1010 (0xA)`. Everything else is kept as the padded bit string.
pub fn format_bits(raw: &str, width: u32) -> String {
    let padded = pad_bits(raw, width);
    let is_binary = padded.bytes().all(|b| b == b'0' || b == b'1');
    if width > 1 && is_binary {
        let hex = bits_to_hex(&padded);
        format!("{} (0x{})", padded, hex)
    } else {
        padded
    }
}

// ============================================================================
// Header parsing
// ============================================================================

/// Header directive whose arguments are being collected up to `$end`
#[derive(Debug, Clone, Copy, PartialEq)]
enum Directive {
    Scope,
    Upscope,
    Var,
    Timescale,
    Date,
    Version,
    EndDefinitions,
    Skip,
}

impl Directive {
    fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "$scope" => Directive::Scope,
            "$upscope" => Directive::Upscope,
            "$var" => Directive::Var,
            "$timescale" => Directive::Timescale,
            "$date" => Directive::Date,
            "$version" => Directive::Version,
            "$enddefinitions" => Directive::EndDefinitions,
            _ => Directive::Skip,
        }
    }
}

/// Declared variable, keyed by its identifier code
#[derive(Debug, Clone)]
struct VarDecl {
    path: String,
    width: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Header,
    Data,
}

// ============================================================================
// Parser state
// ============================================================================

struct DumpParser {
    phase: Phase,
    /// Header directive collected across tokens/lines until `$end`
    pending: Option<(Directive, Vec<String>)>,
    /// Inside a data-phase block (e.g. `$comment`) skipped to `$end`
    skipping_block: bool,
    scopes: Vec<String>,
    /// Identifier code -> index into `decls`
    codes: HashMap<String, usize>,
    decls: Vec<VarDecl>,
    last_values: HashMap<String, String>,
    transitions: Vec<Transition>,
    current_time: u64,
    metadata: DumpMetadata,
    skipped: usize,
}

impl DumpParser {
    fn new() -> Self {
        Self {
            phase: Phase::Header,
            pending: None,
            skipping_block: false,
            scopes: Vec::new(),
            codes: HashMap::new(),
            decls: Vec::new(),
            last_values: HashMap::new(),
            transitions: Vec::new(),
            current_time: 0,
            metadata: DumpMetadata::default(),
            skipped: 0,
        }
    }

    fn feed_line(&mut self, line: &str) {
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            match self.phase {
                Phase::Header => self.header_token(token, &mut tokens),
                Phase::Data => self.data_token(token, &mut tokens),
            }
        }
    }

    fn header_token(&mut self, token: &str, rest: &mut SplitWhitespace<'_>) {
        if let Some((directive, args)) = self.pending.as_mut() {
            if token == "$end" {
                let directive = *directive;
                let args = std::mem::take(args);
                self.pending = None;
                self.apply_directive(directive, args);
            } else {
                args.push(token.to_string());
            }
            return;
        }

        if token == "$end" {
            self.skip(token);
        } else if token.starts_with('$') {
            self.pending = Some((Directive::from_keyword(token), Vec::new()));
        } else if is_timestamp(token) {
            // No $enddefinitions: the first timestamp starts the data.
            debug!("Header ended without $enddefinitions");
            self.phase = Phase::Data;
            self.data_token(token, rest);
        } else {
            self.skip(token);
        }
    }

    fn apply_directive(&mut self, directive: Directive, args: Vec<String>) {
        match directive {
            Directive::Scope => {
                if let Some(name) = args.last() {
                    self.scopes.push(name.clone());
                }
            }
            Directive::Upscope => {
                self.scopes.pop();
            }
            Directive::Var => self.declare_var(&args),
            Directive::Timescale => {
                let unit = args.concat();
                if !unit.is_empty() {
                    self.metadata.timescale = unit;
                }
            }
            Directive::Date => self.metadata.date = join_text(&args),
            Directive::Version => self.metadata.version = join_text(&args),
            Directive::EndDefinitions => {
                debug!(
                    declarations = self.decls.len(),
                    timescale = %self.metadata.timescale,
                    "Header parsed"
                );
                self.phase = Phase::Data;
            }
            Directive::Skip => {}
        }
    }

    /// `$var <type> <width> <code> <name> [range] $end`
    fn declare_var(&mut self, args: &[String]) {
        if args.len() < 4 {
            self.skip("$var");
            return;
        }
        let Ok(width) = args[1].parse::<u32>() else {
            self.skip("$var");
            return;
        };
        let code = args[2].clone();
        let name = args[3..].concat();
        let decl = VarDecl {
            path: join_path(&self.scopes, &name),
            width,
        };
        trace!(code = %code, path = %decl.path, width, "Declared variable");

        // A reused identifier code takes the later declaration.
        match self.codes.get(&code) {
            Some(&idx) => self.decls[idx] = decl,
            None => {
                self.codes.insert(code, self.decls.len());
                self.decls.push(decl);
            }
        }
    }

    // ========================================================================
    // Data phase
    // ========================================================================

    fn data_token(&mut self, token: &str, rest: &mut SplitWhitespace<'_>) {
        if self.skipping_block {
            if token == "$end" {
                self.skipping_block = false;
            }
            return;
        }

        match token.as_bytes()[0] {
            b'#' => match token[1..].parse::<u64>() {
                Ok(time) => self.advance_time(time),
                Err(_) => self.skip(token),
            },
            b'$' => match token {
                // Bulk-dump wrappers: their records are processed as usual.
                "$dumpvars" | "$dumpall" | "$dumpon" | "$dumpoff" | "$end" => {}
                _ => self.skipping_block = true,
            },
            b'b' | b'B' => match rest.next() {
                Some(code) if token.len() > 1 => self.record_bits(&token[1..], code),
                _ => self.skip(token),
            },
            b'r' | b'R' | b's' | b'S' => match rest.next() {
                Some(code) if token.len() > 1 => self.record_opaque(&token[1..], code),
                _ => self.skip(token),
            },
            b'0' | b'1' | b'x' | b'X' | b'z' | b'Z' if token.len() > 1 => {
                self.record_bits(&token[..1], &token[1..]);
            }
            _ => self.skip(token),
        }
    }

    fn advance_time(&mut self, time: u64) {
        // Watermark never moves backwards, keeping the log time-ordered.
        self.current_time = self.current_time.max(time);
    }

    fn record_bits(&mut self, raw: &str, code: &str) {
        let Some(&idx) = self.codes.get(code) else {
            self.skip(code);
            return;
        };
        let value = format_bits(raw, self.decls[idx].width);
        self.record(idx, value);
    }

    fn record_opaque(&mut self, raw: &str, code: &str) {
        let Some(&idx) = self.codes.get(code) else {
            self.skip(code);
            return;
        };
        self.record(idx, raw.to_string());
    }

    fn record(&mut self, idx: usize, value: String) {
        let path = &self.decls[idx].path;
        if self.last_values.get(path) == Some(&value) {
            return;
        }
        self.transitions
            .push(Transition::new(self.current_time, path.clone(), value.clone()));
        self.last_values.insert(path.clone(), value);
    }

    #[inline]
    fn skip(&mut self, token: &str) {
        self.skipped += 1;
        trace!(token, "Skipped unreadable record");
    }

    fn finish(self) -> WaveformDump {
        let mut seen = HashSet::new();
        let signals = self
            .decls
            .into_iter()
            .filter(|d| self.last_values.contains_key(&d.path))
            .filter(|d| seen.insert(d.path.clone()))
            .map(|d| SignalInfo {
                path: d.path,
                width: d.width,
            })
            .collect();

        let mut metadata = self.metadata;
        metadata.end_time = self.current_time;

        if self.skipped > 0 {
            debug!(skipped = self.skipped, "Unreadable records skipped");
        }

        WaveformDump {
            signals,
            transitions: self.transitions,
            metadata,
        }
    }
}

#[inline]
fn is_timestamp(token: &str) -> bool {
    token.len() > 1
        && token.starts_with('#')
        && token[1..].bytes().all(|b| b.is_ascii_digit())
}

fn join_text(args: &[String]) -> Option<String> {
    if args.is_empty() {
        None
    } else {
        Some(args.join(" "))
    }
}

// ============================================================================
// Main entry points
// ============================================================================

/// Parse VCD text held in memory
pub fn parse_vcd_str(text: &str) -> WaveformDump {
    let mut parser = DumpParser::new();
    for line in text.lines() {
        parser.feed_line(line);
    }
    parser.finish()
}

/// Parse VCD bytes, replacing invalid UTF-8 rather than failing
pub fn parse_vcd_bytes(bytes: &[u8]) -> WaveformDump {
    parse_vcd_str(&String::from_utf8_lossy(bytes))
}

/// Read and parse a VCD file from disk
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_vcd_impl(path: &Path) -> Result<WaveformDump> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        info!("Dump file is empty");
        return Ok(WaveformDump::default());
    }

    // SAFETY: the map is read-only and dropped before returning.
    let mmap = unsafe { Mmap::map(&file)? };
    debug!(
        bytes = mmap.len(),
        mb = mmap.len() as f64 / 1_048_576.0,
        "Mapped dump file"
    );

    let dump = parse_vcd_bytes(&mmap);
    info!(
        signals = dump.signals.len(),
        transitions = dump.transitions.len(),
        end_time = dump.metadata.end_time,
        timescale = %dump.metadata.timescale,
        "Dump parsed"
    );
    Ok(dump)
}
