//! Bounded text rendering of an indexed transition log
//!
//! Output is meant for consumers with a hard size budget: every signal is
//! capped through the index's stride resampling and the whole text is cut
//! at a character limit with an explicit note.

use crate::index::TransitionIndex;
use crate::types::{DumpMetadata, TimeWindow, DEFAULT_RANGE_CAP};

/// Rendering limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryOptions {
    /// Hard limit on the rendered text, truncation note included
    pub max_chars: usize,
    /// Transitions shown per signal
    pub per_signal_cap: usize,
    /// Signals to include; empty means every indexed signal
    pub signals: Vec<String>,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            max_chars: 8_000,
            per_signal_cap: DEFAULT_RANGE_CAP,
            signals: Vec::new(),
        }
    }
}

const TRUNCATION_NOTE: &str = "[... truncated to fit output budget]\n";

/// Line accumulator that refuses lines past the budget
struct Budget {
    out: String,
    max_chars: usize,
    /// Room for lines, with the truncation note reserved
    limit: usize,
    truncated: bool,
}

impl Budget {
    fn new(max_chars: usize) -> Self {
        Self {
            out: String::new(),
            max_chars,
            limit: max_chars.saturating_sub(TRUNCATION_NOTE.len()),
            truncated: false,
        }
    }

    fn line(&mut self, line: &str) -> bool {
        if self.truncated {
            return false;
        }
        if self.out.len() + line.len() + 1 > self.limit {
            self.truncated = true;
            return false;
        }
        self.out.push_str(line);
        self.out.push('\n');
        true
    }

    fn finish(mut self) -> String {
        if self.truncated {
            // Budgets smaller than the note get as much of it as fits.
            let room = self.max_chars.saturating_sub(self.out.len());
            self.out
                .push_str(&TRUNCATION_NOTE[..TRUNCATION_NOTE.len().min(room)]);
        }
        self.out
    }
}

/// Render catalog and per-signal transitions inside `window`
pub fn render_summary(
    index: &TransitionIndex,
    metadata: &DumpMetadata,
    window: TimeWindow,
    options: &SummaryOptions,
) -> String {
    let names: Vec<String> = if options.signals.is_empty() {
        index.list_signals().into_iter().map(|s| s.name).collect()
    } else {
        options.signals.clone()
    };

    let mut budget = Budget::new(options.max_chars);
    budget.line(&format!(
        "timescale {} | end time {} | window {}",
        metadata.timescale, metadata.end_time, window
    ));

    for name in &names {
        let shown = index.query_transitions(name, window.start, window.end, options.per_signal_cap);
        let total = index.count_transitions(name, window.start, window.end);

        let heading = if shown.len() < total {
            format!("{name}: {total} transitions, {} shown", shown.len())
        } else {
            format!("{name}: {total} transitions")
        };
        if !budget.line(&heading) {
            break;
        }
        if shown.is_empty() {
            budget.line(&format!(
                "  @{} {}",
                window.start,
                index.value_at(name, window.start)
            ));
            continue;
        }
        for t in &shown {
            if !budget.line(&format!("  @{} {}", t.time, t.value)) {
                break;
            }
        }
    }

    budget.finish()
}
