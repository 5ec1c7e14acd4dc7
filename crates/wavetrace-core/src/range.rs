//! Analysis window resolution from viewer markers
//!
//! File-backed and live sessions both resolve their window here so the two
//! ingestion paths agree on what a marker pair means.

use crate::types::TimeWindow;

/// Marker positions set in the viewer, if any
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Markers {
    pub primary: Option<u64>,
    pub secondary: Option<u64>,
}

impl Markers {
    pub fn new(primary: Option<u64>, secondary: Option<u64>) -> Self {
        Self { primary, secondary }
    }
}

/// Fallback bounds used when markers are missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDefaults {
    pub start: u64,
    pub end: u64,
    /// End of simulation as reported by the data source
    pub reported_end: Option<u64>,
}

/// Resolve markers and defaults into one window.
///
/// - both markers: the span between them, in either order
/// - one marker: from the default start up to that marker
/// - no marker: from the default start to the reported end, or the default end
pub fn resolve_window(markers: Markers, defaults: WindowDefaults) -> TimeWindow {
    match (markers.primary, markers.secondary) {
        (Some(a), Some(b)) => TimeWindow::new(a, b),
        (Some(m), None) | (None, Some(m)) => TimeWindow::new(defaults.start, m),
        (None, None) => TimeWindow::new(
            defaults.start,
            defaults.reported_end.unwrap_or(defaults.end),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: WindowDefaults = WindowDefaults {
        start: 0,
        end: 10_000,
        reported_end: None,
    };

    #[test]
    fn test_both_markers_in_any_order() {
        let w = resolve_window(Markers::new(Some(120), Some(80)), DEFAULTS);
        assert_eq!(w, TimeWindow { start: 80, end: 120 });
    }

    #[test]
    fn test_single_marker_bounds_the_end() {
        let w = resolve_window(Markers::new(None, Some(200)), DEFAULTS);
        assert_eq!(w, TimeWindow { start: 0, end: 200 });
        let w = resolve_window(Markers::new(Some(200), None), DEFAULTS);
        assert_eq!(w, TimeWindow { start: 0, end: 200 });
    }

    #[test]
    fn test_no_markers_prefers_reported_end() {
        let defaults = WindowDefaults {
            reported_end: Some(500),
            ..DEFAULTS
        };
        assert_eq!(
            resolve_window(Markers::default(), defaults),
            TimeWindow { start: 0, end: 500 }
        );
        assert_eq!(
            resolve_window(Markers::default(), DEFAULTS),
            TimeWindow {
                start: 0,
                end: 10_000
            }
        );
    }

    #[test]
    fn test_marker_before_default_start_is_normalized() {
        let defaults = WindowDefaults {
            start: 300,
            ..DEFAULTS
        };
        let w = resolve_window(Markers::new(Some(100), None), defaults);
        assert_eq!(w, TimeWindow { start: 100, end: 300 });
    }
}
