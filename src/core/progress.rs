//! Progress counters and the values a render accepts.

use serde::Serialize;

/// Tracker run phase
///
/// `Idle -> Discovering -> {Empty | Loading} -> Complete`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Discovering,
    /// Nothing matched; terminal, nothing was rendered
    Empty,
    Loading,
    /// Rounded percent reached 100; terminal
    Complete,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Empty | Phase::Complete)
    }
}

/// Loaded / total counters. Percent is always derived, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    total: usize,
    loaded: usize,
}

impl ProgressState {
    pub fn new(total: usize) -> Self {
        Self { total, loaded: 0 }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn loaded(&self) -> usize {
        self.loaded
    }

    /// `loaded * (100 / total)`; 0 when nothing is tracked
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.loaded as f64 * (100.0 / self.total as f64)
    }

    /// Count one more loaded image. Refuses to go past `total`.
    pub fn mark_loaded(&mut self) -> bool {
        if self.loaded >= self.total {
            return false;
        }
        self.loaded += 1;
        true
    }

    pub fn is_complete(&self) -> bool {
        is_done(self.percent())
    }
}

/// Done check used by the render step
pub fn is_done(percent: f64) -> bool {
    percent.round() == 100.0
}

/// Value handed to the render step.
///
/// Only finite numbers render; anything else is rejected with a log line.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressValue {
    Number(f64),
    Text(String),
}

impl ProgressValue {
    /// Percent if this is a usable number
    pub fn as_percent(&self) -> Option<f64> {
        match self {
            ProgressValue::Number(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for ProgressValue {
    fn from(v: f64) -> Self {
        ProgressValue::Number(v)
    }
}

impl From<f32> for ProgressValue {
    fn from(v: f32) -> Self {
        ProgressValue::Number(v as f64)
    }
}

impl From<u32> for ProgressValue {
    fn from(v: u32) -> Self {
        ProgressValue::Number(v as f64)
    }
}

impl From<i32> for ProgressValue {
    fn from(v: i32) -> Self {
        ProgressValue::Number(v as f64)
    }
}

impl From<&str> for ProgressValue {
    fn from(v: &str) -> Self {
        ProgressValue::Text(v.to_string())
    }
}

impl From<String> for ProgressValue {
    fn from(v: String) -> Self {
        ProgressValue::Text(v)
    }
}

/// Fill the counter template. Only the first occurrence of each
/// placeholder is replaced.
pub fn format_count(template: &str, index: usize, total: usize) -> String {
    template
        .replacen("{index}", &index.to_string(), 1)
        .replacen("{total}", &total.to_string(), 1)
}

/// Shortest round-trip form: `100`, `50`, `33.333333333333336`
pub fn format_percent(percent: f64) -> String {
    format!("{}", percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_derived() {
        let mut p = ProgressState::new(4);
        assert_eq!(p.percent(), 0.0);
        p.mark_loaded();
        p.mark_loaded();
        p.mark_loaded();
        assert_eq!(p.loaded(), 3);
        assert_eq!(p.percent(), 75.0);
        assert!(!p.is_complete());
        p.mark_loaded();
        assert!(p.is_complete());
    }

    #[test]
    fn test_thirds_reach_100() {
        let mut p = ProgressState::new(3);
        for _ in 0..3 {
            assert!(p.mark_loaded());
        }
        assert!((p.percent() - 100.0).abs() < 1e-9);
        assert!(p.is_complete());
    }

    #[test]
    fn test_never_past_total() {
        let mut p = ProgressState::new(1);
        assert!(p.mark_loaded());
        assert!(!p.mark_loaded());
        assert_eq!(p.loaded(), 1);

        let mut empty = ProgressState::new(0);
        assert!(!empty.mark_loaded());
        assert_eq!(empty.percent(), 0.0);
    }

    #[test]
    fn test_progress_value() {
        assert_eq!(ProgressValue::from(42.5).as_percent(), Some(42.5));
        assert_eq!(ProgressValue::from(7u32).as_percent(), Some(7.0));
        assert_eq!(ProgressValue::from("50").as_percent(), None);
        assert_eq!(ProgressValue::from(f64::NAN).as_percent(), None);
        assert_eq!(ProgressValue::from(f64::INFINITY).as_percent(), None);
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count("{index}/{total}", 3, 4), "3/4");
        assert_eq!(format_count("Loaded {index} of {total} images", 1, 9), "Loaded 1 of 9 images");
        assert_eq!(format_count("{index} {index}", 1, 2), "1 {index}");
        assert_eq!(format_count("static", 1, 2), "static");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(100.0), "100");
        assert_eq!(format_percent(50.0), "50");
        assert_eq!(format_percent(100.0 / 3.0), "33.333333333333336");
    }
}
