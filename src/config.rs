//! Tracker configuration.
//!
//! Loaded once from JSON (every field optional) and never changed while a
//! run is in progress.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entities::dom::{SelectorError, parse_selector};

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Selector { field: &'static str, error: SelectorError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Config I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "Config parse error: {}", e),
            ConfigError::Selector { field, error } => write!(f, "Invalid {}: {}", field, error),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Which elements to track, where to draw progress and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Selects trackable images
    pub image_selector: String,
    /// Selects the single progress bar
    pub progress_bar_selector: String,
    /// Deferred source attribute, preferred over `src`
    pub source_attribute: String,
    pub invisible_class: String,
    pub visible_class: String,
    /// Added to the bar once the rounded percent reaches 100
    pub done_class: String,
    /// Write the counter text into the bar
    pub show_count: bool,
    /// Counter template, `{index}` and `{total}` are substituted
    pub count_format: String,
    /// Mirror the percent into `aria-valuenow`
    pub update_aria_now: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            image_selector: "[data-images-loaded-src]".to_string(),
            progress_bar_selector: ".images-loaded-progress-bar".to_string(),
            source_attribute: "data-images-loaded-src".to_string(),
            invisible_class: "images-loaded--invisible".to_string(),
            visible_class: "images-loaded--visible".to_string(),
            done_class: "images-loaded-progress-bar--done".to_string(),
            show_count: true,
            count_format: "{index}/{total}".to_string(),
            update_aria_now: true,
        }
    }
}

impl TrackerConfig {
    /// Load from a JSON file and validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json(&text)?;
        log::debug!("Loaded tracker config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Both selectors must parse
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_selector(&self.image_selector)
            .map_err(|error| ConfigError::Selector { field: "image_selector", error })?;
        parse_selector(&self.progress_bar_selector)
            .map_err(|error| ConfigError::Selector { field: "progress_bar_selector", error })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = TrackerConfig::from_json(r#"{ "show_count": false, "count_format": "{index} of {total}" }"#)
            .unwrap();
        assert!(!cfg.show_count);
        assert_eq!(cfg.count_format, "{index} of {total}");
        assert_eq!(cfg.image_selector, "[data-images-loaded-src]");
        assert!(cfg.update_aria_now);
    }

    #[test]
    fn test_bad_selector_rejected() {
        let err = TrackerConfig::from_json(r#"{ "progress_bar_selector": "div >" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Selector { field: "progress_bar_selector", .. }));

        // descendant and pseudo-class selectors are fine
        let cfg = TrackerConfig::from_json(r#"{ "image_selector": "main img:not(.skip)" }"#).unwrap();
        assert_eq!(cfg.image_selector, "main img:not(.skip)");
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            TrackerConfig::from_json("{ nope"),
            Err(ConfigError::Parse(_))
        ));
    }
}
