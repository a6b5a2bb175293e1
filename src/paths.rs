use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Config file name looked up in the config directory
pub const CONFIG_FILE: &str = "imgprogress.json";
/// Default log file name for `--log` without a path
pub const LOG_FILE: &str = "imgprogress.log";

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Create PathConfig from CLI arguments and environment variables
    ///
    /// Priority: CLI args → ENV var (IMGPROGRESS_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| {
            std::env::var("IMGPROGRESS_CONFIG_DIR")
                .ok()
                .map(PathBuf::from)
        });

        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. IMGPROGRESS_CONFIG_DIR environment variable
/// 3. Local folder IF imgprogress.json exists there
/// 4. Platform-specific config directory from dirs-next (default)
///
/// Platform paths:
/// - Linux: ~/.config/imgprogress/{name}
/// - macOS: ~/Library/Application Support/imgprogress/{name}
/// - Windows: %APPDATA%\imgprogress\{name}
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Get path to a data file (logs)
///
/// Same priority as `config_file`, but falls back to the platform data directory.
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Tracker config to load, if any.
///
/// An explicit `--config` path must exist; the default location is optional.
pub fn resolve_tracker_config(explicit: Option<&Path>, config: &PathConfig) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }
    let default = config_file(CONFIG_FILE, config);
    Ok(default.exists().then_some(default))
}

/// Expand CLI image arguments: glob patterns are expanded (sorted), plain
/// paths are kept as given even if they don't exist yet.
pub fn expand_inputs(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for input in inputs {
        if !input.contains(['*', '?', '[']) {
            out.push(PathBuf::from(input));
            continue;
        }
        let mut matched: Vec<PathBuf> = glob::glob(input)
            .with_context(|| format!("Invalid glob pattern: {}", input))?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    log::warn!("Skipping unreadable path: {}", e);
                    None
                }
            })
            .filter(|p| p.is_file())
            .collect();
        if matched.is_empty() {
            log::warn!("Pattern matched no files: {}", input);
        }
        matched.sort();
        out.append(&mut matched);
    }
    Ok(out)
}

/// Ensure the parent directory of a file exists
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
    }
    Ok(())
}

/// Check if the config file exists in the given directory
fn has_local_config(dir: &Path) -> bool {
    dir.join(CONFIG_FILE).exists()
}

/// Get the configuration directory
fn get_config_dir(config: &PathConfig) -> PathBuf {
    // Priority 1: Custom directory from CLI or ENV
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    // Priority 2: Local folder IF config file exists there
    if let Ok(current_dir) = std::env::current_dir() {
        if has_local_config(&current_dir) {
            return current_dir;
        }
    }

    // Priority 3: Platform-specific config directory
    if let Some(dir) = dirs_next::config_dir() {
        return dir.join("imgprogress");
    }

    PathBuf::from(".")
}

/// Get the data directory
fn get_data_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current_dir) = std::env::current_dir() {
        if has_local_config(&current_dir) {
            return current_dir;
        }
    }

    if let Some(dir) = dirs_next::data_dir() {
        return dir.join("imgprogress");
    }

    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("imgprogress-paths-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_custom_dir_wins() {
        let cfg = PathConfig {
            config_dir: Some(PathBuf::from("/tmp/custom")),
        };
        assert_eq!(config_file("a.json", &cfg), PathBuf::from("/tmp/custom/a.json"));
        assert_eq!(data_file(LOG_FILE, &cfg), PathBuf::from("/tmp/custom/imgprogress.log"));
    }

    #[test]
    fn test_resolve_tracker_config() {
        let dir = temp_dir();
        let cfg = PathConfig {
            config_dir: Some(dir.clone()),
        };
        assert_eq!(resolve_tracker_config(None, &cfg).unwrap(), None);

        std::fs::write(dir.join(CONFIG_FILE), "{}").unwrap();
        assert_eq!(resolve_tracker_config(None, &cfg).unwrap(), Some(dir.join(CONFIG_FILE)));

        assert!(resolve_tracker_config(Some(&dir.join("nope.json")), &cfg).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_expand_inputs() {
        let dir = temp_dir();
        for name in ["b.png", "a.png", "c.txt"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }
        let pattern = format!("{}/*.png", dir.display());
        let out = expand_inputs(&[pattern, "literal.jpg".to_string()]).unwrap();
        assert_eq!(
            out,
            vec![dir.join("a.png"), dir.join("b.png"), PathBuf::from("literal.jpg")]
        );

        let none = format!("{}/*.gif", dir.display());
        assert!(expand_inputs(&[none]).unwrap().is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_ensure_parent() {
        let dir = temp_dir();
        let file = dir.join("nested/deeper/out.log");
        ensure_parent(&file).unwrap();
        assert!(dir.join("nested/deeper").is_dir());
        ensure_parent(Path::new("bare.log")).unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }
}
