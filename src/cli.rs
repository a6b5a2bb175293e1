use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

// Build version with backend info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Decode: image 0.25 (png, jpeg, tiff, tga, hdr)\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Preload images and drive a progress bar until they are all loaded
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Image files or glob patterns; each becomes one tracked image
    #[arg(value_name = "IMAGE")]
    pub images: Vec<String>,

    /// Load the page from an HTML file instead of building it from IMAGE args
    #[arg(short = 'p', long = "page", value_name = "PAGE", conflicts_with = "images")]
    pub page: Option<PathBuf>,

    /// Resolve relative image URLs against this directory (default: page directory)
    #[arg(short = 'b', long = "base-dir", value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Tracker config file (JSON). Default: imgprogress.json in the config directory
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Override counter template ({index} and {total} are substituted)
    #[arg(long = "count-format", value_name = "TEMPLATE")]
    pub count_format: Option<String>,

    /// Don't write the counter text into the bar
    #[arg(long = "no-count")]
    pub no_count: bool,

    /// Don't update aria-valuenow
    #[arg(long = "no-aria")]
    pub no_aria: bool,

    /// Decode worker threads (default: 3/4 of the CPUs)
    #[arg(short = 'w', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Frame rate for coalesced renders
    #[arg(long = "fps", value_name = "N", default_value = "60")]
    pub fps: u32,

    /// Stop waiting after this many seconds (the tracker itself never gives up)
    #[arg(short = 't', long = "timeout", value_name = "SECS", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Print the final report as JSON
    #[arg(long = "json")]
    pub json: bool,

    /// Don't draw the terminal progress bar
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Enable debug logging to file (default: imgprogress.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

/// Seconds as a finite, non-negative float
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.trim().parse().map_err(|e| format!("{}", e))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("expected a finite number of seconds >= 0, got {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_images_and_flags() {
        let args = Args::try_parse_from([
            "imgprogress", "a.png", "shots/*.jpg", "--no-count", "-vv", "--timeout", "2.5",
        ])
        .unwrap();
        assert_eq!(args.images, vec!["a.png", "shots/*.jpg"]);
        assert!(args.no_count);
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(args.fps, 60);
        assert!(args.log_file.is_none());
    }

    #[test]
    fn test_log_flag_optional_value() {
        let args = Args::try_parse_from(["imgprogress", "--log"]).unwrap();
        assert_eq!(args.log_file, Some(None));
        let args = Args::try_parse_from(["imgprogress", "--log", "run.log"]).unwrap();
        assert_eq!(args.log_file, Some(Some(PathBuf::from("run.log"))));
    }

    #[test]
    fn test_timeout_rejects_negative_and_non_finite() {
        for bad in ["--timeout=-1", "--timeout=nan", "--timeout=inf", "--timeout=soon"] {
            assert!(Args::try_parse_from(["imgprogress", "a.png", bad]).is_err(), "{}", bad);
        }
        let args = Args::try_parse_from(["imgprogress", "a.png", "--timeout=0"]).unwrap();
        assert_eq!(args.timeout, Some(Duration::ZERO));
    }

    #[test]
    fn test_page_conflicts_with_images() {
        assert!(Args::try_parse_from(["imgprogress", "a.png", "--page", "p.html"]).is_err());
    }
}
