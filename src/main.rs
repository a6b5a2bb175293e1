use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use imgprogress::cli::Args;
use imgprogress::core::event_bus::EventBus;
use imgprogress::core::frames::IntervalFrames;
use imgprogress::core::tracker::{CompletionCallback, ProgressTracker};
use imgprogress::core::tracker_events::{ImageFailed, ProgressRendered, TrackerDone};
use imgprogress::core::workers::Workers;
use imgprogress::entities::loader::DecodeSource;
use imgprogress::entities::page;
use imgprogress::paths::{self, PathConfig};
use imgprogress::runner::{self, RunOutcome};
use imgprogress::TrackerConfig;

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());

    init_logging(&args, &path_config)?;

    info!("imgprogress {} starting", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let config = load_config(&args, &path_config)?;

    // Page: HTML file, or one <img> per input
    let (document, page_dir) = match &args.page {
        Some(path) => (page::load_page(path)?, path.parent().map(|p| p.to_path_buf())),
        None => {
            let images = paths::expand_inputs(&args.images)?;
            (page::page_for_images(&images, &config)?, None)
        }
    };
    info!("Page has {} elements", document.len());

    let num_threads = args
        .workers
        .unwrap_or_else(|| (num_cpus::get() * 3 / 4).max(1));
    let workers = Arc::new(Workers::new(num_threads));
    let mut source = DecodeSource::new(workers);
    if let Some(dir) = args.base_dir.clone().or(page_dir) {
        source = source.with_base_dir(dir);
    }

    // Only the terminal bar listens; nothing polls the queue
    let bus = EventBus::callbacks_only();
    let bar = if args.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(100)
    };
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos:>3}% | {msg}")?
            .progress_chars("█▓░"),
    );
    attach_terminal_bar(&bus, &bar);

    let mut tracker =
        ProgressTracker::new(config, document, source, IntervalFrames::new(args.fps)).with_events(bus.emitter());

    let on_complete: CompletionCallback = Box::new(|| info!("Completion callback fired"));
    let outcome = runner::run(&mut tracker, Some(on_complete), args.timeout);
    if !bar.is_finished() {
        bar.abandon_with_message(outcome.to_string());
    }

    let report = tracker.report();
    if args.json {
        let out = serde_json::json!({ "outcome": outcome, "report": report });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print!("{}", report);
    }

    Ok(match outcome {
        RunOutcome::Complete | RunOutcome::Empty => ExitCode::SUCCESS,
        RunOutcome::Stalled => ExitCode::from(2),
        RunOutcome::TimedOut => ExitCode::from(3),
    })
}

/// Console or file logging, verbosity from -v count
fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| paths::data_file(paths::LOG_FILE, path_config));
        paths::ensure_parent(&log_path)?;
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// Config file (if any) plus CLI overrides
fn load_config(args: &Args, path_config: &PathConfig) -> Result<TrackerConfig> {
    let mut config = match paths::resolve_tracker_config(args.config.as_deref(), path_config)? {
        Some(path) => {
            info!("Config: {}", path.display());
            TrackerConfig::load(&path)?
        }
        None => {
            debug!("No config file, using defaults");
            TrackerConfig::default()
        }
    };

    if let Some(ref format) = args.count_format {
        config.count_format = format.clone();
    }
    if args.no_count {
        config.show_count = false;
    }
    if args.no_aria {
        config.update_aria_now = false;
    }
    config.validate()?;
    Ok(config)
}

/// Mirror tracker events onto the terminal bar
fn attach_terminal_bar(bus: &EventBus, bar: &ProgressBar) {
    let b = bar.clone();
    bus.subscribe::<ProgressRendered, _>(move |e| {
        b.set_position(e.percent.round().clamp(0.0, 100.0) as u64);
        b.set_message(e.text.clone().unwrap_or_else(|| format!("{}/{}", e.loaded, e.total)));
    });

    let b = bar.clone();
    bus.subscribe::<ImageFailed, _>(move |e| {
        b.println(format!("failed: {} ({})", e.url, e.error));
    });

    let b = bar.clone();
    bus.subscribe::<TrackerDone, _>(move |e| {
        b.finish_with_message(format!("done, {} images", e.total));
    });
}
