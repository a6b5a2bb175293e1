//! Host event loop: initialize a tracker and drive it until it can't move.

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;

use crate::core::frames::FrameScheduler;
use crate::core::progress::Phase;
use crate::core::tracker::{CompletionCallback, ProgressTracker};
use crate::entities::loader::ImageSource;
use crate::entities::traits::DomQuery;

/// Longest single wait, so timeouts stay responsive
const MAX_IDLE: Duration = Duration::from_millis(50);

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Bar reached 100% and the callback ran
    Complete,
    /// Nothing to track
    Empty,
    /// Every image settled, but some never counted
    Stalled,
    /// Deadline passed while preloads were still outstanding
    TimedOut,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunOutcome::Complete => "complete",
            RunOutcome::Empty => "empty",
            RunOutcome::Stalled => "stalled",
            RunOutcome::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

/// Initialize `tracker` and pump completions and frames until it finishes,
/// stalls or `timeout` elapses.
///
/// The tracker itself never times out; the deadline only bounds this loop.
pub fn run<D, S, F>(
    tracker: &mut ProgressTracker<D, S, F>,
    on_complete: Option<CompletionCallback>,
    timeout: Option<Duration>,
) -> RunOutcome
where
    D: DomQuery,
    S: ImageSource,
    F: FrameScheduler,
{
    let started = Instant::now();
    let deadline = timeout.map(|t| started + t);

    tracker.initialize(on_complete);

    let outcome = loop {
        match tracker.phase() {
            Phase::Empty => break RunOutcome::Empty,
            Phase::Complete => break RunOutcome::Complete,
            Phase::Idle => {
                warn!("Tracker refused to start");
                break RunOutcome::Empty;
            }
            Phase::Discovering | Phase::Loading => {}
        }
        if tracker.is_stalled() {
            break RunOutcome::Stalled;
        }

        let now = Instant::now();
        if deadline.is_some_and(|d| now >= d) {
            break RunOutcome::TimedOut;
        }

        let mut wait = MAX_IDLE;
        if let Some(due) = tracker.frames().next_due() {
            wait = wait.min(due.saturating_duration_since(now));
        }
        if let Some(d) = deadline {
            wait = wait.min(d.saturating_duration_since(now));
        }

        let applied = tracker.wait(wait);
        if applied > 0 {
            debug!("Applied {} completions", applied);
        }
        tracker.tick(Instant::now());
    };

    let progress = tracker.progress();
    info!(
        "Run {} after {:.0?}: {}/{} images",
        outcome,
        started.elapsed(),
        progress.loaded(),
        progress.total()
    );
    outcome
}
