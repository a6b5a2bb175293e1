//! Core engine modules - tracker, frames, events, workers
//!
//! These modules form the progress engine, independent of any terminal UI.

pub mod event_bus;
pub mod frames;
pub mod progress;
pub mod tracker;
pub mod tracker_events;
pub mod workers;

// Re-exports for convenience
pub use event_bus::EventBus;
pub use frames::{CoalescedRender, FrameHandle, FrameScheduler, IntervalFrames, ManualFrames};
pub use progress::{Phase, ProgressState, ProgressValue};
pub use tracker::ProgressTracker;
pub use workers::Workers;
