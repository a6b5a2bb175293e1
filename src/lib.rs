//! IMGPROGRESS - image preload progress tracker library
//!
//! Re-exports all modules for use by the binary target.

// Core engine (tracker, frames, events, workers)
pub mod core;

// Page model and image sources
pub mod entities;

// App modules
pub mod cli;
pub mod config;
pub mod paths;
pub mod runner;

// Re-export commonly used types
pub use config::TrackerConfig;
pub use crate::core::event_bus::EventBus;
pub use crate::core::progress::{Phase, ProgressState, ProgressValue};
pub use crate::core::tracker::{CompletionCallback, ImageStatus, ProgressTracker, TrackerReport};
pub use crate::core::workers::Workers;
pub use entities::{DecodeSource, Document, Element, ImageSource, ManualSource};
pub use runner::RunOutcome;
