//! Events published by `ProgressTracker`.

use crate::entities::loader::{ImageId, ImageInfo};

/// A tracked image finished preloading and was revealed
#[derive(Clone, Debug)]
pub struct ImageLoaded {
    pub id: ImageId,
    pub url: String,
    pub info: ImageInfo,
    pub loaded: usize,
    pub total: usize,
}

/// A preload failed; the image will never count
#[derive(Clone, Debug)]
pub struct ImageFailed {
    pub id: ImageId,
    pub url: String,
    pub error: String,
}

/// A coalesced render reached the progress bar
#[derive(Clone, Debug)]
pub struct ProgressRendered {
    pub percent: f64,
    pub loaded: usize,
    pub total: usize,
    /// Counter text, when enabled
    pub text: Option<String>,
}

/// Done state applied
#[derive(Clone, Debug)]
pub struct TrackerDone {
    pub total: usize,
}
