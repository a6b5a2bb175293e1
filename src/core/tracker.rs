//! Image load progress tracker.
//!
//! One tracker per run. It discovers images on the page, hands each one to
//! an `ImageSource`, applies completions on the event-loop thread and draws
//! the bar through a coalesced frame render.
//!
//! Known stall cases, kept on purpose:
//! - an image with no usable source still counts toward the total
//! - a failed decode never counts as loaded
//!
//! Either one leaves the tracker in `Phase::Loading` for good; `is_stalled()`
//! tells a host loop when nothing more can happen.

use std::fmt;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, trace, warn};
use serde::Serialize;

use super::event_bus::{EventEmitter, TrackerEventEmitter};
use super::frames::{CoalescedRender, FrameScheduler};
use super::progress::{Phase, ProgressState, ProgressValue, format_count, format_percent, is_done};
use super::tracker_events::{ImageFailed, ImageLoaded, ProgressRendered, TrackerDone};
use crate::config::TrackerConfig;
use crate::entities::loader::{ImageId, ImageInfo, ImageSource, LoadEvent};
use crate::entities::traits::{DomQuery, ElementHandle};

/// Zero-argument completion callback, invoked at most once
pub type CompletionCallback = Box<dyn FnOnce()>;

/// Per-image lifecycle. Only `Pending -> Loaded` moves the counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageStatus {
    Pending,
    Loaded(ImageInfo),
    /// No source attribute; counted, never loaded
    Skipped,
    Failed { error: String },
}

/// One discovered (or standalone-loaded) image
#[derive(Debug, Clone)]
pub struct TrackedImage<E> {
    pub id: ImageId,
    pub element: E,
    pub source_url: Option<String>,
    pub status: ImageStatus,
    /// Part of the discovered total
    pub counted: bool,
}

/// Serializable run summary
#[derive(Debug, Clone, Serialize)]
pub struct TrackerReport {
    pub phase: Phase,
    pub total: usize,
    pub loaded: usize,
    pub percent: f64,
    /// Render requests dropped in favour of a newer one
    pub coalesced: u64,
    pub images: Vec<ImageReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    pub id: ImageId,
    pub element: String,
    pub source_url: Option<String>,
    #[serde(flatten)]
    pub status: ImageStatus,
}

impl fmt::Display for TrackerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:?}: {}/{} images loaded ({}%)",
            self.phase,
            self.loaded,
            self.total,
            format_percent((self.percent * 100.0).round() / 100.0)
        )?;
        for img in &self.images {
            let url = img.source_url.as_deref().unwrap_or("-");
            match &img.status {
                ImageStatus::Pending => writeln!(f, "  #{} {} {} pending", img.id, img.element, url)?,
                ImageStatus::Loaded(info) => writeln!(
                    f,
                    "  #{} {} {} loaded {}x{} ({} bytes)",
                    img.id, img.element, url, info.width, info.height, info.bytes
                )?,
                ImageStatus::Skipped => writeln!(f, "  #{} {} skipped: no source", img.id, img.element)?,
                ImageStatus::Failed { error } => {
                    writeln!(f, "  #{} {} {} failed: {}", img.id, img.element, url, error)?
                }
            }
        }
        Ok(())
    }
}

/// Tracks image preloads on one page and drives one progress bar.
pub struct ProgressTracker<D: DomQuery, S, F> {
    config: TrackerConfig,
    dom: D,
    source: S,
    frames: F,
    phase: Phase,
    images: Vec<TrackedImage<D::Element>>,
    progress: ProgressState,
    bar: Option<D::Element>,
    on_complete: Option<CompletionCallback>,
    render: CoalescedRender<f64>,
    done_tx: Sender<LoadEvent>,
    done_rx: Receiver<LoadEvent>,
    events: TrackerEventEmitter,
}

impl<D, S, F> ProgressTracker<D, S, F>
where
    D: DomQuery,
    S: ImageSource,
    F: FrameScheduler,
{
    pub fn new(config: TrackerConfig, dom: D, source: S, frames: F) -> Self {
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            dom,
            source,
            frames,
            phase: Phase::Idle,
            images: Vec::new(),
            progress: ProgressState::default(),
            bar: None,
            on_complete: None,
            render: CoalescedRender::new(),
            done_tx,
            done_rx,
            events: TrackerEventEmitter::dummy(),
        }
    }

    /// Publish tracker events on a bus
    pub fn with_events(mut self, emitter: EventEmitter) -> Self {
        self.events = TrackerEventEmitter::from_emitter(emitter);
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn progress(&self) -> ProgressState {
        self.progress
    }

    pub fn percent(&self) -> f64 {
        self.progress.percent()
    }

    pub fn images(&self) -> &[TrackedImage<D::Element>] {
        &self.images
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn frames(&self) -> &F {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut F {
        &mut self.frames
    }

    // ========== Entry points ==========

    /// Discover images and start preloading them.
    ///
    /// With no matching image this is a silent no-op: the bar is never
    /// touched and `on_complete` never runs. A tracker runs once; calling
    /// this again logs an error and changes nothing.
    pub fn initialize(&mut self, on_complete: Option<CompletionCallback>) {
        if self.phase != Phase::Idle {
            error!("Tracker already initialized ({:?}), ignoring second initialize", self.phase);
            return;
        }
        self.on_complete = on_complete;
        self.phase = Phase::Discovering;

        let elements = self.dom.query_all(&self.config.image_selector);
        self.progress = ProgressState::new(elements.len());

        if elements.is_empty() {
            debug!("No images match {:?}, nothing to track", self.config.image_selector);
            self.phase = Phase::Empty;
            return;
        }

        self.phase = Phase::Loading;
        if self.bar.is_none() {
            self.bar = self.dom.query(&self.config.progress_bar_selector);
        }
        if self.bar.is_none() {
            warn!(
                "No progress bar matches {:?}; progress will not be drawn",
                self.config.progress_bar_selector
            );
        }

        let mut skipped = 0;
        for element in elements {
            match self.resolve_source(&element) {
                Some(url) => {
                    let id = self.push_image(element, Some(url), ImageStatus::Pending, true);
                    self.begin_preload(id);
                }
                None => {
                    // Still counted in the total: the bar can't reach 100%
                    error!("Cannot find src for image: {}", element.describe());
                    self.push_image(element, None, ImageStatus::Skipped, true);
                    skipped += 1;
                }
            }
        }

        info!(
            "Tracking {} images ({} without source)",
            self.progress.total(),
            skipped
        );
    }

    /// Preload one image and reveal it when done.
    ///
    /// Works standalone too. Images loaded this way outside discovery are not
    /// part of the total and do not move the counters.
    pub fn load_image(&mut self, element: D::Element, url: &str) -> Option<ImageId> {
        if url.is_empty() {
            error!("Cannot load an image: missing src for {}", element.describe());
            return None;
        }
        let id = self.push_image(element, Some(url.to_string()), ImageStatus::Pending, false);
        self.begin_preload(id);
        Some(id)
    }

    /// Request a coalesced render of `value` on the next frame.
    ///
    /// Anything that is not a finite number is logged and dropped. Returns
    /// whether a render was scheduled.
    pub fn update_visual(&mut self, value: impl Into<ProgressValue>) -> bool {
        let value = value.into();
        let Some(percent) = value.as_percent() else {
            error!("Cannot update the progress bar, {:?} is not a number", value);
            return false;
        };
        self.render.request(&mut self.frames, percent);
        trace!("Render of {}% scheduled", format_percent(percent));
        true
    }

    // ========== Event loop ==========

    /// Apply every completion already received. Returns how many.
    pub fn pump(&mut self) -> usize {
        let events: Vec<LoadEvent> = self.done_rx.try_iter().collect();
        let count = events.len();
        for event in events {
            self.on_load_event(event);
        }
        count
    }

    /// Block up to `timeout` for a completion, then drain the rest.
    pub fn wait(&mut self, timeout: Duration) -> usize {
        match self.done_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.on_load_event(event);
                1 + self.pump()
            }
            Err(_) => 0,
        }
    }

    /// Run due frames. Returns true if the bar was rendered.
    pub fn tick(&mut self, now: Instant) -> bool {
        let fired = self.frames.take_due(now);
        if fired.is_empty() {
            return false;
        }
        match self.render.take_fired(&fired) {
            Some(percent) => {
                self.paint(percent);
                true
            }
            None => false,
        }
    }

    /// No preload outstanding and no render pending
    pub fn is_settled(&self) -> bool {
        !self.render.is_pending()
            && self.images.iter().all(|i| i.status != ImageStatus::Pending)
    }

    /// Loading, but nothing left that could finish it
    pub fn is_stalled(&self) -> bool {
        self.phase == Phase::Loading && self.is_settled()
    }

    pub fn report(&self) -> TrackerReport {
        TrackerReport {
            phase: self.phase,
            total: self.progress.total(),
            loaded: self.progress.loaded(),
            percent: self.progress.percent(),
            coalesced: self.render.superseded(),
            images: self
                .images
                .iter()
                .map(|i| ImageReport {
                    id: i.id,
                    element: i.element.describe(),
                    source_url: i.source_url.clone(),
                    status: i.status.clone(),
                })
                .collect(),
        }
    }

    // ========== Internals ==========

    /// Deferred attribute first, then `src`. Empty values don't count.
    fn resolve_source(&self, element: &D::Element) -> Option<String> {
        element
            .attribute(&self.config.source_attribute)
            .filter(|s| !s.is_empty())
            .or_else(|| element.attribute("src").filter(|s| !s.is_empty()))
    }

    fn push_image(
        &mut self,
        element: D::Element,
        source_url: Option<String>,
        status: ImageStatus,
        counted: bool,
    ) -> ImageId {
        let id = self.images.len();
        self.images.push(TrackedImage {
            id,
            element,
            source_url,
            status,
            counted,
        });
        id
    }

    fn begin_preload(&mut self, id: ImageId) {
        let image = &self.images[id];
        let Some(url) = image.source_url.as_deref() else {
            return;
        };
        if !image.element.has_class(&self.config.invisible_class) {
            image.element.add_class(&self.config.invisible_class);
        }
        trace!("Preload #{}: {}", id, url);
        self.source.preload(id, url, self.done_tx.clone());
    }

    fn on_load_event(&mut self, event: LoadEvent) {
        let Some(image) = self.images.get_mut(event.id) else {
            warn!("Completion for unknown image #{} ({})", event.id, event.url);
            return;
        };
        if image.status != ImageStatus::Pending {
            warn!("Duplicate completion for image #{} ignored", event.id);
            return;
        }
        let url = image.source_url.clone().unwrap_or(event.url);

        match event.result {
            Ok(info) => {
                image.status = ImageStatus::Loaded(info);
                let counted = image.counted;
                let element = image.element.clone();
                element.remove_class(&self.config.invisible_class);
                element.add_class(&self.config.visible_class);
                element.set_attribute("src", &url);

                if !counted {
                    debug!("Image #{} loaded outside the tracked set", event.id);
                    return;
                }
                self.progress.mark_loaded();
                debug!(
                    "Loaded {} ({}/{})",
                    url,
                    self.progress.loaded(),
                    self.progress.total()
                );
                self.events.emit(ImageLoaded {
                    id: event.id,
                    url,
                    info,
                    loaded: self.progress.loaded(),
                    total: self.progress.total(),
                });
                self.update_visual(self.progress.percent());
            }
            Err(e) => {
                warn!("Image failed to load, it will never count: {} ({})", url, e);
                image.status = ImageStatus::Failed { error: e.to_string() };
                self.events.emit(ImageFailed {
                    id: event.id,
                    url,
                    error: e.to_string(),
                });
            }
        }
    }

    fn progress_bar(&mut self) -> Option<D::Element> {
        if self.bar.is_none() {
            self.bar = self.dom.query(&self.config.progress_bar_selector);
        }
        self.bar.clone()
    }

    /// One frame's worth of bar mutations
    fn paint(&mut self, percent: f64) {
        let loaded = self.progress.loaded();
        let total = self.progress.total();
        let text = self
            .config
            .show_count
            .then(|| format_count(&self.config.count_format, loaded, total));
        let value = format_percent(percent);

        let bar = self.progress_bar();
        match &bar {
            Some(bar) => {
                bar.set_style("width", &format!("{}%", value));
                if let Some(ref text) = text {
                    bar.set_text(text);
                }
                if self.config.update_aria_now {
                    bar.set_attribute("aria-valuenow", &value);
                }
            }
            None => error!(
                "Cannot update the progress bar: nothing matches {:?}",
                self.config.progress_bar_selector
            ),
        }
        trace!("Rendered {}% ({}/{})", value, loaded, total);
        self.events.emit(ProgressRendered {
            percent,
            loaded,
            total,
            text,
        });

        if !is_done(percent) {
            return;
        }
        if let Some(bar) = &bar {
            bar.add_class(&self.config.done_class);
        }
        if self.phase == Phase::Loading {
            self.phase = Phase::Complete;
            info!("All {} images loaded", total);
            self.events.emit(TrackerDone { total });
        }
        if let Some(callback) = self.on_complete.take() {
            debug!("Invoking completion callback");
            callback();
        }
    }
}
