//! Frame scheduling and render coalescing.
//!
//! A `FrameScheduler` hands out single-shot frame requests that can be
//! cancelled before they fire. `CoalescedRender` keeps at most one of them
//! pending: a new request cancels the previous one and carries the newer
//! value, so a burst of updates costs one render on the next frame.

use std::time::{Duration, Instant};

use log::trace;

/// Opaque frame request id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameHandle(u64);

/// Single-shot deferred-task scheduler.
pub trait FrameScheduler {
    /// Request a callback on the next available frame.
    fn request_frame(&mut self) -> FrameHandle;

    /// Cancel a request that has not fired yet. Unknown handles are ignored.
    fn cancel_frame(&mut self, handle: FrameHandle);

    /// Requests whose frame has arrived, in request order.
    ///
    /// Each handle is returned once. Cancelled handles never are.
    fn take_due(&mut self, now: Instant) -> Vec<FrameHandle>;

    /// When the earliest pending request will be due, if the scheduler knows.
    fn next_due(&self) -> Option<Instant> {
        None
    }

    fn pending_count(&self) -> usize;
}

// ===== Manual frames =====

/// Frames fire only on `advance()`.
#[derive(Debug, Default)]
pub struct ManualFrames {
    next_id: u64,
    requested: Vec<FrameHandle>,
    due: Vec<FrameHandle>,
    frames: u64,
}

impl ManualFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one frame: everything requested so far becomes due
    pub fn advance(&mut self) {
        self.frames += 1;
        self.due.append(&mut self.requested);
    }

    /// Number of frames advanced
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameScheduler for ManualFrames {
    fn request_frame(&mut self) -> FrameHandle {
        let handle = FrameHandle(self.next_id);
        self.next_id += 1;
        self.requested.push(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        self.requested.retain(|h| *h != handle);
        self.due.retain(|h| *h != handle);
    }

    fn take_due(&mut self, _now: Instant) -> Vec<FrameHandle> {
        std::mem::take(&mut self.due)
    }

    fn pending_count(&self) -> usize {
        self.requested.len() + self.due.len()
    }
}

// ===== Interval frames =====

/// Wall-clock frames at a fixed rate.
///
/// A request made during frame N fires at the start of frame N+1.
#[derive(Debug)]
pub struct IntervalFrames {
    period: Duration,
    origin: Instant,
    next_id: u64,
    pending: Vec<(FrameHandle, Instant)>,
}

impl IntervalFrames {
    /// `fps` is clamped to 1..=1000
    pub fn new(fps: u32) -> Self {
        let fps = fps.clamp(1, 1000);
        Self {
            period: Duration::from_secs(1) / fps,
            origin: Instant::now(),
            next_id: 0,
            pending: Vec::new(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start of the first frame strictly after `now`
    fn next_boundary(&self, now: Instant) -> Instant {
        let elapsed = now.saturating_duration_since(self.origin);
        let period_ns = self.period.as_nanos().max(1);
        let frames = elapsed.as_nanos() / period_ns + 1;
        self.origin + Duration::from_nanos((frames * period_ns) as u64)
    }
}

impl FrameScheduler for IntervalFrames {
    fn request_frame(&mut self) -> FrameHandle {
        let handle = FrameHandle(self.next_id);
        self.next_id += 1;
        let at = self.next_boundary(Instant::now());
        self.pending.push((handle, at));
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        self.pending.retain(|(h, _)| *h != handle);
    }

    fn take_due(&mut self, now: Instant) -> Vec<FrameHandle> {
        let mut due = Vec::new();
        self.pending.retain(|(h, at)| {
            if *at <= now {
                due.push(*h);
                false
            } else {
                true
            }
        });
        due
    }

    fn next_due(&self) -> Option<Instant> {
        self.pending.iter().map(|(_, at)| *at).min()
    }

    fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

// ===== Coalescing =====

/// At most one pending render; a new request pre-empts the old one.
#[derive(Debug)]
pub struct CoalescedRender<T> {
    pending: Option<(FrameHandle, T)>,
    superseded: u64,
}

impl<T> Default for CoalescedRender<T> {
    fn default() -> Self {
        Self {
            pending: None,
            superseded: 0,
        }
    }
}

impl<T> CoalescedRender<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any pending frame, then schedule `value` for the next one
    pub fn request<S: FrameScheduler + ?Sized>(&mut self, scheduler: &mut S, value: T) {
        if let Some((old, _)) = self.pending.take() {
            scheduler.cancel_frame(old);
            self.superseded += 1;
            trace!("Coalesced render: cancelled frame {:?}", old);
        }
        let handle = scheduler.request_frame();
        self.pending = Some((handle, value));
    }

    /// Value to render if its frame is among `fired`
    pub fn take_fired(&mut self, fired: &[FrameHandle]) -> Option<T> {
        match self.pending {
            Some((handle, _)) if fired.contains(&handle) => self.pending.take().map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Requests dropped in favour of a newer one
    pub fn superseded(&self) -> u64 {
        self.superseded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_frames_fire_on_advance() {
        let mut frames = ManualFrames::new();
        let a = frames.request_frame();
        assert!(frames.take_due(Instant::now()).is_empty());

        frames.advance();
        let b = frames.request_frame();
        assert_eq!(frames.take_due(Instant::now()), vec![a]);
        assert_eq!(frames.pending_count(), 1);

        frames.cancel_frame(b);
        frames.advance();
        assert!(frames.take_due(Instant::now()).is_empty());
        assert_eq!(frames.frames(), 2);
    }

    #[test]
    fn test_interval_frames_fire_after_boundary() {
        let mut frames = IntervalFrames::new(100); // 10ms
        let h = frames.request_frame();
        let due_at = frames.next_due().unwrap();

        assert!(frames.take_due(due_at - Duration::from_nanos(1)).is_empty());
        assert_eq!(frames.take_due(due_at), vec![h]);
        assert_eq!(frames.pending_count(), 0);
        assert!(frames.next_due().is_none());
    }

    #[test]
    fn test_interval_frames_cancel() {
        let mut frames = IntervalFrames::new(60);
        let h = frames.request_frame();
        frames.cancel_frame(h);
        std::thread::sleep(Duration::from_millis(40));
        assert!(frames.take_due(Instant::now()).is_empty());
    }

    #[test]
    fn test_fps_clamped() {
        assert_eq!(IntervalFrames::new(0).period(), Duration::from_secs(1));
        assert_eq!(IntervalFrames::new(1_000_000).period(), Duration::from_millis(1));
    }

    #[test]
    fn test_coalesce_keeps_latest() {
        let mut frames = ManualFrames::new();
        let mut render = CoalescedRender::new();

        render.request(&mut frames, 25.0);
        render.request(&mut frames, 50.0);
        render.request(&mut frames, 75.0);
        assert_eq!(frames.pending_count(), 1);
        assert_eq!(render.superseded(), 2);

        frames.advance();
        let fired = frames.take_due(Instant::now());
        assert_eq!(fired.len(), 1);
        assert_eq!(render.take_fired(&fired), Some(75.0));
        assert!(!render.is_pending());
        assert_eq!(render.take_fired(&fired), None);
    }

    #[test]
    fn test_coalesce_ignores_foreign_frames() {
        let mut frames = ManualFrames::new();
        let other = frames.request_frame();
        let mut render = CoalescedRender::new();
        render.request(&mut frames, "x");

        assert_eq!(render.take_fired(&[other]), None);
        assert!(render.is_pending());
    }
}
