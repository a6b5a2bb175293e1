//! Pub/Sub event bus for tracker observers.
//!
//! - Observers subscribe to event types with callbacks (immediate invocation)
//! - emit() invokes callbacks immediately AND queues for deferred processing
//! - poll() returns queued events for batch processing in a host loop
//! - a bus built with `callbacks_only()` never queues; use it when nobody polls
//!
//! Callback order: FIFO (first-subscribed, first-called) within same event type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use log::warn;

/// Maximum events in queue before oldest are evicted
const MAX_QUEUE_SIZE: usize = 1000;

/// Marker trait for events. Events must be Send + Sync + 'static.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;
type Subscribers = Arc<RwLock<HashMap<TypeId, Vec<Callback>>>>;
type Queue = Option<Arc<Mutex<Vec<BoxedEvent>>>>;

/// Boxed event for queue storage
pub type BoxedEvent = Box<dyn Event>;

/// Event bus with immediate callbacks and a deferred queue.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Subscribers,
    queue: Queue,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Subscribers::default(),
            queue: Some(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Bus without the deferred queue: emit() only runs callbacks.
    pub fn callbacks_only() -> Self {
        Self {
            subscribers: Subscribers::default(),
            queue: None,
        }
    }

    /// Subscribe to events of type E.
    ///
    /// # Example
    /// ```ignore
    /// bus.subscribe::<ProgressRendered, _>(move |e| bar.set_position(e.percent as u64));
    /// ```
    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    /// Invoke callbacks immediately AND queue for poll().
    pub fn emit<E: Event + Clone>(&self, event: E) {
        dispatch(&self.subscribers, &self.queue, event);
    }

    /// All events emitted since last poll.
    pub fn poll(&self) -> Vec<BoxedEvent> {
        match &self.queue {
            Some(queue) => std::mem::take(&mut *queue.lock().unwrap_or_else(|e| e.into_inner())),
            None => Vec::new(),
        }
    }

    /// Emitter handle for the tracker.
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            subscribers: Arc::clone(&self.subscribers),
            queue: self.queue.clone(),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue
            .as_ref()
            .map_or(0, |q| q.lock().unwrap_or_else(|e| e.into_inner()).len())
    }
}

fn dispatch<E: Event + Clone>(subscribers: &Subscribers, queue: &Queue, event: E) {
    if let Some(cbs) = subscribers
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(&TypeId::of::<E>())
    {
        for cb in cbs {
            cb(&event);
        }
    }

    let Some(queue) = queue else {
        return;
    };
    let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
    if queue.len() >= MAX_QUEUE_SIZE {
        let evict_count = queue.len() / 2;
        warn!("Event queue full ({} events), evicting oldest {}", queue.len(), evict_count);
        queue.drain(0..evict_count);
    }
    queue.push(Box::new(event));
}

/// Cloneable emitter handle.
#[derive(Clone)]
pub struct EventEmitter {
    subscribers: Subscribers,
    queue: Queue,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("subscriber_types", &self.subscribers.read().map(|s| s.len()).unwrap_or(0))
            .field(
                "queue_len",
                &self.queue.as_ref().and_then(|q| q.lock().ok().map(|q| q.len())),
            )
            .finish()
    }
}

impl EventEmitter {
    pub fn emit<E: Event + Clone>(&self, event: E) {
        dispatch(&self.subscribers, &self.queue, event);
    }
}

/// Tracker-side emitter (no-op until attached to a bus)
#[derive(Clone, Default, Debug)]
pub struct TrackerEventEmitter {
    inner: Option<EventEmitter>,
}

impl TrackerEventEmitter {
    pub fn dummy() -> Self {
        Self { inner: None }
    }

    pub fn from_emitter(emitter: EventEmitter) -> Self {
        Self { inner: Some(emitter) }
    }

    pub fn emit<E: Event + Clone>(&self, event: E) {
        if let Some(ref emitter) = self.inner {
            emitter.emit(event);
        }
    }
}

/// Downcast BoxedEvent to concrete type.
///
/// Must deref to `dyn Event` before `as_any()`, otherwise the blanket impl
/// for `Box<dyn Event>` answers and the downcast always fails.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[derive(Clone, Debug)]
    struct TestEvent {
        value: i32,
    }

    #[derive(Clone, Debug)]
    struct OtherEvent;

    #[test]
    fn test_subscribe_emit_immediate() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        bus.subscribe::<TestEvent, _>(move |e| {
            c.fetch_add(e.value, Ordering::SeqCst);
        });

        bus.emit(TestEvent { value: 10 });
        bus.emit(OtherEvent);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(bus.queue_len(), 2);
    }

    #[test]
    fn test_emitter_and_poll() {
        let bus = EventBus::new();
        let emitter = TrackerEventEmitter::from_emitter(bus.emitter());
        emitter.emit(TestEvent { value: 42 });
        TrackerEventEmitter::dummy().emit(TestEvent { value: 1 });

        let events = bus.poll();
        assert_eq!(events.len(), 1);
        assert_eq!(downcast_event::<TestEvent>(&events[0]).map(|e| e.value), Some(42));
        assert!(downcast_event::<OtherEvent>(&events[0]).is_none());
        assert!(bus.poll().is_empty());
    }

    #[test]
    fn test_queue_eviction() {
        let bus = EventBus::new();
        for i in 0..(MAX_QUEUE_SIZE as i32 + 1) {
            bus.emit(TestEvent { value: i });
        }
        assert_eq!(bus.queue_len(), MAX_QUEUE_SIZE / 2 + 1);
    }

    #[test]
    fn test_callbacks_only_never_queues() {
        let bus = EventBus::callbacks_only();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        bus.subscribe::<TestEvent, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let emitter = TrackerEventEmitter::from_emitter(bus.emitter());
        for i in 0..(MAX_QUEUE_SIZE as i32 * 2) {
            emitter.emit(TestEvent { value: i });
        }
        assert_eq!(counter.load(Ordering::SeqCst), MAX_QUEUE_SIZE as i32 * 2);
        assert_eq!(bus.queue_len(), 0);
        assert!(bus.poll().is_empty());
    }
}
