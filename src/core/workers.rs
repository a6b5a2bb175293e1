//! Thread pool for image decode jobs.
//!
//! Uses work-stealing deques:
//! - Jobs go to a global injector
//! - Idle workers steal from each other
//!
//! Preloads are fire-and-forget, so there is no cancellation: every queued
//! job runs unless the pool is dropped first.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::trace;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::entities::WorkerPool;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool with work-stealing.
///
/// # Example
/// ```ignore
/// let workers = Workers::new(4);
/// workers.execute(move || {
///     let info = DecodeSource::decode(&path);
///     tx.send(info).ok();
/// });
/// ```
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Create pool with `num_threads` workers (at least one).
    ///
    /// Recommended: `num_cpus::get() * 3 / 4` (leave room for the event loop).
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let workers_local: Vec<Worker<Job>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = workers_local.iter().map(|w| w.stealer()).collect();
        let mut handles = Vec::with_capacity(num_threads);

        for (worker_id, worker) in workers_local.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let spawned = thread::Builder::new()
                .name(format!("imgprogress-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, worker, &injector, &stealers, &shutdown));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => log::error!("Failed to spawn worker {}: {}", worker_id, e),
            }
        }

        trace!("Workers initialized: {} threads (work-stealing)", handles.len());

        Self {
            injector,
            handles,
            shutdown,
        }
    }

    /// Run closure on a worker thread.
    ///
    /// If no worker could be spawned the job runs inline.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.handles.is_empty() {
            f();
            return;
        }
        self.injector.push(Box::new(f));
    }

    pub fn num_threads(&self) -> usize {
        self.handles.len()
    }
}

fn worker_loop(
    worker_id: usize,
    worker: Worker<Job>,
    injector: &Injector<Job>,
    stealers: &[Stealer<Job>],
    shutdown: &AtomicBool,
) {
    trace!("Worker {} started", worker_id);

    loop {
        // 1. Own queue
        if let Some(job) = worker.pop() {
            job();
            continue;
        }

        // 2. Global injector (batch into own queue)
        if let Some(job) = injector.steal_batch_and_pop(&worker).success() {
            job();
            continue;
        }

        // 3. Other workers
        if let Some(job) = stealers.iter().find_map(|s| s.steal().success()) {
            job();
            continue;
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        // Idle: short sleep instead of spinning
        thread::sleep(Duration::from_millis(1));
    }

    trace!("Worker {} stopped", worker_id);
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        self.shutdown.store(true, Ordering::SeqCst);

        // A decode in flight can take a while; don't block the process on it
        let deadline = Instant::now() + Duration::from_millis(500);

        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, exiting anyway");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} workers stopped", num_threads);
    }
}

impl WorkerPool for Workers {
    fn execute(&self, f: Box<dyn FnOnce() + Send + 'static>) {
        Workers::execute(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_all_jobs_run() {
        let workers = Workers::new(3);
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = crossbeam_channel::unbounded();

        for _ in 0..50 {
            let c = Arc::clone(&counter);
            let tx = tx.clone();
            workers.execute(move || {
                c.fetch_add(1, Ordering::SeqCst);
                tx.send(()).ok();
            });
        }

        for _ in 0..50 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_zero_threads_clamped() {
        let workers = Workers::new(0);
        assert_eq!(workers.num_threads(), 1);
    }

    #[test]
    fn test_via_trait_object() {
        let pool: Arc<dyn WorkerPool> = Arc::new(Workers::new(1));
        let (tx, rx) = crossbeam_channel::bounded(1);
        pool.execute(Box::new(move || {
            tx.send(42).ok();
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }
}
