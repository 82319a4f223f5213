//! Bounded dispatch pool for inbound discovery messages.
//!
//! A fixed number of worker tasks drain a bounded queue. When the queue is
//! full, submitting drops the oldest queued job: fresh announcements are
//! worth more than stale ones, and the receive loop must never wait.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Workers in the receiver's dispatch pool.
pub const DISPATCH_POOL_SIZE: usize = 2;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    discarded: AtomicU64,
}

pub struct DispatchPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DispatchPool {
    /// Spawn `size` workers on the current tokio runtime.
    ///
    /// Must be called from within a runtime.
    pub fn new(size: usize, capacity: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            discarded: AtomicU64::new(0),
        });

        let workers = (0..size.max(1))
            .map(|id| tokio::spawn(worker_loop(id, shared.clone())))
            .collect();

        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Queue a job. Returns false if the pool is shut down.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            return false;
        }

        {
            let mut queue = self.shared.queue.lock();
            if queue.len() >= self.shared.capacity {
                queue.pop_front();
                let total = self.shared.discarded.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(discarded = total, "dispatch queue full, dropped oldest job");
            }
            queue.push_back(Box::new(job));
        }
        self.shared.notify.notify_one();
        true
    }

    /// Jobs dropped because the queue was full.
    pub fn discarded(&self) -> u64 {
        self.shared.discarded.load(Ordering::Relaxed)
    }

    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Stop the workers and drop every job still queued. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = {
            let mut queue = self.shared.queue.lock();
            let n = queue.len();
            queue.clear();
            n
        };
        self.shared.notify.notify_waiters();
        for worker in self.workers.lock().drain(..) {
            worker.abort();
        }
        tracing::debug!(dropped, "dispatch pool shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl Drop for DispatchPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn worker_loop(id: usize, shared: Arc<Shared>) {
    loop {
        let job = shared.queue.lock().pop_front();
        match job {
            Some(job) => {
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
                    tracing::error!(worker = id, "dispatch job panicked");
                }
                // Let the receive loop run between jobs on a single-threaded runtime.
                tokio::task::yield_now().await;
            }
            None => {
                if shared.closed.load(Ordering::Acquire) {
                    return;
                }
                shared.notify.notified().await;
            }
        }
    }
}
