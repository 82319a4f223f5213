//! Periodic task scheduling.
//!
//! Discovery contributes tasks to a scheduler it does not own. The cache
//! process supplies one `Scheduler` and every discovery service registers its
//! advertise and cleanup tasks on it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A unit of periodic work. One call is one tick; implementations handle
/// their own errors so one bad tick never affects the next.
pub trait PeriodicTask: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self);
}

/// Something that can run tasks at a fixed rate.
pub trait Scheduler: Send + Sync {
    fn schedule_at_fixed_rate(
        &self,
        task: Arc<dyn PeriodicTask>,
        initial_delay: Duration,
        period: Duration,
    );
}

/// Scheduler backed by tokio interval timers.
pub struct TokioScheduler {
    handle: Handle,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Scheduler on the runtime the caller is running in.
    ///
    /// Panics if called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Number of tasks still scheduled.
    pub fn task_count(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.len()
    }

    /// Cancel every scheduled task.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_at_fixed_rate(
        &self,
        task: Arc<dyn PeriodicTask>,
        initial_delay: Duration,
        period: Duration,
    ) {
        let name = task.name();
        tracing::debug!(
            task = name,
            initial_delay_ms = initial_delay.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "scheduling periodic task"
        );

        let handle = self.handle.spawn(async move {
            if !initial_delay.is_zero() {
                tokio::time::sleep(initial_delay).await;
            }
            let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));

            loop {
                interval.tick().await;
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.run())).is_err() {
                    tracing::error!(task = name, "periodic task panicked");
                }
            }
        });
        self.tasks.lock().push(handle);
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
