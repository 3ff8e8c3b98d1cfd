//! Deferred task scheduling.
//!
//! The flusher never sleeps; it asks the host to run a task after a delay.
//! Hosts supply a [`Scheduler`]. [`ManualScheduler`] runs on virtual time
//! and is driven explicitly, which makes every debounce path deterministic.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::trace;

/// A deferred callback.
pub type Task = Box<dyn FnOnce() + Send>;

/// Handle to a scheduled task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

/// Host timer facility.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: Task) -> TimerId;

    /// Best-effort cancellation. A task may still run after this returns.
    fn cancel(&self, id: TimerId);
}

struct Queue {
    now: Duration,
    next_id: u64,
    /// Tasks keyed by (due time, id) so equal deadlines fire in schedule order.
    tasks: BTreeMap<(Duration, u64), Task>,
}

/// Virtual-time scheduler.
pub struct ManualScheduler {
    queue: Mutex<Queue>,
    /// When false, `cancel` is ignored and cancelled tasks still fire.
    honor_cancel: bool,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Queue {
                now: Duration::ZERO,
                next_id: 1,
                tasks: BTreeMap::new(),
            }),
            honor_cancel: true,
        }
    }

    /// A scheduler whose `cancel` never lands, as in hosts where a timer
    /// can race its own cancellation.
    pub fn ignoring_cancel() -> Self {
        Self {
            honor_cancel: false,
            ..Self::new()
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.queue.lock().now
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().tasks.len()
    }

    /// Move time forward, running every task that falls due, in order.
    ///
    /// Tasks scheduled by running tasks are honored if they fall inside
    /// the window. Returns the number of tasks that ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.queue.lock().now + by;
        let mut ran = 0;

        loop {
            let task = {
                let mut queue = self.queue.lock();
                let due = match queue.tasks.keys().next() {
                    Some(&key) if key.0 <= target => key,
                    _ => break,
                };
                queue.now = due.0;
                queue.tasks.remove(&due)
            };

            // Run without holding the queue lock; tasks may schedule more work
            if let Some(task) = task {
                task();
                ran += 1;
            }
        }

        self.queue.lock().now = target;
        ran
    }

    /// Run everything that is pending, however far in the future.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let remaining = {
                let queue = self.queue.lock();
                queue
                    .tasks
                    .keys()
                    .next_back()
                    .map(|(due, _)| due.saturating_sub(queue.now))
            };
            match remaining {
                Some(gap) => ran += self.advance(gap),
                None => return ran,
            }
        }
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let mut queue = self.queue.lock();
        let id = queue.next_id;
        queue.next_id += 1;
        let due = queue.now + delay;
        queue.tasks.insert((due, id), task);
        trace!(id, ?due, "Scheduled task");
        TimerId(id)
    }

    fn cancel(&self, id: TimerId) {
        if !self.honor_cancel {
            return;
        }
        self.queue.lock().tasks.retain(|&(_, task_id), _| task_id != id.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter_task(counter: &Arc<AtomicUsize>) -> Task {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_fires_only_when_due() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(Duration::from_millis(100), counter_task(&counter));

        assert_eq!(scheduler.advance(Duration::from_millis(99)), 0);
        assert_eq!(scheduler.advance(Duration::from_millis(1)), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_cancel() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let id = scheduler.schedule(Duration::from_millis(10), counter_task(&counter));
        scheduler.cancel(id);
        scheduler.run_all();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ignoring_cancel_still_fires() {
        let scheduler = ManualScheduler::ignoring_cancel();
        let counter = Arc::new(AtomicUsize::new(0));

        let id = scheduler.schedule(Duration::from_millis(10), counter_task(&counter));
        scheduler.cancel(id);
        scheduler.run_all();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_nested_schedule_within_window() {
        let scheduler = Arc::new(ManualScheduler::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let inner_scheduler = Arc::clone(&scheduler);
        let inner_counter = Arc::clone(&counter);
        scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                inner_scheduler.schedule(Duration::from_millis(10), counter_task(&inner_counter));
            }),
        );

        assert_eq!(scheduler.advance(Duration::from_millis(25)), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.now(), Duration::from_millis(25));
    }
}
