//! Concurrency-limited task scheduler with quiescence detection.
//!
//! A FIFO queue of pending tasks is drained by [`TaskScheduler::run_until_quiescent`],
//! which keeps up to `max_in_flight` task bodies executing concurrently.
//! Tasks are self-feeding: a running body may [`submit`](TaskScheduler::submit)
//! more work. The loop terminates exactly when the queue is empty and no task
//! is executing — both conditions observed under a single lock, so a body
//! that is about to submit more work can never race the exit decision.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, error};

struct Inner<T> {
    queue: VecDeque<T>,
    in_flight: usize,
}

/// FIFO scheduler dispatching tasks with a maximum concurrency.
pub struct TaskScheduler<T> {
    inner: Mutex<Inner<T>>,
    max_in_flight: usize,
    /// Woken on submission and on task completion; the run loop re-evaluates
    /// its dispatch/exit predicates on every wake.
    wake: Notify,
}

impl<T: Send + 'static> TaskScheduler<T> {
    pub fn new(max_in_flight: usize) -> Arc<Self> {
        assert!(max_in_flight > 0, "max_in_flight must be at least 1");
        Arc::new(Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                in_flight: 0,
            }),
            max_in_flight,
            wake: Notify::new(),
        })
    }

    /// Append a task to the tail of the queue. Callable from running tasks.
    pub async fn submit(&self, task: T) {
        self.inner.lock().await.queue.push_back(task);
        self.wake.notify_one();
    }

    /// Number of tasks waiting in the queue.
    pub async fn queued(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    /// Number of tasks currently executing.
    pub async fn in_flight(&self) -> usize {
        self.inner.lock().await.in_flight
    }

    /// Drain the queue, running up to `max_in_flight` task bodies at a time,
    /// until the queue is empty and every dispatched body has returned.
    ///
    /// Each body runs in its own spawned task; a wrapper awaits its join
    /// handle so the in-flight count is decremented only after the body has
    /// fully returned — including any submissions it made, and including the
    /// case where it panicked.
    pub async fn run_until_quiescent<F, Fut>(self: &Arc<Self>, run: F)
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        loop {
            // Register interest before checking state so a wake arriving
            // between the check and the await is not lost.
            let woken = self.wake.notified();

            let next = {
                let mut inner = self.inner.lock().await;
                if inner.queue.is_empty() && inner.in_flight == 0 {
                    debug!("scheduler quiescent, exiting");
                    return;
                }
                if inner.in_flight < self.max_in_flight {
                    if let Some(task) = inner.queue.pop_front() {
                        inner.in_flight += 1;
                        Some(task)
                    } else {
                        None
                    }
                } else {
                    None
                }
            };

            match next {
                Some(task) => {
                    let scheduler = Arc::clone(self);
                    let body = tokio::spawn(run(task));
                    tokio::spawn(async move {
                        if let Err(e) = body.await {
                            error!("Task panicked: {e}");
                        }
                        scheduler.inner.lock().await.in_flight -= 1;
                        scheduler.wake.notify_one();
                    });
                }
                // At capacity, or queue momentarily empty with work still in
                // flight: sleep until a submission or completion wakes us.
                None => woken.await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn empty_scheduler_returns_immediately() {
        let scheduler = TaskScheduler::<()>::new(4);
        scheduler.run_until_quiescent(|()| async {}).await;
    }

    #[tokio::test]
    async fn runs_every_submitted_task() {
        let scheduler = TaskScheduler::new(4);
        for i in 0..20 {
            scheduler.submit(i).await;
        }
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        scheduler
            .run_until_quiescent(move |_task: usize| {
                let counter = Arc::clone(&counter);
                async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;
        assert_eq!(ran.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn panicking_task_still_decrements_in_flight() {
        let scheduler = TaskScheduler::new(2);
        scheduler.submit(0_usize).await;
        scheduler.submit(1_usize).await;
        scheduler
            .run_until_quiescent(|task: usize| async move {
                if task == 0 {
                    panic!("induced failure");
                }
            })
            .await;
        assert_eq!(scheduler.in_flight().await, 0);
        assert_eq!(scheduler.queued().await, 0);
    }
}
