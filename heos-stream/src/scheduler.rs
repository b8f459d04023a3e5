//! Fixed-delay background jobs
//!
//! Heartbeat, reconnect probe and the post-recovery settle wait are all
//! [`FixedDelayTask`]s: sleep, run one tick, sleep again. Cancellation is
//! only observed while sleeping, so a tick that has started always runs to
//! completion. A tick may cancel its own task.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Whether a task keeps running after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskControl {
    Continue,
    Stop,
}

/// A job that runs every `interval` after an initial delay
///
/// Dropping the handle cancels the job.
#[derive(Debug)]
pub struct FixedDelayTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl FixedDelayTask {
    /// Spawn a job on the current tokio runtime
    pub fn spawn<F, Fut>(
        name: &'static str,
        initial_delay: Duration,
        interval: Duration,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TaskControl> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            tracing::debug!("Starting {} task", name);
            let mut delay = initial_delay;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                if tick().await == TaskControl::Stop {
                    tracing::debug!("{} task stopped itself", name);
                    break;
                }
                delay = interval;
            }
            tracing::debug!("{} task finished", name);
        });

        Self {
            name,
            cancel,
            handle,
        }
    }

    /// Spawn a job that runs once after `delay`
    pub fn once<F, Fut>(name: &'static str, delay: Duration, job: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut job = Some(job);
        Self::spawn(name, delay, delay, move || {
            let job = job.take();
            async move {
                if let Some(job) = job {
                    job().await;
                }
                TaskControl::Stop
            }
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop before the next tick. A running tick is not interrupted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for FixedDelayTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_runs_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let task = FixedDelayTask::spawn(
            "counter",
            Duration::from_millis(5),
            Duration::from_millis(5),
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                        TaskControl::Stop
                    } else {
                        TaskControl::Continue
                    }
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(task.is_finished());
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_before_first_tick() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let task = FixedDelayTask::spawn(
            "cancelled",
            Duration::from_millis(100),
            Duration::from_millis(100),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { TaskControl::Continue }
            },
        );

        task.cancel();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(task.is_cancelled());
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_running_tick_completes_after_cancel() {
        let done = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&done);
        let task = FixedDelayTask::once("slow", Duration::from_millis(1), move || async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        task.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert!(task.is_finished());
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let task = FixedDelayTask::spawn(
            "dropped",
            Duration::from_millis(50),
            Duration::from_millis(50),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { TaskControl::Continue }
            },
        );
        drop(task);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
