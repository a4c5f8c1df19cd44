use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{error, warn};

/// Owns fire-and-forget task handles so that shutdown can drain or cancel them
/// instead of leaking detached coroutines.
///
/// The Reconciler submits ChainProcessor tracking calls here rather than calling
/// `tokio::spawn` directly, so `drain` has something to join at shutdown.
#[derive(Default)]
pub struct TaskSupervisor {
    tasks: JoinSet<()>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self { tasks: JoinSet::new() }
    }

    /// Spawns `fut` as a supervised task. Panics and errors surfaced by the task
    /// are logged, never silently dropped.
    pub fn spawn<F>(&mut self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(fut);
        self.reap_finished();
    }

    /// Non-blocking cleanup of already-finished handles, so the JoinSet doesn't
    /// grow without bound across a long-running process.
    fn reap_finished(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(join_err) = result {
                if join_err.is_panic() {
                    error!(error = %join_err, "supervised task panicked");
                }
            }
        }
    }

    /// Waits (up to `grace_period`) for outstanding tasks to finish, then aborts
    /// whatever remains. Called once, at shutdown.
    pub async fn drain(mut self, grace_period: Duration) {
        let outstanding = self.tasks.len();
        if outstanding == 0 {
            return;
        }

        warn!(outstanding, grace_period_s = grace_period.as_secs(), "draining supervised tasks");

        let deadline = tokio::time::sleep(grace_period);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                next = self.tasks.join_next() => {
                    match next {
                        Some(Err(join_err)) if join_err.is_panic() => {
                            error!(error = %join_err, "supervised task panicked during drain");
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
                _ = &mut deadline => {
                    warn!(remaining = self.tasks.len(), "grace period elapsed; aborting remaining tasks");
                    self.tasks.abort_all();
                    break;
                }
            }
        }
    }

    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn drains_completed_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut supervisor = TaskSupervisor::new();
        for _ in 0..3 {
            let counter = counter.clone();
            supervisor.spawn(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        supervisor.drain(Duration::from_secs(1)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn aborts_after_grace_period() {
        let mut supervisor = TaskSupervisor::new();
        supervisor.spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        let start = tokio::time::Instant::now();
        supervisor.drain(Duration::from_millis(20)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
