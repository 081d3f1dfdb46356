//! Bounded-concurrency worker pool
//!
//! Each phase runs its tasks through its own pool so that review fan-out
//! cannot starve product fetches. The pool:
//! - Spawns every task onto a `JoinSet`, gated by a `Semaphore` permit
//! - Keeps at most `concurrency` task bodies running at any instant
//! - Turns panics into fatal outcomes instead of aborting siblings
//! - Returns exactly one outcome per submitted task, in completion order

use crate::crawler::retry::{FailureKind, TaskFailure};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};

/// Completed tasks between progress log lines
const PROGRESS_INTERVAL: usize = 25;

/// Terminal state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Succeeded,
    FailedRetryableExhausted,
    FailedFatal,
}

/// The result of one pool task
#[derive(Debug)]
pub struct TaskOutcome<T> {
    pub task_id: String,
    pub result: Result<T, TaskFailure>,
}

impl<T> TaskOutcome<T> {
    pub fn state(&self) -> TaskState {
        match &self.result {
            Ok(_) => TaskState::Succeeded,
            Err(failure) => match failure.kind {
                FailureKind::RetryableExhausted => TaskState::FailedRetryableExhausted,
                FailureKind::Fatal => TaskState::FailedFatal,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Error detail for failed tasks
    pub fn error(&self) -> Option<&str> {
        self.result.as_ref().err().map(|f| f.message.as_str())
    }

    /// Attempts made by the call that failed the task; 0 for successes
    pub fn attempts(&self) -> u32 {
        self.result.as_ref().err().map_or(0, |f| f.attempts)
    }
}

/// Fatal outcome for a task whose body never returned one
fn lost_outcome<T>(task_ids: &mut HashMap<Id, String>, error: JoinError) -> TaskOutcome<T> {
    let task_id = task_ids
        .remove(&error.id())
        .unwrap_or_else(|| format!("task {}", error.id()));
    let reason = if error.is_cancelled() {
        "task cancelled"
    } else {
        "task panicked"
    };

    TaskOutcome {
        task_id,
        result: Err(TaskFailure::fatal(reason)),
    }
}

/// A named pool with a fixed concurrency ceiling
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: String,
    concurrency: usize,
}

impl WorkerPool {
    /// Creates a pool; a concurrency of 0 is raised to 1
    pub fn new(name: impl Into<String>, concurrency: u32) -> Self {
        Self {
            name: name.into(),
            concurrency: concurrency.max(1) as usize,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs every task to completion
    ///
    /// # Arguments
    ///
    /// * `tasks` - `(task id, task body)` pairs
    ///
    /// # Returns
    ///
    /// One [`TaskOutcome`] per task, in the order the tasks finished
    pub async fn run<T, Fut, I>(&self, tasks: I) -> Vec<TaskOutcome<T>>
    where
        I: IntoIterator<Item = (String, Fut)>,
        Fut: Future<Output = Result<T, TaskFailure>> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        let mut task_ids = HashMap::new();

        for (task_id, task) in tasks {
            let semaphore = Arc::clone(&semaphore);
            let key = task_id.clone();
            let handle = set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => match AssertUnwindSafe(task).catch_unwind().await {
                        Ok(result) => result,
                        Err(_) => Err(TaskFailure::fatal("task panicked")),
                    },
                    Err(_) => Err(TaskFailure::fatal("worker pool closed")),
                };
                TaskOutcome { task_id, result }
            });
            task_ids.insert(handle.id(), key);
        }

        let total = set.len();
        tracing::info!(
            "{} pool: {} tasks, {} workers",
            self.name,
            total,
            self.concurrency
        );

        let mut outcomes = Vec::with_capacity(total);
        let mut failed = 0;

        while let Some(joined) = set.join_next_with_id().await {
            let outcome = match joined {
                Ok((id, outcome)) => {
                    task_ids.remove(&id);
                    outcome
                }
                Err(e) => {
                    tracing::error!("{} pool: worker lost: {}", self.name, e);
                    lost_outcome(&mut task_ids, e)
                }
            };

            if let Err(failure) = &outcome.result {
                failed += 1;
                tracing::warn!(
                    "{} task {} failed: {}",
                    self.name,
                    outcome.task_id,
                    failure
                );
            }

            outcomes.push(outcome);

            if outcomes.len() % PROGRESS_INTERVAL == 0 {
                tracing::info!(
                    "{} pool progress: {}/{} done, {} failed",
                    self.name,
                    outcomes.len(),
                    total,
                    failed
                );
            }
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_one_outcome_per_task() {
        let pool = WorkerPool::new("test", 4);
        let tasks = (0..50).map(|i| {
            (format!("task-{}", i), async move {
                if i % 7 == 0 {
                    Err(TaskFailure::fatal("boom"))
                } else {
                    Ok(i)
                }
            })
        });

        let outcomes = pool.run(tasks).await;
        assert_eq!(outcomes.len(), 50);
        assert_eq!(outcomes.iter().filter(|o| !o.is_success()).count(), 8);

        let mut ids: Vec<_> = outcomes.iter().map(|o| o.task_id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[tokio::test]
    async fn test_concurrency_ceiling() {
        let pool = WorkerPool::new("test", 3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..20).map(|i| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            (format!("task-{}", i), async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let outcomes = pool.run(tasks).await;
        assert_eq!(outcomes.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_panic_becomes_fatal_outcome() {
        let pool = WorkerPool::new("test", 2);
        let tasks = (0..3).map(|i| {
            (format!("task-{}", i), async move {
                if i == 1 {
                    panic!("worker exploded");
                }
                Ok(i)
            })
        });

        let outcomes = pool.run(tasks).await;
        assert_eq!(outcomes.len(), 3);

        let panicked = outcomes.iter().find(|o| o.task_id == "task-1").unwrap();
        assert_eq!(panicked.state(), TaskState::FailedFatal);
        assert_eq!(panicked.error(), Some("task panicked"));
    }

    #[tokio::test]
    async fn test_outcome_states() {
        let pool = WorkerPool::new("test", 1);
        let exhausted = TaskFailure {
            kind: FailureKind::RetryableExhausted,
            message: "timeout".to_string(),
            attempts: 3,
        };
        let tasks = vec![
            ("ok".to_string(), futures::future::ready(Ok(1)).boxed()),
            (
                "exhausted".to_string(),
                futures::future::ready(Err(exhausted)).boxed(),
            ),
        ];

        let outcomes = pool.run(tasks).await;
        let ok = outcomes.iter().find(|o| o.task_id == "ok").unwrap();
        let exhausted = outcomes.iter().find(|o| o.task_id == "exhausted").unwrap();

        assert_eq!(ok.state(), TaskState::Succeeded);
        assert_eq!(ok.attempts(), 0);
        assert_eq!(exhausted.state(), TaskState::FailedRetryableExhausted);
        assert_eq!(exhausted.attempts(), 3);
    }

    #[tokio::test]
    async fn test_lost_task_keeps_its_id() {
        let mut set = JoinSet::new();
        let handle = set.spawn(futures::future::pending::<()>());
        let mut task_ids = HashMap::from([(handle.id(), "product:42".to_string())]);
        handle.abort();

        let error = set.join_next().await.unwrap().unwrap_err();
        let outcome: TaskOutcome<()> = lost_outcome(&mut task_ids, error);

        assert_eq!(outcome.task_id, "product:42");
        assert_eq!(outcome.state(), TaskState::FailedFatal);
        assert_eq!(outcome.error(), Some("task cancelled"));
        assert!(task_ids.is_empty());
    }

    #[test]
    fn test_zero_concurrency_is_raised() {
        assert_eq!(WorkerPool::new("test", 0).concurrency(), 1);
    }
}
