//! Bounded worker pool for independent sandbox commands.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

/// A unit of work submitted to [`WorkerPool::execute`].
pub type Task<'a, T> = Box<dyn FnOnce() -> Result<T> + Send + 'a>;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task {index} failed: {source:#}")]
    Failed {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("task {index} panicked: {message}")]
    Panicked { index: usize, message: String },
    #[error("task {index} was not started before the {}s deadline", .deadline.as_secs())]
    TimedOut { index: usize, deadline: Duration },
}

impl TaskError {
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            TaskError::Failed { index, .. }
            | TaskError::Panicked { index, .. }
            | TaskError::TimedOut { index, .. } => *index,
        }
    }
}

/// Runs at most `workers` tasks at a time and stops handing out new tasks
/// once `deadline` has elapsed. Tasks already running are left to finish.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
    deadline: Duration,
}

impl WorkerPool {
    #[must_use]
    pub fn new(workers: usize, deadline: Duration) -> Self {
        Self {
            workers: workers.max(1),
            deadline,
        }
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Executes `tasks` and returns one result per task, in submission order.
    ///
    /// A failing or panicking task never affects its siblings. Tasks still
    /// queued when the deadline passes are reported as [`TaskError::TimedOut`].
    pub fn execute<'a, T: Send + 'a>(&self, tasks: Vec<Task<'a, T>>) -> Vec<Result<T, TaskError>> {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }
        let started = Instant::now();
        let deadline = self.deadline;

        let (job_tx, job_rx) = mpsc::channel::<(usize, Task<'a, T>)>();
        for job in tasks.into_iter().enumerate() {
            if job_tx.send(job).is_err() {
                break;
            }
        }
        drop(job_tx);
        let job_rx = Mutex::new(job_rx);
        let (result_tx, result_rx) = mpsc::channel();

        thread::scope(|scope| {
            for _ in 0..self.workers.min(total) {
                let job_rx = &job_rx;
                let result_tx = result_tx.clone();
                scope.spawn(move || loop {
                    if started.elapsed() >= deadline {
                        break;
                    }
                    let job = match job_rx.lock() {
                        Ok(guard) => guard.recv(),
                        Err(_) => break,
                    };
                    let Ok((index, task)) = job else {
                        break;
                    };
                    if started.elapsed() >= deadline {
                        break;
                    }
                    tracing::trace!(index, "worker picked up task");
                    let outcome = match panic::catch_unwind(AssertUnwindSafe(task)) {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(source)) => Err(TaskError::Failed { index, source }),
                        Err(payload) => Err(TaskError::Panicked {
                            index,
                            message: panic_message(payload.as_ref()),
                        }),
                    };
                    if result_tx.send((index, outcome)).is_err() {
                        break;
                    }
                });
            }
        });
        drop(result_tx);

        let mut slots: Vec<Option<Result<T, TaskError>>> = (0..total).map(|_| None).collect();
        for (index, outcome) in result_rx {
            slots[index] = Some(outcome);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    tracing::warn!(index, deadline_secs = deadline.as_secs(), "task timed out");
                    Err(TaskError::TimedOut { index, deadline })
                })
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn results_follow_submission_order() {
        let pool = WorkerPool::new(3, Duration::from_secs(10));
        let tasks: Vec<Task<'_, usize>> = (0..6usize)
            .map(|value| {
                Box::new(move || -> Result<usize> {
                    thread::sleep(Duration::from_millis(((6 - value) * 5) as u64));
                    Ok(value * 10)
                }) as Task<'_, usize>
            })
            .collect();
        let values: Vec<usize> = pool
            .execute(tasks)
            .into_iter()
            .map(|result| result.expect("task result"))
            .collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40, 50]);
    }

    #[test]
    fn concurrency_never_exceeds_worker_count() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let pool = WorkerPool::new(2, Duration::from_secs(10));
        let tasks: Vec<Task<'_, ()>> = (0..8)
            .map(|_| {
                let active = &active;
                let peak = &peak;
                Box::new(move || -> Result<()> {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }) as Task<'_, ()>
            })
            .collect();
        assert!(pool.execute(tasks).iter().all(Result::is_ok));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn failures_and_panics_stay_isolated() {
        let pool = WorkerPool::new(2, Duration::from_secs(10));
        let tasks: Vec<Task<'_, &'static str>> = vec![
            Box::new(|| -> Result<&'static str> { Ok("first") }),
            Box::new(|| -> Result<&'static str> { anyhow::bail!("manager missing") }),
            Box::new(|| -> Result<&'static str> { panic!("boom") }),
            Box::new(|| -> Result<&'static str> { Ok("last") }),
        ];
        let results = pool.execute(tasks);
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().ok(), Some(&"first"));
        match &results[1] {
            Err(TaskError::Failed { index, source }) => {
                assert_eq!(*index, 1);
                assert!(source.to_string().contains("manager missing"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &results[2] {
            Err(TaskError::Panicked { message, .. }) => assert_eq!(message, "boom"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(results[3].as_ref().ok(), Some(&"last"));
    }

    #[test]
    fn queued_tasks_time_out_after_deadline() {
        let pool = WorkerPool::new(1, Duration::from_millis(50));
        let tasks: Vec<Task<'_, u8>> = vec![
            Box::new(|| -> Result<u8> {
                thread::sleep(Duration::from_millis(150));
                Ok(1)
            }),
            Box::new(|| -> Result<u8> { Ok(2) }),
            Box::new(|| -> Result<u8> { Ok(3) }),
        ];
        let results = pool.execute(tasks);
        assert_eq!(results[0].as_ref().ok(), Some(&1));
        for (index, result) in results.iter().enumerate().skip(1) {
            match result {
                Err(err @ TaskError::TimedOut { .. }) => assert_eq!(err.index(), index),
                other => panic!("expected timeout, got {other:?}"),
            }
        }
    }

    #[test]
    fn empty_batch_returns_nothing() {
        let pool = WorkerPool::new(4, Duration::from_secs(1));
        let results = pool.execute(Vec::<Task<'_, ()>>::new());
        assert!(results.is_empty());
    }
}
