use super::cancel::CancellationToken;
use super::error::{BatchError, EngineError, TaskError};
use super::progress::{Progress, ProgressReporter};
use crate::core::models::candidate::Candidate;
use crate::core::models::ids::TaskId;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A unit of work run by the [`TaskBatchManager`].
pub trait BatchTask: Send {
    fn id(&self) -> TaskId;

    /// Runs the task. Implementations check `token` between stages and give
    /// up with [`EngineError::Cancelled`] once it is cancelled.
    fn execute(self: Box<Self>, token: &CancellationToken) -> Result<Vec<Candidate>, EngineError>;
}

/// Runs batches of tasks on a bounded pool of worker threads.
#[derive(Debug, Clone)]
pub struct TaskBatchManager {
    token: CancellationToken,
    termination_timeout: Duration,
}

impl TaskBatchManager {
    /// The manager stops together with `parent`, and can also be stopped on
    /// its own.
    pub fn new(parent: &CancellationToken, termination_timeout: Duration) -> Self {
        Self {
            token: parent.child(),
            termination_timeout,
        }
    }

    /// Asks running tasks to finish early and drops tasks not yet started.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// A token whose cancellation stops this manager, usable from another
    /// thread while a batch is running.
    pub fn stop_handle(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Runs every task on at most `max_workers` threads and blocks until
    /// all of them are done, in whatever order they complete.
    ///
    /// # Errors
    ///
    /// - [`BatchError::TaskFailed`] for the first task that fails; the other
    ///   tasks are stopped and what completed before is handed back.
    /// - [`BatchError::Stopped`] when the manager (or its parent token) is
    ///   stopped.
    /// - [`BatchError::Pool`] when no worker thread can be started.
    pub fn execute_tasks(
        &self,
        tasks: Vec<Box<dyn BatchTask>>,
        max_workers: usize,
        reporter: &ProgressReporter,
    ) -> Result<Vec<Candidate>, BatchError> {
        let total = tasks.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        if self.token.is_cancelled() {
            return Err(BatchError::Stopped {
                completed: Vec::new(),
                total,
            });
        }
        let workers = max_workers.clamp(1, total);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("forge-worker-{i}"))
            .build()
            .map_err(|e| BatchError::Pool(e.to_string()))?;
        debug!(tasks = total, workers, "Submitting batch");

        let batch = self.token.child();
        let (sender, receiver) = mpsc::channel();
        for task in tasks {
            let sender = sender.clone();
            let token = batch.clone();
            pool.spawn(move || {
                let id = task.id();
                let outcome = if token.is_cancelled() {
                    Err(EngineError::Cancelled)
                } else {
                    task.execute(&token)
                };
                // The receiver is gone only if the batch was abandoned.
                let _ = sender.send((id, outcome));
            });
        }
        drop(sender);

        reporter.report(Progress::TaskStart {
            total_steps: total as u64,
        });
        let mut completed = Vec::new();
        let mut failure: Option<TaskError> = None;
        let mut deadline: Option<Instant> = None;
        let mut received = 0;

        while received < total {
            if deadline.is_none() && self.token.is_cancelled() {
                debug!("Batch stop requested");
                batch.cancel();
                deadline = Some(Instant::now() + self.termination_timeout);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(
                    pending = total - received,
                    "Tasks did not terminate within {:?}; abandoning them", self.termination_timeout
                );
                break;
            }
            match receiver.recv_timeout(POLL_INTERVAL) {
                Ok((id, outcome)) => {
                    received += 1;
                    reporter.report(Progress::TaskIncrement);
                    match outcome {
                        Ok(candidates) => completed.extend(candidates),
                        Err(EngineError::Cancelled) => debug!(task = %id, "Task cancelled"),
                        Err(source) if failure.is_none() => {
                            error!(task = %id, error = %source, "Task failed; stopping the batch");
                            failure = Some(TaskError { task: id, source });
                            batch.cancel();
                            deadline = Some(Instant::now() + self.termination_timeout);
                        }
                        Err(source) => debug!(task = %id, error = %source, "Further task failure"),
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        reporter.report(Progress::TaskFinish);

        if let Some(error) = failure {
            return Err(BatchError::TaskFailed { error, completed });
        }
        if self.token.is_cancelled() {
            return Err(BatchError::Stopped { completed, total });
        }
        if received < total {
            return Err(BatchError::Pool(format!(
                "{} of {total} tasks never reported back",
                total - received
            )));
        }
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::graph::Graph;
    use crate::core::models::ids::GraphId;
    use std::collections::HashSet;
    use std::thread;

    struct Sleepy {
        id: u64,
        millis: u64,
        fail: bool,
    }

    impl BatchTask for Sleepy {
        fn id(&self) -> TaskId {
            TaskId(self.id)
        }

        fn execute(self: Box<Self>, token: &CancellationToken) -> Result<Vec<Candidate>, EngineError> {
            let end = Instant::now() + Duration::from_millis(self.millis);
            while Instant::now() < end {
                token.check()?;
                thread::sleep(Duration::from_millis(5));
            }
            if self.fail {
                return Err(EngineError::ExternalProcess("exit status 1".into()));
            }
            Ok(vec![Candidate::new(format!("M{:08}", self.id), Graph::new(GraphId(self.id)))])
        }
    }

    fn tasks(n: u64, millis: u64, failing: Option<u64>) -> Vec<Box<dyn BatchTask>> {
        (1..=n)
            .map(|id| {
                Box::new(Sleepy {
                    id,
                    millis,
                    fail: failing == Some(id),
                }) as Box<dyn BatchTask>
            })
            .collect()
    }

    #[test]
    fn every_task_reports_exactly_once() {
        let manager = TaskBatchManager::new(&CancellationToken::new(), Duration::from_secs(5));
        let results = manager
            .execute_tasks(tasks(10, 10, None), 3, &ProgressReporter::new())
            .unwrap();
        assert_eq!(results.len(), 10);
        let names: HashSet<_> = results.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names.len(), 10);
    }

    #[test]
    fn failure_keeps_completed_results() {
        let manager = TaskBatchManager::new(&CancellationToken::new(), Duration::from_secs(5));
        let err = manager
            .execute_tasks(tasks(4, 10, Some(1)), 1, &ProgressReporter::new())
            .unwrap_err();
        match err {
            BatchError::TaskFailed { error, .. } => assert_eq!(error.task, TaskId(1)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stop_returns_within_the_timeout() {
        let manager = TaskBatchManager::new(&CancellationToken::new(), Duration::from_secs(2));
        let stopper = manager.stop_handle();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            stopper.cancel();
        });
        let started = Instant::now();
        let result = manager.execute_tasks(tasks(6, 10_000, None), 3, &ProgressReporter::new());
        handle.join().unwrap();
        assert!(matches!(result, Err(BatchError::Stopped { total: 6, .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn stopped_manager_runs_nothing() {
        let manager = TaskBatchManager::new(&CancellationToken::new(), Duration::from_secs(1));
        manager.stop();
        let result = manager.execute_tasks(tasks(2, 10, None), 2, &ProgressReporter::new());
        assert!(matches!(result, Err(BatchError::Stopped { ref completed, .. }) if completed.is_empty()));
    }
}
