// Task group: spawn, cancel-on-first-error, join

use crate::context::{CancelHandle, Context};
use crate::errors::SchedulerError;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinSet;
use tracing::{debug, warn};

type FirstError = Arc<Mutex<Option<SchedulerError>>>;

/// Runs a batch of fallible tasks.
///
/// The context returned by [`TaskGroup::with_context`] is cancelled as soon as
/// any task fails, and [`TaskGroup::wait`] reports the first failure observed.
/// Dropping the group aborts any task that is still running.
pub struct TaskGroup {
    tasks: Mutex<JoinSet<()>>,
    first_error: FirstError,
    cancel: CancelHandle,
}

impl TaskGroup {
    /// Create a group whose context is derived from `parent`
    pub fn with_context(parent: &Context) -> (TaskGroup, Context) {
        let (ctx, cancel) = parent.with_cancel();
        let group = TaskGroup {
            tasks: Mutex::new(JoinSet::new()),
            first_error: Arc::new(Mutex::new(None)),
            cancel,
        };
        (group, ctx)
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn a task onto the current tokio runtime
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = Result<(), SchedulerError>> + Send + 'static,
    {
        let first_error = Arc::clone(&self.first_error);
        let cancel = self.cancel.clone();

        self.tasks().spawn(async move {
            let outcome = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => Err(SchedulerError::TaskPanicked(panic_message(panic.as_ref()))),
            };

            if let Err(err) = outcome {
                record_failure(&first_error, err);
                cancel.cancel();
            }
        });
    }

    /// Number of tasks not yet joined
    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }

    /// Join every task, including ones spawned while waiting, then cancel the
    /// group context and return the first recorded failure. The failure is
    /// handed out once; a second call returns `Ok(())`.
    pub async fn wait(&self) -> Result<(), SchedulerError> {
        loop {
            let mut batch = std::mem::take(&mut *self.tasks());
            if batch.is_empty() {
                break;
            }
            while let Some(joined) = batch.join_next().await {
                if let Err(e) = joined {
                    // Panics are caught inside the task; this is an abort on runtime shutdown
                    warn!(error = %e, "Task did not run to completion");
                    record_failure(&self.first_error, SchedulerError::TaskPanicked(e.to_string()));
                    self.cancel.cancel();
                }
            }
        }

        self.cancel.cancel();

        let first = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn record_failure(first_error: &Mutex<Option<SchedulerError>>, err: SchedulerError) {
    let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_none() {
        debug!(error = %err, kind = err.kind(), "Recording first task failure");
        *slot = Some(err);
    } else {
        debug!(error = %err, kind = err.kind(), "Dropping later task failure");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
