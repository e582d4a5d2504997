// Deferred scheduler engine

use super::group::TaskGroup;
use super::key::{KeyGenerator, TaskKey, UuidKeyGenerator};
use super::registry::PendingRegistry;
use super::trigger::Trigger;
use crate::context::Context;
use crate::errors::SchedulerError;
use crate::telemetry;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// A unit of deferred work: invoked at most once, possibly never
pub struct DeferredTask {
    run: Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>,
}

impl DeferredTask {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            run: Box::new(move || f().boxed()),
        }
    }

    fn run(self) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.run)()
    }
}

impl fmt::Debug for DeferredTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredTask").finish_non_exhaustive()
    }
}

/// Scheduler trait for deferred execution of tasks
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Schedule `task` and return the key that can cancel it while pending
    fn go(&self, ctx: &Context, task: DeferredTask) -> TaskKey;

    /// Cancel the task behind `key` if it has not fired yet
    fn cancel(&self, key: &TaskKey) -> Result<(), SchedulerError>;

    /// Wait for every scheduled task and release whatever is still pending.
    ///
    /// The first failure is reported by the call that observes it. A later
    /// call with nothing new scheduled returns `Ok(())`.
    async fn wait(&self) -> Result<(), SchedulerError>;
}

/// Runs each task once its trigger fires, unless it is cancelled first.
///
/// Cancellation comes from three places, all of which look the same to a
/// waiting task: [`Scheduler::cancel`] on its key, the context passed to
/// [`Scheduler::go`] becoming done, or a sibling failure cancelling the group
/// context (when that context was the one passed to `go`).
///
/// Must be used from within a tokio runtime.
pub struct DeferredScheduler {
    trigger: Trigger,
    registry: Arc<PendingRegistry>,
    group: TaskGroup,
    keys: Arc<dyn KeyGenerator>,
}

impl DeferredScheduler {
    /// Create a scheduler bound to `parent`.
    ///
    /// The returned context is done once any task fails, `parent` is done, or
    /// `wait` has returned. Pass it to `go` to make tasks sensitive to all three.
    pub fn new(parent: &Context, trigger: Trigger) -> (Self, Context) {
        Self::with_key_generator(parent, trigger, Arc::new(UuidKeyGenerator))
    }

    /// Shortcut for a scheduler with a [`Trigger::FixedDelay`]
    pub fn with_delay(parent: &Context, delay: Duration) -> (Self, Context) {
        Self::new(parent, Trigger::after(delay))
    }

    pub fn with_key_generator(
        parent: &Context,
        trigger: Trigger,
        keys: Arc<dyn KeyGenerator>,
    ) -> (Self, Context) {
        let (group, ctx) = TaskGroup::with_context(parent);
        debug!(trigger = ?trigger, "Deferred scheduler created");

        let scheduler = Self {
            trigger,
            registry: Arc::new(PendingRegistry::new()),
            group,
            keys,
        };
        (scheduler, ctx)
    }

    /// Schedule a closure without boxing it by hand
    pub fn spawn<F, Fut>(&self, ctx: &Context, f: F) -> TaskKey
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.go(ctx, DeferredTask::new(f))
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Number of tasks registered and neither fired nor cancelled
    pub fn pending(&self) -> usize {
        self.registry.len()
    }
}

#[async_trait]
impl Scheduler for DeferredScheduler {
    fn go(&self, ctx: &Context, task: DeferredTask) -> TaskKey {
        let key = self.keys.next_key();

        // Registered before spawning so cancel() never misses a live task
        let (task_ctx, cancel) = ctx.with_cancel();
        self.registry.register(key.clone(), cancel);
        telemetry::update_pending_tasks(self.registry.len());

        let armed = self.trigger.arm();
        let registry = Arc::clone(&self.registry);
        let task_key = key.clone();

        self.group.spawn(async move {
            // Trigger first: an item whose condition already holds is run
            tokio::select! {
                biased;
                _ = armed.fired() => {
                    debug!(key = %task_key, "Trigger fired, running task");
                    telemetry::record_task_fired();

                    let outcome = task.run().await;

                    // Absent if cancel() raced with execution
                    if let Some(cancel) = registry.remove(&task_key) {
                        cancel.cancel();
                    }
                    telemetry::update_pending_tasks(registry.len());

                    outcome.map_err(|err| {
                        warn!(key = %task_key, error = %err, "Deferred task failed");
                        telemetry::record_task_failed();
                        SchedulerError::Task(err)
                    })
                }
                _ = task_ctx.done() => {
                    debug!(
                        key = %task_key,
                        cause = ?task_ctx.cause(),
                        "Task cancelled before trigger fired"
                    );
                    telemetry::record_task_cancelled();
                    Err(SchedulerError::ExecutionCancelled)
                }
            }
        });

        debug!(key = %key, "Task scheduled");
        key
    }

    #[instrument(skip_all, fields(key = %key))]
    fn cancel(&self, key: &TaskKey) -> Result<(), SchedulerError> {
        match self.registry.remove(key) {
            Some(cancel) => {
                cancel.cancel();
                telemetry::update_pending_tasks(self.registry.len());
                debug!("Pending task cancelled");
                Ok(())
            }
            None => {
                debug!("Cancel requested for unknown or finished task");
                Err(SchedulerError::KeyNotFound(key.clone()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn wait(&self) -> Result<(), SchedulerError> {
        let outcome = self.group.wait().await;

        let leftovers = self.registry.drain_all();
        if !leftovers.is_empty() {
            debug!(count = leftovers.len(), "Releasing tasks left in the registry");
        }
        for cancel in leftovers {
            cancel.cancel();
        }
        telemetry::update_pending_tasks(0);

        match &outcome {
            Ok(()) => info!("All deferred tasks completed"),
            Err(e) => warn!(error = %e, kind = e.kind(), "Deferred batch finished with error"),
        }
        outcome
    }
}
