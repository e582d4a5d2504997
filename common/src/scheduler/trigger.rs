// Trigger conditions that make a deferred task eligible to run

use crate::context::Context;
use futures::future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{self, Instant};
use tracing::debug;

/// When a deferred task becomes eligible to run.
///
/// Fixed for the lifetime of a scheduler instance.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Fire `duration` after the task is registered. Every task gets its own timer.
    FixedDelay(Duration),
    /// Fire once the context is done. Shared by every task of the scheduler.
    ExternalSignal(Context),
}

impl Trigger {
    pub fn after(duration: Duration) -> Self {
        Trigger::FixedDelay(duration)
    }

    pub fn on_signal(ctx: Context) -> Self {
        Trigger::ExternalSignal(ctx)
    }

    /// Adapt a one-shot event into an [`Trigger::ExternalSignal`].
    ///
    /// A watcher task cancels an internal context once a value arrives or the
    /// sender is dropped. Must be called from within a tokio runtime.
    pub fn on_event(event: oneshot::Receiver<()>) -> Self {
        let (signal, fire) = Context::background().with_cancel();
        tokio::spawn(async move {
            match event.await {
                Ok(()) => debug!("Event received, firing trigger"),
                Err(_) => debug!("Event sender dropped, firing trigger"),
            }
            fire.cancel();
        });
        Trigger::ExternalSignal(signal)
    }

    /// Start evaluating the trigger for one task
    pub(crate) fn arm(&self) -> ArmedTrigger {
        match self {
            // A delay past the clock's range never fires on its own
            Trigger::FixedDelay(duration) => match Instant::now().checked_add(*duration) {
                Some(at) => ArmedTrigger::Deadline(at),
                None => ArmedTrigger::Never,
            },
            Trigger::ExternalSignal(ctx) => ArmedTrigger::Signal(ctx.clone()),
        }
    }
}

/// A trigger evaluated for a single task
#[derive(Debug)]
pub(crate) enum ArmedTrigger {
    Deadline(Instant),
    Signal(Context),
    Never,
}

impl ArmedTrigger {
    /// Resolves once the condition holds
    pub(crate) async fn fired(&self) {
        match self {
            ArmedTrigger::Deadline(at) => time::sleep_until(*at).await,
            ArmedTrigger::Signal(ctx) => ctx.done().await,
            ArmedTrigger::Never => future::pending::<()>().await,
        }
    }
}
