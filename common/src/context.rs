// Cancellation contexts shared between the scheduler, its task group and callers

use futures::future::{self, BoxFuture, FutureExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant};

/// Why a context became done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneCause {
    /// A cancel handle was invoked on this context or an ancestor
    Cancelled,
    /// The deadline of this context or an ancestor passed
    DeadlineExceeded,
}

struct ContextInner {
    state: watch::Sender<Option<DoneCause>>,
    parent: Option<Context>,
    deadline: Option<Instant>,
}

impl ContextInner {
    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|at| Instant::now() >= at)
    }
}

/// A tree-structured cancellation signal.
///
/// A context becomes done exactly once: when its own [`CancelHandle`] is
/// invoked, when its deadline passes, or when its parent becomes done.
/// Cloning is cheap and every clone observes the same signal.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Root context, never done
    pub fn background() -> Self {
        Self::new(None, None)
    }

    fn new(parent: Option<Context>, deadline: Option<Instant>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            inner: Arc::new(ContextInner {
                state,
                parent,
                deadline,
            }),
        }
    }

    /// Derive a child context that can be cancelled independently of its parent
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        self.derive(None)
    }

    /// Derive a child context that is also done once `timeout` has elapsed.
    /// A timeout past the clock's range sets no deadline.
    pub fn with_timeout(&self, timeout: Duration) -> (Context, CancelHandle) {
        self.derive(Instant::now().checked_add(timeout))
    }

    /// Derive a child context that is also done at `deadline`
    pub fn with_deadline(&self, deadline: Instant) -> (Context, CancelHandle) {
        self.derive(Some(deadline))
    }

    fn derive(&self, deadline: Option<Instant>) -> (Context, CancelHandle) {
        let child = Context::new(Some(self.clone()), deadline);
        let handle = CancelHandle {
            inner: Arc::clone(&child.inner),
        };
        (child, handle)
    }

    /// Earliest deadline along the ancestor chain
    pub fn deadline(&self) -> Option<Instant> {
        let inherited = self.inner.parent.as_ref().and_then(Context::deadline);
        match (self.inner.deadline, inherited) {
            (Some(own), Some(parent)) => Some(own.min(parent)),
            (own, parent) => own.or(parent),
        }
    }

    pub fn is_done(&self) -> bool {
        self.cause().is_some()
    }

    /// Cause of completion, `None` while the context is still live
    pub fn cause(&self) -> Option<DoneCause> {
        if let Some(cause) = *self.inner.state.borrow() {
            return Some(cause);
        }
        if let Some(cause) = self.inner.parent.as_ref().and_then(Context::cause) {
            return Some(cause);
        }
        if self.inner.deadline_passed() {
            return Some(DoneCause::DeadlineExceeded);
        }
        None
    }

    /// Resolves once the context is done. Resolves immediately if it already is.
    pub fn done(&self) -> BoxFuture<'_, ()> {
        async move {
            let mut rx = self.inner.state.subscribe();
            let own = async {
                loop {
                    let fired = rx.borrow_and_update().is_some();
                    if fired {
                        break;
                    }
                    if rx.changed().await.is_err() {
                        future::pending::<()>().await;
                    }
                }
            };
            let deadline = async {
                match self.inner.deadline {
                    Some(at) => time::sleep_until(at).await,
                    None => future::pending::<()>().await,
                }
            };
            let parent = async {
                match &self.inner.parent {
                    Some(parent) => parent.done().await,
                    None => future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = own => {}
                _ = deadline => {}
                _ = parent => {}
            }
        }
        .boxed()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cause", &self.cause())
            .field("deadline", &self.inner.deadline)
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

/// Handle that marks its context as done. Idempotent and non-blocking.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<ContextInner>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let cause = if self.inner.deadline_passed() {
            DoneCause::DeadlineExceeded
        } else {
            DoneCause::Cancelled
        };
        self.inner.state.send_if_modified(|state| {
            if state.is_none() {
                *state = Some(cause);
                true
            } else {
                false
            }
        });
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.inner.state.borrow().is_some())
            .finish()
    }
}
