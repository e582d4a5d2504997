// Shared helpers for the end-to-end scheduler tests

use common::scheduler::DeferredTask;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Task that bumps `counter` each time it runs
pub fn counting_task(counter: &Arc<AtomicUsize>) -> DeferredTask {
    let counter = Arc::clone(counter);
    DeferredTask::new(move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}
