// Property-based tests for the deferred scheduler

use common::context::Context;
use common::scheduler::{
    DeferredScheduler, KeyGenerator, PendingRegistry, Scheduler, TaskKey, UuidKeyGenerator,
};
use common::SchedulerError;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum RegistryOp {
    Register(u8),
    Remove(u8),
    Drain,
}

fn registry_op() -> impl Strategy<Value = RegistryOp> {
    prop_oneof![
        4 => any::<u8>().prop_map(|k| RegistryOp::Register(k % 16)),
        4 => any::<u8>().prop_map(|k| RegistryOp::Remove(k % 16)),
        1 => Just(RegistryOp::Drain),
    ]
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .expect("failed to build runtime")
}

/// Generated keys never collide within one scheduler lifetime
#[test]
fn property_uuid_keys_are_unique() {
    proptest!(|(count in 1usize..500usize)| {
        let generator = UuidKeyGenerator;
        let keys: HashSet<TaskKey> = (0..count).map(|_| generator.next_key()).collect();
        prop_assert_eq!(keys.len(), count);
    });
}

/// The registry behaves like a map whose handles are removed exactly once
#[test]
fn property_registry_matches_model() {
    proptest!(|(ops in proptest::collection::vec(registry_op(), 1..64))| {
        let registry = PendingRegistry::new();
        let mut model: HashMap<u8, Context> = HashMap::new();
        let mut released: Vec<Context> = Vec::new();

        for op in ops {
            match op {
                RegistryOp::Register(k) => {
                    if model.contains_key(&k) {
                        continue;
                    }
                    let (ctx, cancel) = Context::background().with_cancel();
                    registry.register(TaskKey::from(k.to_string()), cancel);
                    model.insert(k, ctx);
                }
                RegistryOp::Remove(k) => {
                    let removed = registry.remove(&TaskKey::from(k.to_string()));
                    prop_assert_eq!(removed.is_some(), model.contains_key(&k));
                    if let (Some(cancel), Some(ctx)) = (removed, model.remove(&k)) {
                        cancel.cancel();
                        released.push(ctx);
                    }
                }
                RegistryOp::Drain => {
                    let drained = registry.drain_all();
                    prop_assert_eq!(drained.len(), model.len());
                    drained.iter().for_each(|cancel| cancel.cancel());
                    released.extend(model.drain().map(|(_, ctx)| ctx));
                }
            }
            prop_assert_eq!(registry.len(), model.len());
        }

        prop_assert!(released.iter().all(Context::is_done));
        prop_assert!(model.values().all(|ctx| !ctx.is_done()));
    });
}

/// N calls to go() yield N distinct keys and N executions
#[test]
fn property_every_scheduled_task_runs_once() {
    proptest!(ProptestConfig::with_cases(32), |(count in 1usize..64usize, delay_ms in 1u64..5000u64)| {
        let runtime = paused_runtime();
        let (keys, ran, pending) = runtime.block_on(async {
            let (scheduler, ctx) = DeferredScheduler::with_delay(
                &Context::background(),
                Duration::from_millis(delay_ms),
            );
            let ran = Arc::new(AtomicUsize::new(0));

            let keys: HashSet<TaskKey> = (0..count)
                .map(|_| {
                    let ran = Arc::clone(&ran);
                    scheduler.spawn(&ctx, move || async move {
                        ran.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                })
                .collect();

            scheduler.wait().await.expect("batch should succeed");
            (keys, ran.load(Ordering::SeqCst), scheduler.pending())
        });

        prop_assert_eq!(pending, 0);
        prop_assert_eq!(keys.len(), count);
        prop_assert_eq!(ran, count);
    });
}

/// Cancelling any subset of keys skips exactly that subset
#[test]
fn property_cancelled_subset_never_runs() {
    proptest!(ProptestConfig::with_cases(32), |(mask in proptest::collection::vec(any::<bool>(), 1..32))| {
        let runtime = paused_runtime();
        let outcome = runtime.block_on(async {
            let (parent, _cancel_parent) = Context::background().with_cancel();
            let (scheduler, _ctx) =
                DeferredScheduler::with_delay(&parent, Duration::from_secs(1));
            let ran: Arc<Vec<AtomicUsize>> =
                Arc::new((0..mask.len()).map(|_| AtomicUsize::new(0)).collect());

            let keys: Vec<TaskKey> = (0..mask.len())
                .map(|i| {
                    let ran = Arc::clone(&ran);
                    // The caller's context, so siblings do not cancel each other
                    scheduler.spawn(&parent, move || async move {
                        ran[i].fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                })
                .collect();

            for (key, cancel) in keys.iter().zip(&mask) {
                if *cancel {
                    scheduler.cancel(key).expect("pending key");
                }
            }

            let result = scheduler.wait().await;
            let counts: Vec<usize> = ran.iter().map(|c| c.load(Ordering::SeqCst)).collect();
            (result, counts)
        });

        let (result, counts) = outcome;
        for (count, cancelled) in counts.iter().zip(&mask) {
            prop_assert_eq!(*count, if *cancelled { 0 } else { 1 });
        }
        if mask.iter().any(|c| *c) {
            prop_assert!(matches!(result, Err(SchedulerError::ExecutionCancelled)));
        } else {
            prop_assert!(result.is_ok());
        }
    });
}
