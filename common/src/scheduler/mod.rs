// Deferred task scheduling with per-task and group cancellation

pub mod engine;
pub mod group;
pub mod key;
pub mod registry;
pub mod trigger;

pub use engine::{DeferredScheduler, DeferredTask, Scheduler};
pub use group::TaskGroup;
pub use key::{KeyGenerator, TaskKey, UuidKeyGenerator};
pub use registry::PendingRegistry;
pub use trigger::Trigger;
