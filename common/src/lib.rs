// Deferred task scheduler with group cancellation semantics

pub mod config;
pub mod context;
pub mod errors;
pub mod scheduler;
pub mod telemetry;

pub use context::{CancelHandle, Context, DoneCause};
pub use errors::SchedulerError;
pub use scheduler::{DeferredScheduler, DeferredTask, Scheduler, TaskKey, Trigger};
