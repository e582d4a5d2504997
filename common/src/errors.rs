// Error handling framework

use crate::scheduler::TaskKey;
use thiserror::Error;

/// Scheduler errors surfaced by `cancel` and `wait`
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The task never ran: its context was done before the trigger fired
    #[error("function execution was cancelled by context")]
    ExecutionCancelled,

    #[error("key not found: {0}")]
    KeyNotFound(TaskKey),

    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// Error returned by the task itself, passed through unchanged
    #[error(transparent)]
    Task(#[from] anyhow::Error),
}

impl SchedulerError {
    /// True for the cancellation sentinel
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SchedulerError::ExecutionCancelled)
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerError::ExecutionCancelled => "cancelled",
            SchedulerError::KeyNotFound(_) => "key_not_found",
            SchedulerError::TaskPanicked(_) => "panicked",
            SchedulerError::Task(_) => "task",
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_display_matches_sentinel_text() {
        let err = SchedulerError::ExecutionCancelled;
        assert_eq!(err.to_string(), "function execution was cancelled by context");
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_key_not_found_display() {
        let err = SchedulerError::KeyNotFound(TaskKey::from("abc"));
        assert!(err.to_string().contains("key not found"));
        assert!(err.to_string().contains("abc"));
        assert_eq!(err.kind(), "key_not_found");
    }

    #[test]
    fn test_task_error_is_transparent_and_downcastable() {
        #[derive(Debug, thiserror::Error)]
        #[error("to err is human")]
        struct Human;

        let err: SchedulerError = anyhow::Error::new(Human).into();
        assert_eq!(err.to_string(), "to err is human");
        assert!(!err.is_cancelled());

        match err {
            SchedulerError::Task(inner) => assert!(inner.downcast_ref::<Human>().is_some()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_settings_error_display() {
        let err = SettingsError::InvalidFieldValue {
            field: "trigger.delay_ms".to_string(),
            reason: "must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("trigger.delay_ms"));
    }
}
