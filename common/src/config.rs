// Configuration management with layered configuration (file, env)

use crate::errors::SettingsError;
use crate::scheduler::Trigger;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub trigger: TriggerSettings,
    pub batch: BatchSettings,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSettings {
    /// Delay applied to every task before it fires
    pub delay_ms: u64,
}

impl TriggerSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn to_trigger(&self) -> Trigger {
        Trigger::after(self.delay())
    }
}

/// Shape of the batch run by the scheduler binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    pub tasks: usize,
    /// Deadline for the whole batch; tasks still waiting at this point are cancelled
    pub parent_timeout_ms: u64,
    /// Index of a task that returns an error when it fires
    #[serde(default)]
    pub fail_task: Option<usize>,
}

impl BatchSettings {
    pub fn parent_timeout(&self) -> Duration {
        Duration::from_millis(self.parent_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default)]
    pub metrics_port: Option<u16>,
    #[serde(default)]
    pub tracing_endpoint: Option<String>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, SettingsError> {
        let config_dir = config_dir.as_ref();
        let defaults = Settings::default();

        let builder = Config::builder()
            .set_default("trigger.delay_ms", defaults.trigger.delay_ms)?
            .set_default("batch.tasks", defaults.batch.tasks as u64)?
            .set_default("batch.parent_timeout_ms", defaults.batch.parent_timeout_ms)?
            .set_default("observability.log_level", defaults.observability.log_level)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Local overrides, not committed
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.trigger.delay_ms == 0 {
            return Err(invalid("trigger.delay_ms", "must be greater than 0"));
        }
        if self.batch.tasks == 0 {
            return Err(invalid("batch.tasks", "must be greater than 0"));
        }
        if self.batch.parent_timeout_ms == 0 {
            return Err(invalid("batch.parent_timeout_ms", "must be greater than 0"));
        }
        if let Some(index) = self.batch.fail_task {
            if index >= self.batch.tasks {
                return Err(invalid(
                    "batch.fail_task",
                    &format!("must be below batch.tasks ({})", self.batch.tasks),
                ));
            }
        }
        if self.observability.metrics_port == Some(0) {
            return Err(invalid("observability.metrics_port", "must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> SettingsError {
    SettingsError::InvalidFieldValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trigger: TriggerSettings { delay_ms: 1000 },
            batch: BatchSettings {
                tasks: 4,
                parent_timeout_ms: 2000,
                fail_task: None,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: None,
                tracing_endpoint: None,
            },
        }
    }
}
