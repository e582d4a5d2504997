// Scheduler binary entry point: runs one batch of deferred tasks

use anyhow::Context as _;
use common::config::Settings;
use common::scheduler::{DeferredScheduler, Scheduler};
use common::{telemetry, Context};
use std::time::Instant;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    info!(
        delay_ms = settings.trigger.delay_ms,
        tasks = settings.batch.tasks,
        parent_timeout_ms = settings.batch.parent_timeout_ms,
        "Configuration loaded"
    );

    // Parent context for the whole batch: deadline plus Ctrl+C
    let (parent, cancel_parent) =
        Context::background().with_timeout(settings.batch.parent_timeout());
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal, cancelling pending tasks");
                cancel_parent.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    let (scheduler, ctx) = DeferredScheduler::new(&parent, settings.trigger.to_trigger());
    let started = Instant::now();

    for index in 0..settings.batch.tasks {
        let fail = settings.batch.fail_task == Some(index);
        let key = scheduler.spawn(&ctx, move || async move {
            if fail {
                anyhow::bail!("task {} failed on purpose", index);
            }
            info!(
                task = index,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Deferred task executed"
            );
            Ok(())
        });
        info!(task = index, key = %key, "Task scheduled");
    }

    let outcome = scheduler.wait().await;

    if settings.observability.tracing_endpoint.is_some() {
        telemetry::shutdown_tracer();
    }

    match outcome {
        Ok(()) => {
            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Batch completed"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, kind = e.kind(), "Batch failed");
            Err(e.into())
        }
    }
}
