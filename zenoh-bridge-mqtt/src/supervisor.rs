//! Instance supervisor.
//!
//! Every device entry runs in its own task so a failing or panicking
//! instance never takes its siblings down. Failed instances are restarted
//! according to [`SupervisorSettings`]; configuration errors are final.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SupervisorSettings;
use crate::instance::{InstanceContext, InstanceError};
use crate::registry::DeviceEntry;

/// How a supervised instance ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceOutcome {
    /// Stopped on shutdown.
    Stopped,
    /// Unusable configuration; not restarted.
    ConfigError(String),
    /// Still failing after every allowed restart.
    GaveUp { restarts: u32, error: String },
}

impl InstanceOutcome {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, InstanceOutcome::Stopped)
    }
}

/// Final report for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceReport {
    pub section: String,
    pub outcome: InstanceOutcome,
}

/// Delay before restart number `restart` (1-based).
pub fn restart_delay(settings: &SupervisorSettings, restart: u32) -> Duration {
    let factor = 1u64 << restart.saturating_sub(1).min(16);
    let secs = settings
        .restart_backoff_secs
        .saturating_mul(factor)
        .min(settings.max_backoff_secs);
    Duration::from_secs(secs)
}

/// Runs device instances and restarts them on failure.
pub struct Supervisor {
    ctx: InstanceContext,
    settings: SupervisorSettings,
}

impl Supervisor {
    pub fn new(ctx: InstanceContext, settings: SupervisorSettings) -> Self {
        Self { ctx, settings }
    }

    /// Run every entry until shutdown, then report how each one ended.
    pub async fn run(&self, entries: Vec<DeviceEntry>) -> Vec<InstanceReport> {
        tracing::info!(instances = entries.len(), "Starting device instances");

        let handles: Vec<(String, JoinHandle<InstanceReport>)> = entries
            .into_iter()
            .map(|entry| {
                let section = entry.section.clone();
                let ctx = self.ctx.clone();
                let handle = tokio::spawn(supervise(
                    entry,
                    self.settings.clone(),
                    self.ctx.shutdown.clone(),
                    move |entry| {
                        let ctx = ctx.clone();
                        async move { ctx.run(&entry).await }
                    },
                ));
                (section, handle)
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for (section, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(section = %section, error = %e, "Supervisor task failed");
                    reports.push(InstanceReport {
                        section,
                        outcome: InstanceOutcome::GaveUp {
                            restarts: 0,
                            error: e.to_string(),
                        },
                    });
                }
            }
        }
        reports
    }
}

/// Run one entry with `run_instance`, restarting it as the settings allow.
///
/// Each attempt is spawned separately so a panic is caught as a
/// [`tokio::task::JoinError`].
pub async fn supervise<F, Fut>(
    entry: DeviceEntry,
    settings: SupervisorSettings,
    mut shutdown: watch::Receiver<bool>,
    run_instance: F,
) -> InstanceReport
where
    F: Fn(DeviceEntry) -> Fut,
    Fut: Future<Output = Result<(), InstanceError>> + Send + 'static,
{
    let section = entry.section.clone();
    let report = |outcome| InstanceReport {
        section: section.clone(),
        outcome,
    };
    let mut restarts = 0u32;

    loop {
        tracing::info!(section = %section, kind = %entry.kind, restarts, "Starting instance");

        let error = match tokio::spawn(run_instance(entry.clone())).await {
            Ok(Ok(())) => {
                tracing::info!(section = %section, "Instance stopped");
                return report(InstanceOutcome::Stopped);
            }
            Ok(Err(e)) if !e.is_restartable() => {
                tracing::error!(section = %section, error = %e, "Instance configuration error, not restarting");
                return report(InstanceOutcome::ConfigError(e.to_string()));
            }
            Ok(Err(e)) => {
                tracing::error!(section = %section, error = %e, "Instance failed");
                e.to_string()
            }
            Err(e) if e.is_panic() => {
                tracing::error!(section = %section, "Instance panicked");
                "instance panicked".to_string()
            }
            Err(e) => {
                tracing::warn!(section = %section, error = %e, "Instance task cancelled");
                return report(InstanceOutcome::Stopped);
            }
        };

        if *shutdown.borrow() {
            return report(InstanceOutcome::Stopped);
        }
        if restarts >= settings.max_restarts {
            tracing::error!(
                section = %section,
                restarts,
                "Instance keeps failing, giving up"
            );
            return report(InstanceOutcome::GaveUp { restarts, error });
        }

        restarts += 1;
        let delay = restart_delay(&settings, restarts);
        tracing::warn!(
            section = %section,
            restart = restarts,
            delay_secs = delay.as_secs(),
            "Restarting instance"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.wait_for(|stop| *stop) => {
                return report(InstanceOutcome::Stopped);
            }
        }
    }
}
