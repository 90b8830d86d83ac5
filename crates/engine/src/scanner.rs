//! Escalation scanner.
//!
//! A periodic sweep, not a per-instance timer: deadlines and hard stops are
//! plain data on the instance, and this job turns the elapsed ones into
//! transitions. A sweep that loses a race with a human action simply leaves
//! that instance for the next sweep.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use crate::{
    EngineError,
    models::{ActionKind, DeadlinePolicy, WorkflowInstance, WorkflowTemplate},
    orchestrator::WorkflowOrchestrator,
};

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub interval: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(300) }
    }
}

/// Per-sweep totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub escalated: usize,
    pub terminated: usize,
    /// Lost a race with another writer; retried next sweep.
    pub deferred: usize,
    /// Overdue but nothing to do (already escalated, or no policy).
    pub skipped: usize,
    pub failed: usize,
}

enum Disposition {
    Escalated,
    Terminated,
    Deferred,
    Skipped,
}

pub struct EscalationScanner {
    orchestrator: Arc<WorkflowOrchestrator>,
    config: ScannerConfig,
}

impl EscalationScanner {
    pub fn new(orchestrator: Arc<WorkflowOrchestrator>, config: ScannerConfig) -> Self {
        Self { orchestrator, config }
    }

    /// One pass over every overdue instance.
    ///
    /// Only the initial query can fail the sweep; per-instance failures are
    /// logged and counted.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<ScanReport, EngineError> {
        let now = self.orchestrator.now();
        let due = self.orchestrator.store().list_due(now).await?;
        let mut report = ScanReport::default();

        for instance in &due {
            match self.process(instance, now).await {
                Ok(Disposition::Escalated) => report.escalated += 1,
                Ok(Disposition::Terminated) => report.terminated += 1,
                Ok(Disposition::Deferred) => {
                    warn!(instance_id = %instance.id, "instance changed during sweep; deferring");
                    report.deferred += 1;
                }
                Ok(Disposition::Skipped) => report.skipped += 1,
                Err(err) => {
                    error!(instance_id = %instance.id, "scanner failed on instance: {}", err);
                    report.failed += 1;
                }
            }
        }

        info!(
            "sweep over {} due instances: {} escalated, {} terminated, {} deferred, {} skipped, {} failed",
            due.len(), report.escalated, report.terminated, report.deferred, report.skipped, report.failed
        );
        Ok(report)
    }

    async fn process(&self, instance: &WorkflowInstance, now: DateTime<Utc>) -> Result<Disposition, EngineError> {
        let template = self.orchestrator.get_template(instance.template_id).await?;

        // The hard stop wins over whatever the step deadline says.
        if instance.auto_terminate_at.is_some_and(|at| at < now) {
            return self.run_action(instance, &template, ActionKind::AutoTerminate, now).await;
        }

        if !instance.current_step_deadline_at.is_some_and(|at| at < now) {
            return Ok(Disposition::Skipped);
        }

        let policy = template
            .step(instance.current_step_order)
            .map(|s| s.on_deadline.clone())
            .unwrap_or_default();

        match policy {
            DeadlinePolicy::None => Ok(Disposition::Skipped),
            DeadlinePolicy::AutoTerminate => {
                self.run_action(instance, &template, ActionKind::AutoTerminate, now).await
            }
            DeadlinePolicy::Escalate { .. } => {
                if instance.escalated || self.already_escalated(instance).await? {
                    return Ok(Disposition::Skipped);
                }
                self.run_action(instance, &template, ActionKind::Escalate, now).await
            }
        }
    }

    /// Whether this visit to the current step already has an `escalate` entry.
    async fn already_escalated(&self, instance: &WorkflowInstance) -> Result<bool, EngineError> {
        let Some(since) = instance.current_step_started_at else {
            return Ok(false);
        };
        Ok(self
            .orchestrator
            .store()
            .has_open_action_at(instance.id, instance.current_step_order, ActionKind::Escalate, since)
            .await?)
    }

    async fn run_action(
        &self,
        instance: &WorkflowInstance,
        template: &WorkflowTemplate,
        action: ActionKind,
        now: DateTime<Utc>,
    ) -> Result<Disposition, EngineError> {
        let committed = self.orchestrator.system_action(instance, template, action, now).await?;
        Ok(match (committed, action) {
            (None, _) => Disposition::Deferred,
            (Some(_), ActionKind::AutoTerminate) => Disposition::Terminated,
            (Some(_), _) => Disposition::Escalated,
        })
    }

    /// Sweep every `interval` until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("escalation scanner started, interval {:?}", self.config.interval);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("escalation scanner stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        error!("escalation sweep failed: {}", err);
                    }
                }
            }
        }
    }
}
