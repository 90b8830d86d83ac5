//! Workflow orchestrator: the façade subject systems call.
//!
//! Every mutation follows the same cycle:
//! 1. Read the instance and its template.
//! 2. Validate the request against the current step.
//! 3. Apply the transition to a local copy, resolve approvers for any newly
//!    entered step and seal the action onto the hash chain.
//! 4. Commit instance + action through the store, guarded by what was read.
//! 5. Only after the commit succeeds, queue notifications.
//!
//! A tripped guard re-runs the cycle with exponential back-off, up to
//! `max_conflict_retries` times.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use integrations::{ApproverResolver, ResolutionContext};
use queue::NotificationQueue;

use crate::{
    EngineError, StoreError,
    audit::{seal, verify_chain},
    clock::{Clock, snapshot_for},
    models::{
        ActionKind, ActionOptions, InstanceStatus, NewInstance, SlaSnapshot, StepAction,
        WorkflowInstance, WorkflowTemplate,
    },
    notify,
    store::{TransitionGuard, WorkflowStore},
    template::validate_template,
    transition::{self, Outcome},
    validator::{ActionRequest, validate_action},
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How many times a tripped concurrency guard re-runs the cycle.
    pub max_conflict_retries: u32,
    /// Base delay for exponential back-off between those retries.
    pub retry_base_delay: Duration,
    /// Actor recorded on scanner-driven actions.
    pub system_actor_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            retry_base_delay: Duration::from_millis(25),
            system_actor_id: "system".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowOrchestrator
// ---------------------------------------------------------------------------

pub struct WorkflowOrchestrator {
    store: Arc<dyn WorkflowStore>,
    resolver: Arc<dyn ApproverResolver>,
    notifications: NotificationQueue,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl WorkflowOrchestrator {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        resolver: Arc<dyn ApproverResolver>,
        notifications: NotificationQueue,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self { store, resolver, notifications, clock, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &dyn WorkflowStore {
        self.store.as_ref()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -----------------------------------------------------------------------
    // Templates
    // -----------------------------------------------------------------------

    /// Validate and store a template. Templates are immutable afterwards.
    #[instrument(skip(self, template), fields(template_id = %template.id))]
    pub async fn register_template(&self, template: WorkflowTemplate) -> Result<WorkflowTemplate, EngineError> {
        let orders = validate_template(&template)?;
        self.store.insert_template(&template).await?;
        info!("template '{}' registered with steps {:?}", template.name, orders);
        Ok(template)
    }

    pub async fn get_template(&self, id: Uuid) -> Result<WorkflowTemplate, EngineError> {
        self.store
            .get_template(id)
            .await?
            .ok_or(EngineError::TemplateNotFound(id))
    }

    // -----------------------------------------------------------------------
    // Instance lifecycle
    // -----------------------------------------------------------------------

    /// Create a draft instance. Nothing is logged until activation.
    #[instrument(skip(self, request), fields(template_id = %request.template_id))]
    pub async fn create_instance(&self, request: NewInstance) -> Result<Uuid, EngineError> {
        let template = self.get_template(request.template_id).await?;
        let first = template.first_step().ok_or(EngineError::UnknownStep {
            template_id: template.id,
            step_order: 1,
        })?;

        let instance = WorkflowInstance {
            id: Uuid::new_v4(),
            template_id: template.id,
            category: request.category,
            acting_company_id: request.company_id.clone(),
            company_id: request.company_id,
            initiator_id: request.initiator_id,
            initiated_at: self.clock.now(),
            current_step_order: first.order,
            status: InstanceStatus::Draft,
            current_step_started_at: None,
            current_step_deadline_at: None,
            auto_terminate_at: None,
            is_cross_company: false,
            cross_company_path: Vec::new(),
            current_approvers: Vec::new(),
            escalated: false,
            sla: SlaSnapshot::not_started(),
            metadata: request.metadata,
            revision: 0,
            chain_head: None,
            completed_at: None,
        };

        self.store.insert_instance(&instance).await?;
        info!(instance_id = %instance.id, "draft instance created");
        Ok(instance.id)
    }

    /// `draft → pending`. Logged as an `activate` action by the initiator.
    #[instrument(skip(self))]
    pub async fn activate(&self, instance_id: Uuid) -> Result<WorkflowInstance, EngineError> {
        let mut attempt = 0u32;
        loop {
            let instance = self.load_instance(instance_id).await?;
            let template = self.get_template(instance.template_id).await?;
            let now = self.clock.now();

            let mut next = instance.clone();
            let outcome = transition::activate(&mut next, &template, now)?;
            let entry = StepAction::new(
                instance.id,
                outcome.from_step,
                instance.initiator_id.as_str(),
                ActionKind::Activate,
                now,
            );

            match self.commit(&instance, next, &template, outcome, entry, now).await? {
                Some(updated) => return Ok(updated),
                None => self.back_off(instance_id, &mut attempt).await?,
            }
        }
    }

    /// Apply a human action to the current step.
    ///
    /// # Errors
    /// `Validation` / `TerminalState` when preconditions fail,
    /// `ConcurrencyConflict` when the step moved underneath the caller or the
    /// retry budget ran out, `InstanceNotFound` / `TemplateNotFound`.
    #[instrument(skip(self, options))]
    pub async fn take_action(
        &self,
        instance_id: Uuid,
        action: ActionKind,
        actor_id: &str,
        options: ActionOptions,
    ) -> Result<WorkflowInstance, EngineError> {
        let mut observed: Option<(InstanceStatus, u32)> = None;
        let mut attempt = 0u32;

        loop {
            let instance = self.load_instance(instance_id).await?;
            let seen = (instance.status, instance.current_step_order);

            // A retry must still be acting on the step the caller saw.
            if observed.is_some_and(|first| first != seen) {
                warn!("step moved from {:?} to {:?} while retrying", observed, seen);
                return Err(EngineError::ConcurrencyConflict { instance_id });
            }
            if let Some(expected) = options.expected_step_order {
                if !instance.is_terminal() && instance.current_step_order != expected {
                    warn!(
                        "caller expected step {} but instance is at step {}",
                        expected, instance.current_step_order
                    );
                    return Err(EngineError::ConcurrencyConflict { instance_id });
                }
            }
            observed = Some(seen);

            let template = self.get_template(instance.template_id).await?;
            let step = template.step(instance.current_step_order).ok_or(EngineError::UnknownStep {
                template_id: template.id,
                step_order: instance.current_step_order,
            })?;

            validate_action(&ActionRequest {
                instance: &instance,
                template: &template,
                step,
                action,
                actor_id,
                options: &options,
            })
            .map_err(|e| EngineError::from_validation(instance_id, e))?;

            let now = self.clock.now();
            let mut next = instance.clone();
            let outcome = transition::apply(&mut next, &template, action, &options, now)?;
            let entry = StepAction::from_request(instance.id, outcome.from_step, actor_id, action, &options, now);

            match self.commit(&instance, next, &template, outcome, entry, now).await? {
                Some(updated) => return Ok(updated),
                None => self.back_off(instance_id, &mut attempt).await?,
            }
        }
    }

    /// Apply a scanner-driven action once, without retrying.
    ///
    /// `Ok(None)` means the guard tripped; the caller re-evaluates next sweep.
    pub(crate) async fn system_action(
        &self,
        instance: &WorkflowInstance,
        template: &WorkflowTemplate,
        action: ActionKind,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkflowInstance>, EngineError> {
        let mut next = instance.clone();
        let outcome = transition::apply(&mut next, template, action, &ActionOptions::default(), now)?;
        let entry = StepAction::new(
            instance.id,
            outcome.from_step,
            self.config.system_actor_id.as_str(),
            action,
            now,
        );
        self.commit(instance, next, template, outcome, entry, now).await
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The instance with a freshly computed SLA reading.
    pub async fn get_instance(&self, instance_id: Uuid) -> Result<WorkflowInstance, EngineError> {
        let mut instance = self.load_instance(instance_id).await?;
        let template = self.get_template(instance.template_id).await?;
        instance.sla = snapshot_for(&instance, &template, self.clock.now());
        Ok(instance)
    }

    /// The action log, oldest first. `internal_notes` are stripped unless
    /// `include_internal` is set.
    pub async fn get_actions(
        &self,
        instance_id: Uuid,
        include_internal: bool,
    ) -> Result<Vec<StepAction>, EngineError> {
        self.load_instance(instance_id).await?;
        let actions = self.store.actions_for_instance(instance_id).await?;
        if include_internal {
            Ok(actions)
        } else {
            Ok(actions.iter().map(StepAction::redacted).collect())
        }
    }

    /// Inbox query: instances waiting on `actor_id`, most urgent first.
    #[instrument(skip(self))]
    pub async fn list_instances_needing_action(
        &self,
        actor_id: &str,
    ) -> Result<Vec<WorkflowInstance>, EngineError> {
        let now = self.clock.now();
        let mut templates: HashMap<Uuid, WorkflowTemplate> = HashMap::new();
        let mut inbox = self.store.list_for_approver(actor_id).await?;

        for instance in &mut inbox {
            if !templates.contains_key(&instance.template_id) {
                let template = self.get_template(instance.template_id).await?;
                templates.insert(template.id, template);
            }
            if let Some(template) = templates.get(&instance.template_id) {
                instance.sla = snapshot_for(instance, template, now);
            }
        }

        debug!("{} instances waiting on {}", inbox.len(), actor_id);
        Ok(inbox)
    }

    /// Re-hash the stored action log and check every link.
    pub async fn verify_history(&self, instance_id: Uuid) -> Result<usize, EngineError> {
        let instance = self.load_instance(instance_id).await?;
        let mut actions = self.store.actions_for_instance(instance_id).await?;
        actions.sort_by_key(|a| a.sequence);
        verify_chain(&actions)?;

        if actions.last().map(|a| a.hash.as_str()) != instance.chain_head.as_deref() {
            return Err(StoreError::Corrupt(format!(
                "chain head of instance {instance_id} does not match its last action"
            ))
            .into());
        }
        Ok(actions.len())
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    async fn load_instance(&self, instance_id: Uuid) -> Result<WorkflowInstance, EngineError> {
        self.store
            .get_instance(instance_id)
            .await?
            .ok_or(EngineError::InstanceNotFound(instance_id))
    }

    /// Finish a transition computed on `next` and commit it.
    ///
    /// Returns `Ok(None)` if the store's guard no longer matches `before`.
    async fn commit(
        &self,
        before: &WorkflowInstance,
        mut next: WorkflowInstance,
        template: &WorkflowTemplate,
        outcome: Outcome,
        entry: StepAction,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkflowInstance>, EngineError> {
        if let Some(order) = outcome.entered_step {
            let step = template.step(order).ok_or(EngineError::UnknownStep {
                template_id: template.id,
                step_order: order,
            })?;
            let ctx = ResolutionContext {
                instance_id: next.id,
                category: next.category.clone(),
                acting_company_id: next.acting_company_id.clone(),
                initiator_id: next.initiator_id.clone(),
                step_order: order,
                metadata: next.metadata.clone(),
            };
            next.current_approvers = self.resolver.resolve(&step.approver, &ctx).await?;
        }

        next.sla = snapshot_for(&next, template, now);
        let entry = seal(&mut next, entry)?;

        match self.store.commit(&TransitionGuard::of(before), &next, &entry).await {
            Ok(()) => {}
            Err(StoreError::Conflict) => return Ok(None),
            Err(err) => return Err(err.into()),
        }

        info!(
            instance_id = %next.id,
            sequence = entry.sequence,
            "'{}' on step {}: {} -> {} (now at step {})",
            entry.action, entry.step_order, before.status, next.status, next.current_step_order
        );

        for notification in notify::for_transition(before, &next, template, &entry) {
            self.notifications.push(notification);
        }

        Ok(Some(next))
    }

    async fn back_off(&self, instance_id: Uuid, attempt: &mut u32) -> Result<(), EngineError> {
        *attempt += 1;
        if *attempt > self.config.max_conflict_retries {
            warn!(%instance_id, "giving up after {} concurrency conflicts", *attempt);
            return Err(EngineError::ConcurrencyConflict { instance_id });
        }

        let delay = retry_delay(self.config.retry_base_delay, *attempt);
        warn!(
            %instance_id,
            "concurrency conflict (attempt {}/{}), retrying in {:?}",
            *attempt, self.config.max_conflict_retries, delay
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

/// Upper bound on a single back-off sleep.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// `base * 2^(attempt - 1)`, saturating and capped at [`MAX_RETRY_DELAY`].
pub(crate) fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
        .min(MAX_RETRY_DELAY)
}
