//! Sequential plan execution

use crate::bindings::Bindings;
use crate::client::LifecycleClient;
use crate::clock::{Clock, SystemClock};
use crate::context::ProviderContext;
use crate::error::{ClientError, Result as ClientResult, StepError};
use crate::handle::ResourceHandle;
use crate::payload::Payload;
use crate::plan::{Action, Plan, Step};
use crate::report::{PlanReport, PlanStatus, StepFailure, StepRecord, StepState};
use crate::status::{OperationResult, ResourceStatus, raw};
use crate::waiter::PollingWaiter;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What the orchestrator shows the operator at a checkpoint
#[derive(Debug, Clone)]
pub struct ExternalActionRequest {
    pub plan: String,
    pub step: String,
    pub handle: ResourceHandle,
    pub prompt: String,

    /// Latest observation of the resource
    pub result: OperationResult,
}

impl ExternalActionRequest {
    /// DNS validation record of a certificate, once the provider reports it
    pub fn validation_record(&self) -> Option<&serde_json::Value> {
        self.result.raw_value(raw::VALIDATION_RECORD)
    }
}

/// Operator answer to a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalActionResponse {
    /// Action performed, continue into the wait
    Confirmed,
    /// Not done yet; suspend the run
    Deferred,
}

/// Synchronous callback invoked at checkpoint steps
pub trait ExternalActionHandler: Send + Sync {
    fn request(&self, request: &ExternalActionRequest) -> ExternalActionResponse;
}

/// Suspends at every checkpoint (non-interactive runs)
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferAll;

impl ExternalActionHandler for DeferAll {
    fn request(&self, request: &ExternalActionRequest) -> ExternalActionResponse {
        tracing::info!("Checkpoint '{}' deferred: {}", request.step, request.prompt);
        ExternalActionResponse::Deferred
    }
}

enum Call<'a> {
    Create(&'a Payload),
    Describe,
    Update(&'a Payload, Option<&'a str>),
    Delete,
}

impl Call<'_> {
    fn is_mutation(&self) -> bool {
        !matches!(self, Call::Describe)
    }
}

enum StepOutcome {
    Done(StepState),
    Suspended,
}

/// Runs plans step by step against one [`LifecycleClient`].
///
/// Steps of a plan never overlap. The orchestrator never prompts on its own:
/// checkpoints go through the configured [`ExternalActionHandler`].
pub struct Orchestrator {
    client: Arc<dyn LifecycleClient>,
    context: ProviderContext,
    clock: Arc<dyn Clock>,
    operator: Arc<dyn ExternalActionHandler>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn LifecycleClient>, context: ProviderContext) -> Self {
        Self {
            client,
            context,
            clock: Arc::new(SystemClock),
            operator: Arc::new(DeferAll),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_operator(mut self, operator: Arc<dyn ExternalActionHandler>) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts the current run at the next poll or retry boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn context(&self) -> &ProviderContext {
        &self.context
    }

    /// Execute `plan`, stopping at the first failure, checkpoint deferral or cancellation
    pub async fn execute(&self, plan: &Plan) -> PlanReport {
        let started_at = self.clock.now();
        let mut bindings = Bindings::new();
        let mut records: Vec<StepRecord> = plan
            .steps()
            .iter()
            .map(|s| StepRecord::pending(&s.label, &s.handle, s.action))
            .collect();
        let mut status = PlanStatus::Completed;
        let mut failure = None;

        tracing::info!("Executing plan '{}': {}", plan.name(), plan.summary());

        for (index, step) in plan.steps().iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!("Plan '{}' cancelled before step {}", plan.name(), index + 1);
                status = PlanStatus::Cancelled;
                break;
            }

            let record = &mut records[index];
            record.state = StepState::Executing;
            tracing::info!("[{}/{}] {}", index + 1, plan.len(), step.label);

            match self.run_step(plan, step, &mut bindings, record).await {
                Ok(StepOutcome::Done(state)) => {
                    record.state = state;
                    tracing::debug!("Step '{}' {}", step.label, state);
                }
                Ok(StepOutcome::Suspended) => {
                    record.state = StepState::WaitingOnExternalAction;
                    status = PlanStatus::Suspended;
                    tracing::info!("Plan '{}' suspended at '{}'", plan.name(), step.label);
                    break;
                }
                Err(StepError::Cancelled) => {
                    record.state = StepState::Pending;
                    record.error = Some(StepError::Cancelled.to_string());
                    status = PlanStatus::Cancelled;
                    tracing::warn!("Plan '{}' cancelled during '{}'", plan.name(), step.label);
                    break;
                }
                Err(err) => {
                    record.state = StepState::Failed;
                    record.error = Some(err.to_string());
                    let step_failure = failure_of(plan, index, record, &err);
                    tracing::warn!("{}", step_failure);
                    failure = Some(step_failure);
                    status = PlanStatus::Failed;
                    break;
                }
            }
        }

        PlanReport {
            plan: plan.name().to_string(),
            status,
            steps: records,
            failure,
            started_at,
            finished_at: self.clock.now(),
        }
    }

    /// Execute independent plans with at most `concurrency` running at once.
    ///
    /// Reports come back in the order the plans were given.
    pub async fn execute_many(&self, plans: &[Plan], concurrency: usize) -> Vec<PlanReport> {
        let mut reports: Vec<(usize, PlanReport)> = futures_util::stream::iter(plans.iter().enumerate())
            .map(|(index, plan)| async move { (index, self.execute(plan).await) })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
        reports.sort_by_key(|(index, _)| *index);
        reports.into_iter().map(|(_, report)| report).collect()
    }

    async fn run_step(
        &self,
        plan: &Plan,
        step: &Step,
        bindings: &mut Bindings,
        record: &mut StepRecord,
    ) -> Result<StepOutcome, StepError> {
        let mut handle = bindings.bind(&step.handle);
        let payload = step.payload.resolve(bindings);
        record.handle = handle.clone();

        let current = self.observe(step, &handle).await?;
        if let Some(current) = &current {
            bindings.record(handle.key(), current.clone());
            record.last_result = Some(current.clone());
        }

        let result = match (step.action, current) {
            (Action::Create, Some(current)) if current.status != ResourceStatus::Failed => {
                tracing::info!("{} already exists ({}), skipping create", handle, current.status);
                current
            }
            (Action::Create, _) => {
                record.mutated = true;
                match self
                    .call_with_retry(step, &handle, Call::Create(&payload), &mut record.attempts)
                    .await
                {
                    Err(StepError::Client(ClientError::AlreadyExists(message))) => {
                        tracing::warn!("{} appeared concurrently ({}), re-reading", handle, message);
                        self.observe(step, &handle)
                            .await?
                            .ok_or_else(|| StepError::Missing(handle.to_string()))?
                    }
                    other => other?,
                }
            }
            (Action::Update, None) if step.allow_absent => {
                tracing::info!("{} does not exist, skipping update", handle);
                return Ok(StepOutcome::Done(StepState::Skipped));
            }
            (Action::Update, None) => return Err(StepError::Missing(handle.to_string())),
            (Action::Update, Some(current)) if payload.is_satisfied_by(&handle, &current) => {
                tracing::info!("{} already up to date, skipping update", handle);
                current
            }
            (Action::Update, Some(current)) => {
                record.mutated = true;
                self.update(step, &handle, &payload, current, &mut record.attempts)
                    .await?
            }
            (Action::Delete, None) => {
                tracing::info!("{} already absent, skipping delete", handle);
                return Ok(StepOutcome::Done(StepState::Skipped));
            }
            (Action::Delete, Some(_)) => {
                record.mutated = true;
                match self
                    .call_with_retry(step, &handle, Call::Delete, &mut record.attempts)
                    .await
                {
                    Err(StepError::Client(ClientError::NotFound(_))) => {
                        tracing::debug!("{} vanished before delete", handle);
                        OperationResult::not_found().observed(self.clock.now())
                    }
                    other => other?,
                }
            }
        };

        if handle.id().is_none() {
            if let Some(id) = &result.resource_id {
                handle = handle.with_id(id.clone());
                record.handle = handle.clone();
            }
        }
        bindings.record(handle.key(), result.clone());
        record.last_result = Some(result.clone());

        if let Some(checkpoint) = &step.checkpoint {
            if self.cancel.is_cancelled() {
                return Err(StepError::Cancelled);
            }
            if record.mutated || result.status != ResourceStatus::Ready {
                let request = ExternalActionRequest {
                    plan: plan.name().to_string(),
                    step: step.label.clone(),
                    handle: handle.clone(),
                    prompt: checkpoint.prompt.clone(),
                    result: result.clone(),
                };
                if self.operator.request(&request) == ExternalActionResponse::Deferred {
                    return Ok(StepOutcome::Suspended);
                }
                tracing::info!("Operator confirmed '{}'", step.label);
            }
        }

        if let Some(policy) = &step.wait {
            if !policy.is_terminal(result.status) {
                let waiter = PollingWaiter::new(self.client.as_ref(), self.clock.as_ref())
                    .with_cancellation(&self.cancel);
                match waiter.wait(&self.context, &handle, policy).await {
                    Ok(outcome) => {
                        record.polls += outcome.attempts;
                        record.wait_timed_out = outcome.timed_out;
                        bindings.record(handle.key(), outcome.result.clone());
                        record.last_result = Some(outcome.result);
                    }
                    Err(err) => {
                        record.polls += err.attempts();
                        if let Some(last) = err.last_result() {
                            record.last_result = Some(last.clone());
                        }
                        return Err(err.into());
                    }
                }
            }
        }

        Ok(StepOutcome::Done(if record.mutated {
            StepState::Succeeded
        } else {
            StepState::Skipped
        }))
    }

    /// Update with the observed version; a stale version gets one fresh re-read and retry
    async fn update(
        &self,
        step: &Step,
        handle: &ResourceHandle,
        payload: &Payload,
        current: OperationResult,
        attempts: &mut u32,
    ) -> Result<OperationResult, StepError> {
        let call = Call::Update(payload, current.version.as_deref());
        match self.call_with_retry(step, handle, call, attempts).await {
            Err(StepError::Client(ClientError::Conflict {
                expected_version,
                message,
            })) => {
                tracing::warn!(
                    "Version conflict on {} (current: {}): {}, re-reading",
                    handle,
                    expected_version.as_deref().unwrap_or("unknown"),
                    message
                );
                let fresh = self
                    .observe(step, handle)
                    .await?
                    .ok_or_else(|| StepError::Missing(handle.to_string()))?;
                let call = Call::Update(payload, fresh.version.as_deref());
                self.call_with_retry(step, handle, call, attempts).await
            }
            other => other,
        }
    }

    /// Describe, mapping absence to `None`
    async fn observe(
        &self,
        step: &Step,
        handle: &ResourceHandle,
    ) -> Result<Option<OperationResult>, StepError> {
        let mut describes = 0;
        match self
            .call_with_retry(step, handle, Call::Describe, &mut describes)
            .await
        {
            Ok(result) if result.status == ResourceStatus::NotFound => Ok(None),
            Ok(result) => Ok(Some(result)),
            Err(StepError::Client(ClientError::NotFound(_))) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn call(&self, handle: &ResourceHandle, call: &Call<'_>) -> ClientResult<OperationResult> {
        let ctx = &self.context;
        match call {
            Call::Create(payload) => self.client.create(ctx, handle, payload).await,
            Call::Describe => self.client.describe(ctx, handle).await,
            Call::Update(payload, if_match) => self.client.update(ctx, handle, payload, *if_match).await,
            Call::Delete => self.client.delete(ctx, handle).await,
        }
    }

    /// Fixed-delay retry of `Transient`/`InUse` failures per the step's [`RetryPolicy`](crate::RetryPolicy)
    async fn call_with_retry(
        &self,
        step: &Step,
        handle: &ResourceHandle,
        call: Call<'_>,
        attempts: &mut u32,
    ) -> Result<OperationResult, StepError> {
        let mut tries = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(StepError::Cancelled);
            }
            tries += 1;
            if call.is_mutation() {
                *attempts += 1;
            }

            match self.call(handle, &call).await {
                Ok(result) => return Ok(result),
                Err(err) if err.is_retryable() && tries <= step.retry.max_retries => {
                    tracing::warn!(
                        "{} on {} failed ({}), retry {}/{} in {:?}",
                        step.action,
                        handle,
                        err,
                        tries,
                        step.retry.max_retries,
                        step.retry.delay
                    );
                    self.pause(step.retry.delay).await?;
                }
                Err(err) if err.is_retryable() && step.retry.max_retries > 0 => {
                    return Err(StepError::RetriesExhausted {
                        attempts: tries,
                        last: err,
                    });
                }
                Err(err) => return Err(StepError::Client(err)),
            }
        }
    }

    async fn pause(&self, delay: Duration) -> Result<(), StepError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(StepError::Cancelled),
            _ = self.clock.sleep(delay) => Ok(()),
        }
    }
}

fn failure_of(plan: &Plan, index: usize, record: &StepRecord, err: &StepError) -> StepFailure {
    let attempts = match err {
        StepError::RetriesExhausted { attempts, .. } => *attempts,
        StepError::Wait(wait) => wait.attempts(),
        _ => record.attempts.max(1),
    };
    let raw = match err {
        StepError::Wait(wait) => wait.last_result().map(|r| r.raw.clone()),
        _ => record.last_result.as_ref().map(|r| r.raw.clone()),
    }
    .filter(|v| !v.is_null());

    StepFailure {
        plan: plan.name().to_string(),
        step: index,
        label: record.label.clone(),
        action: record.action,
        resource: record.handle.to_string(),
        attempts,
        message: err.to_string(),
        raw,
    }
}
