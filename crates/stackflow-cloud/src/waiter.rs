//! Polling until a resource reaches a terminal status (fixed interval)

use crate::client::LifecycleClient;
use crate::clock::Clock;
use crate::context::ProviderContext;
use crate::error::{ClientError, WaitError};
use crate::handle::ResourceHandle;
use crate::status::{OperationResult, ResourceStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What to do once `max_attempts` polls have not reached a terminal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnTimeout {
    /// Raise [`WaitError::Timeout`]
    Fail,
    /// Hand the last non-terminal observation back to the caller
    ReturnLastKnown,
}

/// Governs one [`PollingWaiter::wait`] call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPolicy {
    terminal: BTreeSet<ResourceStatus>,
    failure: BTreeSet<ResourceStatus>,
    poll_interval: Duration,
    max_attempts: u32,
    on_timeout: OnTimeout,
}

impl WaitPolicy {
    /// Wait for any of `terminal`, failing on `Failed`, every 30s for up to 20 polls
    pub fn until(terminal: impl IntoIterator<Item = ResourceStatus>) -> Self {
        Self {
            terminal: terminal.into_iter().collect(),
            failure: BTreeSet::from([ResourceStatus::Failed]),
            poll_interval: Duration::from_secs(30),
            max_attempts: 20,
            on_timeout: OnTimeout::Fail,
        }
    }

    pub fn until_ready() -> Self {
        Self::until([ResourceStatus::Ready])
    }

    pub fn until_disabled() -> Self {
        Self::until([ResourceStatus::Disabled])
    }

    /// Wait for a deletion to be observable
    pub fn until_gone() -> Self {
        Self::until([ResourceStatus::NotFound])
    }

    pub fn failing_on(mut self, failure: impl IntoIterator<Item = ResourceStatus>) -> Self {
        self.failure = failure.into_iter().collect();
        self
    }

    pub fn every(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn at_most(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn on_timeout(mut self, on_timeout: OnTimeout) -> Self {
        self.on_timeout = on_timeout;
        self
    }

    /// Terminal and failure sets must be disjoint and at least one poll is required
    pub fn validate(&self) -> Result<(), String> {
        if self.terminal.is_empty() {
            return Err("no terminal status".to_string());
        }
        if self.max_attempts < 1 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if let Some(status) = self.terminal.intersection(&self.failure).next() {
            return Err(format!("status '{}' is both terminal and a failure", status));
        }
        Ok(())
    }

    pub fn is_terminal(&self, status: ResourceStatus) -> bool {
        self.terminal.contains(&status)
    }

    pub fn is_failure(&self, status: ResourceStatus) -> bool {
        self.failure.contains(&status)
    }

    /// Whether absence of the resource counts as success
    pub fn accepts_absence(&self) -> bool {
        self.is_terminal(ResourceStatus::NotFound)
    }

    pub fn terminal_statuses(&self) -> &BTreeSet<ResourceStatus> {
        &self.terminal
    }

    pub fn failure_statuses(&self) -> &BTreeSet<ResourceStatus> {
        &self.failure
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn timeout_behavior(&self) -> OnTimeout {
        self.on_timeout
    }
}

/// Successful end of a wait
#[derive(Debug, Clone, PartialEq)]
pub struct WaitOutcome {
    pub result: OperationResult,
    pub attempts: u32,
    /// Set when `ReturnLastKnown` handed back a non-terminal observation
    pub timed_out: bool,
}

/// Repeatedly describes a resource until a terminal or failure status shows up
pub struct PollingWaiter<'a> {
    client: &'a dyn LifecycleClient,
    clock: &'a dyn Clock,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> PollingWaiter<'a> {
    pub fn new(client: &'a dyn LifecycleClient, clock: &'a dyn Clock) -> Self {
        Self {
            client,
            clock,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Poll `handle` according to `policy`
    ///
    /// # Returns
    /// * `Ok(WaitOutcome)` - terminal status observed (or last known result
    ///   when the policy says `ReturnLastKnown`)
    /// * `Err(WaitError)` - failure status, timeout, cancellation, or a
    ///   non-retryable describe error
    pub async fn wait(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        policy: &WaitPolicy,
    ) -> Result<WaitOutcome, WaitError> {
        let mut last: Option<OperationResult> = None;
        let max_attempts = policy.max_attempts().max(1);

        for attempt in 1..=max_attempts {
            if self.is_cancelled() {
                return Err(WaitError::Cancelled {
                    handle: handle.to_string(),
                    attempts: attempt - 1,
                });
            }

            let observed = match self.client.describe(ctx, handle).await {
                Ok(result) => Some(result),
                Err(ClientError::NotFound(_)) if policy.accepts_absence() => {
                    Some(OperationResult::not_found().observed(self.clock.now()))
                }
                Err(err) if err.is_retryable() => {
                    tracing::warn!("Describe of {} failed on attempt {}: {}", handle, attempt, err);
                    None
                }
                Err(err) => {
                    return Err(WaitError::Client {
                        handle: handle.to_string(),
                        attempts: attempt,
                        source: err,
                    });
                }
            };

            if let Some(result) = observed {
                tracing::debug!(
                    "{} is {} (attempt {}/{})",
                    handle,
                    result.status,
                    attempt,
                    max_attempts
                );

                if policy.is_failure(result.status) {
                    return Err(WaitError::Failed {
                        handle: handle.to_string(),
                        status: result.status,
                        attempts: attempt,
                        last: Box::new(result),
                    });
                }
                if policy.is_terminal(result.status) {
                    return Ok(WaitOutcome {
                        result,
                        attempts: attempt,
                        timed_out: false,
                    });
                }
                if result.status == ResourceStatus::NotFound {
                    return Err(WaitError::Client {
                        handle: handle.to_string(),
                        attempts: attempt,
                        source: ClientError::NotFound(handle.to_string()),
                    });
                }
                last = Some(result);
            }

            if attempt < max_attempts {
                self.pause(handle, attempt, policy.poll_interval()).await?;
            }
        }

        match (policy.timeout_behavior(), last) {
            (OnTimeout::ReturnLastKnown, Some(result)) => {
                tracing::warn!(
                    "{} still {} after {} attempts, returning last known state",
                    handle,
                    result.status,
                    max_attempts
                );
                Ok(WaitOutcome {
                    result,
                    attempts: max_attempts,
                    timed_out: true,
                })
            }
            (_, last) => Err(WaitError::Timeout {
                handle: handle.to_string(),
                attempts: max_attempts,
                last: last.map(Box::new),
            }),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|t| t.is_cancelled())
    }

    async fn pause(
        &self,
        handle: &ResourceHandle,
        attempts: u32,
        interval: Duration,
    ) -> Result<(), WaitError> {
        match self.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => Err(WaitError::Cancelled {
                        handle: handle.to_string(),
                        attempts,
                    }),
                    _ = self.clock.sleep(interval) => Ok(()),
                }
            }
            None => {
                self.clock.sleep(interval).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::Result as ClientResult;
    use crate::handle::ResourceKind;
    use crate::payload::Payload;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed sequence of describe responses
    struct Scripted {
        responses: Mutex<VecDeque<ClientResult<OperationResult>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn statuses(statuses: &[ResourceStatus]) -> Self {
            Self::new(
                statuses
                    .iter()
                    .map(|s| Ok(OperationResult::new(*s)))
                    .collect(),
            )
        }

        fn new(responses: Vec<ClientResult<OperationResult>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LifecycleClient for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn supports(&self, _kind: ResourceKind) -> bool {
            true
        }

        async fn create(
            &self,
            _ctx: &ProviderContext,
            _handle: &ResourceHandle,
            _payload: &Payload,
        ) -> ClientResult<OperationResult> {
            unreachable!("waiter never creates")
        }

        async fn describe(
            &self,
            _ctx: &ProviderContext,
            _handle: &ResourceHandle,
        ) -> ClientResult<OperationResult> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(OperationResult::new(ResourceStatus::InProgress)))
        }

        async fn update(
            &self,
            _ctx: &ProviderContext,
            _handle: &ResourceHandle,
            _payload: &Payload,
            _if_match: Option<&str>,
        ) -> ClientResult<OperationResult> {
            unreachable!("waiter never updates")
        }

        async fn delete(
            &self,
            _ctx: &ProviderContext,
            _handle: &ResourceHandle,
        ) -> ClientResult<OperationResult> {
            unreachable!("waiter never deletes")
        }
    }

    fn handle() -> ResourceHandle {
        ResourceHandle::distribution("docs")
    }

    #[tokio::test]
    async fn test_terminal_detection_stops_polling() {
        let client = Scripted::statuses(&[
            ResourceStatus::Pending,
            ResourceStatus::Pending,
            ResourceStatus::Ready,
        ]);
        let clock = ManualClock::default();
        let policy = WaitPolicy::until_ready().every(Duration::from_secs(60)).at_most(10);

        let outcome = PollingWaiter::new(&client, &clock)
            .wait(&ProviderContext::new(), &handle(), &policy)
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.status, ResourceStatus::Ready);
        assert!(!outcome.timed_out);
        assert_eq!(client.calls(), 3);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(60); 2]);
    }

    #[tokio::test]
    async fn test_failure_detection_stops_early() {
        let client = Scripted::statuses(&[ResourceStatus::Pending, ResourceStatus::Failed]);
        let clock = ManualClock::default();
        let policy = WaitPolicy::until_ready().at_most(10);

        let err = PollingWaiter::new(&client, &clock)
            .wait(&ProviderContext::new(), &handle(), &policy)
            .await
            .unwrap_err();

        match err {
            WaitError::Failed {
                attempts, status, ..
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(status, ResourceStatus::Failed);
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_timeout_after_max_attempts() {
        let client = Scripted::statuses(&[]);
        let clock = ManualClock::default();
        let policy = WaitPolicy::until_ready().every(Duration::from_secs(5)).at_most(3);

        let err = PollingWaiter::new(&client, &clock)
            .wait(&ProviderContext::new(), &handle(), &policy)
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Timeout { attempts: 3, .. }));
        assert_eq!(err.last_result().map(|r| r.status), Some(ResourceStatus::InProgress));
        assert_eq!(client.calls(), 3);
        // no sleep after the final attempt
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn test_return_last_known_on_timeout() {
        let client = Scripted::statuses(&[ResourceStatus::Pending, ResourceStatus::InProgress]);
        let clock = ManualClock::default();
        let policy = WaitPolicy::until_ready()
            .at_most(2)
            .on_timeout(OnTimeout::ReturnLastKnown);

        let outcome = PollingWaiter::new(&client, &clock)
            .wait(&ProviderContext::new(), &handle(), &policy)
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert_eq!(outcome.result.status, ResourceStatus::InProgress);
    }

    #[tokio::test]
    async fn test_not_found_is_success_when_waiting_for_deletion() {
        let client = Scripted::new(vec![
            Ok(OperationResult::new(ResourceStatus::InProgress)),
            Err(ClientError::NotFound("ResourceNotFoundException".into())),
        ]);
        let clock = ManualClock::default();

        let outcome = PollingWaiter::new(&client, &clock)
            .wait(&ProviderContext::new(), &handle(), &WaitPolicy::until_gone())
            .await
            .unwrap();

        assert_eq!(outcome.result.status, ResourceStatus::NotFound);
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_not_found_is_fatal_when_waiting_for_ready() {
        let client = Scripted::new(vec![Err(ClientError::NotFound("NoSuchDistribution".into()))]);
        let clock = ManualClock::default();

        let err = PollingWaiter::new(&client, &clock)
            .wait(&ProviderContext::new(), &handle(), &WaitPolicy::until_ready())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WaitError::Client {
                source: ClientError::NotFound(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_transient_describe_errors_consume_attempts() {
        let client = Scripted::new(vec![
            Err(ClientError::Transient("Throttling".into())),
            Ok(OperationResult::new(ResourceStatus::Ready)),
        ]);
        let clock = ManualClock::default();

        let outcome = PollingWaiter::new(&client, &clock)
            .wait(&ProviderContext::new(), &handle(), &WaitPolicy::until_ready())
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_polling() {
        let client = Scripted::statuses(&[ResourceStatus::Ready]);
        let clock = ManualClock::default();
        let token = CancellationToken::new();
        token.cancel();

        let err = PollingWaiter::new(&client, &clock)
            .with_cancellation(&token)
            .wait(&ProviderContext::new(), &handle(), &WaitPolicy::until_ready())
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Cancelled { attempts: 0, .. }));
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn test_policy_validation() {
        assert!(WaitPolicy::until_ready().validate().is_ok());
        assert!(WaitPolicy::until_ready().at_most(0).validate().is_err());
        assert!(
            WaitPolicy::until_ready()
                .failing_on([ResourceStatus::Ready])
                .validate()
                .is_err()
        );
        assert!(WaitPolicy::until([]).validate().is_err());
    }
}
