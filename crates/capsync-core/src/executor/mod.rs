//! Retry loop over the resilient transport.
//!
//! Applies the descriptor's retry budget, escalating per-attempt deadlines
//! and backoff between attempts. Retryable failures are absorbed (and
//! logged) until the budget runs out; fatal ones end the loop at once. The
//! caller only ever sees the terminal classification.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::auth::CredentialProvider;
use crate::config::CapsyncConfig;
use crate::control::CancelToken;
use crate::request::RequestDescriptor;
use crate::retry::{ErrorKind, ExecutionError, RetryDecision, RetryPolicy};
use crate::transport::{Connector, ResilientTransport, Response};

/// Terminal artifact of one executed operation.
#[derive(Debug)]
pub struct ExecutionResult {
    pub value: Result<Response, ExecutionError>,
    pub attempts_used: u32,
    pub total_elapsed: Duration,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.value.is_ok()
    }

    pub fn into_response(self) -> Result<Response, ExecutionError> {
        self.value
    }
}

#[derive(Clone)]
pub struct RequestExecutor {
    transport: ResilientTransport,
    credentials: Arc<dyn CredentialProvider>,
    policy: RetryPolicy,
}

impl RequestExecutor {
    pub fn new(transport: ResilientTransport, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            transport,
            credentials,
            policy: RetryPolicy::default(),
        }
    }

    /// Executor with floors and retry policy taken from the config.
    pub fn from_config(
        cfg: &CapsyncConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let transport = ResilientTransport::new(connector).with_floors(cfg.deadline_floors());
        Self::new(transport, credentials).with_policy(cfg.retry_policy())
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &ResilientTransport {
        &self.transport
    }

    /// Deadline for `attempt` (1-based): the descriptor's timeout raised to
    /// the class floor, then escalated.
    pub fn attempt_timeout(&self, descriptor: &RequestDescriptor, attempt: u32) -> Duration {
        let base = descriptor
            .effective_timeout()
            .max(self.transport.deadline_floor(descriptor.class()));
        self.policy.attempt_timeout(base, attempt)
    }

    pub async fn execute(&self, descriptor: &RequestDescriptor) -> ExecutionResult {
        self.execute_with_cancel(descriptor, &CancelToken::new()).await
    }

    pub async fn execute_with_cancel(
        &self,
        descriptor: &RequestDescriptor,
        cancel: &CancelToken,
    ) -> ExecutionResult {
        let started = Instant::now();
        let max_attempts = descriptor.attempts();
        let mut attempt = 1u32;

        loop {
            let credential = if descriptor.needs_auth() {
                self.credentials.credential().await
            } else {
                None
            };
            let timeout = self.attempt_timeout(descriptor, attempt);
            let outcome = self
                .transport
                .attempt(descriptor, credential.as_ref(), timeout, cancel)
                .await;

            let failure = match outcome.result {
                Ok(response) => {
                    tracing::debug!(
                        method = %descriptor.method(),
                        endpoint = descriptor.endpoint(),
                        attempt,
                        status = response.status,
                        elapsed_ms = outcome.elapsed.as_millis() as u64,
                        "request succeeded"
                    );
                    return ExecutionResult {
                        value: Ok(response),
                        attempts_used: attempt,
                        total_elapsed: started.elapsed(),
                    };
                }
                Err(failure) => failure,
            };

            match self.policy.decide(attempt, max_attempts, failure.kind) {
                RetryDecision::RetryAfter(delay) => {
                    tracing::debug!(
                        method = %descriptor.method(),
                        endpoint = descriptor.endpoint(),
                        attempt,
                        max_attempts,
                        kind = %failure.kind,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return self.terminal(
                                descriptor,
                                ErrorKind::Cancelled,
                                None,
                                attempt,
                                started,
                                "cancelled during backoff".to_string(),
                            );
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                RetryDecision::NoRetry => {
                    return self.terminal(
                        descriptor,
                        failure.kind,
                        failure.http_status,
                        attempt,
                        started,
                        failure.detail,
                    );
                }
            }
        }
    }

    fn terminal(
        &self,
        descriptor: &RequestDescriptor,
        kind: ErrorKind,
        http_status: Option<u16>,
        attempts: u32,
        started: Instant,
        detail: String,
    ) -> ExecutionResult {
        let elapsed = started.elapsed();
        let retries_exhausted = kind.is_retryable();
        if retries_exhausted {
            tracing::warn!(
                method = %descriptor.method(),
                endpoint = descriptor.endpoint(),
                attempts,
                kind = %kind,
                elapsed_ms = elapsed.as_millis() as u64,
                "retry budget exhausted"
            );
        } else {
            tracing::debug!(
                method = %descriptor.method(),
                endpoint = descriptor.endpoint(),
                attempts,
                kind = %kind,
                http_status,
                "request failed fatally"
            );
        }
        ExecutionResult {
            value: Err(ExecutionError {
                kind,
                http_status,
                attempts,
                elapsed,
                retries_exhausted,
                detail,
            }),
            attempts_used: attempts,
            total_elapsed: elapsed,
        }
    }
}
