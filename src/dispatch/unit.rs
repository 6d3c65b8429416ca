//! Retry state machine for one unit of work (a chunk or a stage call).
//!
//! ```text
//! Pending ──► InFlight ──► Success
//!    ▲            │
//!    │            ├──► RetryableFailure ──► Pending
//!    │            └──► FatalFailure
//! ```
//!
//! Quota rejections rotate to the next credential, transient errors back off
//! linearly, and everything else is fatal for the unit.

use std::time::Duration;

use tracing::{debug, warn};

use crate::inference::{Credential, CredentialPool, InferenceClient, InferenceError};

/// Text returned by a finished unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Response text, possibly cut off at the output ceiling.
    pub text: String,
    /// The service stopped at the output ceiling.
    pub truncated: bool,
}

/// What a retryable failure does before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Retry immediately with the next credential.
    Rotate,
    /// Wait, then retry.
    Backoff,
}

/// State of a unit of work.
#[derive(Debug)]
pub enum UnitState {
    /// Waiting for a credential.
    Pending {
        /// One-based attempt number.
        attempt: usize,
    },
    /// Request sent with `credential`.
    InFlight {
        /// One-based attempt number.
        attempt: usize,
        /// Credential used for this attempt.
        credential: Credential,
    },
    /// Finished with usable text.
    Success(Completion),
    /// Failed, will be retried.
    RetryableFailure {
        /// Attempt that failed.
        attempt: usize,
        /// Retry mode.
        reason: RetryReason,
        /// Error that caused the retry.
        error: InferenceError,
    },
    /// Failed for good.
    FatalFailure(InferenceError),
}

/// Retry limits for a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Quota rejections tolerated before giving up; normally the pool size.
    pub max_rotations: usize,
    /// Attempts allowed for transient errors, the first one included.
    pub max_transient_attempts: usize,
    /// Backoff unit; the n-th transient retry waits `n * backoff_base`.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Returns the wait before the retry that follows `failures` transient errors.
    pub fn backoff(&self, failures: usize) -> Duration {
        self.backoff_base
            .saturating_mul(u32::try_from(failures).unwrap_or(u32::MAX))
    }
}

/// Failure counters and the transition function for one unit.
#[derive(Debug)]
pub(crate) struct UnitTracker<'p> {
    policy: &'p RetryPolicy,
    rotations: usize,
    transient_failures: usize,
}

impl<'p> UnitTracker<'p> {
    pub(crate) fn new(policy: &'p RetryPolicy) -> Self {
        Self {
            policy,
            rotations: 0,
            transient_failures: 0,
        }
    }

    /// Maps the result of an in-flight attempt to the next state.
    pub(crate) fn transition(
        &mut self,
        attempt: usize,
        result: Result<String, InferenceError>,
    ) -> UnitState {
        match result {
            Ok(text) => UnitState::Success(Completion {
                text,
                truncated: false,
            }),
            Err(InferenceError::Truncated { partial }) => UnitState::Success(Completion {
                text: partial,
                truncated: true,
            }),
            Err(error @ InferenceError::QuotaExceeded(_)) => {
                self.rotations += 1;
                if self.rotations >= self.policy.max_rotations.max(1) {
                    UnitState::FatalFailure(InferenceError::AllCredentialsExhausted)
                } else {
                    UnitState::RetryableFailure {
                        attempt,
                        reason: RetryReason::Rotate,
                        error,
                    }
                }
            }
            Err(error @ InferenceError::Transient(_)) => {
                self.transient_failures += 1;
                if self.transient_failures >= self.policy.max_transient_attempts.max(1) {
                    UnitState::FatalFailure(error)
                } else {
                    UnitState::RetryableFailure {
                        attempt,
                        reason: RetryReason::Backoff,
                        error,
                    }
                }
            }
            Err(error) => UnitState::FatalFailure(error),
        }
    }

    fn backoff(&self) -> Duration {
        self.policy.backoff(self.transient_failures)
    }
}

/// One prompt driven to completion through the state machine.
pub(crate) struct UnitOfWork<'a> {
    pub(crate) label: &'a str,
    pub(crate) pool: &'a CredentialPool,
    pub(crate) client: &'a InferenceClient,
    pub(crate) policy: &'a RetryPolicy,
    pub(crate) system_context: &'a str,
    pub(crate) prompt: &'a str,
    pub(crate) output_ceiling: usize,
}

impl UnitOfWork<'_> {
    /// Runs the unit until it succeeds or fails for good.
    pub(crate) async fn run(self) -> Result<Completion, InferenceError> {
        let mut tracker = UnitTracker::new(self.policy);
        let mut state = UnitState::Pending { attempt: 1 };

        loop {
            state = match state {
                UnitState::Pending { attempt } => match self.pool.next() {
                    Ok(credential) => UnitState::InFlight {
                        attempt,
                        credential,
                    },
                    Err(error) => UnitState::FatalFailure(error),
                },
                UnitState::InFlight {
                    attempt,
                    credential,
                } => {
                    debug!(unit = self.label, attempt, credential = %credential, "Unit in flight");
                    let result = self
                        .client
                        .complete(
                            &credential,
                            self.system_context,
                            self.prompt,
                            self.output_ceiling,
                        )
                        .await;
                    if matches!(result, Err(InferenceError::QuotaExceeded(_))) {
                        self.pool.mark_exhausted(&credential);
                    }
                    tracker.transition(attempt, result)
                }
                UnitState::RetryableFailure {
                    attempt,
                    reason,
                    error,
                } => {
                    warn!(unit = self.label, attempt, ?reason, error = %error, "Retrying unit");
                    if reason == RetryReason::Backoff {
                        tokio::time::sleep(tracker.backoff()).await;
                    }
                    UnitState::Pending {
                        attempt: attempt + 1,
                    }
                }
                UnitState::Success(completion) => {
                    if completion.truncated {
                        warn!(
                            unit = self.label,
                            chars = completion.text.len(),
                            "Output truncated at the ceiling, keeping partial text"
                        );
                    }
                    return Ok(completion);
                }
                UnitState::FatalFailure(error) => {
                    warn!(unit = self.label, error = %error, "Unit failed");
                    return Err(error);
                }
            };
        }
    }
}
