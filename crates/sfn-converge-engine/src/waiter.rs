//! Polling waits for eventually-consistent resources.
//!
//! Two kinds of wait exist and they target different things:
//!
//! - [`StateWaiter`] polls a status label until it reaches a target status, or
//!   until the resource is gone. Used after create and delete.
//! - [`SettleWaiter`] polls attribute values until every changed field matches
//!   its desired value. Used after update, where there is no status to watch.
//!
//! Both poll on a fixed interval, race every check and sleep against a
//! cancellation token, and end within their timeout plus one poll interval.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// What a refresh saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<T> {
    /// The resource exists.
    Found {
        /// The observed state.
        state: T,
        /// Its status label.
        status: String,
    },
    /// The resource does not exist.
    Gone,
}

/// What a settle check saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settle<T> {
    /// Every field matches.
    Settled(T),
    /// Some fields still differ.
    Diverged {
        /// The observed state.
        state: T,
        /// Names of the fields that differ.
        fields: Vec<&'static str>,
    },
}

/// Errors produced by a wait.
#[derive(Debug, Error)]
pub enum WaitError<E> {
    /// The check itself failed.
    #[error("refresh failed: {0}")]
    Refresh(E),

    /// The status left the pending set without reaching a target.
    #[error("unexpected status {status} (expected one of {expected:?})")]
    UnexpectedState {
        /// The status observed.
        status: String,
        /// The target statuses.
        expected: Vec<String>,
    },

    /// The resource kept reading as gone while a status was expected.
    #[error("resource not found after {checks} checks")]
    NotFound {
        /// Consecutive not-found observations.
        checks: u32,
    },

    /// The timeout expired while the status was still pending.
    #[error("timed out after {elapsed:?} (last status {last_status:?})")]
    Timeout {
        /// Time spent.
        elapsed: Duration,
        /// The last status seen.
        last_status: Option<String>,
    },

    /// The timeout expired while fields still differed.
    #[error("timed out after {elapsed:?} waiting for {fields:?} to settle")]
    Unsettled {
        /// Time spent.
        elapsed: Duration,
        /// The fields that still differed on the last read.
        fields: Vec<&'static str>,
    },

    /// The cancellation token fired.
    #[error("cancelled")]
    Cancelled,
}

/// Waits for a status-based transition.
#[derive(Debug, Clone)]
pub struct StateWaiter<'a> {
    /// Statuses that mean "keep waiting".
    pub pending: &'a [&'a str],
    /// Statuses that end the wait successfully.
    pub target: &'a [&'a str],
    /// Overall bound on the wait.
    pub timeout: Duration,
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Consecutive not-found reads tolerated while waiting for a target status.
    pub not_found_checks: u32,
}

impl StateWaiter<'_> {
    /// Poll until the status is in `target`.
    ///
    /// Not-found reads are tolerated up to `not_found_checks` times in a row,
    /// since a freshly created resource may not be readable yet.
    ///
    /// # Errors
    ///
    /// See [`WaitError`]; `Refresh` carries a failed check unchanged.
    pub async fn wait_for_target<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        refresh: F,
    ) -> Result<T, WaitError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation<T>, E>>,
    {
        match self.poll(cancel, false, refresh).await? {
            Some(state) => Ok(state),
            None => Err(WaitError::NotFound {
                checks: self.not_found_checks,
            }),
        }
    }

    /// Poll until the resource is gone. Every observed status must be in
    /// `pending`.
    ///
    /// # Errors
    ///
    /// See [`WaitError`]; `Refresh` carries a failed check unchanged.
    pub async fn wait_for_gone<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        refresh: F,
    ) -> Result<(), WaitError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation<T>, E>>,
    {
        self.poll(cancel, true, refresh).await.map(|_| ())
    }

    async fn poll<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        target_gone: bool,
        mut refresh: F,
    ) -> Result<Option<T>, WaitError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation<T>, E>>,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut not_found: u32 = 0;
        let mut last_status: Option<String> = None;

        loop {
            let observation = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(WaitError::Cancelled),
                observation = tokio::time::timeout_at(deadline, refresh()) => observation,
            };
            let Ok(observation) = observation else {
                return Err(WaitError::Timeout {
                    elapsed: start.elapsed(),
                    last_status,
                });
            };

            match observation.map_err(WaitError::Refresh)? {
                Observation::Gone if target_gone => return Ok(None),
                Observation::Gone => {
                    not_found += 1;
                    if not_found > self.not_found_checks {
                        return Err(WaitError::NotFound { checks: not_found });
                    }
                    tracing::debug!(checks = not_found, "Resource not found yet");
                }
                Observation::Found { state, status } => {
                    not_found = 0;
                    if !target_gone && self.target.contains(&status.as_str()) {
                        return Ok(Some(state));
                    }
                    if !self.pending.contains(&status.as_str()) {
                        let expected = if target_gone { &[][..] } else { self.target };
                        return Err(WaitError::UnexpectedState {
                            status,
                            expected: expected.iter().map(|s| (*s).to_string()).collect(),
                        });
                    }
                    tracing::debug!(status = %status, "Resource still pending");
                    last_status = Some(status);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::Timeout {
                    elapsed: start.elapsed(),
                    last_status,
                });
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(WaitError::Cancelled),
                () = tokio::time::sleep_until((now + self.poll_interval).min(deadline)) => {}
            }
        }
    }
}

/// Waits for a value-based settle after an update.
#[derive(Debug, Clone, Copy)]
pub struct SettleWaiter {
    /// Overall bound on the wait.
    pub timeout: Duration,
    /// Delay between polls.
    pub poll_interval: Duration,
}

impl SettleWaiter {
    /// Poll `check` until it reports [`Settle::Settled`].
    ///
    /// # Errors
    ///
    /// - `WaitError::Refresh` if the check fails (a not-found included)
    /// - `WaitError::Unsettled` naming the fields that still differ at the timeout
    /// - `WaitError::Cancelled` if `cancel` fires
    pub async fn wait<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut check: F,
    ) -> Result<T, WaitError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Settle<T>, E>>,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut diverged: Vec<&'static str> = Vec::new();

        loop {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(WaitError::Cancelled),
                outcome = tokio::time::timeout_at(deadline, check()) => outcome,
            };
            let Ok(outcome) = outcome else {
                return Err(WaitError::Unsettled {
                    elapsed: start.elapsed(),
                    fields: diverged,
                });
            };

            match outcome.map_err(WaitError::Refresh)? {
                Settle::Settled(state) => return Ok(state),
                Settle::Diverged { fields, .. } => {
                    tracing::debug!(fields = ?fields, "Waiting for fields to settle");
                    diverged = fields;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::Unsettled {
                    elapsed: start.elapsed(),
                    fields: diverged,
                });
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(WaitError::Cancelled),
                () = tokio::time::sleep_until((now + self.poll_interval).min(deadline)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    const PENDING: &[&str] = &["CREATING"];
    const TARGET: &[&str] = &["ACTIVE"];

    fn waiter(pending: &'static [&'static str], target: &'static [&'static str]) -> StateWaiter<'static> {
        StateWaiter {
            pending,
            target,
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(5),
            not_found_checks: 2,
        }
    }

    fn found(status: &str) -> Observation<u32> {
        Observation::Found {
            state: 7,
            status: status.to_string(),
        }
    }

    /// A check that replays a script, repeating the last entry forever.
    fn scripted<T: Clone>(script: Vec<T>) -> impl FnMut() -> std::future::Ready<Result<T, String>> {
        let mut script = VecDeque::from(script);
        move || {
            let next = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            std::future::ready(next.ok_or_else(|| "empty script".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_target_after_pending() {
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let state = waiter(PENDING, TARGET)
            .wait_for_target(&cancel, scripted(vec![found("CREATING"), found("CREATING"), found("ACTIVE")]))
            .await
            .unwrap();

        assert_eq!(state, 7);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_status_fails_immediately() {
        let cancel = CancellationToken::new();

        let err = waiter(PENDING, TARGET)
            .wait_for_target(&cancel, scripted(vec![found("FAILED")]))
            .await
            .unwrap_err();

        match err {
            WaitError::UnexpectedState { status, expected } => {
                assert_eq!(status, "FAILED");
                assert_eq!(expected, vec!["ACTIVE".to_string()]);
            }
            other => panic!("expected UnexpectedState, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tolerates_read_after_create_lag() {
        let cancel = CancellationToken::new();

        let state = waiter(PENDING, TARGET)
            .wait_for_target(
                &cancel,
                scripted(vec![Observation::Gone, Observation::Gone, found("ACTIVE")]),
            )
            .await
            .unwrap();
        assert_eq!(state, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn too_many_not_found_reads_fail() {
        let cancel = CancellationToken::new();

        let err = waiter(PENDING, TARGET)
            .wait_for_target(&cancel, scripted(vec![Observation::<u32>::Gone]))
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::NotFound { checks: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn gone_is_success_when_awaiting_deletion() {
        let cancel = CancellationToken::new();

        waiter(&["ACTIVE", "DELETING"], &[])
            .wait_for_gone(&cancel, scripted(vec![found("DELETING"), Observation::Gone]))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_within_timeout_plus_interval() {
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let err = waiter(&["ACTIVE", "DELETING"], &[])
            .wait_for_gone(&cancel, scripted(vec![found("DELETING")]))
            .await
            .unwrap_err();

        match err {
            WaitError::Timeout { last_status, .. } => {
                assert_eq!(last_status.as_deref(), Some("DELETING"));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert!(start.elapsed() <= Duration::from_secs(65));
    }

    #[tokio::test(start_paused = true)]
    async fn check_error_is_propagated() {
        let cancel = CancellationToken::new();

        let err = waiter(PENDING, TARGET)
            .wait_for_target(&cancel, || {
                std::future::ready(Err::<Observation<u32>, _>("throttled".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Refresh(ref e) if e == "throttled"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });
        let start = Instant::now();

        let err = waiter(PENDING, TARGET)
            .wait_for_target(&cancel, scripted(vec![found("CREATING")]))
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn settle_waits_for_fields() {
        let cancel = CancellationToken::new();
        let settle = SettleWaiter {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(5),
        };

        let state = settle
            .wait(
                &cancel,
                scripted(vec![
                    Settle::Diverged {
                        state: 1,
                        fields: vec!["definition"],
                    },
                    Settle::Settled(2),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(state, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_times_out_naming_fields() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let settle = SettleWaiter {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(5),
        };

        let err = settle
            .wait(
                &cancel,
                scripted(vec![Settle::<u32>::Diverged {
                    state: 1,
                    fields: vec!["definition", "role_arn"],
                }]),
            )
            .await
            .unwrap_err();

        match err {
            WaitError::Unsettled { elapsed, fields } => {
                assert_eq!(fields, vec!["definition", "role_arn"]);
                assert_eq!(elapsed, Duration::from_secs(60));
            }
            other => panic!("expected Unsettled, got {other:?}"),
        }
        assert!(start.elapsed() <= Duration::from_secs(65));
    }
}
