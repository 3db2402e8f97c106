//! Adapter lifecycle state machine.
//!
//! Every adapter goes through the same phases, whatever its external
//! resource is:
//!
//! ```text
//! INIT ──▶ CONNECTING ──▶ RUNNING ──▶ STOPPING ──▶ STOPPED
//!              ▲             │
//!              └─────────────┘  resource or bus lost while running
//! ```
//!
//! `STOPPING` is reachable from every live state: a stop may be requested
//! before the first connection succeeds, and a fatal error or a panic ends
//! the adapter from wherever it happens.
//!
//! # Examples
//!
//! ```
//! use odo_adapters::lifecycle::{Lifecycle, LifecycleState};
//!
//! let mut lifecycle = Lifecycle::new();
//! lifecycle.transition_to(LifecycleState::Connecting).unwrap();
//! lifecycle.transition_to(LifecycleState::Running).unwrap();
//!
//! // Cannot skip the stop phase
//! assert!(lifecycle.transition_to(LifecycleState::Stopped).is_err());
//! ```

use odo_core::{Error, Result, constants::DEFAULT_RETRY_BACKOFF_SECS};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Maximum number of transitions kept in history.
///
/// A healthy adapter makes three transitions per reconnect, so this covers
/// the recent flapping of a resource without growing unbounded.
const MAX_HISTORY_SIZE: usize = 64;

/// Phase of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Created, not started.
    Init,

    /// Opening the bus session and the external resource.
    Connecting,

    /// Handling messages and periodic work.
    Running,

    /// Releasing the resource and announcing the disconnection.
    Stopping,

    /// Terminal.
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Init => "INIT",
            LifecycleState::Connecting => "CONNECTING",
            LifecycleState::Running => "RUNNING",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Stopped => "STOPPED",
        };
        write!(f, "{name}")
    }
}

impl LifecycleState {
    /// Check if transition to `target` is valid from this state.
    ///
    /// ```
    /// use odo_adapters::lifecycle::LifecycleState;
    ///
    /// assert!(LifecycleState::Running.can_transition_to(LifecycleState::Connecting));
    /// assert!(LifecycleState::Init.can_transition_to(LifecycleState::Stopping));
    /// assert!(!LifecycleState::Init.can_transition_to(LifecycleState::Running));
    /// ```
    pub fn can_transition_to(self, target: LifecycleState) -> bool {
        matches!(
            (self, target),
            (LifecycleState::Init, LifecycleState::Connecting)
                | (LifecycleState::Connecting, LifecycleState::Running)
                | (LifecycleState::Running, LifecycleState::Connecting)
                | (
                    LifecycleState::Init | LifecycleState::Connecting | LifecycleState::Running,
                    LifecycleState::Stopping
                )
                | (LifecycleState::Stopping, LifecycleState::Stopped)
        )
    }

    /// Returns `true` once the adapter can no longer do any work.
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Stopped)
    }
}

/// A single recorded transition.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub at: Instant,
}

/// Lifecycle of one adapter with a bounded transition history.
#[derive(Debug)]
pub struct Lifecycle {
    current: LifecycleState,
    entered_at: Instant,
    history: VecDeque<LifecycleTransition>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            current: LifecycleState::Init,
            entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current(&self) -> LifecycleState {
        self.current
    }

    /// Time spent in the current state.
    pub fn time_in_current_state(&self) -> Duration {
        self.entered_at.elapsed()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<LifecycleTransition> {
        &self.history
    }

    /// Number of times the adapter went back from `RUNNING` to `CONNECTING`.
    pub fn reconnects(&self) -> usize {
        self.history
            .iter()
            .filter(|t| t.from == LifecycleState::Running && t.to == LifecycleState::Connecting)
            .count()
    }

    /// Move to `next`, validating the transition.
    ///
    /// # Errors
    /// Returns `Error::InvalidStateTransition` if `next` is not reachable from
    /// the current state. The state is left unchanged.
    pub fn transition_to(&mut self, next: LifecycleState) -> Result<LifecycleTransition> {
        if !self.current.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: self.current.to_string(),
                to: next.to_string(),
            });
        }

        let transition = LifecycleTransition {
            from: self.current,
            to: next,
            at: Instant::now(),
        };

        self.current = next;
        self.entered_at = transition.at;
        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }

        Ok(transition)
    }
}

/// Whether and how often a failed connection attempt is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            backoff: Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS),
        }
    }
}

impl RetryPolicy {
    /// Fail on the first error.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Wait before the next attempt at `resource`, or give up.
    ///
    /// # Errors
    /// Returns `Error::RetryDisabled` carrying `error` when retrying is off.
    pub async fn backoff(
        &self,
        adapter: &str,
        resource: &str,
        attempt: u32,
        error: &Error,
    ) -> Result<()> {
        if !self.enabled {
            return Err(Error::RetryDisabled {
                resource: resource.to_string(),
                reason: error.to_string(),
            });
        }

        warn!(
            adapter,
            resource,
            attempt,
            error = %error,
            retry_in_secs = self.backoff.as_secs_f32(),
            "Connection attempt failed"
        );
        tokio::time::sleep(self.backoff).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn running() -> Lifecycle {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition_to(LifecycleState::Connecting).unwrap();
        lifecycle.transition_to(LifecycleState::Running).unwrap();
        lifecycle
    }

    #[test]
    fn test_new_lifecycle_starts_in_init() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.current(), LifecycleState::Init);
        assert!(lifecycle.history().is_empty());
    }

    #[rstest]
    #[case(LifecycleState::Init, LifecycleState::Connecting, true)]
    #[case(LifecycleState::Init, LifecycleState::Running, false)]
    #[case(LifecycleState::Connecting, LifecycleState::Running, true)]
    #[case(LifecycleState::Connecting, LifecycleState::Stopped, false)]
    #[case(LifecycleState::Running, LifecycleState::Connecting, true)]
    #[case(LifecycleState::Running, LifecycleState::Stopping, true)]
    #[case(LifecycleState::Stopping, LifecycleState::Stopped, true)]
    #[case(LifecycleState::Stopping, LifecycleState::Connecting, false)]
    #[case(LifecycleState::Stopped, LifecycleState::Stopping, false)]
    #[case(LifecycleState::Stopped, LifecycleState::Connecting, false)]
    fn test_transition_rules(
        #[case] from: LifecycleState,
        #[case] to: LifecycleState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut lifecycle = Lifecycle::new();
        let error = lifecycle.transition_to(LifecycleState::Running).unwrap_err();

        assert!(matches!(error, Error::InvalidStateTransition { .. }));
        assert_eq!(error.to_string(), "Invalid state transition from INIT to RUNNING");
        assert_eq!(lifecycle.current(), LifecycleState::Init);
    }

    #[test]
    fn test_reconnects_are_counted() {
        let mut lifecycle = running();
        lifecycle.transition_to(LifecycleState::Connecting).unwrap();
        lifecycle.transition_to(LifecycleState::Running).unwrap();

        assert_eq!(lifecycle.reconnects(), 1);
        assert_eq!(lifecycle.history().len(), 4);
    }

    #[test]
    fn test_stop_sequence() {
        let mut lifecycle = running();
        lifecycle.transition_to(LifecycleState::Stopping).unwrap();
        let last = lifecycle.transition_to(LifecycleState::Stopped).unwrap();

        assert_eq!(last.from, LifecycleState::Stopping);
        assert!(lifecycle.current().is_terminal());
    }

    #[test]
    fn test_history_size_limit() {
        let mut lifecycle = running();
        for _ in 0..MAX_HISTORY_SIZE {
            lifecycle.transition_to(LifecycleState::Connecting).unwrap();
            lifecycle.transition_to(LifecycleState::Running).unwrap();
        }

        assert_eq!(lifecycle.history().len(), MAX_HISTORY_SIZE);
        assert_eq!(
            lifecycle.history().back().map(|t| t.to),
            Some(LifecycleState::Running)
        );
    }

    #[tokio::test]
    async fn test_disabled_retry_gives_up() {
        let policy = RetryPolicy::disabled();
        let error = Error::Transport("connection refused".into());

        let result = policy.backoff("espkey", "source", 1, &error).await;
        assert!(matches!(
            result,
            Err(Error::RetryDisabled { ref resource, .. }) if resource == "source"
        ));
        assert!(result.unwrap_err().is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enabled_retry_waits_for_backoff() {
        let policy = RetryPolicy::default().with_backoff(Duration::from_secs(10));
        let error = Error::Transport("connection refused".into());

        let start = Instant::now();
        policy.backoff("espkey", "source", 1, &error).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }
}
