//! Uplink Connectivity State Machine
//!
//! Decides when the uplink should attempt network association and when it
//! should check an established association. The machine is pure: callers
//! pass in the current uptime tick and report association outcomes.
//!
//! Two retry delays apply. A failed attempt waits the full retry interval
//! before the next one. An association that drops after being established
//! is retried after a much shorter delay.

use crate::link;

/// Network association state of the uplink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    Connected,
}

/// Retry timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after a failed association attempt
    pub retry_interval_ms: u64,
    /// Delay after an established association is lost
    pub lost_retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_interval_ms: link::RETRY_INTERVAL_MS,
            lost_retry_delay_ms: link::LOST_RETRY_DELAY_MS,
        }
    }
}

/// What the caller should do on this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Nothing is due
    Idle,
    /// Run a bounded association attempt and report the outcome
    AttemptAssociation,
    /// Query live association status; report a loss if not associated
    CheckAssociation,
}

/// Result of reporting an event to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Association succeeded
    Connected,
    /// Association attempt failed; next attempt is due after the given tick
    ConnectionFailed { next_attempt_at_ms: u64 },
    /// Established association was lost; next attempt is due after the given tick
    ConnectionLost { next_attempt_at_ms: u64 },
    /// Event had no effect in the current state
    Unchanged(ConnectivityState),
}

#[derive(Debug)]
pub struct UplinkConnectivity {
    state: ConnectivityState,
    policy: RetryPolicy,
    last_attempt_ms: Option<u64>,
    next_attempt_at_ms: u64,
    connected_at_ms: Option<u64>,
}

impl Default for UplinkConnectivity {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl UplinkConnectivity {
    /// Create a machine in the Disconnected state with no attempt made yet
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: ConnectivityState::Disconnected,
            policy,
            last_attempt_ms: None,
            next_attempt_at_ms: 0,
            connected_at_ms: None,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectivityState::Connected
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Tick at which the last association attempt completed
    pub fn last_attempt_ms(&self) -> Option<u64> {
        self.last_attempt_ms
    }

    /// Tick at which the current association was established
    pub fn connected_at_ms(&self) -> Option<u64> {
        self.connected_at_ms
    }

    /// Once the current tick passes this value, the next attempt is due.
    /// `None` while connected.
    pub fn next_attempt_at_ms(&self) -> Option<u64> {
        match self.state {
            ConnectivityState::Connected => None,
            ConnectivityState::Disconnected => Some(self.next_attempt_at_ms),
        }
    }

    /// Decide what is due at `now_ms`
    pub fn tick(&self, now_ms: u64) -> TickAction {
        match self.state {
            ConnectivityState::Connected => TickAction::CheckAssociation,
            ConnectivityState::Disconnected => {
                if self.last_attempt_ms.is_none() || now_ms > self.next_attempt_at_ms {
                    TickAction::AttemptAssociation
                } else {
                    TickAction::Idle
                }
            }
        }
    }

    /// Report the outcome of an association attempt that completed at `now_ms`
    pub fn on_association_result(&mut self, associated: bool, now_ms: u64) -> Transition {
        self.last_attempt_ms = Some(now_ms);

        if associated {
            self.state = ConnectivityState::Connected;
            self.connected_at_ms = Some(now_ms);
            Transition::Connected
        } else {
            self.state = ConnectivityState::Disconnected;
            self.connected_at_ms = None;
            self.next_attempt_at_ms = now_ms + self.policy.retry_interval_ms;
            Transition::ConnectionFailed {
                next_attempt_at_ms: self.next_attempt_at_ms,
            }
        }
    }

    /// Report that live status shows the association is gone
    pub fn on_association_lost(&mut self, now_ms: u64) -> Transition {
        if self.state != ConnectivityState::Connected {
            return Transition::Unchanged(self.state);
        }

        self.state = ConnectivityState::Disconnected;
        self.connected_at_ms = None;
        self.next_attempt_at_ms = now_ms + self.policy.lost_retry_delay_ms;
        Transition::ConnectionLost {
            next_attempt_at_ms: self.next_attempt_at_ms,
        }
    }
}
