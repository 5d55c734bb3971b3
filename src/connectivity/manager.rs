//! Connectivity manager with bounded association and automatic reassociation

use super::link::{Credentials, NetworkLink};
use crate::config::ConnectivityConfig;
use hydrosense_shared::state_machine::{
    ConnectivityState, RetryPolicy, TickAction, Transition, UplinkConnectivity,
};
use hydrosense_shared::Uptime;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Events emitted by the connectivity manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// Association established
    Connected { after_polls: u32 },
    /// Association attempt failed; next attempt is due after the given tick
    ConnectionFailed { reason: String, retry_at_ms: u64 },
    /// Established association dropped
    Disconnected { reason: String, retry_at_ms: u64 },
}

/// Outcome of one bounded association attempt
enum AttemptOutcome {
    Associated { after_polls: u32 },
    Refused(String),
    TimedOut,
}

/// Drives [`UplinkConnectivity`] against a live network link
pub struct ConnectivityManager<L> {
    link: L,
    credentials: Credentials,
    fsm: UplinkConnectivity,
    association_polls: u32,
    poll_interval: Duration,
    uptime: Uptime,
}

impl<L: NetworkLink> ConnectivityManager<L> {
    pub fn new(link: L, credentials: Credentials, config: &ConnectivityConfig, uptime: Uptime) -> Self {
        Self::with_policy(
            link,
            credentials,
            config.retry_policy(),
            config.association_polls,
            config.association_poll_interval(),
            uptime,
        )
    }

    pub fn with_policy(
        link: L,
        credentials: Credentials,
        policy: RetryPolicy,
        association_polls: u32,
        poll_interval: Duration,
        uptime: Uptime,
    ) -> Self {
        Self {
            link,
            credentials,
            fsm: UplinkConnectivity::new(policy),
            association_polls,
            poll_interval,
            uptime,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.fsm.state()
    }

    pub fn is_connected(&self) -> bool {
        self.fsm.is_connected()
    }

    /// Make the startup association attempt
    pub async fn start(&mut self) -> ConnectivityEvent {
        info!(
            "[{}] Associating with {:?}",
            self.link.name(),
            self.credentials.ssid
        );
        self.associate().await
    }

    /// Run whatever the state machine says is due now
    ///
    /// While connected this is one status query. While disconnected it is
    /// either nothing or one bounded association attempt.
    pub async fn tick(&mut self) -> Option<ConnectivityEvent> {
        match self.fsm.tick(self.uptime.millis()) {
            TickAction::Idle => None,
            TickAction::AttemptAssociation => {
                debug!("[{}] Retrying association", self.link.name());
                Some(self.associate().await)
            }
            TickAction::CheckAssociation => {
                if self.link.is_associated().await {
                    return None;
                }
                match self.fsm.on_association_lost(self.uptime.millis()) {
                    Transition::ConnectionLost { next_attempt_at_ms } => {
                        warn!(
                            "[{}] Association lost, retrying after {} ms",
                            self.link.name(),
                            next_attempt_at_ms
                        );
                        Some(ConnectivityEvent::Disconnected {
                            reason: "association lost".into(),
                            retry_at_ms: next_attempt_at_ms,
                        })
                    }
                    _ => None,
                }
            }
        }
    }

    /// One bounded association attempt, reported to the state machine
    async fn associate(&mut self) -> ConnectivityEvent {
        let outcome = self.attempt().await;
        let now = self.uptime.millis();

        match outcome {
            AttemptOutcome::Associated { after_polls } => {
                self.fsm.on_association_result(true, now);
                info!("[{}] Connected after {} polls", self.link.name(), after_polls);
                ConnectivityEvent::Connected { after_polls }
            }
            AttemptOutcome::Refused(reason) => self.failed(reason, now),
            AttemptOutcome::TimedOut => self.failed(
                format!("not associated after {} polls", self.association_polls),
                now,
            ),
        }
    }

    fn failed(&mut self, reason: String, now: u64) -> ConnectivityEvent {
        let retry_at_ms = match self.fsm.on_association_result(false, now) {
            Transition::ConnectionFailed { next_attempt_at_ms } => next_attempt_at_ms,
            _ => now,
        };
        warn!(
            "[{}] Association failed ({}), will retry later",
            self.link.name(),
            reason
        );
        ConnectivityEvent::ConnectionFailed { reason, retry_at_ms }
    }

    async fn attempt(&mut self) -> AttemptOutcome {
        if let Err(e) = self.link.begin_association(&self.credentials).await {
            return AttemptOutcome::Refused(format!("{:#}", e));
        }
        self.wait_for_association().await
    }

    /// Poll status at most `association_polls` times, `poll_interval` apart
    async fn wait_for_association(&mut self) -> AttemptOutcome {
        for polls in 0..self.association_polls {
            if self.link.is_associated().await {
                return AttemptOutcome::Associated { after_polls: polls };
            }
            sleep(self.poll_interval).await;
        }

        if self.link.is_associated().await {
            AttemptOutcome::Associated {
                after_polls: self.association_polls,
            }
        } else {
            AttemptOutcome::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::time::{advance, Instant};

    /// Link whose status answers are scripted; falls back to `settled`
    #[derive(Default)]
    struct ScriptedLink {
        status: VecDeque<bool>,
        settled: bool,
        refuse: bool,
        begin_calls: u32,
        status_calls: u32,
    }

    impl ScriptedLink {
        fn answering(status: &[bool], settled: bool) -> Self {
            Self {
                status: status.iter().copied().collect(),
                settled,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl NetworkLink for ScriptedLink {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn begin_association(&mut self, _credentials: &Credentials) -> Result<()> {
            self.begin_calls += 1;
            if self.refuse {
                return Err(anyhow!("radio off"));
            }
            Ok(())
        }

        async fn is_associated(&mut self) -> bool {
            self.status_calls += 1;
            self.status.pop_front().unwrap_or(self.settled)
        }
    }

    fn manager(link: ScriptedLink) -> ConnectivityManager<ScriptedLink> {
        ConnectivityManager::new(
            link,
            Credentials::new("field-ap", "secret"),
            &ConnectivityConfig::default(),
            Uptime::start(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_connects_after_a_few_polls() {
        let mut mgr = manager(ScriptedLink::answering(&[false, false, false], true));

        let event = mgr.start().await;
        assert_eq!(event, ConnectivityEvent::Connected { after_polls: 3 });
        assert!(mgr.is_connected());
        assert_eq!(mgr.link.begin_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_association_wait_is_bounded() {
        let mut mgr = manager(ScriptedLink::answering(&[], false));
        let started = Instant::now();

        let event = mgr.start().await;
        assert!(matches!(event, ConnectivityEvent::ConnectionFailed { .. }));
        assert_eq!(mgr.state(), ConnectivityState::Disconnected);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(20) && waited < Duration::from_secs(21));
        assert_eq!(mgr.link.status_calls, 21);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempt_retries_after_full_interval() {
        let mut mgr = manager(ScriptedLink::answering(&[], false));

        let ConnectivityEvent::ConnectionFailed { retry_at_ms, .. } = mgr.start().await else {
            panic!("expected failure");
        };
        assert!(retry_at_ms >= 20_000 + 30_000);

        advance(Duration::from_secs(30)).await;
        assert_eq!(mgr.tick().await, None);
        assert_eq!(mgr.link.begin_calls, 1);

        advance(Duration::from_millis(1)).await;
        mgr.link.settled = true;
        assert_eq!(
            mgr.tick().await,
            Some(ConnectivityEvent::Connected { after_polls: 0 })
        );
        assert_eq!(mgr.link.begin_calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_association_retries_quickly() {
        let mut mgr = manager(ScriptedLink::answering(&[], true));
        mgr.start().await;
        assert!(mgr.is_connected());

        assert_eq!(mgr.tick().await, None);

        advance(Duration::from_secs(100)).await;
        mgr.link.settled = false;
        let event = mgr.tick().await;
        assert_eq!(
            event,
            Some(ConnectivityEvent::Disconnected {
                reason: "association lost".into(),
                retry_at_ms: 105_000,
            })
        );
        assert_eq!(mgr.fsm.next_attempt_at_ms(), Some(105_000));

        advance(Duration::from_secs(5)).await;
        assert_eq!(mgr.tick().await, None);

        advance(Duration::from_millis(1)).await;
        mgr.link.settled = true;
        assert!(matches!(
            mgr.tick().await,
            Some(ConnectivityEvent::Connected { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_request_counts_as_failed_attempt() {
        let mut mgr = manager(ScriptedLink {
            refuse: true,
            settled: true,
            ..Default::default()
        });

        let event = mgr.start().await;
        let ConnectivityEvent::ConnectionFailed { reason, retry_at_ms } = event else {
            panic!("expected failure, got {:?}", event);
        };
        assert!(reason.contains("radio off"));
        assert_eq!(retry_at_ms, 30_000);
        assert_eq!(mgr.link.status_calls, 0);
        assert!(!mgr.is_connected());
    }
}
