//! Failure detection and bounded restart/retry
//!
//! The supervisor turns health signals from the sessions into recovery
//! actions: an in-place ICE restart when a transport fails, a debounced
//! restart when it stays degraded, and a full session replacement when a
//! server-side monitor asks for one. It never restarts a peer twice for one
//! failure — a new restart is armed only after the session reports
//! `Connected` again or is closed.

use crate::config::{ConnectionConfig, CoordinatorConfig, RestartPolicy};
use crate::coordinator::NegotiationCoordinator;
use crate::peer::capability::HealthState;
use std::collections::{HashMap, HashSet};
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Events observed by the supervisor
#[derive(Debug)]
pub(crate) enum SupervisorEvent {
    /// A session's connection health changed
    Health {
        remote_id: String,
        state: HealthState,
    },
    /// Server-side monitor requested a hard restart after a settle delay
    RetryRequested { remote_id: String, attempt: u32 },
    /// Server instructed an immediate session replacement with new config
    HardRestart {
        remote_id: String,
        config: ConnectionConfig,
    },
    /// A degraded-debounce timer elapsed
    DebounceElapsed { remote_id: String, epoch: u64 },
}

/// Observes session health and drives bounded recovery
pub(crate) struct ReconnectSupervisor {
    coordinator: Weak<NegotiationCoordinator>,
    degraded_debounce: Duration,
    retry_settle: Duration,
    policy: RestartPolicy,
    tx: mpsc::UnboundedSender<SupervisorEvent>,

    /// Health-transition counter per peer; a debounce timer only acts if no
    /// transition happened after it was scheduled
    epochs: HashMap<String, u64>,
    /// Peers with a restart in flight (re-armed on Connected/Closed)
    in_flight: HashSet<String>,
}

impl ReconnectSupervisor {
    /// Start the supervisor loop
    pub(crate) fn spawn(
        coordinator: Weak<NegotiationCoordinator>,
        config: &CoordinatorConfig,
        tx: mpsc::UnboundedSender<SupervisorEvent>,
        rx: mpsc::UnboundedReceiver<SupervisorEvent>,
    ) -> JoinHandle<()> {
        let supervisor = Self {
            coordinator,
            degraded_debounce: config.degraded_debounce(),
            retry_settle: config.retry_settle(),
            policy: config.restart.clone(),
            tx,
            epochs: HashMap::new(),
            in_flight: HashSet::new(),
        };

        tokio::spawn(supervisor.run(rx))
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SupervisorEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
        }

        debug!("Reconnect supervisor terminated");
    }

    async fn handle(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::Health { remote_id, state } => {
                self.handle_health(remote_id, state).await;
            }
            SupervisorEvent::DebounceElapsed { remote_id, epoch } => {
                if self.epochs.get(&remote_id) == Some(&epoch) {
                    warn!(
                        "Connection with {} still degraded after debounce, restarting",
                        remote_id
                    );
                    self.trigger_restart(&remote_id, "degraded-timeout").await;
                } else {
                    debug!("Degraded debounce for {} cancelled by recovery", remote_id);
                }
            }
            SupervisorEvent::RetryRequested { remote_id, attempt } => {
                self.schedule_hard_restart(remote_id, attempt, None);
            }
            SupervisorEvent::HardRestart { remote_id, config } => {
                self.schedule_hard_restart(remote_id, 0, Some(config));
            }
        }
    }

    async fn handle_health(&mut self, remote_id: String, state: HealthState) {
        let epoch = self.epochs.entry(remote_id.clone()).or_insert(0);
        *epoch += 1;
        let epoch = *epoch;

        match state {
            HealthState::Connected | HealthState::Closed => {
                // Recovery observed; arm the next restart.
                self.in_flight.remove(&remote_id);
            }
            HealthState::Degraded => {
                if self.in_flight.contains(&remote_id) {
                    return;
                }

                debug!(
                    "Connection with {} degraded, waiting {:?} before restart",
                    remote_id, self.degraded_debounce
                );

                let tx = self.tx.clone();
                let wait = self.degraded_debounce;
                tokio::spawn(async move {
                    tokio::time::sleep(wait).await;
                    let _ = tx.send(SupervisorEvent::DebounceElapsed { remote_id, epoch });
                });
            }
            HealthState::Failed => {
                self.trigger_restart(&remote_id, "failed").await;
            }
            HealthState::New | HealthState::Connecting => {}
        }
    }

    /// Fire an in-place ICE restart, at most once per failure
    async fn trigger_restart(&mut self, remote_id: &str, reason: &str) {
        if self.in_flight.contains(remote_id) {
            debug!("Restart already in flight for {}", remote_id);
            return;
        }

        let Some(coordinator) = self.coordinator.upgrade() else {
            return;
        };

        self.in_flight.insert(remote_id.to_string());

        if let Err(e) = coordinator.request_restart(remote_id, reason).await {
            warn!("Restart for {} not possible: {}", remote_id, e);
            self.in_flight.remove(remote_id);
        }
    }

    /// Replace the session outright after the settle delay plus backoff
    fn schedule_hard_restart(
        &mut self,
        remote_id: String,
        attempt: u32,
        config: Option<ConnectionConfig>,
    ) {
        if !self.policy.should_retry(attempt) {
            warn!(
                "Giving up on {} after {} restart attempts",
                remote_id, attempt
            );
            return;
        }

        let delay = if config.is_some() {
            // Explicit replacement config: rebuild immediately.
            Duration::ZERO
        } else {
            self.retry_settle + self.policy.backoff(attempt)
        };

        info!(
            "Hard restart for {} scheduled in {:?} (attempt {})",
            remote_id, delay, attempt
        );

        self.in_flight.insert(remote_id.clone());

        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let Some(coordinator) = coordinator.upgrade() else {
                return;
            };

            if let Err(e) = coordinator.connect_to(&remote_id, true, config).await {
                warn!("Hard restart for {} failed: {}", remote_id, e);
            }
        });
    }
}
