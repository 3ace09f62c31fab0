use futures::future::join_all;
use mineset_remote::{MiningConnection, RemoteError};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{orchestrator::Orchestrator, registry::MinerRegistry};

/// Outcome of one polling cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Miners whose balance was written to the registry
    pub updated: Vec<Uuid>,
    /// Miners unknown to their endpoint
    pub unknown: Vec<Uuid>,
    /// Miners whose connection was dropped after a timeout or hang-up
    pub dropped: Vec<Uuid>,
    /// Miners whose endpoint rejected the request; the connection is kept
    pub failed: Vec<Uuid>,
}

enum PollOutcome {
    Updated,
    Unknown,
    Dropped,
    Failed,
    Skipped,
}

/// Fetches remote balances over the live connections
pub struct BalancePoller {
    registry: Arc<MinerRegistry>,
    orchestrator: Arc<Orchestrator>,
    enabled: AtomicBool,
    timeout: Duration,
}

impl BalancePoller {
    /// Polling starts disabled
    pub fn new(registry: Arc<MinerRegistry>, orchestrator: Arc<Orchestrator>, timeout: Duration) -> Self {
        Self {
            registry,
            orchestrator,
            enabled: AtomicBool::new(false),
            timeout,
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::SeqCst) != enabled {
            info!("Balance polling {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Poll every live connection if polling is enabled
    pub async fn poll(&self) -> PollReport {
        if !self.is_enabled() {
            return PollReport::default();
        }
        self.poll_now().await
    }

    /// Poll every live connection regardless of the enable flag.
    /// Failures of one miner never affect the others.
    pub async fn poll_now(&self) -> PollReport {
        let connections = self.orchestrator.pool().connections();
        debug!("Polling balances of {} miners", connections.len());

        let polls = connections
            .into_iter()
            .map(|(id, connection)| async move { (id, self.poll_one(id, connection).await) });

        let mut report = PollReport::default();
        for (id, outcome) in join_all(polls).await {
            match outcome {
                PollOutcome::Updated => report.updated.push(id),
                PollOutcome::Unknown => report.unknown.push(id),
                PollOutcome::Dropped => report.dropped.push(id),
                PollOutcome::Failed => report.failed.push(id),
                PollOutcome::Skipped => {}
            }
        }
        report
    }

    async fn poll_one(&self, id: Uuid, connection: Arc<dyn MiningConnection>) -> PollOutcome {
        let Some(miner) = self.registry.get(id) else {
            return PollOutcome::Skipped;
        };

        let request = connection.get_balance(
            &miner.specification().signature_for_deadlines,
            miner.public_key().to_base58(),
            self.timeout,
        );
        let balance = timeout(self.timeout, request)
            .await
            .unwrap_or(Err(RemoteError::Timeout));

        match balance {
            Ok(Some(balance)) => match self.registry.set_balance(id, balance).await {
                Ok(_) => PollOutcome::Updated,
                Err(e) => {
                    error!("Cannot store balance of miner {}: {}", id, e);
                    PollOutcome::Skipped
                }
            },
            Ok(None) => {
                debug!("Endpoint of miner {} does not know its key yet", id);
                PollOutcome::Unknown
            }
            Err(e) if e.is_transient() => {
                // No inline retry: the next reconciliation reconnects
                warn!("Balance request of miner {} failed, dropping its connection: {}", id, e);
                self.orchestrator.disconnect_connection(id, &connection).await;
                PollOutcome::Dropped
            }
            Err(e) => {
                warn!("Endpoint of miner {} rejected the balance request: {}", id, e);
                PollOutcome::Failed
            }
        }
    }
}
