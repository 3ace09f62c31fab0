use futures::future::join_all;
use mineset_remote::{Connector, MinerIdentity, MiningConnection, RemoteError};
use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::{
    sync::{broadcast, Mutex},
    time::timeout,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{model::Miner, plot::plot_path, pool::ConnectionPool, registry::MinerRegistry};

/// Connection lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected(Uuid),
    Disconnected(Uuid),
    ConnectFailed { id: Uuid, reason: String },
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub connected: Vec<Uuid>,
    pub failed: Vec<Uuid>,
    /// Connections that completed after their miner stopped being wanted
    pub abandoned: Vec<Uuid>,
    pub closed: Vec<Uuid>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.connected.is_empty() && self.failed.is_empty() && self.abandoned.is_empty() && self.closed.is_empty()
    }
}

enum ConnectOutcome {
    Connected,
    Failed,
    Abandoned,
}

/// Brings live connections in line with the miners that should be mining.
///
/// The only component that inserts into the connection pool. Passes are serialized
/// so two passes never both try to open a connection for the same miner.
pub struct Orchestrator {
    registry: Arc<MinerRegistry>,
    connector: Arc<dyn Connector>,
    pool: Arc<ConnectionPool>,
    plots_dir: PathBuf,
    connect_timeout: Duration,
    pass_lock: Mutex<()>,
    /// Set by `disconnect_all`; later passes do nothing
    stopped: AtomicBool,
    events: broadcast::Sender<ConnectionEvent>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<MinerRegistry>,
        connector: Arc<dyn Connector>,
        plots_dir: PathBuf,
        connect_timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(256);

        Self {
            registry,
            connector,
            pool: Arc::new(ConnectionPool::new()),
            plots_dir,
            connect_timeout,
            pass_lock: Mutex::new(()),
            stopped: AtomicBool::new(false),
            events,
        }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn is_connected(&self, id: Uuid) -> bool {
        self.pool.contains(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Run one reconciliation pass, waiting for any pass in progress.
    /// Does nothing once `disconnect_all` has run.
    pub async fn reconcile(&self) -> ReconcileReport {
        let _pass = self.pass_lock.lock().await;
        let mut report = ReconcileReport::default();
        if self.is_stopped() {
            debug!("Reconciliation skipped, orchestrator stopped");
            return report;
        }

        let snapshot = self.registry.snapshot();
        let desired: HashSet<Uuid> = snapshot.desired().map(|entry| entry.miner.id()).collect();

        let attempts = snapshot
            .desired()
            .filter(|entry| !self.pool.contains(entry.miner.id()))
            .map(|entry| async move {
                let id = entry.miner.id();
                (id, self.connect(&entry.miner).await)
            });

        for (id, outcome) in join_all(attempts).await {
            match outcome {
                ConnectOutcome::Connected => report.connected.push(id),
                ConnectOutcome::Failed => report.failed.push(id),
                ConnectOutcome::Abandoned => report.abandoned.push(id),
            }
        }

        for id in self.pool.ids() {
            if !desired.contains(&id) && self.disconnect(id).await {
                report.closed.push(id);
            }
        }

        if report.is_noop() {
            debug!("Reconciliation: nothing to do ({} live)", self.pool.len());
        } else {
            info!(
                "Reconciliation: {} connected, {} failed, {} abandoned, {} closed, {} live",
                report.connected.len(),
                report.failed.len(),
                report.abandoned.len(),
                report.closed.len(),
                self.pool.len()
            );
        }
        report
    }

    /// Take the miner's connection out of the pool and close it.
    /// False if it had no connection.
    pub async fn disconnect(&self, id: Uuid) -> bool {
        match self.pool.take(id) {
            Some(connection) => {
                connection.close().await;
                info!("Disconnected miner {}", id);
                let _ = self.events.send(ConnectionEvent::Disconnected(id));
                true
            }
            None => false,
        }
    }

    /// Like `disconnect`, but only if the pool still holds `connection`
    pub async fn disconnect_connection(&self, id: Uuid, connection: &Arc<dyn MiningConnection>) -> bool {
        match self.pool.take_if_same(id, connection) {
            Some(connection) => {
                connection.close().await;
                info!("Dropped connection of miner {}", id);
                let _ = self.events.send(ConnectionEvent::Disconnected(id));
                true
            }
            None => false,
        }
    }

    /// Close every connection and refuse further passes, used on shutdown
    pub async fn disconnect_all(&self) {
        let _pass = self.pass_lock.lock().await;
        self.stopped.store(true, Ordering::SeqCst);
        for id in self.pool.ids() {
            self.disconnect(id).await;
        }
    }

    async fn connect(&self, miner: &Miner) -> ConnectOutcome {
        let id = miner.id();
        let identity = MinerIdentity {
            miner_id: id,
            public_key_base58: miner.public_key().to_base58().to_string(),
            signature_for_deadlines: miner.specification().signature_for_deadlines.clone(),
            plot_path: plot_path(&self.plots_dir, id),
        };

        // Bounded here too, for connectors that ignore their timeout
        let attempt = timeout(
            self.connect_timeout,
            self.connector.connect(&identity, miner.uri(), self.connect_timeout),
        )
        .await
        .unwrap_or(Err(RemoteError::Timeout));

        let connection = match attempt {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Cannot connect miner {} to {}: {}", id, miner.uri(), e);
                let _ = self.events.send(ConnectionEvent::ConnectFailed {
                    id,
                    reason: e.to_string(),
                });
                return ConnectOutcome::Failed;
            }
        };

        // The miner may have been turned off or deleted while connecting
        if !self.registry.snapshot().is_desired(id) {
            info!("Miner {} no longer wanted, closing fresh connection", id);
            connection.close().await;
            return ConnectOutcome::Abandoned;
        }

        let generation = match self.pool.insert(id, connection.clone()) {
            Ok(generation) => generation,
            Err(rejected) => {
                warn!("Miner {} already has a connection", id);
                rejected.close().await;
                return ConnectOutcome::Abandoned;
            }
        };

        Self::watch_close(&connection, Arc::downgrade(&self.pool), id, generation, self.events.clone());

        info!("Miner {} is mining at {}", id, miner.uri());
        let _ = self.events.send(ConnectionEvent::Connected(id));
        ConnectOutcome::Connected
    }

    /// Remove the entry when the connection terminates on its own, unless it has
    /// already been taken out (or replaced by a newer connection)
    fn watch_close(
        connection: &Arc<dyn MiningConnection>,
        pool: Weak<ConnectionPool>,
        id: Uuid,
        generation: u64,
        events: broadcast::Sender<ConnectionEvent>,
    ) {
        connection.on_close(Box::new(move || {
            let Some(pool) = pool.upgrade() else { return };
            if pool.take_if_generation(id, generation).is_some() {
                info!("Connection of miner {} closed", id);
                let _ = events.send(ConnectionEvent::Disconnected(id));
            }
        }));
    }
}
