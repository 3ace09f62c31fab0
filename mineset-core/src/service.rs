use mineset_remote::{Connector, Endpoint};
use std::{path::Path, sync::Arc};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch, Notify},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::ServiceConfig,
    error::{CoreError, Result, ValidationError},
    keys::{IdentityMaterial, KeyProvider},
    model::{Miner, MinerStatus, MiningSpecification},
    orchestrator::{ConnectionEvent, Orchestrator, ReconcileReport},
    plot::{plot_path, PlotEngine, Prolog},
    poller::{BalancePoller, PollReport},
    registry::{MinerRegistry, RegistryEvent, RegistrySnapshot},
    store::{FileStore, RegistryStore},
};

/// Everything a consumer may want to observe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    Registry(RegistryEvent),
    Connection(ConnectionEvent),
    PlotProgress { id: Uuid, percent: u8 },
    PlotCreated(Uuid),
    PlotFailed { id: Uuid, reason: String },
}

/// A validated miner whose plot has not been created yet; nothing is persisted
#[derive(Debug, Clone)]
pub struct PendingMiner {
    miner: Miner,
}

impl PendingMiner {
    pub fn miner(&self) -> &Miner {
        &self.miner
    }
}

enum Command {
    CreateMiner {
        uri: String,
        size: i64,
        identity: IdentityMaterial,
        reply: oneshot::Sender<Result<PendingMiner>>,
    },
    ConfirmPlotCreation {
        pending: PendingMiner,
        reply: oneshot::Sender<Result<()>>,
    },
    Delete {
        id: Uuid,
        reply: oneshot::Sender<Result<bool>>,
    },
    Switch {
        id: Uuid,
        on: bool,
        reply: oneshot::Sender<Result<bool>>,
    },
    RefreshBalances {
        reply: oneshot::Sender<PollReport>,
    },
    SetBalancePolling {
        enabled: bool,
    },
    Reconcile {
        reply: oneshot::Sender<ReconcileReport>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Builder for the background mining worker
pub struct MiningService {
    config: ServiceConfig,
    connector: Arc<dyn Connector>,
    store: Option<Arc<dyn RegistryStore>>,
    plot_engine: Option<Arc<dyn PlotEngine>>,
    key_provider: Option<Arc<dyn KeyProvider>>,
    reconcile: bool,
}

impl MiningService {
    pub fn new(config: ServiceConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            store: None,
            plot_engine: None,
            key_provider: None,
            reconcile: true,
        }
    }

    /// Use `store` instead of the file named by the configuration
    pub fn with_store(mut self, store: Arc<dyn RegistryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_plot_engine(mut self, engine: Arc<dyn PlotEngine>) -> Self {
        self.plot_engine = Some(engine);
        self
    }

    pub fn with_key_provider(mut self, provider: Arc<dyn KeyProvider>) -> Self {
        self.key_provider = Some(provider);
        self
    }

    /// Never open mining connections on their own; only `reconcile_now` does.
    /// For hosts that only create or edit miners.
    pub fn without_reconciliation(mut self) -> Self {
        self.reconcile = false;
        self
    }

    /// Load the registry and start the worker, its timers and a first reconciliation
    pub async fn spawn(self) -> Result<ServiceHandle> {
        let config = self.config;
        let store = self.store.unwrap_or_else(|| {
            Arc::new(FileStore::new(config.store_path.clone(), config.store_timeout())) as Arc<dyn RegistryStore>
        });

        let registry = Arc::new(MinerRegistry::new(store, config.load_policy));
        registry.load().await?;

        let orchestrator = Arc::new(Orchestrator::new(
            registry.clone(),
            self.connector.clone(),
            config.plots_dir.clone(),
            config.connect_timeout(),
        ));
        let poller = Arc::new(BalancePoller::new(
            registry.clone(),
            orchestrator.clone(),
            config.balance_timeout(),
        ));

        let (events, _) = broadcast::channel(1024);
        let (command_tx, command_rx) = mpsc::channel(config.command_queue_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let core = Arc::new(ServiceCore {
            config,
            registry: registry.clone(),
            orchestrator: orchestrator.clone(),
            poller,
            connector: self.connector,
            plot_engine: self.plot_engine,
            key_provider: self.key_provider,
            reconcile_requested: Notify::new(),
            events: events.clone(),
        });

        let mut tasks = vec![
            forward_events(registry.subscribe(), events.clone(), ServiceEvent::Registry),
            forward_events(orchestrator.subscribe(), events.clone(), ServiceEvent::Connection),
        ];
        if self.reconcile {
            tasks.push(tokio::spawn(reconcile_loop(core.clone(), shutdown_rx)));
            core.request_reconcile();
        } else {
            info!("Automatic reconciliation disabled");
        }

        tasks.push(tokio::spawn(worker_loop(core.clone(), command_rx, shutdown_tx)));
        info!("Mining service started with {} miners", registry.snapshot().len());

        Ok(ServiceHandle {
            commands: command_tx,
            events,
            registry,
            orchestrator,
            tasks: Arc::new(parking_lot::Mutex::new(tasks)),
        })
    }
}

/// Cloneable handle used by consumers to drive the worker
#[derive(Clone)]
pub struct ServiceHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ServiceEvent>,
    registry: Arc<MinerRegistry>,
    orchestrator: Arc<Orchestrator>,
    tasks: Arc<parking_lot::Mutex<Vec<JoinHandle<()>>>>,
}

impl ServiceHandle {
    /// Validate the inputs and fetch the endpoint's specification
    pub async fn create_miner(&self, uri: &str, size: i64, identity: IdentityMaterial) -> Result<PendingMiner> {
        self.call(|reply| Command::CreateMiner {
            uri: uri.to_string(),
            size,
            identity,
            reply,
        })
        .await?
    }

    /// Register the miner and start creating its plot in the background
    pub async fn confirm_plot_creation(&self, pending: PendingMiner) -> Result<()> {
        self.call(|reply| Command::ConfirmPlotCreation { pending, reply }).await?
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        self.call(|reply| Command::Delete { id, reply }).await?
    }

    pub async fn turn_on(&self, id: Uuid) -> Result<bool> {
        self.call(|reply| Command::Switch { id, on: true, reply }).await?
    }

    pub async fn turn_off(&self, id: Uuid) -> Result<bool> {
        self.call(|reply| Command::Switch { id, on: false, reply }).await?
    }

    /// Poll balances now, whether or not periodic polling is enabled
    pub async fn request_balance_refresh(&self) -> Result<PollReport> {
        self.call(|reply| Command::RefreshBalances { reply }).await
    }

    pub async fn set_balance_polling(&self, enabled: bool) -> Result<()> {
        self.commands
            .send(Command::SetBalancePolling { enabled })
            .await
            .map_err(|_| CoreError::ServiceStopped)
    }

    pub async fn reconcile_now(&self) -> Result<ReconcileReport> {
        self.call(|reply| Command::Reconcile { reply }).await
    }

    /// Stop the worker and close every connection
    pub async fn shutdown(&self) -> Result<()> {
        self.call(|reply| Command::Shutdown { reply }).await?;

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.registry.snapshot()
    }

    pub fn is_connected(&self, id: Uuid) -> bool {
        self.orchestrator.is_connected(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| CoreError::ServiceStopped)?;
        response.await.map_err(|_| CoreError::ServiceStopped)
    }
}

struct ServiceCore {
    config: ServiceConfig,
    registry: Arc<MinerRegistry>,
    orchestrator: Arc<Orchestrator>,
    poller: Arc<BalancePoller>,
    connector: Arc<dyn Connector>,
    plot_engine: Option<Arc<dyn PlotEngine>>,
    key_provider: Option<Arc<dyn KeyProvider>>,
    /// Coalesces reconciliation triggers into the reconcile loop
    reconcile_requested: Notify,
    events: broadcast::Sender<ServiceEvent>,
}

impl ServiceCore {
    fn request_reconcile(&self) {
        self.reconcile_requested.notify_one();
    }

    async fn handle(self: Arc<Self>, command: Command) {
        match command {
            Command::CreateMiner { uri, size, identity, reply } => {
                let _ = reply.send(self.create_miner(&uri, size, &identity).await);
            }
            Command::ConfirmPlotCreation { pending, reply } => {
                let _ = reply.send(self.clone().confirm_plot_creation(pending).await);
            }
            Command::Delete { id, reply } => {
                let _ = reply.send(self.delete(id).await);
            }
            Command::Switch { id, on, reply } => {
                let _ = reply.send(self.switch(id, on).await);
            }
            Command::RefreshBalances { reply } => {
                let _ = reply.send(self.poller.poll_now().await);
            }
            Command::SetBalancePolling { enabled } => {
                self.poller.set_enabled(enabled);
                if enabled {
                    self.poller.poll().await;
                }
            }
            Command::Reconcile { reply } => {
                let _ = reply.send(self.orchestrator.reconcile().await);
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn create_miner(&self, uri: &str, size: i64, identity: &IdentityMaterial) -> Result<PendingMiner> {
        if size < 1 {
            return Err(ValidationError::NonPositiveSize(size).into());
        }
        Endpoint::parse(uri).map_err(|e| ValidationError::MalformedUri(e.to_string()))?;

        let payload = self
            .connector
            .fetch_specification(uri, self.config.connect_timeout())
            .await?;
        let specification = MiningSpecification::try_from(payload)?;

        let public_key = identity.resolve(self.key_provider.as_deref(), &specification.signature_for_deadlines)?;
        let miner = Miner::new(specification, uri, size, public_key)?;

        debug!("Prepared miner {} for {}", miner.id(), uri);
        Ok(PendingMiner { miner })
    }

    async fn confirm_plot_creation(self: Arc<Self>, pending: PendingMiner) -> Result<()> {
        let engine = self
            .plot_engine
            .clone()
            .ok_or_else(|| CoreError::Plot("no plot engine configured".to_string()))?;

        let miner = pending.miner;
        self.registry.add(miner.clone(), MinerStatus::new(true)).await?;

        tokio::spawn(async move {
            let id = miner.id();
            let path = plot_path(&self.config.plots_dir, id);

            match self.create_plot(engine.as_ref(), &miner, &path).await {
                Ok(()) if self.registry.get(id).is_none() => {
                    info!("Miner {} was deleted while plotting", id);
                    remove_plot(&path).await;
                }
                Ok(()) => match self.registry.mark_plot_ready(id).await {
                    Ok(_) => {
                        let _ = self.events.send(ServiceEvent::PlotCreated(id));
                        self.request_reconcile();
                    }
                    Err(e) => error!("Cannot record plot of miner {}: {}", id, e),
                },
                Err(e) => {
                    warn!("Plot creation for miner {} failed: {}", id, e);
                    remove_plot(&path).await;
                    if let Err(e) = self.registry.remove(id).await {
                        error!("Cannot remove miner {} after failed plot: {}", id, e);
                    }
                    let _ = self.events.send(ServiceEvent::PlotFailed {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        });

        Ok(())
    }

    async fn create_plot(&self, engine: &dyn PlotEngine, miner: &Miner, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let id = miner.id();
        let prolog = Prolog::for_miner(miner);
        let hashing = miner.specification().hashing_for_deadlines.clone();
        let events = self.events.clone();

        info!("Creating plot of {} nonces for miner {}", miner.size(), id);
        engine
            .create(
                path,
                &prolog,
                0,
                miner.size(),
                &hashing,
                Box::new(move |percent| {
                    let _ = events.send(ServiceEvent::PlotProgress { id, percent });
                }),
            )
            .await?;

        let plot = engine.load(path).await?;
        if plot.prolog() != &prolog || plot.length() != miner.size() {
            return Err(CoreError::Plot(format!("plot at {} does not match miner {}", path.display(), id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        if !self.registry.remove(id).await? {
            return Ok(false);
        }

        self.orchestrator.disconnect(id).await;
        remove_plot(&plot_path(&self.config.plots_dir, id)).await;
        self.request_reconcile();
        Ok(true)
    }

    async fn switch(&self, id: Uuid, on: bool) -> Result<bool> {
        if self.registry.get(id).is_none() {
            return Err(CoreError::UnknownMiner(id));
        }

        let changed = self.registry.set_on(id, on).await?;
        if !on {
            self.orchestrator.disconnect(id).await;
        }
        self.request_reconcile();
        Ok(changed)
    }
}

async fn remove_plot(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed plot {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Cannot remove plot {}: {}", path.display(), e),
    }
}

/// Receives commands and timer ticks; long-running work runs in spawned tasks
async fn worker_loop(core: Arc<ServiceCore>, mut commands: mpsc::Receiver<Command>, shutdown: watch::Sender<bool>) {
    let mut reconcile_timer = interval(core.config.reconcile_interval());
    reconcile_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    reconcile_timer.tick().await;

    let mut balance_timer = interval(core.config.balance_interval());
    balance_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    balance_timer.tick().await;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown { reply }) => {
                    info!("Stopping mining service");
                    let _ = shutdown.send(true);
                    core.orchestrator.disconnect_all().await;
                    let _ = reply.send(());
                    break;
                }
                Some(command) => {
                    tokio::spawn(core.clone().handle(command));
                }
                None => {
                    let _ = shutdown.send(true);
                    core.orchestrator.disconnect_all().await;
                    break;
                }
            },
            _ = reconcile_timer.tick() => core.request_reconcile(),
            _ = balance_timer.tick() => {
                if core.poller.is_enabled() {
                    let poller = core.poller.clone();
                    tokio::spawn(async move {
                        poller.poll().await;
                    });
                }
            }
        }
    }
}

/// Single consumer of reconciliation requests
async fn reconcile_loop(core: Arc<ServiceCore>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = core.reconcile_requested.notified() => {
                core.orchestrator.reconcile().await;
            }
        }
    }
}

fn forward_events<E: Clone + Send + 'static>(
    mut source: broadcast::Receiver<E>,
    sink: broadcast::Sender<ServiceEvent>,
    wrap: fn(E) -> ServiceEvent,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match source.recv().await {
                Ok(event) => {
                    let _ = sink.send(wrap(event));
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Dropped {} events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
