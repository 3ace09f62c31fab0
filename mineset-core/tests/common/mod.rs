#![allow(dead_code)]

use async_trait::async_trait;
use mineset_core::{
    CoreError, Miner, MinerRecord, MinerStatus, MiningSpecification, Plot, PlotEngine, ProgressCallback,
    Prolog, PublicKey, RegistryStore,
};
use mineset_remote::{
    CloseCallback, CloseNotifier, Connector, MinerIdentity, MiningConnection, RemoteError,
    Result as RemoteResult, SpecificationPayload,
};
use num_bigint::BigUint;
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use uuid::Uuid;

pub const URI: &str = "ws://mining.example.com:8025";

pub fn specification(name: &str) -> MiningSpecification {
    MiningSpecification {
        name: name.to_string(),
        description: format!("{} chain", name),
        chain_id: format!("{}-chain", name),
        hashing_for_deadlines: "shabal256".to_string(),
        signature_for_blocks: "ed25519".to_string(),
        signature_for_deadlines: "ed25519".to_string(),
        public_key_for_signing_blocks: PublicKey::from_bytes(vec![3; 32]),
    }
}

pub fn miner(size: i64) -> Miner {
    Miner::new(specification("test"), URI, size, PublicKey::from_bytes(vec![5; 32])).unwrap()
}

/// Status of a miner that should be mining
pub fn desired() -> MinerStatus {
    MinerStatus {
        has_plot_ready: true,
        is_on: true,
        ..Default::default()
    }
}

pub fn record_value(miner: &Miner, status: &MinerStatus) -> Value {
    serde_json::to_value(MinerRecord::new(miner, status)).unwrap()
}

#[derive(Debug, Clone)]
pub enum BalanceReply {
    Known(u64),
    Unknown,
    Timeout,
    /// The endpoint answers with an error
    Rejected,
    /// The request never completes
    Hang,
}

pub struct MockConnection {
    notifier: CloseNotifier,
    closes: AtomicUsize,
    balance: Mutex<BalanceReply>,
}

impl MockConnection {
    fn new(balance: BalanceReply) -> Self {
        Self {
            notifier: CloseNotifier::new(),
            closes: AtomicUsize::new(0),
            balance: Mutex::new(balance),
        }
    }

    /// Simulate the endpoint going away
    pub fn drop_remote(&self) {
        self.notifier.fire();
    }

    pub fn set_balance(&self, reply: BalanceReply) {
        *self.balance.lock() = reply;
    }

    /// Number of local closes that actually closed the connection
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MiningConnection for MockConnection {
    async fn get_balance(&self, _signature: &str, _public_key: &str, _timeout: Duration) -> RemoteResult<Option<BigUint>> {
        let reply = self.balance.lock().clone();
        match reply {
            BalanceReply::Known(value) => Ok(Some(BigUint::from(value))),
            BalanceReply::Unknown => Ok(None),
            BalanceReply::Timeout => Err(RemoteError::Timeout),
            BalanceReply::Rejected => Err(RemoteError::Rpc {
                code: -32000,
                message: "unknown signature scheme".to_string(),
            }),
            BalanceReply::Hang => std::future::pending().await,
        }
    }

    async fn close(&self) {
        if self.notifier.fire() {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn on_close(&self, callback: CloseCallback) {
        self.notifier.register(callback);
    }

    fn is_closed(&self) -> bool {
        self.notifier.is_closed()
    }
}

/// Connector handing out `MockConnection`s, with controllable latency and failures
pub struct MockConnector {
    connects: AtomicUsize,
    failing: AtomicBool,
    hanging: AtomicBool,
    delay: Mutex<Duration>,
    balance: Mutex<BalanceReply>,
    connections: Mutex<HashMap<Uuid, Vec<Arc<MockConnection>>>>,
    specification: SpecificationPayload,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connects: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            hanging: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            balance: Mutex::new(BalanceReply::Known(0)),
            connections: Mutex::new(HashMap::new()),
            specification: SpecificationPayload::from(&specification("remote")),
        })
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make connection attempts never complete, ignoring their timeout
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn set_balance(&self, reply: BalanceReply) {
        *self.balance.lock() = reply;
    }

    /// Most recent connection opened for `id`
    pub fn latest(&self, id: Uuid) -> Option<Arc<MockConnection>> {
        self.connections.lock().get(&id).and_then(|all| all.last().cloned())
    }

    /// Connections of `id` that are still open
    pub fn open_count(&self, id: Uuid) -> usize {
        self.connections
            .lock()
            .get(&id)
            .map(|all| all.iter().filter(|c| !c.is_closed()).count())
            .unwrap_or(0)
    }

    pub fn total_closes(&self) -> usize {
        self.connections
            .lock()
            .values()
            .flatten()
            .map(|c| c.close_count())
            .sum()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        identity: &MinerIdentity,
        _uri: &str,
        _timeout: Duration,
    ) -> RemoteResult<Arc<dyn MiningConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.hanging.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Deployment("connection refused".to_string()));
        }

        let connection = Arc::new(MockConnection::new(self.balance.lock().clone()));
        self.connections
            .lock()
            .entry(identity.miner_id)
            .or_default()
            .push(connection.clone());
        Ok(connection)
    }

    async fn fetch_specification(&self, _uri: &str, _timeout: Duration) -> RemoteResult<SpecificationPayload> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Deployment("connection refused".to_string()));
        }
        Ok(self.specification.clone())
    }
}

/// Store whose writes always fail
pub struct FailingStore;

#[async_trait]
impl RegistryStore for FailingStore {
    async fn read(&self) -> mineset_core::Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn write(&self, _records: Vec<MinerRecord>) -> mineset_core::Result<()> {
        Err(CoreError::Persistence(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    }
}

struct MockPlot {
    prolog: Prolog,
    length: u64,
    hashing: String,
}

impl Plot for MockPlot {
    fn prolog(&self) -> &Prolog {
        &self.prolog
    }

    fn start(&self) -> u64 {
        0
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn hashing(&self) -> &str {
        &self.hashing
    }
}

/// Writes a marker file and remembers what it was asked to plot
#[derive(Default)]
pub struct MockPlotEngine {
    fail: bool,
    plots: Mutex<HashMap<PathBuf, (Prolog, u64, String)>>,
}

impl MockPlotEngine {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl PlotEngine for MockPlotEngine {
    async fn create(
        &self,
        path: &Path,
        prolog: &Prolog,
        _start: u64,
        length: u64,
        hashing: &str,
        on_progress: ProgressCallback,
    ) -> mineset_core::Result<()> {
        tokio::fs::write(path, b"partial").await?;
        on_progress(50);

        if self.fail {
            return Err(CoreError::Plot("out of disk space".to_string()));
        }

        on_progress(100);
        self.plots
            .lock()
            .insert(path.to_path_buf(), (prolog.clone(), length, hashing.to_string()));
        Ok(())
    }

    async fn load(&self, path: &Path) -> mineset_core::Result<Box<dyn Plot>> {
        let plots = self.plots.lock();
        let (prolog, length, hashing) = plots
            .get(path)
            .cloned()
            .ok_or_else(|| CoreError::Plot(format!("no plot at {}", path.display())))?;
        Ok(Box::new(MockPlot { prolog, length, hashing }))
    }
}
