use async_trait::async_trait;
use num_bigint::BigUint;
use parking_lot::Mutex;
use std::{path::PathBuf, sync::Arc, time::Duration};
use uuid::Uuid;

use crate::{error::Result, protocol::SpecificationPayload};

/// Callback run once when a connection terminates
pub type CloseCallback = Box<dyn FnOnce() + Send + 'static>;

/// Local identity a connection mines with
#[derive(Debug, Clone)]
pub struct MinerIdentity {
    /// Registry id of the local miner
    pub miner_id: Uuid,

    /// Base58 public key used for signing deadlines
    pub public_key_base58: String,

    /// Signature algorithm used for deadlines
    pub signature_for_deadlines: String,

    /// Plot file answering the endpoint's challenges
    pub plot_path: PathBuf,
}

/// A live connection to a remote mining endpoint
#[async_trait]
pub trait MiningConnection: Send + Sync {
    /// Balance of `public_key_base58` as known by the endpoint, `None` if it is unknown
    async fn get_balance(
        &self,
        signature: &str,
        public_key_base58: &str,
        timeout: Duration,
    ) -> Result<Option<BigUint>>;

    /// Close the connection; closing twice is harmless
    async fn close(&self);

    /// Register a callback fired once the connection terminates for any reason.
    /// Fires immediately if the connection is already closed.
    fn on_close(&self, callback: CloseCallback);

    fn is_closed(&self) -> bool;
}

/// Opens connections to mining endpoints
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        identity: &MinerIdentity,
        uri: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn MiningConnection>>;

    /// Ask the endpoint which algorithms, chain and block key it mines with
    async fn fetch_specification(&self, uri: &str, timeout: Duration) -> Result<SpecificationPayload>;
}

#[derive(Default)]
struct NotifierState {
    closed: bool,
    callbacks: Vec<CloseCallback>,
}

/// Fires registered close callbacks exactly once
#[derive(Default)]
pub struct CloseNotifier {
    state: Mutex<NotifierState>,
}

impl CloseNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callback: CloseCallback) {
        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            callback();
        } else {
            state.callbacks.push(callback);
        }
    }

    /// Mark closed and run pending callbacks outside the lock.
    /// Returns false if it had already fired.
    pub fn fire(&self) -> bool {
        let callbacks = {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            std::mem::take(&mut state.callbacks)
        };

        for callback in callbacks {
            callback();
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
