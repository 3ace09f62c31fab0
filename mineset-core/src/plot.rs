use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::{error::Result, model::Miner};

/// Progress reported while a plot is written, in percent
pub type ProgressCallback = Box<dyn Fn(u8) + Send + Sync>;

/// Metadata bound into every nonce of a plot, tying it to one miner identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prolog {
    pub chain_id: String,
    pub public_key_for_signing_blocks: Vec<u8>,
    pub signature_for_blocks: String,
    pub public_key_for_signing_deadlines: Vec<u8>,
    pub signature_for_deadlines: String,
    pub extra: Vec<u8>,
}

impl Prolog {
    pub fn for_miner(miner: &Miner) -> Self {
        let specification = miner.specification();
        Self {
            chain_id: specification.chain_id.clone(),
            public_key_for_signing_blocks: specification.public_key_for_signing_blocks.as_bytes().to_vec(),
            signature_for_blocks: specification.signature_for_blocks.clone(),
            public_key_for_signing_deadlines: miner.public_key().as_bytes().to_vec(),
            signature_for_deadlines: specification.signature_for_deadlines.clone(),
            extra: Vec::new(),
        }
    }
}

/// A plot file opened by the engine
pub trait Plot: Send + Sync {
    fn prolog(&self) -> &Prolog;

    /// First nonce number
    fn start(&self) -> u64;

    /// Number of nonces
    fn length(&self) -> u64;

    fn hashing(&self) -> &str;
}

/// Generates and opens plot files
#[async_trait]
pub trait PlotEngine: Send + Sync {
    /// Write a plot; may take minutes
    async fn create(
        &self,
        path: &Path,
        prolog: &Prolog,
        start: u64,
        length: u64,
        hashing: &str,
        on_progress: ProgressCallback,
    ) -> Result<()>;

    async fn load(&self, path: &Path) -> Result<Box<dyn Plot>>;
}

/// Location of the plot of miner `id`
pub fn plot_path(plots_dir: &Path, id: Uuid) -> PathBuf {
    plots_dir.join(format!("{}.plot", id))
}
