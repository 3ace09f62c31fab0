use chrono::{DateTime, Utc};
use mineset_remote::{Endpoint, SpecificationPayload};
use num_bigint::BigUint;
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};
use uuid::Uuid;

use crate::error::ValidationError;

/// Public key together with its canonical base58 text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicKey {
    bytes: Vec<u8>,
    base58: String,
}

impl PublicKey {
    pub fn from_base58(text: &str) -> Result<Self, ValidationError> {
        let bytes = bs58::decode(text)
            .into_vec()
            .map_err(|e| ValidationError::MalformedKey(format!("{}: {}", text, e)))?;

        if bytes.is_empty() {
            return Err(ValidationError::MalformedKey("empty key".to_string()));
        }

        Ok(Self::from_bytes(bytes))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let base58 = bs58::encode(&bytes).into_string();
        Self { bytes, base58 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_base58(&self) -> &str {
        &self.base58
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base58)
    }
}

/// Algorithms, chain and block key declared by a remote endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningSpecification {
    pub name: String,
    pub description: String,
    pub chain_id: String,
    pub hashing_for_deadlines: String,
    pub signature_for_blocks: String,
    pub signature_for_deadlines: String,
    pub public_key_for_signing_blocks: PublicKey,
}

impl TryFrom<SpecificationPayload> for MiningSpecification {
    type Error = ValidationError;

    fn try_from(payload: SpecificationPayload) -> Result<Self, Self::Error> {
        if payload.name.trim().is_empty() {
            return Err(ValidationError::EmptySpecificationName);
        }

        Ok(Self {
            public_key_for_signing_blocks: PublicKey::from_base58(
                &payload.public_key_for_signing_blocks_base58,
            )?,
            name: payload.name,
            description: payload.description,
            chain_id: payload.chain_id,
            hashing_for_deadlines: payload.hashing_for_deadlines,
            signature_for_blocks: payload.signature_for_blocks,
            signature_for_deadlines: payload.signature_for_deadlines,
        })
    }
}

impl From<&MiningSpecification> for SpecificationPayload {
    fn from(spec: &MiningSpecification) -> Self {
        Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            chain_id: spec.chain_id.clone(),
            hashing_for_deadlines: spec.hashing_for_deadlines.clone(),
            signature_for_blocks: spec.signature_for_blocks.clone(),
            signature_for_deadlines: spec.signature_for_deadlines.clone(),
            public_key_for_signing_blocks_base58: spec.public_key_for_signing_blocks.to_base58().to_string(),
        }
    }
}

/// A configured miner. Identity is the UUID alone.
#[derive(Debug, Clone)]
pub struct Miner {
    id: Uuid,
    specification: MiningSpecification,
    uri: String,
    size: u64,
    public_key: PublicKey,
}

impl Miner {
    /// Create a miner with a fresh random id
    pub fn new(
        specification: MiningSpecification,
        uri: &str,
        size: i64,
        public_key: PublicKey,
    ) -> Result<Self, ValidationError> {
        Self::with_id(Uuid::new_v4(), specification, uri, size, public_key)
    }

    pub fn with_id(
        id: Uuid,
        specification: MiningSpecification,
        uri: &str,
        size: i64,
        public_key: PublicKey,
    ) -> Result<Self, ValidationError> {
        if size < 1 {
            return Err(ValidationError::NonPositiveSize(size));
        }
        Endpoint::parse(uri).map_err(|e| ValidationError::MalformedUri(e.to_string()))?;

        Ok(Self {
            id,
            specification,
            uri: uri.to_string(),
            size: size as u64,
            public_key,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn specification(&self) -> &MiningSpecification {
        &self.specification
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Number of nonces in the plot
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Key used for signing deadlines
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

impl PartialEq for Miner {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Miner {}

impl Hash for Miner {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Ord for Miner {
    fn cmp(&self, other: &Self) -> Ordering {
        self.specification
            .name
            .cmp(&other.specification.name)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Miner {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Miner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.specification.name, self.id)
    }
}

/// Mutable status of a miner
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MinerStatus {
    pub balance: BigUint,

    /// Flips to true once, when the plot is complete
    pub has_plot_ready: bool,

    /// User-controlled mining toggle
    pub is_on: bool,

    /// Last successful status touch, millisecond precision
    pub last_updated: Option<DateTime<Utc>>,
}

impl MinerStatus {
    pub fn new(is_on: bool) -> Self {
        Self {
            is_on,
            ..Default::default()
        }
    }

    /// The miner should hold a live connection
    pub fn is_desired(&self) -> bool {
        self.is_on && self.has_plot_ready
    }
}

/// Current time truncated to the millisecond resolution of the store
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
