use crate::{error::ValidationError, model::PublicKey};

/// Derives public keys from secret material
pub trait KeyProvider: Send + Sync {
    fn derive_public_key(
        &self,
        entropy: &[u8],
        password: &str,
        signature: &str,
    ) -> Result<PublicKey, ValidationError>;
}

/// How the user identifies the deadline signing key of a new miner
#[derive(Clone)]
pub enum IdentityMaterial {
    /// Key already derived elsewhere, as base58 text
    PublicKey(String),

    /// Derive through the configured key provider
    Entropy { entropy: Vec<u8>, password: String },
}

impl std::fmt::Debug for IdentityMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityMaterial::PublicKey(key) => f.debug_tuple("PublicKey").field(key).finish(),
            IdentityMaterial::Entropy { .. } => f.write_str("Entropy { .. }"),
        }
    }
}

impl IdentityMaterial {
    /// Resolve to the public key for signing deadlines with `signature`
    pub fn resolve(
        &self,
        provider: Option<&dyn KeyProvider>,
        signature: &str,
    ) -> Result<PublicKey, ValidationError> {
        match self {
            IdentityMaterial::PublicKey(base58) => PublicKey::from_base58(base58),
            IdentityMaterial::Entropy { entropy, password } => provider
                .ok_or(ValidationError::MissingKeyProvider)?
                .derive_public_key(entropy, password, signature),
        }
    }
}
