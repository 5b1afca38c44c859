//! Authority records & identity status

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::hash::{ChainId, Hash32, KeyHash};
use crate::error::AuthorityError;

/// Lifecycle status of an identity. Removal is not a status: removed authorities are
/// deleted from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum IdentityStatus {
    #[default]
    Pending,
    PendingFederatedServer,
    PendingAuditServer,
    FederatedServer,
    AuditServer,
}

impl IdentityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingFederatedServer => "pendingFederatedServer",
            Self::PendingAuditServer => "pendingAuditServer",
            Self::FederatedServer => "federatedServer",
            Self::AuditServer => "auditServer",
        }
    }

    /// Federated and audit servers are active authorities; everything else is pending.
    pub fn is_server(&self) -> bool {
        matches!(self, Self::FederatedServer | Self::AuditServer)
    }
}

impl fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IdentityStatus {
    type Err = AuthorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "pendingfederatedserver" => Ok(Self::PendingFederatedServer),
            "pendingauditserver" => Ok(Self::PendingAuditServer),
            "federatedserver" => Ok(Self::FederatedServer),
            "auditserver" => Ok(Self::AuditServer),
            _ => Err(AuthorityError::Malformed {
                context: "identity status",
                reason: format!("Unknown identity status: {}", s),
            }),
        }
    }
}

/// External chain an anchor key signs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnchorChain {
    #[serde(rename = "BTC")]
    Bitcoin,
}

impl AnchorChain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bitcoin => "BTC",
        }
    }
}

impl fmt::Display for AnchorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A key an authority registered for anchoring into an external chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorKey {
    pub chain: AnchorChain,
    /// Script type for Bitcoin keys: 0 is P2PKH and 1 is P2SH.
    pub key_type: u8,
    /// Rank among the authority's keys for the same chain. Lower is preferred.
    pub key_priority: u8,
    /// Raw key bytes, [`ANCHOR_KEY_LENGTH`](crate::ANCHOR_KEY_LENGTH) long.
    pub key: Vec<u8>,
}

/// One identity as the registry knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authority {
    /// Identity chain id. This is the registry key.
    pub identity_chain_id: ChainId,
    /// Management chain id. Never set by admin ops, so it stays zero after replay.
    pub management_chain_id: ChainId,
    /// Top of the authority's matryoshka hash chain. Zero until one is set.
    pub matryoshka_hash: Hash32,
    /// Block signing key. Zero until one is registered.
    pub signing_key: KeyHash,
    pub status: IdentityStatus,
    /// Anchor keys in registration order. Keys are only ever appended.
    pub anchor_keys: Vec<AnchorKey>,
}

impl Authority {
    /// A freshly referenced identity: status `Pending`, every other field zeroed.
    pub fn pending(identity_chain_id: ChainId) -> Self {
        Self {
            identity_chain_id,
            management_chain_id: Hash32::ZERO,
            matryoshka_hash: Hash32::ZERO,
            signing_key: Hash32::ZERO,
            status: IdentityStatus::Pending,
            anchor_keys: Vec::new(),
        }
    }

    pub fn is_federated(&self) -> bool {
        self.status == IdentityStatus::FederatedServer
    }

    pub fn is_audit(&self) -> bool {
        self.status == IdentityStatus::AuditServer
    }

    /// Signing key, if one has been registered.
    pub fn signing_key(&self) -> Option<KeyHash> {
        (!self.signing_key.is_zero()).then_some(self.signing_key)
    }
}
