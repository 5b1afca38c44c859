//! Authority registry
//!
//! The set of identities currently known to the authority set, keyed by identity chain
//! id. It is mutated only by the replay engine; readers go through [`AuthorityView`] or
//! take a snapshot from a [`SharedRegistry`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::admin::DirectoryBlockSignature;
use crate::error::AuthorityError;
use crate::replay::{ReplayReport, Replayer};
use crate::types::{AnchorKey, Authority, ChainId, Hash32, IdentityStatus, KeyHash};

/// Read access used by signature validation and voting.
pub trait AuthorityView {
    fn is_federated(&self, chain_id: &ChainId) -> bool;
    fn is_audit(&self, chain_id: &ChainId) -> bool;
    fn signing_key_of(&self, chain_id: &ChainId) -> Option<KeyHash>;
}

/// Verifies an ed25519 signature. Cryptography lives outside this crate.
pub trait SignatureVerifier {
    fn verify(&self, public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> bool;
}

/// Receives identity status transitions caused by replay.
pub trait IdentityStatusHook: Send + Sync {
    fn status_changed(&self, chain_id: &ChainId, from: IdentityStatus, to: IdentityStatus);
}

/// Hook for callers with no identity registry to notify.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIdentityHook;

impl IdentityStatusHook for NoIdentityHook {
    fn status_changed(&self, _chain_id: &ChainId, _from: IdentityStatus, _to: IdentityStatus) {}
}

/// Authorities keyed by identity chain id, as of [`Self::height`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorityRegistry {
    authorities: HashMap<ChainId, Authority>,
    server_count: u64,
    /// Last directory block height whose admin log has been applied.
    height: u32,
}

impl AuthorityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, chain_id: &ChainId) -> Option<&Authority> {
        self.authorities.get(chain_id)
    }

    pub fn contains(&self, chain_id: &ChainId) -> bool {
        self.authorities.contains_key(chain_id)
    }

    pub fn len(&self) -> usize {
        self.authorities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authorities.is_empty()
    }

    /// Iteration order is unspecified; use [`Self::snapshot`] for a stable order.
    pub fn iter(&self) -> impl Iterator<Item = &Authority> {
        self.authorities.values()
    }

    pub fn server_count(&self) -> u64 {
        self.server_count
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub(crate) fn mark_applied(&mut self, height: u32) {
        self.height = height;
    }

    /// Inserts a `Pending` record for `chain_id` unless one exists.
    pub fn upsert_pending(&mut self, chain_id: ChainId) -> &mut Authority {
        self.authorities.entry(chain_id).or_insert_with(|| {
            debug!(chain_id = %chain_id, "Inserting pending authority");
            Authority::pending(chain_id)
        })
    }

    fn get_mut(&mut self, chain_id: &ChainId) -> Result<&mut Authority, AuthorityError> {
        self.authorities
            .get_mut(chain_id)
            .ok_or(AuthorityError::UnknownAuthority(*chain_id))
    }

    /// Returns the previous status.
    pub fn set_status(
        &mut self,
        chain_id: &ChainId,
        status: IdentityStatus,
    ) -> Result<IdentityStatus, AuthorityError> {
        let authority = self.get_mut(chain_id)?;
        let previous = std::mem::replace(&mut authority.status, status);
        info!(chain_id = %chain_id, from = %previous, to = %status, "Authority status changed");
        Ok(previous)
    }

    pub fn set_matryoshka(
        &mut self,
        chain_id: &ChainId,
        hash: Hash32,
    ) -> Result<(), AuthorityError> {
        self.get_mut(chain_id)?.matryoshka_hash = hash;
        debug!(chain_id = %chain_id, "Matryoshka hash set");
        Ok(())
    }

    pub fn set_signing_key(
        &mut self,
        chain_id: &ChainId,
        key: KeyHash,
    ) -> Result<(), AuthorityError> {
        self.get_mut(chain_id)?.signing_key = key;
        info!(chain_id = %chain_id, key = %key, "Signing key set");
        Ok(())
    }

    pub fn append_anchor_key(
        &mut self,
        chain_id: &ChainId,
        anchor: AnchorKey,
    ) -> Result<(), AuthorityError> {
        let authority = self.get_mut(chain_id)?;
        debug!(
            chain_id = %chain_id,
            chain = %anchor.chain,
            key_type = anchor.key_type,
            key_priority = anchor.key_priority,
            "Appending anchor key"
        );
        authority.anchor_keys.push(anchor);
        Ok(())
    }

    /// Deletes the record outright; nothing of it is retained.
    pub fn remove(&mut self, chain_id: &ChainId) -> Result<Authority, AuthorityError> {
        let removed = self
            .authorities
            .remove(chain_id)
            .ok_or(AuthorityError::UnknownAuthority(*chain_id))?;
        info!(chain_id = %chain_id, "Removed authority");
        Ok(removed)
    }

    pub fn increase_server_count(&mut self, delta: u64) {
        self.server_count = self.server_count.saturating_add(delta);
        debug!(server_count = self.server_count, "Server count increased");
    }

    pub fn federated_servers(&self) -> Vec<&Authority> {
        self.sorted(Authority::is_federated)
    }

    pub fn audit_servers(&self) -> Vec<&Authority> {
        self.sorted(Authority::is_audit)
    }

    fn sorted(&self, keep: impl Fn(&Authority) -> bool) -> Vec<&Authority> {
        let mut out: Vec<_> = self.authorities.values().filter(|a| keep(a)).collect();
        out.sort_by_key(|a| a.identity_chain_id);
        out
    }

    /// Canonical, order-independent copy of the registry.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut authorities: Vec<Authority> = self.authorities.values().cloned().collect();
        authorities.sort_by_key(|a| a.identity_chain_id);
        RegistrySnapshot {
            height: self.height,
            server_count: self.server_count,
            authorities,
        }
    }

    pub fn restore(snapshot: RegistrySnapshot) -> Result<Self, AuthorityError> {
        let mut authorities = HashMap::with_capacity(snapshot.authorities.len());
        for authority in snapshot.authorities {
            let id = authority.identity_chain_id;
            if authorities.insert(id, authority).is_some() {
                return Err(AuthorityError::Malformed {
                    context: "registry snapshot",
                    reason: format!("duplicate authority {}", id),
                });
            }
        }
        info!(
            height = snapshot.height,
            authorities = authorities.len(),
            "Restored authority registry from snapshot"
        );
        Ok(Self {
            authorities,
            server_count: snapshot.server_count,
            height: snapshot.height,
        })
    }

    /// Accepts a directory block signature only from a current federated server whose
    /// registered signing key is the signature's public key.
    pub fn verify_directory_signature(
        &self,
        sig: &DirectoryBlockSignature,
        message: &[u8],
        verifier: &dyn SignatureVerifier,
    ) -> bool {
        let Some(authority) = self.lookup(&sig.signer_chain_id) else {
            debug!(signer = %sig.signer_chain_id, "Signature from unknown authority");
            return false;
        };
        if !authority.is_federated() {
            debug!(
                signer = %sig.signer_chain_id,
                status = %authority.status,
                "Signer is not federated"
            );
            return false;
        }
        if authority.signing_key() != Some(Hash32::new(sig.public_key)) {
            debug!(signer = %sig.signer_chain_id, "Signature key does not match registered key");
            return false;
        }
        verifier.verify(&sig.public_key, message, &sig.signature)
    }
}

impl AuthorityView for AuthorityRegistry {
    fn is_federated(&self, chain_id: &ChainId) -> bool {
        self.lookup(chain_id).is_some_and(Authority::is_federated)
    }

    fn is_audit(&self, chain_id: &ChainId) -> bool {
        self.lookup(chain_id).is_some_and(Authority::is_audit)
    }

    fn signing_key_of(&self, chain_id: &ChainId) -> Option<KeyHash> {
        self.lookup(chain_id).and_then(Authority::signing_key)
    }
}

/// Serializable registry state. Authorities are sorted by identity chain id, so equal
/// registries produce identical snapshots.
/// Serializable copy of a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub height: u32,
    pub server_count: u64,
    /// Sorted by identity chain id, so equal registries give equal snapshots.
    pub authorities: Vec<Authority>,
}

/// Single-writer, many-reader handle.
///
/// Readers get an `Arc` to a complete registry and never observe a replay in progress.
/// Writers are serialized by `writer`, which is held from reading the published registry
/// until its successor is published, so a slower writer cannot overwrite a newer result.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<RwLock<Arc<AuthorityRegistry>>>,
    writer: Arc<Mutex<()>>,
}

impl SharedRegistry {
    pub fn new(registry: AuthorityRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(registry))),
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub async fn current(&self) -> Arc<AuthorityRegistry> {
        self.inner.read().await.clone()
    }

    /// Publishes `registry` unless it is behind the published one.
    pub async fn publish(&self, registry: AuthorityRegistry) -> Result<(), AuthorityError> {
        let _writer = self.writer.lock().await;
        self.replace(registry).await
    }

    /// Caller must hold `writer`.
    async fn replace(&self, registry: AuthorityRegistry) -> Result<(), AuthorityError> {
        let mut published = self.inner.write().await;
        let offered = registry.height();
        if offered < published.height() {
            warn!(
                current = published.height(),
                offered, "Refusing to publish an older authority registry"
            );
            return Err(AuthorityError::StaleRegistry {
                current: published.height(),
                offered,
            });
        }
        *published = Arc::new(registry);
        debug!(height = offered, "Published authority registry");
        Ok(())
    }

    /// Rebuilds from genesis and publishes the result. On error the previous registry
    /// stays published.
    pub async fn refresh(&self, replayer: &Replayer<'_>) -> Result<ReplayReport, AuthorityError> {
        let _writer = self.writer.lock().await;
        let (registry, report) = replayer.rebuild_with_report().await?;
        self.replace(registry).await?;
        Ok(report)
    }

    /// Applies heights after the published one through `target` to a private copy, then
    /// publishes it. `target` is capped at the last finalized height.
    pub async fn extend_to(
        &self,
        replayer: &Replayer<'_>,
        target: u32,
    ) -> Result<Arc<AuthorityRegistry>, AuthorityError> {
        let _writer = self.writer.lock().await;
        let current = self.current().await;
        let target = target.min(replayer.finalized_height().await?);
        if target <= current.height() {
            return Ok(current);
        }

        let mut next = (*current).clone();
        for height in current.height() + 1..=target {
            replayer.apply_height(height, &mut next).await?;
        }
        self.replace(next).await?;
        Ok(self.current().await)
    }
}
