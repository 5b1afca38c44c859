//! Replay engine
//!
//! Rebuilds the authority registry by folding every admin log from height 1 up to (but
//! not including) the open head height, in height order and in log order within a
//! height. A registry is only returned once the fold reaches its target, so callers never
//! see a partial replay.

use tracing::{debug, info, warn};

use crate::admin::{AdminOp, AdminOpKind, decode_admin_log};
use crate::error::AuthorityError;
use crate::registry::{AuthorityRegistry, IdentityStatusHook, NoIdentityHook};
use crate::store::DirectoryStore;
use crate::types::{ChainId, IdentityStatus};

const REPLAY_CEILING_VAR: &str = "AUTHORITY_REPLAY_CEILING";
const REQUIRE_DIRECTORY_BLOCKS_VAR: &str = "AUTHORITY_REQUIRE_DIRECTORY_BLOCKS";

/// Replay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Highest height a full rebuild will apply, even if the head is further along.
    pub replay_ceiling: Option<u32>,
    /// Require each replayed height's directory block to exist and carry that height.
    pub require_directory_blocks: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            replay_ceiling: None,
            require_directory_blocks: true,
        }
    }
}

impl ReplayConfig {
    /// Load from the environment:
    /// - `AUTHORITY_REPLAY_CEILING`: highest height to replay (unset = head - 1)
    /// - `AUTHORITY_REQUIRE_DIRECTORY_BLOCKS`: `true`/`false` (default `true`)
    pub fn from_env() -> Result<Self, AuthorityError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AuthorityError> {
        let mut config = Self::default();

        if let Some(value) = lookup(REPLAY_CEILING_VAR).filter(|v| !v.trim().is_empty()) {
            let ceiling = value.trim().parse::<u32>().map_err(|e| {
                AuthorityError::Config(format!("{} '{}': {}", REPLAY_CEILING_VAR, value, e))
            })?;
            config.replay_ceiling = Some(ceiling);
        }

        if let Some(value) = lookup(REQUIRE_DIRECTORY_BLOCKS_VAR).filter(|v| !v.trim().is_empty())
        {
            config.require_directory_blocks = match value.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(AuthorityError::Config(format!(
                        "{} must be true or false, got '{}'",
                        REQUIRE_DIRECTORY_BLOCKS_VAR, value
                    )));
                }
            };
        }

        Ok(config)
    }
}

/// An op that referenced an identity missing from the registry and was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedOp {
    /// Directory block height whose admin log carried the op.
    pub height: u32,
    /// Position within that height's admin log.
    pub index: usize,
    pub kind: AdminOpKind,
    /// The identity the op referred to.
    pub chain_id: ChainId,
}

/// What applying one height did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeightOutcome {
    pub height: u32,
    /// False when the store had no admin log for the height.
    pub had_admin_log: bool,
    /// Ops that changed the registry. Skipped ops are not counted.
    pub ops_applied: usize,
    pub skipped: Vec<SkippedOp>,
}

/// Totals for a rebuild from genesis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Last height applied. Zero when nothing was replayed.
    pub last_height: u32,
    pub heights_replayed: u32,
    /// Heights marked applied without an admin log.
    pub heights_without_log: u32,
    pub ops_applied: usize,
    /// Every skipped op, in replay order.
    pub skipped_ops: Vec<SkippedOp>,
}

impl ReplayReport {
    fn record(&mut self, outcome: HeightOutcome) {
        self.last_height = outcome.height;
        self.heights_replayed += 1;
        if !outcome.had_admin_log {
            self.heights_without_log += 1;
        }
        self.ops_applied += outcome.ops_applied;
        self.skipped_ops.extend(outcome.skipped);
    }
}

/// Folds admin logs from a [`DirectoryStore`] into an [`AuthorityRegistry`].
pub struct Replayer<'a> {
    store: &'a dyn DirectoryStore,
    identities: &'a dyn IdentityStatusHook,
    config: ReplayConfig,
}

impl<'a> Replayer<'a> {
    pub fn new(store: &'a dyn DirectoryStore) -> Self {
        Self {
            store,
            identities: &NoIdentityHook,
            config: ReplayConfig::default(),
        }
    }

    pub fn with_identity_hook(mut self, identities: &'a dyn IdentityStatusHook) -> Self {
        self.identities = identities;
        self
    }

    pub fn with_config(mut self, config: ReplayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Rebuilds from genesis through the last finalized height.
    pub async fn rebuild(&self) -> Result<AuthorityRegistry, AuthorityError> {
        Ok(self.rebuild_with_report().await?.0)
    }

    pub async fn rebuild_with_report(
        &self,
    ) -> Result<(AuthorityRegistry, ReplayReport), AuthorityError> {
        let mut target = self.finalized_height().await?;
        if let Some(ceiling) = self.config.replay_ceiling
            && ceiling < target
        {
            debug!(ceiling, finalized = target, "Replay capped by ceiling");
            target = ceiling;
        }

        self.rebuild_through_with_report(target).await
    }

    /// Folds heights `1..=target` into an empty registry. `target` is capped at the last
    /// finalized height.
    pub async fn rebuild_through(&self, target: u32) -> Result<AuthorityRegistry, AuthorityError> {
        let finalized = self.finalized_height().await?;
        if target > finalized {
            debug!(target, finalized, "Replay target capped at last finalized height");
        }
        Ok(self.rebuild_through_with_report(target.min(finalized)).await?.0)
    }

    /// Height just below the head, whose admin log can no longer change. Zero when the
    /// store has no head.
    pub async fn finalized_height(&self) -> Result<u32, AuthorityError> {
        let Some(head) = self.store.fetch_directory_block_head().await? else {
            info!("No directory block head, nothing is finalized");
            return Ok(0);
        };
        // the head height is still open
        Ok(head.height().saturating_sub(1))
    }

    async fn rebuild_through_with_report(
        &self,
        target: u32,
    ) -> Result<(AuthorityRegistry, ReplayReport), AuthorityError> {
        let mut registry = AuthorityRegistry::new();
        let mut report = ReplayReport::default();

        for height in 1..=target {
            let outcome = self.apply_height(height, &mut registry).await?;
            report.record(outcome);
        }

        info!(
            height = report.last_height,
            authorities = registry.len(),
            federated = registry.federated_servers().len(),
            audit = registry.audit_servers().len(),
            skipped = report.skipped_ops.len(),
            "Authority registry rebuilt"
        );
        Ok((registry, report))
    }

    /// Applies exactly one height. `height` must directly follow the registry's height.
    ///
    /// Nothing is mutated unless the height's block and admin log were fetched and the
    /// whole log decoded.
    pub async fn apply_height(
        &self,
        height: u32,
        registry: &mut AuthorityRegistry,
    ) -> Result<HeightOutcome, AuthorityError> {
        let expected = registry
            .height()
            .checked_add(1)
            .ok_or(AuthorityError::HeightGap {
                expected: u32::MAX,
                found: Some(height),
            })?;
        if height != expected {
            return Err(AuthorityError::HeightGap {
                expected,
                found: Some(height),
            });
        }

        if self.config.require_directory_blocks {
            match self.store.fetch_block_by_height(height).await? {
                Some(block) if block.height() == height => {}
                Some(block) => {
                    return Err(AuthorityError::HeightGap {
                        expected: height,
                        found: Some(block.height()),
                    });
                }
                None => {
                    return Err(AuthorityError::HeightGap {
                        expected: height,
                        found: None,
                    });
                }
            }
        }

        let Some(log) = self.store.fetch_admin_log_at(height).await? else {
            debug!(height, "No admin log at height, skipping");
            registry.mark_applied(height);
            return Ok(HeightOutcome {
                height,
                had_admin_log: false,
                ops_applied: 0,
                skipped: Vec::new(),
            });
        };

        let ops = decode_admin_log(&log).inspect_err(|e| {
            warn!(height, error = %e, "Failed to decode admin log");
        })?;

        let mut outcome = HeightOutcome {
            height,
            had_admin_log: true,
            ops_applied: 0,
            skipped: Vec::new(),
        };

        for (index, op) in ops.iter().enumerate() {
            match apply_admin_op(registry, op, self.identities) {
                Ok(()) => outcome.ops_applied += 1,
                Err(AuthorityError::UnknownAuthority(chain_id)) => {
                    warn!(
                        height,
                        index,
                        op = %op.kind(),
                        chain_id = %chain_id,
                        "Admin op references unknown authority, skipping"
                    );
                    outcome.skipped.push(SkippedOp {
                        height,
                        index,
                        kind: op.kind(),
                        chain_id,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        registry.mark_applied(height);
        debug!(
            height,
            ops = ops.len(),
            skipped = outcome.skipped.len(),
            "Applied admin log"
        );
        Ok(outcome)
    }
}

/// Applies one op. `UnknownAuthority` means the op was not applied and left no trace.
pub fn apply_admin_op(
    registry: &mut AuthorityRegistry,
    op: &AdminOp,
    identities: &dyn IdentityStatusHook,
) -> Result<(), AuthorityError> {
    match op {
        AdminOp::MinuteMarker(_)
        | AdminOp::DirectoryBlockSignature(_)
        | AdminOp::RevealMatryoshkaHash { .. } => Ok(()),
        AdminOp::SetMatryoshkaHash {
            identity_chain_id,
            hash,
        } => registry.set_matryoshka(identity_chain_id, *hash),
        AdminOp::IncreaseServerCount(amount) => {
            registry.increase_server_count(u64::from(*amount));
            Ok(())
        }
        AdminOp::AddFederatedServer(chain_id) => promote(
            registry,
            chain_id,
            IdentityStatus::PendingFederatedServer,
            IdentityStatus::FederatedServer,
            identities,
        ),
        AdminOp::AddAuditServer(chain_id) => promote(
            registry,
            chain_id,
            IdentityStatus::PendingAuditServer,
            IdentityStatus::AuditServer,
            identities,
        ),
        AdminOp::RemoveServer(chain_id) => registry.remove(chain_id).map(|_| ()),
        AdminOp::AddServerSigningKey {
            identity_chain_id,
            signing_key,
            ..
        } => registry.set_signing_key(identity_chain_id, *signing_key),
        AdminOp::AddAnchorKey {
            identity_chain_id,
            anchor,
        } => registry.append_anchor_key(identity_chain_id, anchor.clone()),
    }
}

fn promote(
    registry: &mut AuthorityRegistry,
    chain_id: &ChainId,
    pending: IdentityStatus,
    status: IdentityStatus,
    identities: &dyn IdentityStatusHook,
) -> Result<(), AuthorityError> {
    registry.upsert_pending(*chain_id);
    registry.set_status(chain_id, status)?;
    identities.status_changed(chain_id, pending, status);
    Ok(())
}
