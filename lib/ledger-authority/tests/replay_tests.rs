//! End-to-end replay over in-memory and file-backed stores.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use ledger_authority::{
    ANCHOR_KEY_LENGTH, AdminOp, AdminOpKind, AnchorChain, AnchorKey, AuthorityError,
    AuthorityRegistry, AuthorityView, Block, BlockEntry, ChainId, DIRECTORY_CHAIN_ID,
    DirectoryStore, FileDirectoryStore, Hash32, IdentityStatus, MemoryStore, ReplayConfig,
    Replayer, SharedRegistry, encode_admin_log,
};
use proptest::prelude::*;
use tokio::sync::Notify;

fn id(byte: u8) -> ChainId {
    Hash32::from_low_byte(byte)
}

fn btc_key(byte: u8) -> AnchorKey {
    AnchorKey {
        chain: AnchorChain::Bitcoin,
        key_type: 1,
        key_priority: 0,
        key: vec![byte; ANCHOR_KEY_LENGTH],
    }
}

/// Genesis, then one height per entry of `heights`, then an open head.
fn store_with(heights: &[Vec<AdminOp>]) -> MemoryStore {
    let store = MemoryStore::new();
    store.append(&[]).unwrap();
    for ops in heights {
        store.append(ops).unwrap();
    }
    store.append(&[]).unwrap();
    store
}

fn snapshot_json(registry: &AuthorityRegistry) -> Vec<u8> {
    serde_json::to_vec(&registry.snapshot()).unwrap()
}

/// Holds the first admin log fetch at `gate_height` until `release` fires.
struct GatedStore {
    inner: MemoryStore,
    gate_height: u32,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedStore {
    fn new(inner: MemoryStore, gate_height: u32) -> Self {
        Self {
            inner,
            gate_height,
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl DirectoryStore for GatedStore {
    async fn fetch_directory_block_head(&self) -> Result<Option<Block>, AuthorityError> {
        self.inner.fetch_directory_block_head().await
    }

    async fn fetch_block_by_height(&self, height: u32) -> Result<Option<Block>, AuthorityError> {
        self.inner.fetch_block_by_height(height).await
    }

    async fn fetch_admin_log_at(&self, height: u32) -> Result<Option<Bytes>, AuthorityError> {
        if height == self.gate_height && self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.fetch_admin_log_at(height).await
    }
}

#[tokio::test]
async fn test_empty_store_rebuilds_empty_registry() {
    let store = MemoryStore::new();
    let (registry, report) = Replayer::new(&store).rebuild_with_report().await.unwrap();
    assert!(registry.is_empty());
    assert_eq!(registry.height(), 0);
    assert_eq!(report.heights_replayed, 0);
}

#[tokio::test]
async fn test_genesis_only_rebuilds_empty_registry() {
    let store = MemoryStore::new();
    store.append(&[]).unwrap();
    let registry = Replayer::new(&store).rebuild().await.unwrap();
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_single_federated_server() {
    let store = store_with(&[vec![AdminOp::AddFederatedServer(id(1))]]);
    let registry = Replayer::new(&store).rebuild().await.unwrap();

    assert_eq!(registry.len(), 1);
    let authority = registry.lookup(&id(1)).unwrap();
    assert_eq!(authority.status, IdentityStatus::FederatedServer);
    assert!(authority.anchor_keys.is_empty());
    assert!(registry.is_federated(&id(1)));
    assert!(!registry.is_audit(&id(1)));
}

#[tokio::test]
async fn test_open_head_is_not_replayed() {
    let store = MemoryStore::new();
    store.append(&[]).unwrap();
    store.append(&[AdminOp::AddFederatedServer(id(1))]).unwrap();
    // height 2 is the head and still open
    store.append(&[AdminOp::AddFederatedServer(id(2))]).unwrap();

    let registry = Replayer::new(&store).rebuild().await.unwrap();
    assert_eq!(registry.height(), 1);
    assert!(registry.is_federated(&id(1)));
    assert!(registry.lookup(&id(2)).is_none());
}

#[tokio::test]
async fn test_add_then_remove_at_later_height() {
    let store = store_with(&[
        vec![AdminOp::AddFederatedServer(id(1))],
        vec![AdminOp::MinuteMarker(1)],
        vec![AdminOp::RemoveServer(id(1))],
    ]);
    let registry = Replayer::new(&store).rebuild().await.unwrap();
    assert!(registry.lookup(&id(1)).is_none());
    assert!(registry.is_empty());
    assert_eq!(registry.height(), 3);
}

#[tokio::test]
async fn test_anchor_key_for_unknown_authority_is_skipped() {
    let baseline = store_with(&[vec![AdminOp::AddAuditServer(id(2))]]);
    let with_orphan = store_with(&[vec![
        AdminOp::AddAnchorKey {
            identity_chain_id: id(1),
            anchor: btc_key(0xaa),
        },
        AdminOp::AddAuditServer(id(2)),
    ]]);

    let expected = Replayer::new(&baseline).rebuild().await.unwrap();
    let (registry, report) = Replayer::new(&with_orphan)
        .rebuild_with_report()
        .await
        .unwrap();

    assert_eq!(snapshot_json(&registry), snapshot_json(&expected));
    assert_eq!(report.skipped_ops.len(), 1);
    let skipped = &report.skipped_ops[0];
    assert_eq!(skipped.height, 1);
    assert_eq!(skipped.index, 0);
    assert_eq!(skipped.chain_id, id(1));
    assert_eq!(report.ops_applied, 1);
}

#[tokio::test]
async fn test_full_authority_lifecycle() {
    let store = store_with(&[
        vec![
            AdminOp::AddAuditServer(id(1)),
            AdminOp::IncreaseServerCount(1),
        ],
        vec![
            AdminOp::AddServerSigningKey {
                identity_chain_id: id(1),
                key_priority: 0,
                signing_key: id(0x51),
            },
            AdminOp::SetMatryoshkaHash {
                identity_chain_id: id(1),
                hash: id(0x61),
            },
            AdminOp::AddAnchorKey {
                identity_chain_id: id(1),
                anchor: btc_key(1),
            },
            AdminOp::AddAnchorKey {
                identity_chain_id: id(1),
                anchor: btc_key(2),
            },
        ],
        vec![AdminOp::AddFederatedServer(id(1))],
    ]);

    let registry = Replayer::new(&store).rebuild().await.unwrap();
    let authority = registry.lookup(&id(1)).unwrap();
    assert_eq!(authority.status, IdentityStatus::FederatedServer);
    assert_eq!(authority.matryoshka_hash, id(0x61));
    assert_eq!(registry.signing_key_of(&id(1)), Some(id(0x51)));
    assert_eq!(authority.anchor_keys, vec![btc_key(1), btc_key(2)]);
    assert_eq!(registry.server_count(), 1);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_op_order_within_height_matters() {
    let add_then_remove = store_with(&[vec![
        AdminOp::AddFederatedServer(id(1)),
        AdminOp::RemoveServer(id(1)),
    ]]);
    let remove_then_add = store_with(&[vec![
        AdminOp::RemoveServer(id(1)),
        AdminOp::AddFederatedServer(id(1)),
    ]]);

    let a = Replayer::new(&add_then_remove).rebuild().await.unwrap();
    let b = Replayer::new(&remove_then_add).rebuild().await.unwrap();
    assert!(a.lookup(&id(1)).is_none());
    assert!(b.is_federated(&id(1)));
    assert_ne!(snapshot_json(&a), snapshot_json(&b));
}

#[tokio::test]
async fn test_unknown_op_tag_fails_without_advancing() {
    let store = store_with(&[vec![AdminOp::AddFederatedServer(id(1))]]);
    let mut log = encode_admin_log(&[AdminOp::AddFederatedServer(id(2))]).unwrap();
    log.push(0x42);
    store.append(&[]).unwrap();
    store.insert_admin_log(2, log).unwrap();

    let replayer = Replayer::new(&store);
    let err = replayer.rebuild().await.unwrap_err();
    assert!(matches!(
        err,
        AuthorityError::UnsupportedTag { tag: 0x42, .. }
    ));

    let mut registry = replayer.rebuild_through(1).await.unwrap();
    let before = registry.clone();
    let err = replayer.apply_height(2, &mut registry).await.unwrap_err();
    assert!(err.is_decode_error());
    assert_eq!(registry, before);
    assert_eq!(registry.height(), 1);
}

#[tokio::test]
async fn test_missing_admin_log_is_skipped() {
    let store = store_with(&[
        vec![AdminOp::AddFederatedServer(id(1))],
        vec![],
        vec![],
        vec![AdminOp::AddAuditServer(id(2))],
    ]);
    let (registry, report) = Replayer::new(&store).rebuild_with_report().await.unwrap();
    assert_eq!(report.last_height, 4);
    assert_eq!(report.heights_replayed, 4);
    assert_eq!(report.heights_without_log, 2);
    assert!(registry.is_federated(&id(1)));
    assert!(registry.is_audit(&id(2)));
}

#[tokio::test]
async fn test_missing_directory_block_fails_rebuild() {
    let store = store_with(&[
        vec![AdminOp::AddFederatedServer(id(1))],
        vec![AdminOp::AddFederatedServer(id(2))],
        vec![AdminOp::AddFederatedServer(id(3))],
    ]);
    store.remove_block(2).unwrap();

    let err = Replayer::new(&store).rebuild().await.unwrap_err();
    assert!(matches!(
        err,
        AuthorityError::HeightGap {
            expected: 2,
            found: None
        }
    ));
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let store = store_with(&[
        vec![AdminOp::AddFederatedServer(id(1)), AdminOp::AddAuditServer(id(2))],
        vec![AdminOp::AddAnchorKey {
            identity_chain_id: id(2),
            anchor: btc_key(9),
        }],
        vec![AdminOp::RemoveServer(id(7))],
    ]);
    let replayer = Replayer::new(&store);
    let (first, first_report) = replayer.rebuild_with_report().await.unwrap();
    let (second, second_report) = replayer.rebuild_with_report().await.unwrap();
    assert_eq!(snapshot_json(&first), snapshot_json(&second));
    assert_eq!(first, second);
    assert_eq!(first_report, second_report);

    // removing an identity that was never registered is skipped, not fatal
    assert_eq!(first_report.skipped_ops.len(), 1);
    let skipped = &first_report.skipped_ops[0];
    assert_eq!(skipped.height, 3);
    assert_eq!(skipped.index, 0);
    assert_eq!(skipped.kind, AdminOpKind::RemoveServer);
    assert_eq!(skipped.chain_id, id(7));
    assert_eq!(first_report.ops_applied, 3);
}

#[tokio::test]
async fn test_shared_registry_keeps_last_good_state() {
    let store = store_with(&[vec![AdminOp::AddFederatedServer(id(1))]]);
    let shared = SharedRegistry::default();
    shared.refresh(&Replayer::new(&store)).await.unwrap();
    assert!(shared.current().await.is_federated(&id(1)));

    // corrupt the next height, then make it finalized
    store.append(&[]).unwrap();
    store.insert_admin_log(2, vec![0xffu8]).unwrap();
    assert!(shared.refresh(&Replayer::new(&store)).await.is_err());

    let current = shared.current().await;
    assert!(current.is_federated(&id(1)));
    assert_eq!(current.height(), 1);
}

#[tokio::test]
async fn test_shared_registry_extends_incrementally() {
    let store = store_with(&[vec![AdminOp::AddFederatedServer(id(1))]]);
    let replayer = Replayer::new(&store);
    let shared = SharedRegistry::new(replayer.rebuild().await.unwrap());

    store.append(&[AdminOp::AddAuditServer(id(2))]).unwrap();
    store.append(&[]).unwrap();

    let extended = shared.extend_to(&replayer, 3).await.unwrap();
    assert_eq!(extended.height(), 3);
    assert!(extended.is_audit(&id(2)));
    assert_eq!(*extended, replayer.rebuild().await.unwrap());
}

#[tokio::test]
async fn test_shared_registry_extend_stops_below_head() {
    let store = store_with(&[vec![AdminOp::AddFederatedServer(id(1))]]);
    let replayer = Replayer::new(&store);
    let shared = SharedRegistry::new(replayer.rebuild().await.unwrap());

    // height 3 becomes the open head
    store.append(&[AdminOp::AddAuditServer(id(2))]).unwrap();

    let extended = shared.extend_to(&replayer, 10).await.unwrap();
    assert_eq!(extended.height(), 2);
    assert!(!extended.contains(&id(2)));

    store.append(&[]).unwrap();
    let extended = shared.extend_to(&replayer, 10).await.unwrap();
    assert_eq!(extended.height(), 3);
    assert!(extended.is_audit(&id(2)));
}

#[tokio::test]
async fn test_slow_extend_does_not_roll_back_newer_registry() {
    let store = GatedStore::new(
        store_with(&[
            vec![AdminOp::AddFederatedServer(id(1))],
            vec![AdminOp::AddAuditServer(id(2))],
            vec![AdminOp::AddFederatedServer(id(3))],
        ]),
        2,
    );
    let replayer = Replayer::new(&store);
    let shared = SharedRegistry::new(replayer.rebuild_through(1).await.unwrap());
    let go = Notify::new();

    store.armed.store(true, Ordering::SeqCst);
    let slow = shared.extend_to(&replayer, 2);
    let fast = async {
        go.notified().await;
        shared.extend_to(&replayer, 3).await
    };
    let release = async {
        store.entered.notified().await;
        go.notify_one();
        // give the second writer every chance to run ahead
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        store.release.notify_one();
    };
    let (slow, fast, ()) = tokio::join!(slow, fast, release);

    assert_eq!(slow.unwrap().height(), 2);
    assert_eq!(fast.unwrap().height(), 3);
    let current = shared.current().await;
    assert_eq!(current.height(), 3);
    assert!(current.is_federated(&id(3)));
    assert_eq!(*current, replayer.rebuild_through(3).await.unwrap());
}

#[tokio::test]
async fn test_file_store_replay() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("dblock")).unwrap();
    std::fs::create_dir_all(dir.path().join("admin")).unwrap();

    let mut block = Block::new(DIRECTORY_CHAIN_ID);
    block.build_header();
    let mut blocks = vec![block];
    for _ in 0..3 {
        let next = Block::next(blocks.last().unwrap()).unwrap();
        blocks.push(next);
    }
    for block in &blocks {
        let path = dir.path().join("dblock").join(format!("{}.blk", block.height()));
        std::fs::write(path, block.encode()).unwrap();
    }
    let log = encode_admin_log(&[
        AdminOp::AddFederatedServer(id(1)),
        AdminOp::AddServerSigningKey {
            identity_chain_id: id(1),
            key_priority: 0,
            signing_key: id(0x71),
        },
    ])
    .unwrap();
    std::fs::write(dir.path().join("admin").join("2.log"), log).unwrap();

    let store = FileDirectoryStore::open(dir.path()).unwrap();
    let head = store.fetch_directory_block_head().await.unwrap().unwrap();
    assert_eq!(head.height(), 3);

    let (registry, report) = Replayer::new(&store).rebuild_with_report().await.unwrap();
    assert_eq!(report.last_height, 2);
    assert_eq!(report.heights_without_log, 1);
    assert_eq!(registry.signing_key_of(&id(1)), Some(id(0x71)));
}

#[test]
fn test_object_count_beyond_body_is_truncation() {
    let mut block = Block::new_entry_credit();
    block.add_entries([BlockEntry::MinuteNumber(1), BlockEntry::ServerIndexNumber(0)]);
    block.build_header();
    block.header.object_count = 3;

    let mut bytes = Vec::new();
    block.header.encode(&mut bytes);
    bytes.extend_from_slice(&block.encode_body());
    assert!(matches!(
        Block::decode(&bytes),
        Err(AuthorityError::Truncation { .. })
    ));
}

fn arb_op() -> impl Strategy<Value = AdminOp> {
    // a small id space so ops collide on the same identities
    let chain = (1u8..6).prop_map(Hash32::from_low_byte);
    prop_oneof![
        chain.clone().prop_map(AdminOp::AddFederatedServer),
        chain.clone().prop_map(AdminOp::AddAuditServer),
        chain.clone().prop_map(AdminOp::RemoveServer),
        (1u8..4).prop_map(AdminOp::IncreaseServerCount),
        (chain.clone(), any::<u8>()).prop_map(|(identity_chain_id, byte)| {
            AdminOp::AddServerSigningKey {
                identity_chain_id,
                key_priority: 0,
                signing_key: Hash32::from_low_byte(byte),
            }
        }),
        (chain, any::<u8>()).prop_map(|(identity_chain_id, byte)| AdminOp::AddAnchorKey {
            identity_chain_id,
            anchor: btc_key(byte),
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_incremental_matches_rebuild(
        heights in proptest::collection::vec(proptest::collection::vec(arb_op(), 0..5), 1..12),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let store = store_with(&heights);
            let config = ReplayConfig::default();
            let replayer = Replayer::new(&store).with_config(config);
            let target = heights.len() as u32;

            let mut incremental = AuthorityRegistry::new();
            for height in 1..=target {
                replayer.apply_height(height, &mut incremental).await.unwrap();
            }

            let through = replayer.rebuild_through(target).await.unwrap();
            let rebuilt = replayer.rebuild().await.unwrap();
            assert_eq!(&incremental, &through);
            assert_eq!(snapshot_json(&incremental), snapshot_json(&rebuilt));
        });
    }
}
