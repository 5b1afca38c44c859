//! Ledger authority registry
//!
//! Decodes hash-chained blocks and directory-block admin logs, and rebuilds the set of
//! federated and audit servers by replaying every admin op from genesis.

#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::unwrap_in_result,
        clippy::panic
    )
)]

pub mod admin;
pub mod block;
pub mod codec;
pub mod error;
pub mod registry;
pub mod replay;
pub mod store;
pub mod types;

pub use admin::{
    ANCHOR_KEY_LENGTH, AdminOp, AdminOpKind, DirectoryBlockSignature, decode_admin_log,
    encode_admin_log,
};
pub use block::{Block, BlockEntry, BlockHeader};
pub use error::AuthorityError;
pub use registry::{
    AuthorityRegistry, AuthorityView, IdentityStatusHook, NoIdentityHook, RegistrySnapshot,
    SharedRegistry, SignatureVerifier,
};
pub use replay::{
    HeightOutcome, ReplayConfig, ReplayReport, Replayer, SkippedOp, apply_admin_op,
};
pub use store::{DirectoryStore, FileDirectoryStore, MemoryStore};
pub use types::{
    ADMIN_CHAIN_ID, AnchorChain, AnchorKey, Authority, ChainId, DIRECTORY_CHAIN_ID,
    ENTRY_CREDIT_CHAIN_ID, FACTOID_CHAIN_ID, Hash32, IdentityStatus, KeyHash,
};
