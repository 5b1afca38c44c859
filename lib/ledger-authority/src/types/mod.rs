//! Shared data model

mod authority;
mod hash;

pub use authority::{AnchorChain, AnchorKey, Authority, IdentityStatus};
pub use hash::{
    ADMIN_CHAIN_ID, ChainId, DIRECTORY_CHAIN_ID, ENTRY_CREDIT_CHAIN_ID, FACTOID_CHAIN_ID,
    HASH_LENGTH, Hash32, KeyHash,
};
