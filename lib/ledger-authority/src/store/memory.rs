//! In-memory directory store for producers, tests and tooling

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use super::DirectoryStore;
use crate::admin::{AdminOp, encode_admin_log};
use crate::block::Block;
use crate::error::AuthorityError;
use crate::types::DIRECTORY_CHAIN_ID;

#[derive(Debug, Default)]
struct Contents {
    blocks: BTreeMap<u32, Block>,
    admin_logs: BTreeMap<u32, Bytes>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Contents>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> AuthorityError {
        AuthorityError::StoreUnavailable("memory store lock poisoned".to_string())
    }

    pub fn insert_block(&self, block: Block) -> Result<(), AuthorityError> {
        let mut guard = self.inner.write().map_err(|_| Self::poisoned())?;
        guard.blocks.insert(block.height(), block);
        Ok(())
    }

    pub fn insert_admin_log(
        &self,
        height: u32,
        log: impl Into<Bytes>,
    ) -> Result<(), AuthorityError> {
        let mut guard = self.inner.write().map_err(|_| Self::poisoned())?;
        guard.admin_logs.insert(height, log.into());
        Ok(())
    }

    pub fn remove_block(&self, height: u32) -> Result<Option<Block>, AuthorityError> {
        let mut guard = self.inner.write().map_err(|_| Self::poisoned())?;
        Ok(guard.blocks.remove(&height))
    }

    /// Appends the next directory block, linked to the current head, and records `ops`
    /// as that height's admin log. An empty `ops` stores no log. The first append is
    /// genesis at height 0, which replay never applies. Returns the new height.
    pub fn append(&self, ops: &[AdminOp]) -> Result<u32, AuthorityError> {
        let log = encode_admin_log(ops)?;
        let mut guard = self.inner.write().map_err(|_| Self::poisoned())?;

        let mut block = match guard.blocks.last_key_value() {
            Some((_, head)) => Block::next(head)?,
            None => Block::new(DIRECTORY_CHAIN_ID),
        };
        block.build_header();
        let height = block.height();

        guard.blocks.insert(height, block);
        if !log.is_empty() {
            guard.admin_logs.insert(height, Bytes::from(log));
        }
        Ok(height)
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn fetch_directory_block_head(&self) -> Result<Option<Block>, AuthorityError> {
        let guard = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(guard.blocks.last_key_value().map(|(_, b)| b.clone()))
    }

    async fn fetch_block_by_height(&self, height: u32) -> Result<Option<Block>, AuthorityError> {
        let guard = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(guard.blocks.get(&height).cloned())
    }

    async fn fetch_admin_log_at(&self, height: u32) -> Result<Option<Bytes>, AuthorityError> {
        let guard = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(guard.admin_logs.get(&height).cloned())
    }
}
