//! Directory block storage - the read side replay consumes
//!
//! Stores are collaborators: they hand back already-accepted blocks and admin logs and
//! never validate them. Retries and timeouts are the implementation's concern.

pub mod file;
pub mod memory;

pub use file::FileDirectoryStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use bytes::Bytes;

use crate::block::Block;
use crate::error::AuthorityError;

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// The newest directory block, still open for the current height. `None` for a new
    /// chain.
    async fn fetch_directory_block_head(&self) -> Result<Option<Block>, AuthorityError>;

    async fn fetch_block_by_height(&self, height: u32) -> Result<Option<Block>, AuthorityError>;

    /// Raw admin log recorded at `height`. `None` when the height produced no admin ops.
    async fn fetch_admin_log_at(&self, height: u32) -> Result<Option<Bytes>, AuthorityError>;
}
