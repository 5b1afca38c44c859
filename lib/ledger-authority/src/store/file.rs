//! File-based directory store
//!
//! ```text
//! <root>/dblock/<height>.blk   encoded directory block
//! <root>/admin/<height>.log    admin log recorded at that height
//! ```
//!
//! The head is the block with the highest height under `dblock/`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::DirectoryStore;
use crate::block::Block;
use crate::error::AuthorityError;

const BLOCK_DIR: &str = "dblock";
const ADMIN_DIR: &str = "admin";
const BLOCK_EXTENSION: &str = "blk";
const ADMIN_EXTENSION: &str = "log";

/// Read-only view over a directory of exported blocks and admin logs.
pub struct FileDirectoryStore {
    root: PathBuf,
}

impl FileDirectoryStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, AuthorityError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(AuthorityError::StoreUnavailable(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn block_path(&self, height: u32) -> PathBuf {
        self.root
            .join(BLOCK_DIR)
            .join(format!("{}.{}", height, BLOCK_EXTENSION))
    }

    pub fn admin_log_path(&self, height: u32) -> PathBuf {
        self.root
            .join(ADMIN_DIR)
            .join(format!("{}.{}", height, ADMIN_EXTENSION))
    }

    /// `None` when the file does not exist.
    fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, AuthorityError> {
        match std::fs::read(path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AuthorityError::StoreUnavailable(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn head_height(&self) -> Result<Option<u32>, AuthorityError> {
        let dir = self.root.join(BLOCK_DIR);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut head = None;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BLOCK_EXTENSION) {
                continue;
            }
            let Some(height) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok())
            else {
                debug!(path = %path.display(), "Ignoring unrecognized block file");
                continue;
            };
            head = head.max(Some(height));
        }
        Ok(head)
    }
}

#[async_trait]
impl DirectoryStore for FileDirectoryStore {
    async fn fetch_directory_block_head(&self) -> Result<Option<Block>, AuthorityError> {
        match self.head_height()? {
            Some(height) => self.fetch_block_by_height(height).await,
            None => Ok(None),
        }
    }

    async fn fetch_block_by_height(&self, height: u32) -> Result<Option<Block>, AuthorityError> {
        Self::read_optional(&self.block_path(height))?
            .map(|data| Block::decode_exact(&data))
            .transpose()
    }

    async fn fetch_admin_log_at(&self, height: u32) -> Result<Option<Bytes>, AuthorityError> {
        Ok(Self::read_optional(&self.admin_log_path(height))?.map(Bytes::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DIRECTORY_CHAIN_ID;

    fn write_block(store: &FileDirectoryStore, block: &Block) {
        let path = store.block_path(block.height());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, block.encode()).unwrap();
    }

    fn chain(len: u32) -> Vec<Block> {
        let mut genesis = Block::new(DIRECTORY_CHAIN_ID);
        genesis.build_header();
        let mut blocks = vec![genesis];
        for _ in 1..len {
            let next = Block::next(blocks.last().unwrap()).unwrap();
            blocks.push(next);
        }
        blocks
    }

    #[test]
    fn test_open_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            FileDirectoryStore::open(missing),
            Err(AuthorityError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_root_has_no_head() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDirectoryStore::open(dir.path()).unwrap();
        assert!(store.fetch_directory_block_head().await.unwrap().is_none());
        assert!(store.fetch_block_by_height(3).await.unwrap().is_none());
        assert!(store.fetch_admin_log_at(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_head_is_highest_height() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDirectoryStore::open(dir.path()).unwrap();
        for block in chain(12) {
            write_block(&store, &block);
        }
        std::fs::write(dir.path().join(BLOCK_DIR).join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join(BLOCK_DIR).join("latest.blk"), b"x").unwrap();

        // numeric, not lexical, ordering
        let head = store.fetch_directory_block_head().await.unwrap().unwrap();
        assert_eq!(head.height(), 11);
    }

    #[tokio::test]
    async fn test_reads_admin_log_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDirectoryStore::open(dir.path()).unwrap();
        let path = store.admin_log_path(4);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, [0u8, 1]).unwrap();

        let log = store.fetch_admin_log_at(4).await.unwrap().unwrap();
        assert_eq!(&log[..], &[0u8, 1]);
    }

    #[tokio::test]
    async fn test_corrupt_block_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDirectoryStore::open(dir.path()).unwrap();
        let blocks = chain(2);
        write_block(&store, &blocks[0]);

        let mut bytes = blocks[1].encode();
        bytes.truncate(bytes.len() - 3);
        std::fs::write(store.block_path(1), bytes).unwrap();

        let err = store.fetch_block_by_height(1).await.unwrap_err();
        assert!(err.is_decode_error());
    }
}
