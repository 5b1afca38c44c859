//! Hash-chained blocks
//!
//! A block is a header followed by a body of typed entries. The header commits to the
//! body through `body_hash`, `object_count` and `body_size`, so the body must be encoded
//! before the header can be. [`Block::encode`], [`Block::hash`] and
//! [`Block::header_hash`] always work from a header rebuilt against the current body.
//!
//! # Header layout
//!
//! ```text
//! ChainID(32) | BodyHash(32) | PrevHeaderHash(32) | PrevFullHash(32) | Height(u32 BE)
//!   | VarInt(len) | ExpansionArea(len) | ObjectCount(u64 BE) | BodySize(u64 BE)
//! ```

mod entry;

pub use entry::{
    BalanceIncrease, BlockEntry, CHAIN_COMMIT_SIZE, ChainCommit, ENTRY_COMMIT_SIZE, EntryCommit,
    EntryTag, MINUTE_NUMBER_SIZE, SERVER_INDEX_NUMBER_SIZE,
};

use crate::codec::{Reader, encode_varint};
use crate::error::AuthorityError;
use crate::types::{ChainId, ENTRY_CREDIT_CHAIN_ID, Hash32};

/// Fixed header of a block. The last three fields are derived from the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Chain the block belongs to.
    pub chain_id: ChainId,
    /// SHA-256 of the encoded body.
    pub body_hash: Hash32,
    /// Header hash of the previous block. Zero at genesis.
    pub prev_header_hash: Hash32,
    /// Full hash of the previous block. Zero at genesis.
    pub prev_full_hash: Hash32,
    pub height: u32,
    /// Reserved for future header fields. Always empty in blocks produced here.
    pub expansion_area: Vec<u8>,
    /// Number of entries in the body.
    pub object_count: u64,
    /// Length of the encoded body in bytes.
    pub body_size: u64,
}

impl BlockHeader {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            body_hash: Hash32::ZERO,
            prev_header_hash: Hash32::ZERO,
            prev_full_hash: Hash32::ZERO,
            height: 0,
            expansion_area: Vec::new(),
            object_count: 0,
            body_size: 0,
        }
    }

    /// Writes the header exactly as stored, without reconciling it against any body.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.chain_id.as_bytes());
        buf.extend_from_slice(self.body_hash.as_bytes());
        buf.extend_from_slice(self.prev_header_hash.as_bytes());
        buf.extend_from_slice(self.prev_full_hash.as_bytes());
        buf.extend_from_slice(&self.height.to_be_bytes());
        encode_varint(buf, self.expansion_area.len() as u64);
        buf.extend_from_slice(&self.expansion_area);
        buf.extend_from_slice(&self.object_count.to_be_bytes());
        buf.extend_from_slice(&self.body_size.to_be_bytes());
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, AuthorityError> {
        let chain_id = r.read_hash()?;
        let body_hash = r.read_hash()?;
        let prev_header_hash = r.read_hash()?;
        let prev_full_hash = r.read_hash()?;
        let height = r.read_u32_be()?;

        let expansion_len = r.read_varint()?;
        let expansion_len =
            usize::try_from(expansion_len).map_err(|_| AuthorityError::Malformed {
                context: "block header",
                reason: format!("expansion area length {} overflows", expansion_len),
            })?;
        let expansion_area = r.take(expansion_len)?.to_vec();

        Ok(Self {
            chain_id,
            body_hash,
            prev_header_hash,
            prev_full_hash,
            height,
            expansion_area,
            object_count: r.read_u64_be()?,
            body_size: r.read_u64_be()?,
        })
    }
}

/// A header and its entries, in body order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub body: Vec<BlockEntry>,
}

impl Block {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            header: BlockHeader::new(chain_id),
            body: Vec::new(),
        }
    }

    pub fn new_entry_credit() -> Self {
        Self::new(ENTRY_CREDIT_CHAIN_ID)
    }

    /// Starts the successor of `prev` on the same chain, linked by both of its hashes.
    pub fn next(prev: &Block) -> Result<Self, AuthorityError> {
        let height = prev
            .header
            .height
            .checked_add(1)
            .ok_or_else(|| AuthorityError::Malformed {
                context: "block header",
                reason: "height overflows u32".to_string(),
            })?;

        let mut block = Self::new(prev.header.chain_id);
        block.header.prev_header_hash = prev.header_hash();
        block.header.prev_full_hash = prev.hash();
        block.header.height = height;
        Ok(block)
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn add_entries(&mut self, entries: impl IntoIterator<Item = BlockEntry>) {
        self.body.extend(entries);
    }

    pub fn encode_body(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for entry in &self.body {
            entry.encode(&mut buf);
        }
        buf
    }

    /// Refreshes `body_hash`, `object_count` and `body_size` from the current body.
    pub fn build_header(&mut self) {
        let body = self.encode_body();
        self.header = self.header_for_body(&body);
    }

    fn header_for_body(&self, body: &[u8]) -> BlockHeader {
        BlockHeader {
            body_hash: Hash32::sha256(body),
            object_count: self.body.len() as u64,
            body_size: body.len() as u64,
            ..self.header.clone()
        }
    }

    pub fn encode_header(&self) -> Vec<u8> {
        let body = self.encode_body();
        let mut buf = Vec::new();
        self.header_for_body(&body).encode(&mut buf);
        buf
    }

    pub fn encode(&self) -> Vec<u8> {
        let body = self.encode_body();
        let mut buf = Vec::with_capacity(200 + body.len());
        self.header_for_body(&body).encode(&mut buf);
        buf.extend_from_slice(&body);
        buf
    }

    /// SHA-256 of the complete encoded block.
    pub fn hash(&self) -> Hash32 {
        Hash32::sha256(&self.encode())
    }

    /// SHA-256 of the encoded header alone.
    pub fn header_hash(&self) -> Hash32 {
        Hash32::sha256(&self.encode_header())
    }

    /// Decodes one block and returns the bytes that follow it.
    ///
    /// Exactly `object_count` entries are read. The declared body size and body hash
    /// are then checked against the bytes those entries occupied.
    pub fn decode(data: &[u8]) -> Result<(Self, &[u8]), AuthorityError> {
        let mut r = Reader::new(data, "block header");
        let header = BlockHeader::decode(&mut r)?;

        let body_data = r.remaining();
        let mut body_reader = Reader::new(body_data, "block body");
        let capacity = usize::try_from(header.object_count)
            .unwrap_or(usize::MAX)
            .min(body_data.len());
        let mut body = Vec::with_capacity(capacity);
        for _ in 0..header.object_count {
            body.push(BlockEntry::decode(&mut body_reader)?);
        }

        let body_len = body_reader.offset();
        let block = Self { header, body };
        block.check_body_bytes(&body_data[..body_len])?;

        Ok((block, body_reader.remaining()))
    }

    /// Decodes a buffer that must hold exactly one block.
    pub fn decode_exact(data: &[u8]) -> Result<Self, AuthorityError> {
        let (block, rest) = Self::decode(data)?;
        if !rest.is_empty() {
            return Err(AuthorityError::Malformed {
                context: "block",
                reason: format!("{} trailing bytes", rest.len()),
            });
        }
        Ok(block)
    }

    /// Checks the stored header against the current body.
    pub fn verify(&self) -> Result<(), AuthorityError> {
        let declared = self.header.object_count;
        let computed = self.body.len() as u64;
        if declared != computed {
            return Err(AuthorityError::IntegrityMismatch {
                field: "object count",
                declared: declared.to_string(),
                computed: computed.to_string(),
            });
        }
        self.check_body_bytes(&self.encode_body())
    }

    fn check_body_bytes(&self, body: &[u8]) -> Result<(), AuthorityError> {
        let computed_size = body.len() as u64;
        if self.header.body_size != computed_size {
            return Err(AuthorityError::IntegrityMismatch {
                field: "body size",
                declared: self.header.body_size.to_string(),
                computed: computed_size.to_string(),
            });
        }

        let computed_hash = Hash32::sha256(body);
        if self.header.body_hash != computed_hash {
            return Err(AuthorityError::IntegrityMismatch {
                field: "body hash",
                declared: self.header.body_hash.to_hex(),
                computed: computed_hash.to_hex(),
            });
        }
        Ok(())
    }
}
