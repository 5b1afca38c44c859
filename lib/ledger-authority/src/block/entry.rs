//! Typed block body entries
//!
//! Each entry is a tag byte followed by a payload whose extent the tag determines.
//! Commits are fixed width; balance increases end with two varints and so delimit
//! themselves.

use crate::codec::{Reader, encode_varint};
use crate::error::AuthorityError;
use crate::types::Hash32;

pub const SERVER_INDEX_NUMBER_SIZE: usize = 1;
pub const MINUTE_NUMBER_SIZE: usize = 1;
pub const CHAIN_COMMIT_SIZE: usize = 200;
pub const ENTRY_COMMIT_SIZE: usize = 136;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryTag {
    ServerIndexNumber = 0,
    MinuteNumber = 1,
    ChainCommit = 2,
    EntryCommit = 3,
    BalanceIncrease = 4,
}

impl TryFrom<u8> for EntryTag {
    type Error = AuthorityError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::ServerIndexNumber),
            1 => Ok(Self::MinuteNumber),
            2 => Ok(Self::ChainCommit),
            3 => Ok(Self::EntryCommit),
            4 => Ok(Self::BalanceIncrease),
            _ => Err(AuthorityError::UnsupportedTag {
                context: "block entry",
                tag,
            }),
        }
    }
}

/// Payment of entry credits for a new chain (and its first entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainCommit {
    pub version: u8,
    /// Commit time as 48-bit big-endian milliseconds since the Unix epoch.
    pub milli_time: [u8; 6],
    /// Hash of the chain id being created.
    pub chain_id_hash: Hash32,
    /// Binds the first entry to the new chain id.
    pub weld: Hash32,
    /// Hash of the chain's first entry.
    pub entry_hash: Hash32,
    /// Entry credits paid.
    pub credits: u8,
    /// Entry credit key that paid and signed the commit.
    pub ec_public_key: [u8; 32],
    pub signature: [u8; 64],
}

impl ChainCommit {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.version);
        buf.extend_from_slice(&self.milli_time);
        buf.extend_from_slice(self.chain_id_hash.as_bytes());
        buf.extend_from_slice(self.weld.as_bytes());
        buf.extend_from_slice(self.entry_hash.as_bytes());
        buf.push(self.credits);
        buf.extend_from_slice(&self.ec_public_key);
        buf.extend_from_slice(&self.signature);
    }

    fn decode(payload: &[u8]) -> Result<Self, AuthorityError> {
        let mut r = Reader::new(payload, "chain commit");
        let commit = Self {
            version: r.read_u8()?,
            milli_time: r.read_array()?,
            chain_id_hash: r.read_hash()?,
            weld: r.read_hash()?,
            entry_hash: r.read_hash()?,
            credits: r.read_u8()?,
            ec_public_key: r.read_array()?,
            signature: r.read_array()?,
        };
        r.finish()?;
        Ok(commit)
    }
}

/// Payment of entry credits for one entry in an existing chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryCommit {
    pub version: u8,
    /// Same encoding as [`ChainCommit::milli_time`].
    pub milli_time: [u8; 6],
    pub entry_hash: Hash32,
    /// Entry credits paid.
    pub credits: u8,
    pub ec_public_key: [u8; 32],
    pub signature: [u8; 64],
}

impl EntryCommit {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.version);
        buf.extend_from_slice(&self.milli_time);
        buf.extend_from_slice(self.entry_hash.as_bytes());
        buf.push(self.credits);
        buf.extend_from_slice(&self.ec_public_key);
        buf.extend_from_slice(&self.signature);
    }

    fn decode(payload: &[u8]) -> Result<Self, AuthorityError> {
        let mut r = Reader::new(payload, "entry commit");
        let commit = Self {
            version: r.read_u8()?,
            milli_time: r.read_array()?,
            entry_hash: r.read_hash()?,
            credits: r.read_u8()?,
            ec_public_key: r.read_array()?,
            signature: r.read_array()?,
        };
        r.finish()?;
        Ok(commit)
    }
}

/// Entry credits purchased by a factoid transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceIncrease {
    /// Entry credit key receiving the credits.
    pub ec_public_key: [u8; 32],
    /// Factoid transaction that bought them.
    pub tx_id: Hash32,
    /// Output index within the transaction.
    pub index: u64,
    /// Number of entry credits added.
    pub num_ec: u64,
}

impl BalanceIncrease {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.ec_public_key);
        buf.extend_from_slice(self.tx_id.as_bytes());
        encode_varint(buf, self.index);
        encode_varint(buf, self.num_ec);
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, AuthorityError> {
        Ok(Self {
            ec_public_key: r.read_array()?,
            tx_id: r.read_hash()?,
            index: r.read_varint()?,
            num_ec: r.read_varint()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockEntry {
    ServerIndexNumber(u8),
    MinuteNumber(u8),
    ChainCommit(ChainCommit),
    EntryCommit(EntryCommit),
    BalanceIncrease(BalanceIncrease),
}

impl BlockEntry {
    pub fn tag(&self) -> EntryTag {
        match self {
            Self::ServerIndexNumber(_) => EntryTag::ServerIndexNumber,
            Self::MinuteNumber(_) => EntryTag::MinuteNumber,
            Self::ChainCommit(_) => EntryTag::ChainCommit,
            Self::EntryCommit(_) => EntryTag::EntryCommit,
            Self::BalanceIncrease(_) => EntryTag::BalanceIncrease,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.tag() as u8);
        match self {
            Self::ServerIndexNumber(index) => buf.push(*index),
            Self::MinuteNumber(minute) => buf.push(*minute),
            Self::ChainCommit(commit) => commit.encode(buf),
            Self::EntryCommit(commit) => commit.encode(buf),
            Self::BalanceIncrease(increase) => increase.encode(buf),
        }
    }

    /// Reads one tagged entry, leaving the reader positioned at the next one.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, AuthorityError> {
        let tag = EntryTag::try_from(r.read_u8()?)?;
        let entry = match tag {
            EntryTag::ServerIndexNumber => {
                Self::ServerIndexNumber(r.take(SERVER_INDEX_NUMBER_SIZE)?[0])
            }
            EntryTag::MinuteNumber => Self::MinuteNumber(r.take(MINUTE_NUMBER_SIZE)?[0]),
            EntryTag::ChainCommit => {
                Self::ChainCommit(ChainCommit::decode(r.take(CHAIN_COMMIT_SIZE)?)?)
            }
            EntryTag::EntryCommit => {
                Self::EntryCommit(EntryCommit::decode(r.take(ENTRY_COMMIT_SIZE)?)?)
            }
            EntryTag::BalanceIncrease => Self::BalanceIncrease(BalanceIncrease::decode(r)?),
        };
        Ok(entry)
    }
}
