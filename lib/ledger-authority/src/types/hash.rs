//! Fixed-width 32-byte hashes and chain identifiers

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::AuthorityError;

pub const HASH_LENGTH: usize = 32;

/// A 32-byte value: block hashes, chain identifiers, key hashes and matryoshka hashes
/// all share this representation on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash32([u8; HASH_LENGTH]);

/// Identity, management and block chains are addressed by a 32-byte id.
pub type ChainId = Hash32;

/// Hash of a public key, as recorded for a server's signing key.
pub type KeyHash = Hash32;

/// Admin block chain id (`00..0a`).
pub const ADMIN_CHAIN_ID: ChainId = Hash32::from_low_byte(0x0a);
/// Entry-credit block chain id (`00..0c`).
pub const ENTRY_CREDIT_CHAIN_ID: ChainId = Hash32::from_low_byte(0x0c);
/// Directory block chain id (`00..0d`).
pub const DIRECTORY_CHAIN_ID: ChainId = Hash32::from_low_byte(0x0d);
/// Factoid block chain id (`00..0f`).
pub const FACTOID_CHAIN_ID: ChainId = Hash32::from_low_byte(0x0f);

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0u8; HASH_LENGTH]);

    pub const fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// All zero except the final byte, the form used by the well-known system chains.
    pub const fn from_low_byte(byte: u8) -> Self {
        let mut bytes = [0u8; HASH_LENGTH];
        bytes[HASH_LENGTH - 1] = byte;
        Self(bytes)
    }

    pub fn sha256(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LENGTH]
    }
}

impl From<[u8; HASH_LENGTH]> for Hash32 {
    fn from(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl FromStr for Hash32 {
    type Err = AuthorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; HASH_LENGTH];
        hex::decode_to_slice(s.trim(), &mut bytes).map_err(|e| AuthorityError::Malformed {
            context: "hash",
            reason: format!("'{}' is not a 64-digit hex string: {}", s, e),
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
