//! Admin log codec
//!
//! An admin log is the concatenation of tagged operation records for one directory
//! block height. Every record has a fixed payload width determined by its tag, so the
//! decoder slices exactly that many bytes and requires its sub-decoder to consume all
//! of them.

use std::fmt;

use crate::codec::Reader;
use crate::error::AuthorityError;
use crate::types::{AnchorChain, AnchorKey, ChainId, Hash32, KeyHash};

/// Length of the raw key carried by an anchor key registration (a Bitcoin hash160).
pub const ANCHOR_KEY_LENGTH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AdminOpKind {
    MinuteMarker = 0,
    DirectoryBlockSignature = 1,
    RevealMatryoshkaHash = 2,
    SetMatryoshkaHash = 3,
    IncreaseServerCount = 4,
    AddFederatedServer = 5,
    AddAuditServer = 6,
    RemoveServer = 7,
    AddServerSigningKey = 8,
    AddAnchorKey = 9,
}

impl AdminOpKind {
    /// Payload width following the tag byte.
    pub fn payload_len(&self) -> usize {
        match self {
            Self::MinuteMarker | Self::IncreaseServerCount => 1,
            Self::DirectoryBlockSignature => 32 + 32 + 64,
            Self::RevealMatryoshkaHash | Self::SetMatryoshkaHash => 32 + 32,
            Self::AddFederatedServer | Self::AddAuditServer | Self::RemoveServer => 32,
            Self::AddServerSigningKey => 32 + 1 + 32,
            Self::AddAnchorKey => 32 + 1 + 1 + ANCHOR_KEY_LENGTH,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MinuteMarker => "minuteMarker",
            Self::DirectoryBlockSignature => "directoryBlockSignature",
            Self::RevealMatryoshkaHash => "revealMatryoshkaHash",
            Self::SetMatryoshkaHash => "setMatryoshkaHash",
            Self::IncreaseServerCount => "increaseServerCount",
            Self::AddFederatedServer => "addFederatedServer",
            Self::AddAuditServer => "addAuditServer",
            Self::RemoveServer => "removeServer",
            Self::AddServerSigningKey => "addServerSigningKey",
            Self::AddAnchorKey => "addAnchorKey",
        }
    }
}

impl fmt::Display for AdminOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<u8> for AdminOpKind {
    type Error = AuthorityError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::MinuteMarker),
            1 => Ok(Self::DirectoryBlockSignature),
            2 => Ok(Self::RevealMatryoshkaHash),
            3 => Ok(Self::SetMatryoshkaHash),
            4 => Ok(Self::IncreaseServerCount),
            5 => Ok(Self::AddFederatedServer),
            6 => Ok(Self::AddAuditServer),
            7 => Ok(Self::RemoveServer),
            8 => Ok(Self::AddServerSigningKey),
            9 => Ok(Self::AddAnchorKey),
            _ => Err(AuthorityError::UnsupportedTag {
                context: "admin entry",
                tag,
            }),
        }
    }
}

/// A federated server's signature over the previous directory block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryBlockSignature {
    pub signer_chain_id: ChainId,
    pub public_key: [u8; 32],
    pub signature: [u8; 64],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOp {
    MinuteMarker(u8),
    DirectoryBlockSignature(DirectoryBlockSignature),
    RevealMatryoshkaHash {
        identity_chain_id: ChainId,
        hash: Hash32,
    },
    SetMatryoshkaHash {
        identity_chain_id: ChainId,
        hash: Hash32,
    },
    IncreaseServerCount(u8),
    AddFederatedServer(ChainId),
    AddAuditServer(ChainId),
    RemoveServer(ChainId),
    AddServerSigningKey {
        identity_chain_id: ChainId,
        key_priority: u8,
        signing_key: KeyHash,
    },
    AddAnchorKey {
        identity_chain_id: ChainId,
        anchor: AnchorKey,
    },
}

impl AdminOp {
    pub fn kind(&self) -> AdminOpKind {
        match self {
            Self::MinuteMarker(_) => AdminOpKind::MinuteMarker,
            Self::DirectoryBlockSignature(_) => AdminOpKind::DirectoryBlockSignature,
            Self::RevealMatryoshkaHash { .. } => AdminOpKind::RevealMatryoshkaHash,
            Self::SetMatryoshkaHash { .. } => AdminOpKind::SetMatryoshkaHash,
            Self::IncreaseServerCount(_) => AdminOpKind::IncreaseServerCount,
            Self::AddFederatedServer(_) => AdminOpKind::AddFederatedServer,
            Self::AddAuditServer(_) => AdminOpKind::AddAuditServer,
            Self::RemoveServer(_) => AdminOpKind::RemoveServer,
            Self::AddServerSigningKey { .. } => AdminOpKind::AddServerSigningKey,
            Self::AddAnchorKey { .. } => AdminOpKind::AddAnchorKey,
        }
    }

    /// The identity this op targets, if any.
    pub fn target_chain_id(&self) -> Option<ChainId> {
        match self {
            Self::MinuteMarker(_) | Self::IncreaseServerCount(_) => None,
            Self::DirectoryBlockSignature(sig) => Some(sig.signer_chain_id),
            Self::RevealMatryoshkaHash {
                identity_chain_id, ..
            }
            | Self::SetMatryoshkaHash {
                identity_chain_id, ..
            }
            | Self::AddServerSigningKey {
                identity_chain_id, ..
            }
            | Self::AddAnchorKey {
                identity_chain_id, ..
            } => Some(*identity_chain_id),
            Self::AddFederatedServer(id) | Self::AddAuditServer(id) | Self::RemoveServer(id) => {
                Some(*id)
            }
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), AuthorityError> {
        buf.push(self.kind() as u8);
        match self {
            Self::MinuteMarker(minute) => buf.push(*minute),
            Self::DirectoryBlockSignature(sig) => {
                buf.extend_from_slice(sig.signer_chain_id.as_bytes());
                buf.extend_from_slice(&sig.public_key);
                buf.extend_from_slice(&sig.signature);
            }
            Self::RevealMatryoshkaHash {
                identity_chain_id,
                hash,
            }
            | Self::SetMatryoshkaHash {
                identity_chain_id,
                hash,
            } => {
                buf.extend_from_slice(identity_chain_id.as_bytes());
                buf.extend_from_slice(hash.as_bytes());
            }
            Self::IncreaseServerCount(amount) => buf.push(*amount),
            Self::AddFederatedServer(id) | Self::AddAuditServer(id) | Self::RemoveServer(id) => {
                buf.extend_from_slice(id.as_bytes());
            }
            Self::AddServerSigningKey {
                identity_chain_id,
                key_priority,
                signing_key,
            } => {
                buf.extend_from_slice(identity_chain_id.as_bytes());
                buf.push(*key_priority);
                buf.extend_from_slice(signing_key.as_bytes());
            }
            Self::AddAnchorKey {
                identity_chain_id,
                anchor,
            } => {
                if anchor.key.len() != ANCHOR_KEY_LENGTH {
                    return Err(AuthorityError::Malformed {
                        context: "anchor key",
                        reason: format!(
                            "key is {} bytes, expected {}",
                            anchor.key.len(),
                            ANCHOR_KEY_LENGTH
                        ),
                    });
                }
                buf.extend_from_slice(identity_chain_id.as_bytes());
                buf.push(anchor.key_priority);
                buf.push(anchor.key_type);
                buf.extend_from_slice(&anchor.key);
            }
        }
        Ok(())
    }

    /// Decodes one op, consuming exactly its tag and payload.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, AuthorityError> {
        let kind = AdminOpKind::try_from(r.read_u8()?)?;
        let mut p = Reader::new(r.take(kind.payload_len())?, "admin entry");

        let op = match kind {
            AdminOpKind::MinuteMarker => Self::MinuteMarker(p.read_u8()?),
            AdminOpKind::DirectoryBlockSignature => {
                Self::DirectoryBlockSignature(DirectoryBlockSignature {
                    signer_chain_id: p.read_hash()?,
                    public_key: p.read_array()?,
                    signature: p.read_array()?,
                })
            }
            AdminOpKind::RevealMatryoshkaHash => Self::RevealMatryoshkaHash {
                identity_chain_id: p.read_hash()?,
                hash: p.read_hash()?,
            },
            AdminOpKind::SetMatryoshkaHash => Self::SetMatryoshkaHash {
                identity_chain_id: p.read_hash()?,
                hash: p.read_hash()?,
            },
            AdminOpKind::IncreaseServerCount => Self::IncreaseServerCount(p.read_u8()?),
            AdminOpKind::AddFederatedServer => Self::AddFederatedServer(p.read_hash()?),
            AdminOpKind::AddAuditServer => Self::AddAuditServer(p.read_hash()?),
            AdminOpKind::RemoveServer => Self::RemoveServer(p.read_hash()?),
            AdminOpKind::AddServerSigningKey => Self::AddServerSigningKey {
                identity_chain_id: p.read_hash()?,
                key_priority: p.read_u8()?,
                signing_key: p.read_hash()?,
            },
            AdminOpKind::AddAnchorKey => {
                let identity_chain_id = p.read_hash()?;
                let key_priority = p.read_u8()?;
                let key_type = p.read_u8()?;
                let key = p.read_array::<ANCHOR_KEY_LENGTH>()?.to_vec();
                Self::AddAnchorKey {
                    identity_chain_id,
                    anchor: AnchorKey {
                        chain: AnchorChain::Bitcoin,
                        key_type,
                        key_priority,
                        key,
                    },
                }
            }
        };

        p.finish()?;
        Ok(op)
    }
}

/// Decodes a complete admin log. Any bad entry fails the whole log.
pub fn decode_admin_log(data: &[u8]) -> Result<Vec<AdminOp>, AuthorityError> {
    let mut r = Reader::new(data, "admin log");
    let mut ops = Vec::new();
    while !r.is_empty() {
        ops.push(AdminOp::decode(&mut r)?);
    }
    Ok(ops)
}

pub fn encode_admin_log(ops: &[AdminOp]) -> Result<Vec<u8>, AuthorityError> {
    let mut buf = Vec::new();
    for op in ops {
        op.encode(&mut buf)?;
    }
    Ok(buf)
}
