//! Authority replay error types

use thiserror::Error;

use crate::types::ChainId;

#[derive(Error, Debug)]
pub enum AuthorityError {
    #[error("Truncated {context}: needs {needed} bytes, {available} available")]
    Truncation {
        context: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Unsupported {context} tag: {tag:#04x}")]
    UnsupportedTag { context: &'static str, tag: u8 },

    #[error("Integrity mismatch in {field}: header declares {declared}, computed {computed}")]
    IntegrityMismatch {
        field: &'static str,
        declared: String,
        computed: String,
    },

    #[error("Unknown authority: {0}")]
    UnknownAuthority(ChainId),

    #[error("Height gap: expected {expected}, found {found:?}")]
    HeightGap { expected: u32, found: Option<u32> },

    #[error("Stale registry: height {offered} is behind published height {current}")]
    StaleRegistry { current: u32, offered: u32 },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Malformed {context}: {reason}")]
    Malformed {
        context: &'static str,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthorityError {
    /// Decode failures abort the block or log being decoded.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::Truncation { .. }
                | Self::UnsupportedTag { .. }
                | Self::IntegrityMismatch { .. }
                | Self::Malformed { .. }
        )
    }
}

impl From<std::io::Error> for AuthorityError {
    fn from(e: std::io::Error) -> Self {
        AuthorityError::StoreUnavailable(e.to_string())
    }
}
