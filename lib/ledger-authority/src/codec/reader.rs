//! Bounds-checked cursor over an input buffer

use crate::error::AuthorityError;
use crate::types::{HASH_LENGTH, Hash32};

use super::varint::decode_varint;

pub struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
    context: &'static str,
}

impl<'a> Reader<'a> {
    /// `context` names the structure being decoded in truncation errors.
    pub fn new(data: &'a [u8], context: &'static str) -> Self {
        Self {
            data,
            offset: 0,
            context,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    pub fn is_empty(&self) -> bool {
        self.offset == self.data.len()
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], AuthorityError> {
        let available = self.data.len() - self.offset;
        if len > available {
            return Err(AuthorityError::Truncation {
                context: self.context,
                needed: len,
                available,
            });
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, AuthorityError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32_be(&mut self) -> Result<u32, AuthorityError> {
        Ok(u32::from_be_bytes(self.read_array::<4>()?))
    }

    pub fn read_u64_be(&mut self) -> Result<u64, AuthorityError> {
        Ok(u64::from_be_bytes(self.read_array::<8>()?))
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], AuthorityError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn read_hash(&mut self) -> Result<Hash32, AuthorityError> {
        Ok(Hash32::new(self.read_array::<HASH_LENGTH>()?))
    }

    pub fn read_varint(&mut self) -> Result<u64, AuthorityError> {
        let (value, used) = decode_varint(self.remaining())?;
        self.offset += used;
        Ok(value)
    }

    /// Errors unless every byte was consumed.
    pub fn finish(self) -> Result<(), AuthorityError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AuthorityError::Malformed {
                context: self.context,
                reason: format!("{} unconsumed bytes", self.data.len() - self.offset),
            })
        }
    }
}
