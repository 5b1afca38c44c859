//! Wire primitives shared by the block and admin-log codecs

mod reader;
mod varint;

pub use reader::Reader;
pub use varint::{MAX_VARINT_LEN, decode_varint, encode_varint, varint_len};
