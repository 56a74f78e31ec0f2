//! Fixed-width big-endian integers and standard base64.
//!
//! Everything on the wire (report payloads, advertisement keys, private keys
//! handed between client and firmware builder) uses the standard padded
//! base64 alphabet and big-endian integers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CodecError;

pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn decode_base64(s: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD
        .decode(s.trim())
        .map_err(|e| CodecError::Base64(e.to_string()))
}

/// Decode base64 into a fixed-size array, rejecting any other length.
pub fn decode_base64_array<const N: usize>(s: &str) -> Result<[u8; N], CodecError> {
    let bytes = decode_base64(s)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| CodecError::Length {
        expected: N,
        actual: bytes.len(),
    })
}

fn slice_at(data: &[u8], offset: usize, len: usize) -> Result<&[u8], CodecError> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or(CodecError::OutOfBounds {
            offset,
            len,
            available: data.len(),
        })
}

pub fn read_u8(data: &[u8], offset: usize) -> Result<u8, CodecError> {
    Ok(slice_at(data, offset, 1)?[0])
}

pub fn read_u32_be(data: &[u8], offset: usize) -> Result<u32, CodecError> {
    let bytes = slice_at(data, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn write_u32_be(data: &mut [u8], offset: usize, value: u32) -> Result<(), CodecError> {
    let available = data.len();
    let target = offset
        .checked_add(4)
        .and_then(|end| data.get_mut(offset..end))
        .ok_or(CodecError::OutOfBounds {
            offset,
            len: 4,
            available,
        })?;
    target.copy_from_slice(&value.to_be_bytes());
    Ok(())
}
