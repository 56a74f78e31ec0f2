//! Content-addressed report identifiers.
//!
//! The report network re-delivers the same ciphertext on every query until it
//! ages out, so stored reports are keyed by a hash of the payload instead of
//! a random id. The hash is shaped as a version-4 UUID to fit a `uuid` column.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::codec;
use crate::error::CodecError;

/// First 16 bytes of SHA-256(payload) with version nibble 4 and RFC 4122 variant.
pub fn report_id(payload: &[u8]) -> Uuid {
    let digest = Sha256::digest(payload);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    bytes[6] = (bytes[6] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    Uuid::from_bytes(bytes)
}

/// Same as [`report_id`], over the decoded bytes of a base64 payload.
pub fn report_id_from_base64(payload: &str) -> Result<Uuid, CodecError> {
    Ok(report_id(&codec::decode_base64(payload)?))
}
