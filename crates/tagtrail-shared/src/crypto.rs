use aes::Aes128;
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::AesGcm;
use p224::ecdh::diffie_hellman;
use p224::{PublicKey, SecretKey};
use sha2::{Digest, Sha256};

use crate::constants::{AES_GCM_IV_SIZE, AES_KEY_SIZE, P224_SCALAR_SIZE, REPORT_KDF_OUTPUT_SIZE};
use crate::error::ReportError;

/// AES-128-GCM with the 16-byte IV the offline-finding network uses.
pub type ReportCipher = AesGcm<Aes128, U16>;

/// AES key and IV derived for one report.
pub struct ReportKeys {
    pub key: [u8; AES_KEY_SIZE],
    pub iv: [u8; AES_GCM_IV_SIZE],
}

/// ECDH on P-224, returning the x-coordinate of the shared point (28 bytes, BE).
pub fn shared_secret(secret: &SecretKey, public: &PublicKey) -> [u8; P224_SCALAR_SIZE] {
    let shared = diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    let mut out = [0u8; P224_SCALAR_SIZE];
    out.copy_from_slice(shared.raw_secret_bytes());
    out
}

/// ANSI X9.63 KDF over SHA-256:
/// `SHA256(secret || counter_be32 || shared_info)` for counter = 1, 2, ...
/// concatenated and truncated to `length` bytes.
pub fn x963_kdf(secret: &[u8], shared_info: &[u8], length: usize) -> Vec<u8> {
    let mut output = Vec::with_capacity(length);
    let mut counter: u32 = 1;

    while output.len() < length {
        let mut sha = Sha256::new();
        sha.update(secret);
        sha.update(counter.to_be_bytes());
        sha.update(shared_info);
        let block = sha.finalize();

        let take = (length - output.len()).min(block.len());
        output.extend_from_slice(&block[..take]);
        counter = counter.wrapping_add(1);
    }

    output
}

// Shared info is the ephemeral public key exactly as carried in the report.
pub fn derive_report_keys(shared_secret: &[u8], ephemeral_key_bytes: &[u8]) -> ReportKeys {
    let material = x963_kdf(shared_secret, ephemeral_key_bytes, REPORT_KDF_OUTPUT_SIZE);
    let mut key = [0u8; AES_KEY_SIZE];
    let mut iv = [0u8; AES_GCM_IV_SIZE];
    key.copy_from_slice(&material[..AES_KEY_SIZE]);
    iv.copy_from_slice(&material[AES_KEY_SIZE..]);
    ReportKeys { key, iv }
}

// Returns ciphertext || tag
pub fn encrypt(keys: &ReportKeys, plaintext: &[u8]) -> Result<Vec<u8>, ReportError> {
    let cipher = ReportCipher::new(GenericArray::from_slice(&keys.key));
    cipher
        .encrypt(GenericArray::from_slice(&keys.iv), plaintext)
        .map_err(|_| ReportError::EncryptionFailed)
}

// Expects ciphertext || tag
pub fn decrypt(keys: &ReportKeys, data: &[u8]) -> Result<Vec<u8>, ReportError> {
    let cipher = ReportCipher::new(GenericArray::from_slice(&keys.key));
    cipher
        .decrypt(GenericArray::from_slice(&keys.iv), data)
        .map_err(|_| ReportError::Authentication)
}
