use p224::elliptic_curve::sec1::ToEncodedPoint;
use p224::{FieldBytes, PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::constants::{ADVERTISEMENT_KEY_SIZE, MAX_KEYGEN_ATTEMPTS, P224_SCALAR_SIZE};
use crate::error::KeyError;
use crate::types::{AdvertisementKey, MacAddress};

/// A tracker's P-224 key material.
/// The private scalar stays with the owning client; everything else is
/// derived from the public point.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    advertisement_key: AdvertisementKey,
}

/// Serializable format for showing/exporting a key pair (all base64 except the MAC)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyPairExport {
    pub private_key: String,
    pub advertisement_key: String,
    pub advertisement_hash: String,
    pub mac_address: String,
}

impl KeyPair {
    /// Generate a new random key pair whose advertisement hash is safe for
    /// the report network's identifier alphabet.
    pub fn generate() -> Result<Self, KeyError> {
        Self::generate_with(&mut OsRng)
    }

    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, KeyError> {
        for _ in 0..MAX_KEYGEN_ATTEMPTS {
            let pair = Self::from_secret(SecretKey::random(rng));
            if pair.is_wire_safe() {
                return Ok(pair);
            }
        }
        Err(KeyError::GenerationExhausted(MAX_KEYGEN_ATTEMPTS))
    }

    /// Restore a key pair from its 28-byte big-endian private scalar
    pub fn from_private_bytes(bytes: &[u8; P224_SCALAR_SIZE]) -> Result<Self, KeyError> {
        let secret = SecretKey::from_bytes(&FieldBytes::clone_from_slice(bytes))
            .map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret(secret))
    }

    pub fn from_private_base64(s: &str) -> Result<Self, KeyError> {
        let bytes = codec::decode_base64_array::<P224_SCALAR_SIZE>(s)?;
        Self::from_private_bytes(&bytes)
    }

    fn from_secret(secret: SecretKey) -> Self {
        let advertisement_key = advertisement_key_for(&secret.public_key());
        Self {
            secret,
            advertisement_key,
        }
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }

    pub fn private_bytes(&self) -> [u8; P224_SCALAR_SIZE] {
        self.secret.to_bytes().into()
    }

    pub fn private_base64(&self) -> String {
        codec::encode_base64(&self.private_bytes())
    }

    pub fn advertisement_key(&self) -> &AdvertisementKey {
        &self.advertisement_key
    }

    pub fn advertisement_hash(&self) -> String {
        self.advertisement_key.hashed_base64()
    }

    pub fn mac_address(&self) -> MacAddress {
        self.advertisement_key.mac_address()
    }

    /// True when the advertisement hash avoids `/` and `+`
    pub fn is_wire_safe(&self) -> bool {
        is_wire_safe_identifier(&self.advertisement_hash())
    }

    pub fn to_export(&self) -> KeyPairExport {
        KeyPairExport {
            private_key: self.private_base64(),
            advertisement_key: self.advertisement_key.to_base64(),
            advertisement_hash: self.advertisement_hash(),
            mac_address: self.mac_address().to_string(),
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("advertisement_key", &self.advertisement_key.to_base64())
            .finish_non_exhaustive()
    }
}

/// Strip the SEC1 format byte from the compressed point, leaving x.
pub fn advertisement_key_for(public: &PublicKey) -> AdvertisementKey {
    let encoded = public.to_encoded_point(true);
    let mut key = [0u8; ADVERTISEMENT_KEY_SIZE];
    key.copy_from_slice(&encoded.as_bytes()[1..]);
    AdvertisementKey(key)
}

pub fn is_wire_safe_identifier(id: &str) -> bool {
    !id.contains('/') && !id.contains('+')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAC_STATIC_RANDOM_BITS;

    // Scalar 0x0102..1b20; its hash happens to be wire safe.
    const VECTOR_PRIVATE: &str = "AQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobIA==";
    const VECTOR_ADVERTISEMENT: &str = "wgicV7hgo5usJB0r0x32ZSgcmXpsFIAe79bgYQ==";
    const VECTOR_HASH: &str = "QQ6KIdG4jp7ujbCSO82nNpZSchJW4rRlDcqwUNsMMrI=";

    #[test]
    fn test_generation_is_wire_safe() {
        for _ in 0..16 {
            let pair = KeyPair::generate().unwrap();
            let hash = pair.advertisement_hash();
            assert!(!hash.contains('/'));
            assert!(!hash.contains('+'));
        }
    }

    #[test]
    fn test_generated_mac_top_bits() {
        for _ in 0..16 {
            let pair = KeyPair::generate().unwrap();
            assert_eq!(
                pair.mac_address().0[0] & MAC_STATIC_RANDOM_BITS,
                MAC_STATIC_RANDOM_BITS
            );
        }
    }

    #[test]
    fn test_known_vector() {
        let pair = KeyPair::from_private_base64(VECTOR_PRIVATE).unwrap();
        assert_eq!(pair.advertisement_key().to_base64(), VECTOR_ADVERTISEMENT);
        assert_eq!(pair.advertisement_hash(), VECTOR_HASH);
        assert_eq!(pair.mac_address().to_string(), "C2:08:9C:57:B8:60");
        assert!(pair.is_wire_safe());
    }

    #[test]
    fn test_known_vector_forces_mac_bits() {
        // Scalar 0x0102..1b1c: key starts with 0x62, hash contains '/' and '+'.
        let mut scalar = [0u8; 28];
        for (i, b) in scalar.iter_mut().enumerate() {
            *b = i as u8 + 1;
        }
        let pair = KeyPair::from_private_bytes(&scalar).unwrap();
        assert_eq!(
            hex::encode(pair.advertisement_key().as_bytes()),
            "627b7c0b3a2fb7a478ac5670e9973194a5fda0bc0791b07506a73ddd"
        );
        assert_eq!(pair.mac_address().0, [0xE2, 0x7B, 0x7C, 0x0B, 0x3A, 0x2F]);
        assert_eq!(
            pair.mac_address().to_le_bytes(),
            [0x2F, 0x3A, 0x0B, 0x7C, 0x7B, 0xE2]
        );
        assert!(!pair.is_wire_safe());
    }

    #[test]
    fn test_private_roundtrip() {
        let pair = KeyPair::generate().unwrap();
        let restored = KeyPair::from_private_base64(&pair.private_base64()).unwrap();
        assert_eq!(pair.advertisement_key(), restored.advertisement_key());
    }

    #[test]
    fn test_zero_scalar_rejected() {
        assert_eq!(
            KeyPair::from_private_bytes(&[0u8; 28]).unwrap_err(),
            KeyError::InvalidPrivateKey
        );
    }

    #[test]
    fn test_export_fields() {
        let pair = KeyPair::from_private_base64(VECTOR_PRIVATE).unwrap();
        let export = pair.to_export();
        assert_eq!(export.private_key, VECTOR_PRIVATE);
        assert_eq!(export.advertisement_key, VECTOR_ADVERTISEMENT);
        assert_eq!(export.advertisement_hash, VECTOR_HASH);
        assert_eq!(export.mac_address, "C2:08:9C:57:B8:60");
    }

    #[test]
    fn test_debug_hides_private_key() {
        let pair = KeyPair::from_private_base64(VECTOR_PRIVATE).unwrap();
        let dbg = format!("{pair:?}");
        assert!(!dbg.contains(VECTOR_PRIVATE));
    }

    #[test]
    fn test_wire_safe_identifier() {
        assert!(is_wire_safe_identifier("abcDEF0123=="));
        assert!(!is_wire_safe_identifier("ab/c"));
        assert!(!is_wire_safe_identifier("ab+c"));
    }
}
