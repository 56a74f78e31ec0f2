use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::codec;
use crate::constants::{ADVERTISEMENT_KEY_SIZE, MAC_ADDRESS_SIZE, MAC_STATIC_RANDOM_BITS};
use crate::error::KeyError;

// Tracker public identity = x-coordinate of the P-224 public point (28 bytes)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AdvertisementKey(pub [u8; ADVERTISEMENT_KEY_SIZE]);

impl AdvertisementKey {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let arr = <[u8; ADVERTISEMENT_KEY_SIZE]>::try_from(bytes)
            .map_err(|_| KeyError::InvalidAdvertisementKey)?;
        Ok(Self(arr))
    }

    pub fn from_base64(s: &str) -> Result<Self, KeyError> {
        Ok(Self(codec::decode_base64_array(s)?))
    }

    pub fn as_bytes(&self) -> &[u8; ADVERTISEMENT_KEY_SIZE] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        codec::encode_base64(&self.0)
    }

    /// SHA-256 of the key bytes, the identifier the report network indexes by.
    pub fn hashed(&self) -> [u8; 32] {
        Sha256::digest(self.0).into()
    }

    pub fn hashed_base64(&self) -> String {
        codec::encode_base64(&self.hashed())
    }

    pub fn mac_address(&self) -> MacAddress {
        let mut mac = [0u8; MAC_ADDRESS_SIZE];
        mac.copy_from_slice(&self.0[..MAC_ADDRESS_SIZE]);
        mac[0] |= MAC_STATIC_RANDOM_BITS;
        MacAddress(mac)
    }

    /// Status bits carried in the broadcast: the two key bits the MAC overwrites.
    pub fn status_bits(&self) -> u8 {
        self.0[0] >> 6
    }

    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl std::fmt::Display for AdvertisementKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

/// BLE static random address in canonical (most significant byte first) order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; MAC_ADDRESS_SIZE]);

impl MacAddress {
    /// Over-the-air byte order, as the radio stack and firmware expect it.
    pub fn to_le_bytes(&self) -> [u8; MAC_ADDRESS_SIZE] {
        let mut out = self.0;
        out.reverse();
        out
    }

    // "C0:11:22:33:44:55" -> "C0_11_22_33_44_55"
    pub fn to_file_tag(&self) -> String {
        self.to_string().replace(':', "_")
    }
}

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|b| format!("{b:02X}")).collect();
        write!(f, "{}", parts.join(":"))
    }
}

impl std::str::FromStr for MacAddress {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || KeyError::InvalidMacAddress(s.to_string());
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != MAC_ADDRESS_SIZE {
            return Err(invalid());
        }
        let mut mac = [0u8; MAC_ADDRESS_SIZE];
        for (slot, part) in mac.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(invalid());
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(Self(mac))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> AdvertisementKey {
        let mut bytes = [0u8; ADVERTISEMENT_KEY_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8 + 1;
        }
        AdvertisementKey(bytes)
    }

    #[test]
    fn test_mac_from_key() {
        let mac = sample_key().mac_address();
        assert_eq!(mac.0, [0xC1, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(mac.to_le_bytes(), [0x06, 0x05, 0x04, 0x03, 0x02, 0xC1]);
    }

    #[test]
    fn test_mac_display_and_parse() {
        let mac = MacAddress([0xC1, 0x02, 0xAB, 0x04, 0x05, 0xFF]);
        assert_eq!(mac.to_string(), "C1:02:AB:04:05:FF");
        assert_eq!(mac.to_file_tag(), "C1_02_AB_04_05_FF");
        assert_eq!("C1:02:AB:04:05:FF".parse::<MacAddress>().unwrap(), mac);
        assert!("C1:02:AB".parse::<MacAddress>().is_err());
        assert!("C1:02:AB:04:05:GG".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_mac_parse_error_names_input() {
        for bad in ["C1:02:AB", "C1:02:AB:04:05:GG", "C1:2:AB:04:05:FF", ""] {
            assert_eq!(
                bad.parse::<MacAddress>(),
                Err(KeyError::InvalidMacAddress(bad.to_string()))
            );
        }
    }

    #[test]
    fn test_key_base64_roundtrip_and_length() {
        let key = sample_key();
        assert_eq!(AdvertisementKey::from_base64(&key.to_base64()).unwrap(), key);
        assert!(AdvertisementKey::from_base64("AQID").is_err());
        assert!(AdvertisementKey::from_slice(&[0u8; 27]).is_err());
    }

    #[test]
    fn test_status_bits() {
        let mut key = sample_key();
        key.0[0] = 0b1011_0101;
        assert_eq!(key.status_bits(), 0b10);
    }
}
