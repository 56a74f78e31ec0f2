//! Offline-finding location reports.
//!
//! A finder device that sees a tracker's broadcast encrypts its own location
//! to the tracker's public key and uploads it. Layout of the decoded payload
//! (length `L`, big-endian):
//!
//! | bytes             | content                                  |
//! |-------------------|------------------------------------------|
//! | `0..4`            | seconds since 2001-01-01T00:00:00Z       |
//! | `4`               | confidence                               |
//! | `L-83..L-26`      | ephemeral P-224 public key (SEC1, 57 B)  |
//! | `L-26..L-16`      | AES-GCM ciphertext of the location       |
//! | `L-16..L`         | AES-GCM tag                              |
//!
//! Any bytes between the header and the ephemeral key are ignored.

use chrono::{DateTime, Duration, Utc};
use p224::elliptic_curve::sec1::ToEncodedPoint;
use p224::{PublicKey, SecretKey};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::constants::{
    AES_GCM_TAG_SIZE, COORDINATE_SCALE, LOCATION_SIZE, MIN_REPORT_SIZE,
    P224_UNCOMPRESSED_POINT_SIZE, REPORT_EPOCH_UNIX_SECS, REPORT_HEADER_SIZE,
};
use crate::crypto;
use crate::error::ReportError;

/// A decrypted location fix. Never persisted server-side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DecryptedFix {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: u8,
    pub confidence: u8,
}

/// Plaintext location in its wire form: fixed-point coordinates scaled by 1e7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub latitude: u32,
    pub longitude: u32,
    pub accuracy: u8,
    pub reserved: u8,
}

impl Location {
    /// Convert degrees to the unsigned fixed-point wire form.
    ///
    /// Coordinates are clamped to the representable range `0.0..=429.4967295`:
    /// negative values (and NaN) encode as 0, larger values as `u32::MAX`.
    pub fn from_degrees(latitude: f64, longitude: f64, accuracy: u8) -> Self {
        Self {
            latitude: to_fixed_point(latitude),
            longitude: to_fixed_point(longitude),
            accuracy,
            reserved: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; LOCATION_SIZE] {
        let mut out = [0u8; LOCATION_SIZE];
        out[0..4].copy_from_slice(&self.latitude.to_be_bytes());
        out[4..8].copy_from_slice(&self.longitude.to_be_bytes());
        out[8] = self.accuracy;
        out[9] = self.reserved;
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReportError> {
        if bytes.len() != LOCATION_SIZE {
            return Err(ReportError::Format(format!(
                "location is {} bytes, expected {}",
                bytes.len(),
                LOCATION_SIZE
            )));
        }
        Ok(Self {
            latitude: codec::read_u32_be(bytes, 0)?,
            longitude: codec::read_u32_be(bytes, 4)?,
            accuracy: codec::read_u8(bytes, 8)?,
            reserved: codec::read_u8(bytes, 9)?,
        })
    }

    pub fn latitude_degrees(&self) -> f64 {
        self.latitude as f64 / COORDINATE_SCALE
    }

    pub fn longitude_degrees(&self) -> f64 {
        self.longitude as f64 / COORDINATE_SCALE
    }
}

fn to_fixed_point(degrees: f64) -> u32 {
    let scaled = (degrees * COORDINATE_SCALE).round();
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(0.0, u32::MAX as f64) as u32
}

/// Borrowed view over the fields of a decoded report payload.
#[derive(Debug, Clone, Copy)]
pub struct ReportLayout<'a> {
    pub timestamp: u32,
    pub confidence: u8,
    pub ephemeral_key: &'a [u8],
    pub ciphertext: &'a [u8],
    pub tag: &'a [u8],
}

impl<'a> ReportLayout<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, ReportError> {
        let len = data.len();
        if len < MIN_REPORT_SIZE {
            return Err(ReportError::Format(format!(
                "report is {len} bytes, need at least {MIN_REPORT_SIZE}"
            )));
        }

        let tag_start = len - AES_GCM_TAG_SIZE;
        let ciphertext_start = tag_start - LOCATION_SIZE;
        let key_start = ciphertext_start - P224_UNCOMPRESSED_POINT_SIZE;

        Ok(Self {
            timestamp: codec::read_u32_be(data, 0)?,
            confidence: codec::read_u8(data, 4)?,
            ephemeral_key: &data[key_start..ciphertext_start],
            ciphertext: &data[ciphertext_start..tag_start],
            tag: &data[tag_start..],
        })
    }

    pub fn time(&self) -> DateTime<Utc> {
        report_time(self.timestamp)
    }
}

/// Reference epoch plus a 32-bit report timestamp.
pub fn report_time(timestamp: u32) -> DateTime<Utc> {
    DateTime::<Utc>::from(std::time::UNIX_EPOCH)
        + Duration::seconds(REPORT_EPOCH_UNIX_SECS + timestamp as i64)
}

/// Inverse of [`report_time`]; `None` if the time is not representable.
pub fn report_timestamp(time: DateTime<Utc>) -> Option<u32> {
    u32::try_from(time.timestamp() - REPORT_EPOCH_UNIX_SECS).ok()
}

/// Decrypt a base64 report payload with the tracker's private key.
pub fn decrypt_report(payload_base64: &str, secret: &SecretKey) -> Result<DecryptedFix, ReportError> {
    let data = codec::decode_base64(payload_base64)?;
    decrypt_report_bytes(&data, secret)
}

pub fn decrypt_report_bytes(data: &[u8], secret: &SecretKey) -> Result<DecryptedFix, ReportError> {
    let layout = ReportLayout::parse(data)?;

    let ephemeral = PublicKey::from_sec1_bytes(layout.ephemeral_key)
        .map_err(|_| ReportError::Format("invalid ephemeral public key".to_string()))?;

    let secret_bytes = crypto::shared_secret(secret, &ephemeral);
    let keys = crypto::derive_report_keys(&secret_bytes, layout.ephemeral_key);

    let mut sealed = Vec::with_capacity(LOCATION_SIZE + AES_GCM_TAG_SIZE);
    sealed.extend_from_slice(layout.ciphertext);
    sealed.extend_from_slice(layout.tag);

    let plaintext = crypto::decrypt(&keys, &sealed)?;
    let location = Location::from_bytes(&plaintext)?;

    Ok(DecryptedFix {
        time: layout.time(),
        latitude: location.latitude_degrees(),
        longitude: location.longitude_degrees(),
        accuracy: location.accuracy,
        confidence: layout.confidence,
    })
}

/// Finder-side construction: encrypt a location to a tracker's public key
/// under a fresh ephemeral key. Returns the raw payload bytes.
pub fn encrypt_report<R: RngCore + CryptoRng>(
    rng: &mut R,
    tracker: &PublicKey,
    timestamp: u32,
    confidence: u8,
    location: &Location,
) -> Result<Vec<u8>, ReportError> {
    let ephemeral = SecretKey::random(rng);
    let ephemeral_point = ephemeral.public_key().to_encoded_point(false);
    let ephemeral_bytes = ephemeral_point.as_bytes();

    let secret_bytes = crypto::shared_secret(&ephemeral, tracker);
    let keys = crypto::derive_report_keys(&secret_bytes, ephemeral_bytes);
    let sealed = crypto::encrypt(&keys, &location.to_bytes())?;

    let mut payload = Vec::with_capacity(REPORT_HEADER_SIZE + ephemeral_bytes.len() + sealed.len());
    payload.extend_from_slice(&timestamp.to_be_bytes());
    payload.push(confidence);
    payload.extend_from_slice(ephemeral_bytes);
    payload.extend_from_slice(&sealed);

    Ok(payload)
}
