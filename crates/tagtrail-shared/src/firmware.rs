//! Firmware image patching.
//!
//! Release firmware ships with placeholder byte sequences where the
//! per-device broadcast payload, its length and the BLE address live. The
//! builder finds each placeholder and overwrites it in place, so the image
//! length never changes.

use serde::{Deserialize, Serialize};

use crate::constants::{
    ADVERTISEMENT_BLOB_SIZE, ADVERTISEMENT_KEY_SIZE, ADVERTISEMENT_PREAMBLE, MAC_ADDRESS_SIZE,
};
use crate::error::PatchError;
use crate::types::AdvertisementKey;

/// Placeholder broadcast blob compiled into release images.
pub const DEFAULT_BROADCAST_TEMPLATE: [u8; ADVERTISEMENT_BLOB_SIZE] = [
    0x1E, 0xFF, 0x4C, 0x00, 0x12, 0x19, 0x00, b'T', b'A', b'G', b'T', b'R', b'A', b'I', b'L',
    b'_', b'K', b'E', b'Y', b'_', b'P', b'L', b'A', b'C', b'E', b'H', b'O', b'L', b'D', 0x00,
    0x00,
];

/// Placeholder broadcast length: the length byte followed by its marker.
pub const DEFAULT_LENGTH_TEMPLATE: [u8; 5] = [0xFF, b'T', b'T', b'L', b'N'];

/// Placeholder BLE address in over-the-air byte order.
pub const DEFAULT_MAC_TEMPLATE: [u8; MAC_ADDRESS_SIZE] = [b'T', b'T', b'M', b'A', b'C', b'!'];

/// Find the first occurrence of `template` in `firmware` and overwrite its
/// leading `replacement.len()` bytes. Nothing is written on error.
pub fn patch(firmware: &mut [u8], template: &[u8], replacement: &[u8]) -> Result<usize, PatchError> {
    if replacement.len() > template.len() {
        return Err(PatchError::Size {
            template: template.len(),
            replacement: replacement.len(),
        });
    }

    let offset = find(firmware, template).ok_or(PatchError::NotFound)?;
    firmware[offset..offset + replacement.len()].copy_from_slice(replacement);
    Ok(offset)
}

/// Offset of the first exact match, scanning from 0.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Manufacturer-data advertisement for a tracker key: preamble, status byte,
/// key bytes 6..28, the top two bits of key byte 0, and a trailing hint byte.
pub fn advertisement_blob(key: &AdvertisementKey) -> [u8; ADVERTISEMENT_BLOB_SIZE] {
    let mut blob = [0u8; ADVERTISEMENT_BLOB_SIZE];
    let preamble = ADVERTISEMENT_PREAMBLE.len();
    blob[..preamble].copy_from_slice(&ADVERTISEMENT_PREAMBLE);
    blob[preamble] = 0x00; // status
    blob[preamble + 1..ADVERTISEMENT_BLOB_SIZE - 2]
        .copy_from_slice(&key.as_bytes()[MAC_ADDRESS_SIZE..ADVERTISEMENT_KEY_SIZE]);
    blob[ADVERTISEMENT_BLOB_SIZE - 2] = key.status_bits();
    blob[ADVERTISEMENT_BLOB_SIZE - 1] = 0x00; // hint
    blob
}

/// Build the broadcast blob and check it against the template it replaces.
pub fn build_blob_for_template(
    key: &AdvertisementKey,
    template: &[u8],
) -> Result<[u8; ADVERTISEMENT_BLOB_SIZE], PatchError> {
    let blob = advertisement_blob(key);
    if blob.len() != template.len() {
        return Err(PatchError::BlobLength {
            expected: template.len(),
            actual: blob.len(),
        });
    }
    Ok(blob)
}

/// The three placeholder regions of a firmware image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareTemplates {
    #[serde(with = "hex_bytes")]
    pub broadcast: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub broadcast_length: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub mac: Vec<u8>,
}

impl Default for FirmwareTemplates {
    fn default() -> Self {
        Self {
            broadcast: DEFAULT_BROADCAST_TEMPLATE.to_vec(),
            broadcast_length: DEFAULT_LENGTH_TEMPLATE.to_vec(),
            mac: DEFAULT_MAC_TEMPLATE.to_vec(),
        }
    }
}

/// Offsets written by [`FirmwarePatcher::patch_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchReport {
    pub broadcast_offset: usize,
    pub length_offset: usize,
    pub mac_offset: usize,
}

/// Patches all device-specific regions of an image for one tracker.
#[derive(Debug, Clone, Default)]
pub struct FirmwarePatcher {
    templates: FirmwareTemplates,
}

impl FirmwarePatcher {
    pub fn new(templates: FirmwareTemplates) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &FirmwareTemplates {
        &self.templates
    }

    /// Locate every region before writing any of them, so a failure leaves
    /// the image untouched.
    pub fn patch_image(
        &self,
        firmware: &mut [u8],
        key: &AdvertisementKey,
    ) -> Result<PatchReport, PatchError> {
        let blob = build_blob_for_template(key, &self.templates.broadcast)?;
        let length = [blob.len() as u8];
        let mac = key.mac_address().to_le_bytes();

        let regions: [(&[u8], &[u8]); 3] = [
            (self.templates.broadcast.as_slice(), blob.as_slice()),
            (self.templates.broadcast_length.as_slice(), length.as_slice()),
            (self.templates.mac.as_slice(), mac.as_slice()),
        ];

        let mut offsets = [0usize; 3];
        for (slot, (template, replacement)) in offsets.iter_mut().zip(regions.iter()) {
            if replacement.len() > template.len() {
                return Err(PatchError::Size {
                    template: template.len(),
                    replacement: replacement.len(),
                });
            }
            *slot = find(firmware, template).ok_or(PatchError::NotFound)?;
        }

        for ((_, replacement), offset) in regions.iter().zip(offsets) {
            firmware[offset..offset + replacement.len()].copy_from_slice(replacement);
        }

        Ok(PatchReport {
            broadcast_offset: offsets[0],
            length_offset: offsets[1],
            mac_offset: offsets[2],
        })
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s.trim()).map_err(serde::de::Error::custom)
    }
}
