/// Application name
pub const APP_NAME: &str = "tagtrail";

/// P-224 scalar / field element size in bytes
pub const P224_SCALAR_SIZE: usize = 28;

/// SEC1 compressed P-224 point (format byte + x-coordinate)
pub const P224_COMPRESSED_POINT_SIZE: usize = 1 + P224_SCALAR_SIZE;

/// SEC1 uncompressed P-224 point, as carried in location reports
pub const P224_UNCOMPRESSED_POINT_SIZE: usize = 1 + 2 * P224_SCALAR_SIZE;

/// Advertisement key: the compressed point without its format byte
pub const ADVERTISEMENT_KEY_SIZE: usize = P224_SCALAR_SIZE;

/// BLE MAC address size in bytes
pub const MAC_ADDRESS_SIZE: usize = 6;

/// Two most significant bits set: static random (locally administered) address
pub const MAC_STATIC_RANDOM_BITS: u8 = 0b1100_0000;

/// Upper bound on keygen attempts before giving up on the entropy source.
/// About one attempt in four yields a hash without `/` or `+`.
pub const MAX_KEYGEN_ATTEMPTS: usize = 64;

/// AES-128 key size in bytes
pub const AES_KEY_SIZE: usize = 16;

/// AES-GCM IV size used by the offline-finding network (non-standard 16 bytes)
pub const AES_GCM_IV_SIZE: usize = 16;

/// AES-GCM tag size in bytes
pub const AES_GCM_TAG_SIZE: usize = 16;

/// Key material drawn from the X9.63 KDF: AES key followed by IV
pub const REPORT_KDF_OUTPUT_SIZE: usize = AES_KEY_SIZE + AES_GCM_IV_SIZE;

/// Encrypted location size in bytes (lat, lon, accuracy, reserved)
pub const LOCATION_SIZE: usize = 10;

/// Bytes before the variable section of a report: timestamp + confidence
pub const REPORT_HEADER_SIZE: usize = 4 + 1;

/// Smallest well-formed report payload
pub const MIN_REPORT_SIZE: usize =
    REPORT_HEADER_SIZE + P224_UNCOMPRESSED_POINT_SIZE + LOCATION_SIZE + AES_GCM_TAG_SIZE;

/// Latitude / longitude fixed-point scale
pub const COORDINATE_SCALE: f64 = 10_000_000.0;

/// Report timestamps count seconds from 2001-01-01T00:00:00Z
pub const REPORT_EPOCH_UNIX_SECS: i64 = 978_307_200;

/// Manufacturer-data advertisement preamble: AD length, AD type,
/// company id (LE), offline-finding type, payload length
pub const ADVERTISEMENT_PREAMBLE: [u8; 6] = [0x1E, 0xFF, 0x4C, 0x00, 0x12, 0x19];

/// Number of advertisement key bytes carried in the broadcast (key[6..28])
pub const ADVERTISEMENT_KEY_TAIL_SIZE: usize = ADVERTISEMENT_KEY_SIZE - MAC_ADDRESS_SIZE;

/// Full broadcast blob: preamble, status, key tail, key bits, hint
pub const ADVERTISEMENT_BLOB_SIZE: usize =
    ADVERTISEMENT_PREAMBLE.len() + 1 + ADVERTISEMENT_KEY_TAIL_SIZE + 1 + 1;
