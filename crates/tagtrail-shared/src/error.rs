use thiserror::Error;

#[derive(Error, Debug)]
pub enum TagtrailError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Firmware patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid base64: {0}")]
    Base64(String),

    #[error("Read of {len} bytes at offset {offset} exceeds buffer of {available} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },

    #[error("Expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid private key bytes")]
    InvalidPrivateKey,

    #[error("Invalid advertisement key")]
    InvalidAdvertisementKey,

    #[error("Invalid MAC address: {0}")]
    InvalidMacAddress(String),

    #[error("Key generation gave up after {0} attempts")]
    GenerationExhausted(usize),

    #[error("Key encoding error: {0}")]
    Encoding(#[from] CodecError),
}

/// Firmware patching errors. None of these leave the image modified.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PatchError {
    #[error("Replacement ({replacement} bytes) is longer than template ({template} bytes)")]
    Size { template: usize, replacement: usize },

    #[error("Template sequence not found in firmware image")]
    NotFound,

    #[error("Broadcast blob is {actual} bytes, template expects {expected}")]
    BlobLength { expected: usize, actual: usize },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReportError {
    #[error("Malformed report: {0}")]
    Format(String),

    #[error("Report authentication failed: wrong key or corrupted data")]
    Authentication,

    #[error("Report encryption failed")]
    EncryptionFailed,
}

impl From<CodecError> for ReportError {
    fn from(e: CodecError) -> Self {
        ReportError::Format(e.to_string())
    }
}
