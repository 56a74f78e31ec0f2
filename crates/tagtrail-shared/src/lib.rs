//! # tagtrail-shared
//!
//! Protocol layer shared by the server, the store and the CLI: tracker key
//! material, firmware patching, offline-finding report decryption and the
//! content-addressed report identifiers.

pub mod codec;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod firmware;
pub mod keys;
pub mod report;
pub mod report_id;
pub mod types;

pub use error::TagtrailError;
pub use keys::KeyPair;
pub use report::{decrypt_report, DecryptedFix};
pub use report_id::report_id;
pub use types::{AdvertisementKey, MacAddress};
