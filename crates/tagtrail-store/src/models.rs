//! Domain model structs persisted in the server's SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// A tracker known to the server. The primary key is the base64 advertisement
/// key the report network is queried with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tracker {
    /// Base64 wire identifier of the tracker.
    pub advertisement_key: String,
    /// Last time reports were fetched for this tracker. `None` until the
    /// first fetch completes.
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// OwnerTracker
// ---------------------------------------------------------------------------

/// Link between an owner and a tracker. The private key never reaches the
/// server in the clear; the owner stores it encrypted here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerTracker {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub advertisement_key: String,
    /// Opaque, owner-encrypted key material and metadata.
    pub encrypted_private_data: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// A location report exactly as delivered by the report network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Report {
    /// Content-addressed id derived from the payload bytes.
    pub id: Uuid,
    pub advertisement_key: String,
    /// Time the report network published the report.
    pub time: DateTime<Utc>,
    /// Base64 ciphertext.
    pub payload: String,
}
