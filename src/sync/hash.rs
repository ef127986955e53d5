//! Content hashing for local upserts.
//!
//! A SHA256 hash of the mapped payload is stored next to each local record.
//! An update whose payload hashes to the stored value is skipped, so
//! re-importing an unchanged remote record does not bump `modified_at` and
//! pull it into the next export window.

use sha2::{Digest, Sha256};

use crate::sync::types::{RecordMap, SyncResult};

/// Compute a SHA256 hash of a record.
///
/// Keys are serialized in sorted order, so two maps with the same entries
/// hash the same regardless of insertion order.
///
/// # Errors
///
/// Returns `SyncError::Json` if the record cannot be serialized.
pub fn content_hash(record: &RecordMap) -> SyncResult<String> {
    let sorted: std::collections::BTreeMap<&String, &serde_json::Value> = record.iter().collect();
    let json = serde_json::to_vec(&sorted)?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Check if a record has changed since it was last written.
///
/// Returns `true` when there is no stored hash or the hashes differ.
#[must_use]
pub fn has_changed(current_hash: &str, stored_hash: Option<&str>) -> bool {
    stored_hash.is_none_or(|h| h != current_hash)
}
