use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// Domain data structures shared across modules.

/// One university announcement as the client understands it.
///
/// This is the canonical shape: the backend has gone through several field
/// renames over time (`date` vs `publishedAt`, `hits` vs `viewCount`,
/// `categoryCode` vs `category`), and all of that variance is normalized
/// away in `backend.rs` before a notice reaches the rest of the crate.
/// Cached copies are serialized from this struct, so the storage format is
/// stable regardless of what the wire looked like.
///
/// Identity is `id` alone; two notices with the same id are the same
/// announcement even when their mutable fields (e.g. `view_count`) differ.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub url: Option<String>,
    pub category: Option<String>,
    pub detail_category: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub view_count: Option<u64>,
    #[serde(default)]
    pub is_important: bool,
    pub attachments: Option<String>,
    pub source: Option<String>,
}

/// Server-side record of "the signed-in user saved this notice".
///
/// `id` is assigned by the backend and addresses the bookmark for deletion;
/// it is unrelated to the notice id the UI works with.
#[derive(Debug, Clone, PartialEq)]
pub struct BookmarkRecord {
    pub id: i64,
    pub notice_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Parse the timestamp formats the backend has emitted over its lifetime:
/// RFC 3339, zone-less `LocalDateTime` output (taken as UTC), and bare dates.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|midnight| midnight.and_utc());
    }
    None
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
