use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{BookmarkRecord, Notice, parse_timestamp};

const USER_AGENT_HEADER: &str = "notice-client/0.1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The slice of the campus backend this crate talks to. `BackendClient` is
/// the production implementation; tests substitute scripted doubles.
///
/// Every method takes the caller's bearer token explicitly: the backend
/// scopes bookmarks to the authenticated user, and there is no meaningful
/// anonymous variant of any of these calls.
#[async_trait]
pub trait BookmarkApi: Send + Sync {
    /// `POST /api/bookmarks` — saves a notice for the signed-in user and
    /// returns the server-side bookmark record.
    async fn create_bookmark(
        &self,
        notice_id: &str,
        token: &str,
    ) -> Result<BookmarkRecord, ApiError>;

    /// `DELETE /api/bookmarks/{bookmark_id}`.
    async fn delete_bookmark(&self, bookmark_id: i64, token: &str) -> Result<(), ApiError>;

    /// `GET /api/bookmarks` — the user's bookmark records.
    async fn bookmark_records(
        &self,
        page: u32,
        size: u32,
        token: &str,
    ) -> Result<Page<BookmarkRecord>, ApiError>;

    /// `GET /api/notices/bookmarked` — full notices for the user's bookmarks.
    async fn bookmarked_notices(
        &self,
        page: u32,
        size: u32,
        token: &str,
    ) -> Result<Page<Notice>, ApiError>;
}

/// One page of a paged listing, after envelope unwrapping and normalization.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_elements: u64,
}

/// HTTP client for the campus notice backend.
pub struct BackendClient {
    base_url: String,
    client: Client,
}

impl BackendClient {
    /// Builds a client against `base_url` (scheme and host, no trailing
    /// path) with the default request timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(USER_AGENT_HEADER)
            .timeout(timeout)
            .build()
            .map_err(ApiError::Http)?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { base_url, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl BookmarkApi for BackendClient {
    async fn create_bookmark(
        &self,
        notice_id: &str,
        token: &str,
    ) -> Result<BookmarkRecord, ApiError> {
        debug!(notice_id, "creating bookmark");
        let envelope: Envelope<RawBookmarkRecord> = self
            .client
            .post(self.url("/api/bookmarks"))
            .bearer_auth(token)
            .json(&CreateBookmarkPayload { notice_id })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(require_data(envelope)?.into())
    }

    async fn delete_bookmark(&self, bookmark_id: i64, token: &str) -> Result<(), ApiError> {
        debug!(bookmark_id, "deleting bookmark");
        let envelope: Envelope<serde_json::Value> = self
            .client
            .delete(self.url(&format!("/api/bookmarks/{bookmark_id}")))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !envelope.success {
            return Err(ApiError::Rejected {
                message: envelope.message,
            });
        }
        Ok(())
    }

    async fn bookmark_records(
        &self,
        page: u32,
        size: u32,
        token: &str,
    ) -> Result<Page<BookmarkRecord>, ApiError> {
        let envelope: Envelope<RawPage<RawBookmarkRecord>> = self
            .client
            .get(self.url("/api/bookmarks"))
            .query(&[("page", page), ("size", size)])
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let raw = require_data(envelope)?;
        Ok(Page {
            content: raw.content.into_iter().map(BookmarkRecord::from).collect(),
            total_elements: raw.total_elements,
        })
    }

    async fn bookmarked_notices(
        &self,
        page: u32,
        size: u32,
        token: &str,
    ) -> Result<Page<Notice>, ApiError> {
        let envelope: Envelope<RawPage<RawNotice>> = self
            .client
            .get(self.url("/api/notices/bookmarked"))
            .query(&[("page", page), ("size", size)])
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let raw = require_data(envelope)?;
        Ok(Page {
            content: raw.content.into_iter().map(Notice::from).collect(),
            total_elements: raw.total_elements,
        })
    }
}

fn require_data<T>(envelope: Envelope<T>) -> Result<T, ApiError> {
    if !envelope.success {
        return Err(ApiError::Rejected {
            message: envelope.message,
        });
    }
    envelope.data.ok_or_else(|| ApiError::Rejected {
        message: "backend reported success without data".to_owned(),
    })
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend rejected the request: {message}")]
    Rejected { message: String },
}

// Wire payloads -------------------------------------------------------------

/// Response envelope every backend endpoint wraps its payload in. The wire
/// form also carries a `timestamp` field the client has no use for.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
struct RawPage<T> {
    #[serde(default)]
    content: Vec<T>,
    #[serde(default)]
    total_elements: u64,
}

#[derive(Debug, Serialize)]
struct CreateBookmarkPayload<'a> {
    // The write endpoint still names the notice id "keyword" on the wire.
    #[serde(rename = "keyword")]
    notice_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBookmarkRecord {
    id: i64,
    #[serde(deserialize_with = "de_id")]
    notice_id: String,
    created_at: Option<String>,
}

impl From<RawBookmarkRecord> for BookmarkRecord {
    fn from(raw: RawBookmarkRecord) -> Self {
        BookmarkRecord {
            id: raw.id,
            notice_id: raw.notice_id,
            created_at: raw.created_at.as_deref().and_then(parse_timestamp),
        }
    }
}

/// A notice exactly as some backend revision serialized it. Older notice
/// sources still emit `date`, `hits` and `categoryName`/`categoryCode`;
/// `From<RawNotice>` collapses the variants into the canonical [`Notice`]
/// so the rest of the crate never sees them.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNotice {
    #[serde(deserialize_with = "de_id")]
    id: String,
    #[serde(default)]
    title: String,
    content: Option<String>,
    url: Option<String>,
    category: Option<String>,
    category_name: Option<String>,
    category_code: Option<String>,
    detail_category: Option<String>,
    author: Option<String>,
    published_at: Option<String>,
    date: Option<String>,
    #[serde(default, deserialize_with = "de_opt_count")]
    view_count: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_count")]
    hits: Option<u64>,
    #[serde(default)]
    is_important: bool,
    attachments: Option<String>,
    source: Option<String>,
}

impl From<RawNotice> for Notice {
    fn from(raw: RawNotice) -> Self {
        let published_at = raw
            .published_at
            .as_deref()
            .or(raw.date.as_deref())
            .and_then(parse_timestamp);
        Notice {
            id: raw.id,
            title: raw.title,
            content: raw.content,
            url: raw.url,
            category: raw.category.or(raw.category_name).or(raw.category_code),
            detail_category: raw.detail_category,
            author: raw.author,
            published_at,
            view_count: raw.view_count.or(raw.hits),
            is_important: raw.is_important,
            attachments: raw.attachments,
            source: raw.source,
        }
    }
}

/// Ids arrive as JSON numbers from the current backend and as strings from
/// the older one.
fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

/// View counters are numbers on the current wire, but scraped sources have
/// shipped them as strings (sometimes with thousands separators). Anything
/// unparseable becomes `None` rather than an error.
fn de_opt_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(number)) => Some(number),
        Some(Raw::Text(text)) => text.trim().replace(',', "").parse().ok(),
        None => None,
    })
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
