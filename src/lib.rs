//! Client-side synchronization layer for a university notice app: keeps the
//! user's bookmarked notices consistent between a local key/value cache and
//! the campus backend, and manages the device-local notification inbox.
//!
//! Both services follow the same lifecycle: hydrate from the cache so the UI
//! has data immediately, then (for bookmarks) refresh from the backend in the
//! background. Mutations are confirmed-first: the backend accepts a change
//! before local state and cache do, so the cache never claims a bookmark the
//! server would deny.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use notice_client::{
//!     BackendClient, BookmarkService, FileStore, NotificationInbox, StoredCredentials,
//! };
//!
//! # async fn wire() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FileStore::initialize().await?);
//! let api = Arc::new(BackendClient::new("https://notices.example.edu")?);
//! let credentials = Arc::new(StoredCredentials::new(store.clone()));
//!
//! let bookmarks = BookmarkService::new(store.clone(), api, credentials);
//! let inbox = NotificationInbox::new(store);
//! bookmarks.initialize().await;
//! inbox.initialize().await;
//!
//! if bookmarks.is_bookmarked("12345") {
//!     bookmarks.remove_bookmark("12345").await?;
//! }
//! # Ok(())
//! # }
//! ```

mod auth;
mod backend;
mod bookmarks;
mod domain;
mod notifications;
mod storage;

#[cfg(test)]
mod testutil;

pub use auth::{CredentialSource, StaticCredentials, StoredCredentials};
pub use backend::{ApiError, BackendClient, BookmarkApi, Page};
pub use bookmarks::{BookmarkError, BookmarkService};
pub use domain::{BookmarkRecord, Notice};
pub use notifications::NotificationInbox;
pub use storage::{
    AUTH_TOKEN_KEY, BOOKMARKED_NOTICES_KEY, BOOKMARK_ID_MAP_KEY, FileStore, KeyValueStore,
    MemoryStore, NOTIFICATION_NOTICES_KEY, StorageError,
};
