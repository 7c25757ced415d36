use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::CredentialSource;
use crate::backend::{ApiError, BookmarkApi};
use crate::domain::Notice;
use crate::storage::{
    BOOKMARKED_NOTICES_KEY, BOOKMARK_ID_MAP_KEY, KeyValueStore, read_json, write_json,
};

const SYNC_PAGE_SIZE: u32 = 100;

/// Keeps the user's saved notices consistent across the local cache and the
/// backend.
///
/// Writes are confirmed-first: a bookmark appears (or disappears) locally
/// only after the backend has accepted the change, so the cache never claims
/// state the server would contradict. Reads go the other way round: cached
/// state is served immediately and a background synchronization replaces it
/// once the backend answers.
///
/// The service is a cheap handle; clones share one state.
#[derive(Clone)]
pub struct BookmarkService {
    store: Arc<dyn KeyValueStore>,
    api: Arc<dyn BookmarkApi>,
    credentials: Arc<dyn CredentialSource>,
    state: Arc<Mutex<BookmarkState>>,
}

#[derive(Default)]
struct BookmarkState {
    notices: Vec<Notice>,
    id_map: HashMap<String, i64>,
    inflight: HashSet<String>,
    revision: u64,
    last_synced_at: Option<DateTime<Utc>>,
}

impl BookmarkState {
    fn contains(&self, notice_id: &str) -> bool {
        self.notices.iter().any(|notice| notice.id == notice_id)
    }

    fn snapshot(&self) -> (Vec<Notice>, HashMap<String, i64>) {
        (self.notices.clone(), self.id_map.clone())
    }
}

impl BookmarkService {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn BookmarkApi>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            store,
            api,
            credentials,
            state: Arc::new(Mutex::new(BookmarkState::default())),
        }
    }

    /// Loads the cached bookmark state and kicks off a background refresh.
    /// Call once at startup, from within a Tokio runtime; the service is
    /// usable as soon as this returns, and the refresh replaces the snapshot
    /// whenever it lands.
    pub async fn initialize(&self) {
        let notices: Vec<Notice> = read_json(self.store.as_ref(), BOOKMARKED_NOTICES_KEY)
            .await
            .unwrap_or_default();
        let mut id_map: HashMap<String, i64> = read_json(self.store.as_ref(), BOOKMARK_ID_MAP_KEY)
            .await
            .unwrap_or_default();
        // Mappings without a cached notice are dropped; the next
        // synchronization rebuilds them.
        id_map.retain(|notice_id, _| notices.iter().any(|notice| &notice.id == notice_id));

        {
            let mut state = self.lock_state();
            state.notices = notices;
            state.id_map = id_map;
            state.revision += 1;
        }
        debug!("bookmark cache hydrated");

        let service = self.clone();
        tokio::spawn(async move {
            service.synchronize().await;
        });
    }

    /// Fetches the authoritative bookmark state and replaces the local
    /// snapshot with it. Never fails: without a credential it does nothing,
    /// and on a remote error the cached snapshot stays in place. A result
    /// that raced with a local mutation is discarded wholesale; the next
    /// refresh starts from the mutated state.
    pub async fn synchronize(&self) {
        let Some(token) = self.credentials.bearer_token().await else {
            debug!("skipping bookmark sync: not signed in");
            return;
        };
        let started_at = self.lock_state().revision;

        let records = match self.api.bookmark_records(0, SYNC_PAGE_SIZE, &token).await {
            Ok(page) => page.content,
            Err(err) => {
                warn!("bookmark record fetch failed: {err}");
                return;
            }
        };
        let listed = match self.api.bookmarked_notices(0, SYNC_PAGE_SIZE, &token).await {
            Ok(page) => page.content,
            Err(err) => {
                warn!("bookmarked notice fetch failed: {err}");
                return;
            }
        };

        // Keep the intersection of the two listings so the notice list and
        // the id map always describe the same set.
        let mut id_map: HashMap<String, i64> = records
            .into_iter()
            .map(|record| (record.notice_id, record.id))
            .collect();
        let notices: Vec<Notice> = listed
            .into_iter()
            .filter(|notice| id_map.contains_key(&notice.id))
            .collect();
        id_map.retain(|notice_id, _| notices.iter().any(|notice| &notice.id == notice_id));

        let snapshot = {
            let mut state = self.lock_state();
            if state.revision != started_at {
                debug!("discarding bookmark sync result: state changed while fetching");
                return;
            }
            state.notices = notices;
            state.id_map = id_map;
            state.revision += 1;
            state.last_synced_at = Some(Utc::now());
            state.snapshot()
        };
        debug!(count = snapshot.0.len(), "bookmark list synchronized");
        self.persist(&snapshot.0, &snapshot.1).await;
    }

    pub fn is_bookmarked(&self, notice_id: &str) -> bool {
        self.lock_state().contains(notice_id)
    }

    /// Current snapshot of the saved notices, oldest first; freshly added
    /// bookmarks go to the end until a synchronization imposes server order.
    pub fn bookmarked_notices(&self) -> Vec<Notice> {
        self.lock_state().notices.clone()
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.lock_state().last_synced_at
    }

    /// Bookmarks a notice. The backend write happens first; local state and
    /// cache are only touched once the backend has confirmed.
    pub async fn add_bookmark(&self, notice: Notice) -> Result<(), BookmarkError> {
        let Some(_guard) = self.begin_mutation(&notice.id) else {
            return Ok(());
        };
        if self.is_bookmarked(&notice.id) {
            return Ok(());
        }
        let token = self.require_token().await?;
        let record = self.api.create_bookmark(&notice.id, &token).await?;

        let snapshot = {
            let mut state = self.lock_state();
            state.id_map.insert(notice.id.clone(), record.id);
            if !state.contains(&notice.id) {
                state.notices.push(notice);
            }
            state.revision += 1;
            state.snapshot()
        };
        self.persist(&snapshot.0, &snapshot.1).await;
        Ok(())
    }

    /// Removes a bookmark. Without a server-side mapping for the id the
    /// removal degrades to local-only; the next synchronization settles any
    /// disagreement with the backend.
    pub async fn remove_bookmark(&self, notice_id: &str) -> Result<(), BookmarkError> {
        let Some(_guard) = self.begin_mutation(notice_id) else {
            return Ok(());
        };
        let token = self.require_token().await?;

        let mapped = self.lock_state().id_map.get(notice_id).copied();
        if let Some(bookmark_id) = mapped {
            self.api.delete_bookmark(bookmark_id, &token).await?;
        }

        let (changed, snapshot) = {
            let mut state = self.lock_state();
            let before = state.notices.len() + state.id_map.len();
            state.notices.retain(|notice| notice.id != notice_id);
            state.id_map.remove(notice_id);
            let changed = state.notices.len() + state.id_map.len() != before;
            if changed {
                state.revision += 1;
            }
            (changed, state.snapshot())
        };
        if changed {
            self.persist(&snapshot.0, &snapshot.1).await;
        }
        Ok(())
    }

    /// Adds the notice when it is not bookmarked, removes it when it is.
    /// A second toggle for the same notice while one is still in flight is
    /// a no-op.
    pub async fn toggle_bookmark(&self, notice: Notice) -> Result<(), BookmarkError> {
        if self.is_bookmarked(&notice.id) {
            self.remove_bookmark(&notice.id).await
        } else {
            self.add_bookmark(notice).await
        }
    }

    async fn require_token(&self) -> Result<String, BookmarkError> {
        self.credentials
            .bearer_token()
            .await
            .ok_or(BookmarkError::AuthRequired)
    }

    /// Claims the per-notice mutation slot; `None` while another mutation
    /// for the same notice is still in flight. The slot is released when the
    /// returned guard drops, including on error paths.
    fn begin_mutation(&self, notice_id: &str) -> Option<InflightGuard> {
        let mut state = self.lock_state();
        if !state.inflight.insert(notice_id.to_owned()) {
            return None;
        }
        drop(state);
        Some(InflightGuard {
            state: Arc::clone(&self.state),
            notice_id: notice_id.to_owned(),
        })
    }

    /// Cache writes are best-effort: the backend already holds the truth,
    /// so a failed write is logged and the in-memory state stands.
    async fn persist(&self, notices: &[Notice], id_map: &HashMap<String, i64>) {
        if let Err(err) = write_json(self.store.as_ref(), BOOKMARKED_NOTICES_KEY, notices).await {
            warn!("failed to persist bookmarked notices: {err}");
        }
        if let Err(err) = write_json(self.store.as_ref(), BOOKMARK_ID_MAP_KEY, id_map).await {
            warn!("failed to persist bookmark id map: {err}");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BookmarkState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }
}

struct InflightGuard {
    state: Arc<Mutex<BookmarkState>>,
    notice_id: String,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());
        state.inflight.remove(&self.notice_id);
    }
}

#[derive(Error, Debug)]
pub enum BookmarkError {
    #[error("a signed-in session is required to change bookmarks")]
    AuthRequired,
    #[error(transparent)]
    Remote(#[from] ApiError),
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
