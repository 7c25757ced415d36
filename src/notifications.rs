use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::domain::Notice;
use crate::storage::{KeyValueStore, NOTIFICATION_NOTICES_KEY, read_json, write_json};

/// Device-local inbox of notices the user was alerted about (keyword hits,
/// urgent notices). Unlike bookmarks there is no server-side copy: the inbox
/// lives entirely in local storage, so every operation succeeds from the
/// caller's point of view and storage trouble only costs durability.
///
/// Clones share one state.
#[derive(Clone)]
pub struct NotificationInbox {
    store: Arc<dyn KeyValueStore>,
    state: Arc<Mutex<InboxState>>,
}

#[derive(Default)]
struct InboxState {
    notices: Vec<Notice>,
    alert_visible: bool,
}

impl NotificationInbox {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(InboxState::default())),
        }
    }

    /// Loads the persisted inbox. A missing or unreadable cache yields an
    /// empty inbox.
    pub async fn initialize(&self) {
        let notices: Vec<Notice> = read_json(self.store.as_ref(), NOTIFICATION_NOTICES_KEY)
            .await
            .unwrap_or_default();
        debug!(count = notices.len(), "notification inbox hydrated");
        self.lock_state().notices = notices;
    }

    /// Prepends a notice so the newest alert is always first. Re-adding an
    /// id that is already present leaves the inbox untouched.
    pub async fn add(&self, notice: Notice) {
        let snapshot = {
            let mut state = self.lock_state();
            if state.notices.iter().any(|existing| existing.id == notice.id) {
                return;
            }
            state.notices.insert(0, notice);
            state.notices.clone()
        };
        self.persist(&snapshot).await;
    }

    pub async fn remove(&self, notice_id: &str) {
        let snapshot = {
            let mut state = self.lock_state();
            let before = state.notices.len();
            state.notices.retain(|notice| notice.id != notice_id);
            if state.notices.len() == before {
                return;
            }
            state.notices.clone()
        };
        self.persist(&snapshot).await;
    }

    /// Empties the inbox and writes the empty list through, so the cleared
    /// state survives a restart.
    pub async fn clear_all(&self) {
        self.lock_state().notices.clear();
        self.persist(&[]).await;
    }

    pub fn is_present(&self, notice_id: &str) -> bool {
        self.lock_state()
            .notices
            .iter()
            .any(|notice| notice.id == notice_id)
    }

    /// Inbox contents, newest first.
    pub fn notices(&self) -> Vec<Notice> {
        self.lock_state().notices.clone()
    }

    /// Number of alerts in the inbox; what the UI renders as the badge.
    pub fn len(&self) -> usize {
        self.lock_state().notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_state().notices.is_empty()
    }

    /// Flips the in-app alert panel flag. Pure UI state: intentionally not
    /// persisted, so every session starts with the panel closed.
    pub fn toggle_alert_visibility(&self) {
        let mut state = self.lock_state();
        state.alert_visible = !state.alert_visible;
    }

    pub fn is_alert_visible(&self) -> bool {
        self.lock_state().alert_visible
    }

    async fn persist(&self, notices: &[Notice]) {
        if let Err(err) = write_json(self.store.as_ref(), NOTIFICATION_NOTICES_KEY, notices).await {
            warn!("failed to persist notification inbox: {err}");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
