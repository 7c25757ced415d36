//! Scripted doubles shared by the service tests.

use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::backend::{ApiError, BookmarkApi, Page};
use crate::domain::{BookmarkRecord, Notice};
use crate::storage::{KeyValueStore, StorageError};

pub(crate) fn notice(id: &str, title: &str) -> Notice {
    Notice {
        id: id.to_owned(),
        title: title.to_owned(),
        ..Notice::default()
    }
}

/// Store whose every operation fails, for exercising degraded-cache paths.
pub(crate) struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Io(io::Error::other("injected failure")))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Io(io::Error::other("injected failure")))
    }

    async fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Io(io::Error::other("injected failure")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ApiCall {
    Create(String),
    Delete(i64),
    Records,
    Notices,
}

/// Pauses a backend call so a test can interleave other work with it: the
/// double signals `entered` once the call is underway, then waits for
/// `release`.
#[derive(Clone)]
pub(crate) struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }
}

#[derive(Clone)]
pub(crate) struct Listing {
    pub records: Vec<BookmarkRecord>,
    pub notices: Vec<Notice>,
}

/// Backend double that records every call and replays scripted results.
pub(crate) struct RecordingApi {
    pub create_result: Mutex<Result<i64, String>>,
    pub delete_result: Mutex<Result<(), String>>,
    pub listing: Mutex<Result<Listing, String>>,
    pub calls: Mutex<Vec<ApiCall>>,
    pub records_gate: Mutex<Option<Gate>>,
    pub delete_gate: Mutex<Option<Gate>>,
}

impl Default for RecordingApi {
    fn default() -> Self {
        Self {
            create_result: Mutex::new(Ok(1)),
            delete_result: Mutex::new(Ok(())),
            listing: Mutex::new(Ok(Listing {
                records: Vec::new(),
                notices: Vec::new(),
            })),
            calls: Mutex::new(Vec::new()),
            records_gate: Mutex::new(None),
            delete_gate: Mutex::new(None),
        }
    }
}

impl RecordingApi {
    pub fn with_create_id(bookmark_id: i64) -> Self {
        let api = Self::default();
        *api.create_result.lock().unwrap() = Ok(bookmark_id);
        api
    }

    pub fn failing_create(message: &str) -> Self {
        let api = Self::default();
        *api.create_result.lock().unwrap() = Err(message.to_owned());
        api
    }

    pub fn failing_delete(message: &str) -> Self {
        let api = Self::default();
        *api.delete_result.lock().unwrap() = Err(message.to_owned());
        api
    }

    pub fn with_listing(records: Vec<BookmarkRecord>, notices: Vec<Notice>) -> Self {
        let api = Self::default();
        *api.listing.lock().unwrap() = Ok(Listing { records, notices });
        api
    }

    pub fn failing_listing(message: &str) -> Self {
        let api = Self::default();
        *api.listing.lock().unwrap() = Err(message.to_owned());
        api
    }

    pub fn install_gate(&self) -> Gate {
        let gate = Gate::new();
        *self.records_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn install_delete_gate(&self) -> Gate {
        let gate = Gate::new();
        *self.delete_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    fn push_call(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn scripted_listing(&self) -> Result<Listing, ApiError> {
        self.listing
            .lock()
            .unwrap()
            .clone()
            .map_err(|message| ApiError::Rejected { message })
    }
}

pub(crate) fn record(id: i64, notice_id: &str) -> BookmarkRecord {
    BookmarkRecord {
        id,
        notice_id: notice_id.to_owned(),
        created_at: None,
    }
}

#[async_trait]
impl BookmarkApi for RecordingApi {
    async fn create_bookmark(
        &self,
        notice_id: &str,
        _token: &str,
    ) -> Result<BookmarkRecord, ApiError> {
        self.push_call(ApiCall::Create(notice_id.to_owned()));
        match self.create_result.lock().unwrap().clone() {
            Ok(bookmark_id) => Ok(record(bookmark_id, notice_id)),
            Err(message) => Err(ApiError::Rejected { message }),
        }
    }

    async fn delete_bookmark(&self, bookmark_id: i64, _token: &str) -> Result<(), ApiError> {
        self.push_call(ApiCall::Delete(bookmark_id));
        let gate = self.delete_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.delete_result
            .lock()
            .unwrap()
            .clone()
            .map_err(|message| ApiError::Rejected { message })
    }

    async fn bookmark_records(
        &self,
        _page: u32,
        _size: u32,
        _token: &str,
    ) -> Result<Page<BookmarkRecord>, ApiError> {
        self.push_call(ApiCall::Records);
        let gate = self.records_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        let listing = self.scripted_listing()?;
        Ok(Page {
            total_elements: listing.records.len() as u64,
            content: listing.records,
        })
    }

    async fn bookmarked_notices(
        &self,
        _page: u32,
        _size: u32,
        _token: &str,
    ) -> Result<Page<Notice>, ApiError> {
        self.push_call(ApiCall::Notices);
        let listing = self.scripted_listing()?;
        Ok(Page {
            total_elements: listing.notices.len() as u64,
            content: listing.notices,
        })
    }
}
