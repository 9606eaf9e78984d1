//! Per-user sessions and the session table.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::state::ConversationState;

/// Handle to one persisted upload in scratch storage.
///
/// Owned by the session until assembly; the assembler's scratch guard takes
/// over deletion of the blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub id: Uuid,
    pub path: PathBuf,
}

/// Mutable per-user collection state.
#[derive(Debug)]
pub struct Session {
    /// Current position in the stage sequence. Always a valid index.
    pub stage_index: usize,
    /// Conversation state for this chat.
    pub state: ConversationState,
    /// Uploads keyed by stage index; insertion order is upload order.
    /// BTreeMap keeps the stage ordering for the final flatten.
    pub uploads: BTreeMap<usize, Vec<StoredUpload>>,
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// A fresh session at stage 0.
    pub fn new() -> Self {
        Self {
            stage_index: 0,
            state: ConversationState::ChoosingAction,
            uploads: BTreeMap::new(),
            started_at: Utc::now(),
        }
    }

    /// Append an upload to the current stage's bucket, creating it if absent.
    ///
    /// Re-entering a stage via Previous appends to the existing bucket.
    pub fn push_upload(&mut self, upload: StoredUpload) {
        self.uploads
            .entry(self.stage_index)
            .or_default()
            .push(upload);
    }

    /// Running total of uploads across all stages.
    pub fn total_uploads(&self) -> usize {
        self.uploads.values().map(Vec::len).sum()
    }

    /// Drain all uploads as one flat sequence: ascending stage index, upload
    /// order within a stage. Called exactly once, at finish.
    pub fn take_uploads(&mut self) -> Vec<StoredUpload> {
        std::mem::take(&mut self.uploads)
            .into_values()
            .flatten()
            .collect()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Explicit session table keyed by chat id.
///
/// All mutable state is isolated per chat; the only shared data is the
/// read-only stage list. One event is handled to completion at a time, so
/// the lock is never contended within a session.
pub struct SessionStore {
    inner: RwLock<HashMap<i64, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Create a fresh session for the chat, overwriting any existing one.
    /// Returns the replaced session so its uploads can be purged.
    pub async fn begin(&self, chat_id: i64) -> Option<Session> {
        self.inner.write().await.insert(chat_id, Session::new())
    }

    /// Remove and return the chat's session, if any.
    pub async fn remove(&self, chat_id: i64) -> Option<Session> {
        self.inner.write().await.remove(&chat_id)
    }

    /// Conversation state for the chat; `Idle` when no session exists.
    pub async fn state(&self, chat_id: i64) -> ConversationState {
        self.inner
            .read()
            .await
            .get(&chat_id)
            .map(|s| s.state)
            .unwrap_or(ConversationState::Idle)
    }

    /// Run a closure against the chat's session, if one exists.
    pub async fn with_session<R>(
        &self,
        chat_id: i64,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        self.inner.write().await.get_mut(&chat_id).map(f)
    }

    /// Write access to the whole table, for callers that must hold the
    /// session across an await point (the upload path).
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, HashMap<i64, Session>> {
        self.inner.write().await
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
