//! Upload collector — persists incoming files to scratch storage.

use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use crate::error::StorageError;

use super::session::{Session, StoredUpload};

/// Persists uploads under unique names in a scratch directory and records
/// them in the session.
pub struct UploadCollector {
    scratch_dir: PathBuf,
}

impl UploadCollector {
    pub fn new(scratch_dir: PathBuf) -> Self {
        Self { scratch_dir }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Persist one incoming file and append it to the current stage's bucket.
    ///
    /// Returns the running total of uploads across all stages. The reference
    /// is recorded only after the write succeeds, so an I/O failure leaves
    /// the session untouched and the user can simply retry.
    pub async fn accept(
        &self,
        session: &mut Session,
        bytes: &[u8],
    ) -> Result<usize, StorageError> {
        let stored = self.persist(bytes).await?;
        tracing::debug!(
            id = %stored.id,
            stage = session.stage_index,
            size = bytes.len(),
            "upload persisted"
        );
        session.push_upload(stored);
        Ok(session.total_uploads())
    }

    /// Write the blob to scratch storage under a fresh unique id.
    /// Creates the scratch directory on first use.
    async fn persist(&self, bytes: &[u8]) -> Result<StoredUpload, StorageError> {
        fs::create_dir_all(&self.scratch_dir).await?;
        let id = Uuid::new_v4();
        let path = self.scratch_dir.join(id.to_string());
        fs::write(&path, bytes).await?;
        Ok(StoredUpload { id, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accept_persists_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let collector = UploadCollector::new(dir.path().join("scratch"));
        let mut session = Session::new();

        let total = collector.accept(&mut session, b"first").await.unwrap();
        assert_eq!(total, 1);

        session.stage_index = 2;
        let total = collector.accept(&mut session, b"second").await.unwrap();
        assert_eq!(total, 2);

        let flat = session.take_uploads();
        assert_eq!(flat.len(), 2);
        assert_eq!(std::fs::read(&flat[0].path).unwrap(), b"first");
        assert_eq!(std::fs::read(&flat[1].path).unwrap(), b"second");
    }

    #[tokio::test]
    async fn accept_creates_scratch_dir_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("nested").join("scratch");
        let collector = UploadCollector::new(scratch.clone());
        assert!(!scratch.exists());

        let mut session = Session::new();
        collector.accept(&mut session, b"data").await.unwrap();
        assert!(scratch.exists());
    }

    #[tokio::test]
    async fn failed_persist_leaves_session_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let collector = UploadCollector::new(dir.path().join("scratch"));
        let mut session = Session::new();
        collector.accept(&mut session, b"ok").await.unwrap();

        // Point the collector at a path that cannot be a directory
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, b"not a dir").unwrap();
        let failing = UploadCollector::new(blocked.join("scratch"));

        let result = failing.accept(&mut session, b"doomed").await;
        assert!(result.is_err());
        assert_eq!(
            session.total_uploads(),
            1,
            "failed upload must not be recorded"
        );
    }

    #[tokio::test]
    async fn stored_ids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let collector = UploadCollector::new(dir.path().to_path_buf());
        let mut session = Session::new();
        for _ in 0..5 {
            collector.accept(&mut session, b"x").await.unwrap();
        }
        let flat = session.take_uploads();
        let mut ids: Vec<_> = flat.iter().map(|u| u.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }
}
