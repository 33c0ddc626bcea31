//! Per-document reader/writer locks.
//!
//! Every sanitized filename maps to one [`tokio::sync::RwLock`]. Writes to the
//! raw upload and to the persisted index take the write lock; reading the raw
//! file for indexing and loading the index for a query take the read lock.
//! Different documents never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

#[derive(Clone, Default)]
pub struct FileLocks {
    inner: Arc<Mutex<HashMap<String, Arc<RwLock<()>>>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, filename: &str) -> Arc<RwLock<()>> {
        // A poisoned map is still structurally valid.
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(filename.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    pub async fn read(&self, filename: &str) -> OwnedRwLockReadGuard<()> {
        self.lock_for(filename).read_owned().await
    }

    pub async fn write(&self, filename: &str) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(filename).write_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_readers_share() {
        let locks = FileLocks::new();
        let _a = locks.read("doc.pdf").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.read("doc.pdf")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_writer_excludes_reader() {
        let locks = FileLocks::new();
        let w = locks.write("doc.pdf").await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.read("doc.pdf")).await;
        assert!(blocked.is_err());
        drop(w);
        let r = tokio::time::timeout(Duration::from_millis(100), locks.read("doc.pdf")).await;
        assert!(r.is_ok());
    }

    #[tokio::test]
    async fn test_documents_are_independent() {
        let locks = FileLocks::new();
        let _w = locks.write("a.pdf").await;
        let other = tokio::time::timeout(Duration::from_millis(100), locks.write("b.pdf")).await;
        assert!(other.is_ok());
        assert_eq!(locks.inner.lock().unwrap().len(), 2);
    }
}
