use crate::index::VectorIndex;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Everything the service knows about one uploaded document.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Opaque identifier returned to the client.
    pub session_id: String,
    /// Registration time, used for expiry.
    pub created_at: OffsetDateTime,
    /// Stored upload.
    pub upload_path: PathBuf,
    /// Persisted index directory.
    pub index_dir: PathBuf,
    /// Index held in memory for chat requests.
    pub index: Arc<VectorIndex>,
}

impl SessionEntry {
    /// Whether the entry is strictly older than `ttl` at `now`.
    pub fn is_expired(&self, now: OffsetDateTime, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}

/// Registry of live sessions shared by request handlers and the sweeper.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a session.
    async fn get(&self, session_id: &str) -> Option<SessionEntry>;

    /// Register (or replace) a session.
    async fn put(&self, entry: SessionEntry);

    /// Remove a session, returning it if it was present.
    async fn delete(&self, session_id: &str) -> Option<SessionEntry>;

    /// Snapshot of entries older than `ttl` at `now`.
    async fn list_expired(&self, now: OffsetDateTime, ttl: Duration) -> Vec<SessionEntry>;

    /// Number of registered sessions.
    async fn len(&self) -> usize;
}

/// Process-local store; contents do not survive a restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<String, SessionEntry>>,
}

impl InMemorySessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Option<SessionEntry> {
        self.entries.read().await.get(session_id).cloned()
    }

    async fn put(&self, entry: SessionEntry) {
        self.entries
            .write()
            .await
            .insert(entry.session_id.clone(), entry);
    }

    async fn delete(&self, session_id: &str) -> Option<SessionEntry> {
        self.entries.write().await.remove(session_id)
    }

    async fn list_expired(&self, now: OffsetDateTime, ttl: Duration) -> Vec<SessionEntry> {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.is_expired(now, ttl))
            .cloned()
            .collect()
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::processing::Chunk;

    pub(crate) fn entry(session_id: &str, created_at: OffsetDateTime, root: &std::path::Path) -> SessionEntry {
        let index = VectorIndex::build(
            "hash-2",
            vec![Chunk::new("text", "doc.pdf", Some(1))],
            vec![vec![1.0, 0.0]],
        )
        .expect("index");
        SessionEntry {
            session_id: session_id.to_string(),
            created_at,
            upload_path: root.join(format!("uploads/{session_id}.pdf")),
            index_dir: root.join(format!("faiss_indexes/{session_id}")),
            index: Arc::new(index),
        }
    }

    #[test]
    fn expiry_is_strictly_greater_than_ttl() {
        let now = OffsetDateTime::now_utc();
        let ttl = Duration::from_secs(3600);
        let root = std::path::Path::new("/tmp");

        assert!(!entry("a", now - ttl, root).is_expired(now, ttl));
        assert!(entry("b", now - ttl - Duration::from_secs(1), root).is_expired(now, ttl));
        assert!(!entry("c", now, root).is_expired(now, ttl));
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let store = InMemorySessionStore::new();
        let now = OffsetDateTime::now_utc();
        store.put(entry("s1", now, std::path::Path::new("/tmp"))).await;

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("s1").await.map(|e| e.session_id), Some("s1".into()));
        assert!(store.get("missing").await.is_none());
        assert!(store.delete("s1").await.is_some());
        assert!(store.delete("s1").await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn list_expired_returns_only_stale_entries() {
        let store = InMemorySessionStore::new();
        let now = OffsetDateTime::now_utc();
        let root = std::path::Path::new("/tmp");
        store.put(entry("fresh", now, root)).await;
        store
            .put(entry("stale", now - Duration::from_secs(7200), root))
            .await;

        let expired = store.list_expired(now, Duration::from_secs(3600)).await;
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].session_id, "stale");
    }

    #[tokio::test]
    async fn concurrent_registration_keeps_every_entry() {
        let store = Arc::new(InMemorySessionStore::new());
        let now = OffsetDateTime::now_utc();
        let mut tasks = Vec::new();
        for idx in 0..32 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .put(entry(&format!("s{idx}"), now, std::path::Path::new("/tmp")))
                    .await;
            }));
        }
        for task in tasks {
            task.await.expect("task");
        }
        assert_eq!(store.len().await, 32);
    }
}
