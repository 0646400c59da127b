use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing upload, chat, and sweep activity.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
    sessions_purged: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an indexed upload and the number of chunks it produced.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a successfully answered question.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record sessions removed by the sweeper.
    pub fn record_purged(&self, sessions: u64) {
        self.sessions_purged.fetch_add(sessions, Ordering::Relaxed);
    }

    /// Return a snapshot of the counters; `active_sessions` comes from the session store.
    pub fn snapshot(&self, active_sessions: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            sessions_purged: self.sessions_purged.load(Ordering::Relaxed),
            active_sessions,
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    /// Uploads indexed since startup.
    pub documents_indexed: u64,
    /// Total chunks produced across all uploads.
    pub chunks_indexed: u64,
    /// Questions answered since startup.
    pub questions_answered: u64,
    /// Sessions removed by expiry sweeps.
    pub sessions_purged: u64,
    /// Sessions currently registered.
    pub active_sessions: usize,
}
