//! Short-TTL cache for composite score reads
//!
//! A read-through fill must not resurrect a value that was invalidated while
//! the store read was in flight. Callers take a [`FillTicket`] before reading
//! the store and hand it back with the record; any invalidation in between
//! makes the fill a no-op.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::models::CompositeRecord;

/// Invalidation epoch observed before a store read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket(u64);

struct CacheState {
    entries: HashMap<i64, (Instant, CompositeRecord)>,
    /// Bumped by every invalidation
    epoch: u64,
}

/// Composite reads cached per document for `ttl`
pub struct ScoreCache {
    state: Mutex<CacheState>,
    ttl: Duration,
}

impl ScoreCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                epoch: 0,
            }),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fresh cached record, if any; an expired entry is dropped on access
    pub fn get(&self, document_id: i64) -> Option<CompositeRecord> {
        let mut state = self.lock();
        match state.entries.get(&document_id) {
            Some((stored_at, record)) if stored_at.elapsed() <= self.ttl => Some(record.clone()),
            Some(_) => {
                state.entries.remove(&document_id);
                None
            }
            None => None,
        }
    }

    /// Take before reading the store for a later [`ScoreCache::fill`]
    pub fn ticket(&self) -> FillTicket {
        FillTicket(self.lock().epoch)
    }

    /// Cache `record` unless an invalidation happened since `ticket` was taken
    ///
    /// Returns whether the record was stored. Expired entries are purged.
    pub fn fill(&self, ticket: FillTicket, record: CompositeRecord) -> bool {
        let mut state = self.lock();
        if state.epoch != ticket.0 {
            tracing::debug!(
                doc_id = record.document_id,
                "Composite cache fill skipped, invalidated during read"
            );
            return false;
        }
        let ttl = self.ttl;
        state.entries.retain(|_, (stored_at, _)| stored_at.elapsed() <= ttl);
        state
            .entries
            .insert(record.document_id, (Instant::now(), record));
        true
    }

    pub fn invalidate(&self, document_id: i64) {
        let mut state = self.lock();
        state.epoch = state.epoch.wrapping_add(1);
        if state.entries.remove(&document_id).is_some() {
            tracing::debug!(doc_id = document_id, "Composite cache entry invalidated");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoreSource;

    fn record(document_id: i64) -> CompositeRecord {
        CompositeRecord {
            document_id,
            score: 0.1,
            confidence: 0.9,
            source: ScoreSource::Llm,
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_fill_get_invalidate() {
        let cache = ScoreCache::new(Duration::from_secs(30));
        assert!(cache.fill(cache.ticket(), record(1)));
        assert_eq!(cache.get(1).unwrap().document_id, 1);

        cache.invalidate(1);
        assert!(cache.get(1).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = ScoreCache::new(Duration::ZERO);
        cache.fill(cache.ticket(), record(2));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(2).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_fill_purges_expired_entries_of_other_documents() {
        let cache = ScoreCache::new(Duration::from_millis(20));
        for id in 0..10 {
            cache.fill(cache.ticket(), record(id));
        }
        assert_eq!(cache.len(), 10);

        std::thread::sleep(Duration::from_millis(40));
        cache.fill(cache.ticket(), record(99));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(99).is_some());
    }

    #[test]
    fn test_invalidation_during_read_discards_fill() {
        let cache = ScoreCache::new(Duration::from_secs(30));
        let ticket = cache.ticket();

        // A write lands between the store read and the fill
        cache.invalidate(3);

        assert!(!cache.fill(ticket, record(3)));
        assert!(cache.get(3).is_none());

        assert!(cache.fill(cache.ticket(), record(3)));
        assert!(cache.get(3).is_some());
    }
}
