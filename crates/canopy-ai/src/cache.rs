//! Analysis cache for the supplemental AI-relationship pass, keyed on
//! `(componentId, contentHash)` so an unchanged component never pays for a
//! repeat inference call within the TTL window.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use canopy_core::model::ComponentId;

use crate::analysis::InferredRelationship;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub relationships: Vec<InferredRelationship>,
    pub timestamp: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.timestamp.elapsed() > self.ttl
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct CacheKey {
    component_id: ComponentId,
    content_hash: u64,
}

pub struct AnalysisCache {
    entries: HashMap<CacheKey, CacheEntry>,
    default_ttl: Duration,
}

impl AnalysisCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self { entries: HashMap::new(), default_ttl }
    }

    pub fn get(&self, component_id: ComponentId, content_hash: u64) -> Option<&CacheEntry> {
        let key = CacheKey { component_id, content_hash };
        self.entries.get(&key).filter(|entry| !entry.is_expired())
    }

    pub fn insert(&mut self, component_id: ComponentId, content_hash: u64, relationships: Vec<InferredRelationship>) {
        let key = CacheKey { component_id, content_hash };
        self.entries.insert(key, CacheEntry { relationships, timestamp: Instant::now(), ttl: self.default_ttl });
    }

    pub fn cleanup_expired(&mut self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.entries.len(),
            expired_entries: self.entries.values().filter(|e| e.is_expired()).count(),
        }
    }
}

#[derive(Debug)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
}

pub fn compute_content_hash(content: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entries_are_not_returned() {
        let mut cache = AnalysisCache::new(Duration::from_millis(0));
        cache.insert(ComponentId(1), 42, vec![]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(ComponentId(1), 42).is_none());
    }

    #[test]
    fn cleanup_expired_drops_stale_entries_only() {
        let mut cache = AnalysisCache::new(Duration::from_secs(60));
        cache.insert(ComponentId(1), 1, vec![]);
        cache.insert(ComponentId(2), 2, vec![]);
        cache.entries.get_mut(&CacheKey { component_id: ComponentId(1), content_hash: 1 }).unwrap().ttl = Duration::from_millis(0);
        std::thread::sleep(Duration::from_millis(5));
        cache.cleanup_expired();
        assert_eq!(cache.stats().total_entries, 1);
    }
}
