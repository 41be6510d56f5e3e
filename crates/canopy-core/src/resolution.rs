//! `ResolutionContext` (§3): the process-local cache shared by the target and
//! source resolvers (C7). Reset per resolution pass.

use dashmap::DashMap;

use crate::model::{ComponentId, RelationshipId};

/// The outcome of attempting to resolve one relationship endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStatus {
    Resolved,
    External,
    SkippedExternal,
    SkippedJunk,
    SkippedStdlib,
    SkippedIgnored,
    Unresolved,
}

/// A queued rewrite: once a batch is flushed, the graph's symbolic endpoint
/// `relationship_id` is replaced with `resolved_id`.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub relationship_id: RelationshipId,
    pub is_target: bool,
    pub resolved_id: ComponentId,
}

#[derive(Debug, Default, Clone)]
pub struct ResolutionMetrics {
    pub resolved: u64,
    pub external: u64,
    pub skipped_external: u64,
    pub skipped_junk: u64,
    pub skipped_stdlib: u64,
    pub skipped_ignored: u64,
    pub unresolved: u64,
}

impl ResolutionMetrics {
    pub fn record(&mut self, status: ResolutionStatus) {
        match status {
            ResolutionStatus::Resolved => self.resolved += 1,
            ResolutionStatus::External => self.external += 1,
            ResolutionStatus::SkippedExternal => self.skipped_external += 1,
            ResolutionStatus::SkippedJunk => self.skipped_junk += 1,
            ResolutionStatus::SkippedStdlib => self.skipped_stdlib += 1,
            ResolutionStatus::SkippedIgnored => self.skipped_ignored += 1,
            ResolutionStatus::Unresolved => self.unresolved += 1,
        }
    }
}

/// Caches name→id, filePath→id, and `fs.exists` lookups across one bulk
/// resolution pass, plus pending-update queues and metrics.
pub struct ResolutionContext {
    pub component_id_by_file_path: DashMap<String, ComponentId>,
    pub component_id_by_name: DashMap<String, ComponentId>,
    pub fs_exists_cache: DashMap<String, bool>,
    pending: std::sync::Mutex<Vec<PendingUpdate>>,
    pub metrics: std::sync::Mutex<ResolutionMetrics>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        ResolutionContext {
            component_id_by_file_path: DashMap::new(),
            component_id_by_name: DashMap::new(),
            fs_exists_cache: DashMap::new(),
            pending: std::sync::Mutex::new(Vec::new()),
            metrics: std::sync::Mutex::new(ResolutionMetrics::default()),
        }
    }

    pub fn queue_update(&self, update: PendingUpdate) {
        self.pending.lock().unwrap().push(update);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Drains the pending-update queue, handing the batch to `flush` for a
    /// single transactional application.
    pub fn flush(&self, apply: impl FnOnce(Vec<PendingUpdate>)) {
        let batch = std::mem::take(&mut *self.pending.lock().unwrap());
        if !batch.is_empty() {
            apply(batch);
        }
    }

    pub fn record(&self, status: ResolutionStatus) {
        self.metrics.lock().unwrap().record(status);
    }
}

impl Default for ResolutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// `processInBatches(items, size, handler, onFlush)`: runs `handler` over
/// `items` in chunks of `size`, invoking `on_flush` after each chunk so the
/// caller can commit the context's pending updates in one transaction.
pub fn process_in_batches<T, H>(items: Vec<T>, size: usize, mut handler: H, mut on_flush: impl FnMut())
where
    H: FnMut(T) -> ResolutionStatus,
{
    let size = size.max(1);
    let mut remaining = items;
    while !remaining.is_empty() {
        let take = size.min(remaining.len());
        let batch: Vec<T> = remaining.drain(..take).collect();
        for item in batch {
            handler(item);
        }
        on_flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_in_batches_flushes_once_per_chunk() {
        let items: Vec<i32> = (0..10).collect();
        let mut flushes = 0;
        let mut statuses = Vec::new();
        process_in_batches(
            items,
            3,
            |n| {
                statuses.push(n);
                ResolutionStatus::Resolved
            },
            || flushes += 1,
        );
        assert_eq!(statuses.len(), 10);
        assert_eq!(flushes, 4); // 3,3,3,1
    }

    #[test]
    fn pending_updates_drain_on_flush() {
        let ctx = ResolutionContext::new();
        ctx.queue_update(PendingUpdate {
            relationship_id: RelationshipId(1),
            is_target: true,
            resolved_id: ComponentId(2),
        });
        assert_eq!(ctx.pending_len(), 1);
        let mut applied = 0;
        ctx.flush(|batch| applied = batch.len());
        assert_eq!(applied, 1);
        assert_eq!(ctx.pending_len(), 0);
    }
}
