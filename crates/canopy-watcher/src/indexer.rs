//! Incremental reindexing (§4.10): the diff/tombstone/resolve/AI-analysis
//! semantics applied per file on every debounced filesystem event. Has no
//! notion of `notify` or debouncing itself — [`crate::watcher::WatcherService`]
//! owns the event loop and calls into this.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::Utc;
use tracing::debug;

use canopy_ai::analysis::{AnalysisContext, AnalysisProvider, AnalysisRequest};
use canopy_ai::budget::Budget;
use canopy_ai::cache::{compute_content_hash, AnalysisCache};
use canopy_core::model::{Component, ComponentId, ComponentType, SymbolicId};
use canopy_core::storage::{ComponentRepository, RelationshipQuery, RelationshipRepository};
use canopy_core::{Aggregator, EngineConfig, IgnoreEngine, ParsingLevel, Relationship, WorkspaceType};
use canopy_indexer::coordinator::{level_from_origin, Coordinator};
use canopy_indexer::resolver::run_resolution_pass;

/// Tally returned from one `apply_change`/`apply_unlink` call, surfaced for
/// logging and for the integration tests that exercise §8's scenarios.
#[derive(Debug, Default, Clone, Copy)]
pub struct WatchApplyOutcome {
    pub added: usize,
    pub updated: usize,
    pub tombstoned: usize,
    pub removed: usize,
    pub relationships_upserted: usize,
    pub relationships_reverted: usize,
    pub relationships_deleted: usize,
    pub resolver_resolved: u64,
    pub ai_relationships: usize,
}

fn needs_resolution(r: &Relationship) -> bool {
    matches!(r.source_id, SymbolicId::Symbolic(_)) || matches!(r.target_id, SymbolicId::Symbolic(_))
}

/// Merges a file's freshly-parsed provisional edges the same way the initial
/// full index does: grouped into per-`ParsingLevel` batches by origin tag.
fn aggregate_file_edges(edges: Vec<canopy_core::ProvisionalEdge>) -> Vec<Relationship> {
    let mut by_level: HashMap<String, (ParsingLevel, Vec<canopy_core::ProvisionalEdge>)> = HashMap::new();
    for edge in edges {
        let level = level_from_origin(&edge.origin);
        by_level.entry(format!("{level:?}")).or_insert_with(|| (level, Vec::new())).1.push(edge);
    }
    let mut aggregator = Aggregator::new();
    for (_, (level, batch)) in by_level {
        aggregator.add(batch, level);
    }
    aggregator.get_all(0.0)
}

pub struct IncrementalIndexer {
    workspace_root: PathBuf,
    config: EngineConfig,
    coordinator: Coordinator,
    ignore: IgnoreEngine,
    workspace_type: Option<WorkspaceType>,
}

impl IncrementalIndexer {
    pub fn new(workspace_root: PathBuf, config: EngineConfig) -> Self {
        let ignore = IgnoreEngine::build(&workspace_root, &config.exclude_extensions);
        let coordinator = Coordinator::new(workspace_root.clone(), config.clone());
        let workspace_type = canopy_core::detect_workspace(&workspace_root);
        IncrementalIndexer { workspace_root, config, coordinator, ignore, workspace_type }
    }

    /// `add`/`change`: re-parse the file, diff the new component set against
    /// the stored one by id (ids already encode `(type, name, startLine,
    /// startColumn)`, per §4.12, so an id match *is* the diff key match),
    /// upsert what's still there, tombstone what dropped out, and sweep the
    /// resolver over the endpoints this file touched.
    pub fn apply_change(
        &self,
        project_relative_path: &str,
        components: &dyn ComponentRepository,
        relationships: &dyn RelationshipRepository,
    ) -> WatchApplyOutcome {
        let mut outcome = WatchApplyOutcome::default();

        let old_ids: HashSet<ComponentId> =
            components.get_by_file(project_relative_path).iter().map(|c| c.id).collect();

        let file_index = self.coordinator.index_file(project_relative_path);
        let new_ids: HashSet<ComponentId> = file_index.components.iter().map(|c| c.id).collect();

        for component in &file_index.components {
            if old_ids.contains(&component.id) {
                outcome.updated += 1;
            } else {
                outcome.added += 1;
            }
            components.store(component.clone());
        }

        let now = Utc::now();
        for &id in old_ids.difference(&new_ids) {
            if let Some(mut component) = components.get(id) {
                if component.metadata.tombstoned_at.is_none() {
                    component.metadata.tombstoned_at = Some(now);
                    components.store(component);
                    outcome.tombstoned += 1;
                }
            }
        }

        let fresh = aggregate_file_edges(file_index.relationships);
        relationships.upsert_many(fresh.clone());
        outcome.relationships_upserted = fresh.len();

        let touched: HashSet<ComponentId> = old_ids.union(&new_ids).copied().collect();
        let to_resolve = self.gather_relationships_to_resolve(&fresh, &touched, relationships);
        if !to_resolve.is_empty() {
            let metrics =
                run_resolution_pass(to_resolve, components, relationships, &self.config, &self.ignore, &self.workspace_root, self.workspace_type);
            outcome.resolver_resolved = metrics.resolved;
        }

        outcome
    }

    /// `unlink`: remove every component the file owned outright (no grace
    /// period — the file is gone). Relationships that named one of them as
    /// source or target revert to their pre-resolution symbolic form when an
    /// `originalTarget`/`resolvedFrom` was recorded, else they're deleted.
    pub fn apply_unlink(
        &self,
        project_relative_path: &str,
        components: &dyn ComponentRepository,
        relationships: &dyn RelationshipRepository,
    ) -> WatchApplyOutcome {
        let mut outcome = WatchApplyOutcome::default();
        let owned = components.get_by_file(project_relative_path);

        for component in &owned {
            for r in relationships.query_by(&RelationshipQuery { source_id: Some(component.id), ..Default::default() }) {
                match r.metadata.resolved_from.clone() {
                    Some(original) => {
                        relationships.revert_source_to_symbolic(r.id, original);
                        outcome.relationships_reverted += 1;
                    }
                    None => {
                        relationships.delete(r.id);
                        outcome.relationships_deleted += 1;
                    }
                }
            }
            for r in relationships.query_by(&RelationshipQuery { target_id: Some(component.id), ..Default::default() }) {
                match r.metadata.original_target.clone() {
                    Some(original) => {
                        relationships.revert_target_to_symbolic(r.id, original);
                        outcome.relationships_reverted += 1;
                    }
                    None => {
                        relationships.delete(r.id);
                        outcome.relationships_deleted += 1;
                    }
                }
            }
            components.remove(component.id);
            outcome.removed += 1;
        }

        outcome
    }

    /// Sweeps tombstoned components whose grace period has elapsed and which
    /// no surviving relationship still points at, deleting them outright.
    pub fn sweep_tombstones(&self, components: &dyn ComponentRepository, relationships: &dyn RelationshipRepository) -> usize {
        let grace = chrono::Duration::milliseconds(self.config.tombstone_grace_ms as i64);
        let now = Utc::now();
        let mut removed = 0;
        for component in components.get_all() {
            let Some(tombstoned_at) = component.metadata.tombstoned_at else { continue };
            if now - tombstoned_at < grace {
                continue;
            }
            let still_referenced = !relationships
                .query_by(&RelationshipQuery { source_id: Some(component.id), ..Default::default() })
                .is_empty()
                || !relationships
                    .query_by(&RelationshipQuery { target_id: Some(component.id), ..Default::default() })
                    .is_empty();
            if !still_referenced {
                components.remove(component.id);
                removed += 1;
            }
        }
        removed
    }

    /// Gathers relationships worth feeding back into the resolver: every
    /// freshly-aggregated edge from this file that still needs resolution,
    /// plus any already-stored relationship whose resolved endpoint is one of
    /// the ids this file's reindex touched and whose other endpoint is still
    /// symbolic (e.g. an edge from another file pointing at a symbol this
    /// file just (re)introduced).
    fn gather_relationships_to_resolve(
        &self,
        fresh: &[Relationship],
        touched: &HashSet<ComponentId>,
        relationships: &dyn RelationshipRepository,
    ) -> Vec<Relationship> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for r in fresh {
            if needs_resolution(r) && seen.insert(r.id) {
                out.push(r.clone());
            }
        }
        for &id in touched {
            for r in relationships.query_by(&RelationshipQuery { source_id: Some(id), ..Default::default() }) {
                if needs_resolution(&r) && seen.insert(r.id) {
                    out.push(r);
                }
            }
            for r in relationships.query_by(&RelationshipQuery { target_id: Some(id), ..Default::default() }) {
                if needs_resolution(&r) && seen.insert(r.id) {
                    out.push(r);
                }
            }
        }
        out
    }

    pub fn run_full_index(
        &self,
        components: &dyn ComponentRepository,
        relationships: &dyn RelationshipRepository,
    ) -> anyhow::Result<canopy_indexer::coordinator::IndexSummary> {
        self.coordinator.run_full_index(components, relationships)
    }
}

/// §4.10.1: proposes `SemanticReference`-style edges for newly added
/// function/method components via an [`AnalysisProvider`], gated by a token
/// budget and an acceptance confidence threshold. Disabled unless
/// `EngineConfig::enable_ai_analysis` is set. Accepted relationships are
/// merged in at `ParsingLevel::Initial` — the aggregator has no rung below
/// that for a source reasoning over the text rather than the text itself.
pub async fn run_ai_analysis_pass(
    provider: &dyn AnalysisProvider,
    budget: &mut Budget,
    cache: &mut AnalysisCache,
    confidence_threshold: f32,
    project_relative_path: &str,
    added: &[Component],
    all_components: &[Component],
    relationships: &dyn RelationshipRepository,
) -> usize {
    let candidates: Vec<Component> = added
        .iter()
        .filter(|c| matches!(c.r#type, ComponentType::Function | ComponentType::Method))
        .cloned()
        .collect();
    if candidates.is_empty() {
        return 0;
    }

    let requests: Vec<AnalysisRequest> = candidates
        .iter()
        .map(|source| AnalysisRequest {
            source: source.clone(),
            candidates: all_components.to_vec(),
            context: AnalysisContext {
                file_path: project_relative_path.to_string(),
                language: format!("{:?}", source.language),
                enclosing_context: Vec::new(),
                imports: Vec::new(),
            },
        })
        .collect();

    let inferred = canopy_ai::analysis::propose_relationships(provider, budget, cache, confidence_threshold, requests).await;
    if inferred.is_empty() {
        return 0;
    }

    let edges: Vec<canopy_core::ProvisionalEdge> = inferred
        .into_iter()
        .map(|rel| canopy_core::ProvisionalEdge {
            source_id: SymbolicId::Resolved(rel.source_id),
            target_id: SymbolicId::Resolved(rel.target_id),
            r#type: rel.relationship.into(),
            confidence: rel.confidence,
            metadata: Default::default(),
            producer_metadata: HashMap::from([("explanation".to_string(), rel.explanation)]),
            origin: "ai-analysis:Initial".to_string(),
        })
        .collect();
    let count = edges.len();

    let mut aggregator = Aggregator::new();
    aggregator.add(edges, ParsingLevel::Initial);
    let merged = aggregator.get_all(0.0);
    relationships.upsert_many(merged);
    debug!("ai-analysis: {count} relationship(s) accepted for {project_relative_path}");
    count
}

/// Computes the content hash `run_ai_analysis_pass`'s cache keys on, so
/// callers can check cache freshness before spending a request.
pub fn ai_cache_hash(component: &Component) -> u64 {
    compute_content_hash(component.code.as_deref().unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::model::{ComponentMetadata, Language, Location};
    use canopy_core::InMemoryStorage;

    #[test]
    fn apply_change_upserts_additions_and_tombstones_drops() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export function foo() {}\nexport function bar() {}\n").unwrap();
        let indexer = IncrementalIndexer::new(dir.path().to_path_buf(), EngineConfig::default());
        let storage = InMemoryStorage::new();

        let outcome = indexer.apply_change("a.ts", &storage, &storage);
        assert_eq!(outcome.added, storage.get_by_file("a.ts").len());
        assert!(outcome.tombstoned == 0);

        std::fs::write(dir.path().join("a.ts"), "export function foo() {}\n").unwrap();
        let outcome2 = indexer.apply_change("a.ts", &storage, &storage);
        assert_eq!(outcome2.tombstoned, 1);
        let bar_gone = storage
            .get_by_file("a.ts")
            .into_iter()
            .find(|c| c.name == "bar")
            .expect("tombstoned component stays until the grace period sweep");
        assert!(bar_gone.metadata.tombstoned_at.is_some());
    }

    #[test]
    fn reappearing_component_clears_its_tombstone() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export function foo() {}\nexport function bar() {}\n").unwrap();
        let indexer = IncrementalIndexer::new(dir.path().to_path_buf(), EngineConfig::default());
        let storage = InMemoryStorage::new();
        indexer.apply_change("a.ts", &storage, &storage);

        std::fs::write(dir.path().join("a.ts"), "export function foo() {}\n").unwrap();
        indexer.apply_change("a.ts", &storage, &storage);

        std::fs::write(dir.path().join("a.ts"), "export function foo() {}\nexport function bar() {}\n").unwrap();
        indexer.apply_change("a.ts", &storage, &storage);
        let bar = storage.get_by_file("a.ts").into_iter().find(|c| c.name == "bar").unwrap();
        assert!(bar.metadata.tombstoned_at.is_none());
    }

    #[test]
    fn sweep_tombstones_removes_only_unreferenced_expired_entries() {
        let storage = InMemoryStorage::new();
        let old = Component {
            id: ComponentId(1),
            name: "gone".into(),
            r#type: ComponentType::Function,
            language: Language::TypeScript,
            file_path: "a.ts".into(),
            location: Location { start_line: 1, end_line: 1, start_column: 0, end_column: 1 },
            code: Some("function gone(){}".into()),
            metadata: ComponentMetadata {
                tombstoned_at: Some(Utc::now() - chrono::Duration::hours(1)),
                ..Default::default()
            },
        };
        storage.store(old);

        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.tombstone_grace_ms = 1000;
        let indexer = IncrementalIndexer::new(dir.path().to_path_buf(), config);

        let removed = indexer.sweep_tombstones(&storage, &storage);
        assert_eq!(removed, 1);
        assert!(canopy_core::ComponentRepository::get(&storage, ComponentId(1)).is_none());
    }

    #[test]
    fn unlink_reverts_resolved_relationships_to_symbolic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export function helper() {}\n").unwrap();
        let indexer = IncrementalIndexer::new(dir.path().to_path_buf(), EngineConfig::default());
        let storage = InMemoryStorage::new();
        indexer.apply_change("a.ts", &storage, &storage);

        let helper = storage.get_by_file("a.ts").into_iter().find(|c| c.name == "helper").unwrap();
        let rel = Relationship {
            id: canopy_core::model::RelationshipId(42),
            source_id: SymbolicId::Symbolic("RESOLVE:./caller#call".into()),
            target_id: SymbolicId::Resolved(helper.id),
            r#type: canopy_core::model::RelationshipType::Calls,
            metadata: canopy_core::model::RelationshipMetadata {
                original_target: Some("RESOLVE:./a#helper".into()),
                ..Default::default()
            },
            sources: Vec::new(),
            precedence_level: ParsingLevel::Initial,
            final_confidence: 0.9,
            aggregation_metadata: canopy_core::model::AggregationMetadata {
                merged_from_count: 1,
                last_updated: Utc::now(),
                consensus_score: 1.0,
                highest_original_confidence: 0.9,
                lowest_original_confidence: 0.9,
            },
        };
        storage.upsert_many(vec![rel]);

        let outcome = indexer.apply_unlink("a.ts", &storage, &storage);
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.relationships_reverted, 1);
        let reverted = canopy_core::RelationshipRepository::get(&storage, canopy_core::model::RelationshipId(42)).unwrap();
        assert_eq!(reverted.target_id, SymbolicId::Symbolic("RESOLVE:./a#helper".into()));
    }
}
