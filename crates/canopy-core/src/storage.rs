//! Storage adapter traits (§6) and an in-memory reference implementation
//! backed by [`crate::graph::Graph`].

use std::collections::HashMap;
use std::sync::RwLock;

use crate::graph::Graph;
use crate::model::{Component, ComponentId, ComponentType, EmbeddingRow, Relationship, RelationshipId};

#[derive(Debug, Default, Clone)]
pub struct ComponentQuery {
    pub r#type: Option<ComponentType>,
    pub name: Option<String>,
    pub file_path: Option<String>,
    pub entity_type: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub has_more: bool,
    pub offset: usize,
    pub limit: usize,
}

pub trait ComponentRepository: Send + Sync {
    fn get(&self, id: ComponentId) -> Option<Component>;
    fn get_by_file(&self, path: &str) -> Vec<Component>;
    fn search(&self, query: &ComponentQuery) -> Page<Component>;
    fn store(&self, component: Component);
    fn get_all(&self) -> Vec<Component>;
    fn count(&self) -> usize;
    fn get_by_name(&self, names: &[String]) -> HashMap<String, ComponentId>;
    fn get_by_file_path(&self, paths: &[String]) -> HashMap<String, ComponentId>;
    fn remove(&self, id: ComponentId) -> Option<Component>;
}

#[derive(Debug, Default, Clone)]
pub struct RelationshipQuery {
    pub source_id: Option<ComponentId>,
    pub target_id: Option<ComponentId>,
    pub r#type: Option<crate::model::RelationshipType>,
}

pub struct TargetUpdate {
    pub id: RelationshipId,
    pub resolved_target_id: ComponentId,
}

pub struct SourceUpdate {
    pub id: RelationshipId,
    pub resolved_source_id: ComponentId,
}

pub trait RelationshipRepository: Send + Sync {
    fn upsert_many(&self, batch: Vec<Relationship>);
    fn update_targets(&self, batch: Vec<TargetUpdate>);
    fn update_sources(&self, batch: Vec<SourceUpdate>);
    fn delete_by_source(&self, id: ComponentId);
    fn delete_by_target(&self, id: ComponentId);
    fn query_by(&self, query: &RelationshipQuery) -> Vec<Relationship>;
    fn get(&self, id: RelationshipId) -> Option<Relationship>;
    fn delete(&self, id: RelationshipId);
    /// Reverts a previously-resolved endpoint back to its symbolic form
    /// (the watcher's `unlink` path, per §4.10).
    fn revert_target_to_symbolic(&self, id: RelationshipId, symbolic: String);
    fn revert_source_to_symbolic(&self, id: RelationshipId, symbolic: String);
}

pub struct SimilarityMatch {
    pub entity_id: ComponentId,
    pub entity_type: String,
    pub similarity: f32,
}

pub trait EmbeddingRepository: Send + Sync {
    fn get_embedding(&self, id: ComponentId, entity_type: &str) -> Option<EmbeddingRow>;
    fn get_by_type(&self, entity_type: &str) -> Vec<EmbeddingRow>;
    fn store(&self, row: EmbeddingRow);
    fn find_similar(&self, query: &[f32], k: usize, types: &[String]) -> Vec<SimilarityMatch>;
}

/// In-memory implementation of all three repositories, sharing the same
/// project [`Graph`]. Used as the default backend and in tests; a real
/// deployment may swap this for a persistent adapter behind the same traits.
pub struct InMemoryStorage {
    graph: RwLock<Graph>,
    embeddings: RwLock<HashMap<(ComponentId, String), EmbeddingRow>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        InMemoryStorage {
            graph: RwLock::new(Graph::new()),
            embeddings: RwLock::new(HashMap::new()),
        }
    }

    pub fn graph(&self) -> std::sync::RwLockReadGuard<'_, Graph> {
        self.graph.read().unwrap()
    }

    pub fn graph_mut(&self) -> std::sync::RwLockWriteGuard<'_, Graph> {
        self.graph.write().unwrap()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRepository for InMemoryStorage {
    fn get(&self, id: ComponentId) -> Option<Component> {
        self.graph.read().unwrap().component(id).cloned()
    }

    fn get_by_file(&self, path: &str) -> Vec<Component> {
        self.graph
            .read()
            .unwrap()
            .components_in_file(path)
            .into_iter()
            .cloned()
            .collect()
    }

    fn search(&self, query: &ComponentQuery) -> Page<Component> {
        let graph = self.graph.read().unwrap();
        let mut matched: Vec<Component> = graph
            .all_components()
            .filter(|c| query.r#type.is_none_or(|t| c.r#type == t))
            .filter(|c| query.name.as_deref().is_none_or(|n| c.name == n))
            .filter(|c| query.file_path.as_deref().is_none_or(|p| c.file_path == p))
            .filter(|c| {
                query
                    .entity_type
                    .as_deref()
                    .is_none_or(|et| c.metadata.entity_type.as_deref() == Some(et))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        let total = matched.len();
        let limit = if query.limit == 0 { total } else { query.limit };
        let items: Vec<Component> = matched
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .collect();
        let has_more = query.offset + items.len() < total;
        Page {
            items,
            total,
            has_more,
            offset: query.offset,
            limit,
        }
    }

    fn store(&self, component: Component) {
        self.graph.write().unwrap().upsert_component(component);
    }

    fn get_all(&self) -> Vec<Component> {
        self.graph.read().unwrap().all_components().cloned().collect()
    }

    fn count(&self) -> usize {
        self.graph.read().unwrap().component_count()
    }

    fn get_by_name(&self, names: &[String]) -> HashMap<String, ComponentId> {
        let graph = self.graph.read().unwrap();
        names
            .iter()
            .filter_map(|n| graph.find_by_name(n).map(|id| (n.clone(), id)))
            .collect()
    }

    fn get_by_file_path(&self, paths: &[String]) -> HashMap<String, ComponentId> {
        let graph = self.graph.read().unwrap();
        paths
            .iter()
            .filter_map(|p| {
                let components = graph.components_in_file(p);
                // Prefer a dedicated `file` component where one exists (Rust,
                // plain-text); most per-language extractors don't emit one, so
                // fall back to any component anchored to that path as the
                // resolution target.
                components
                    .iter()
                    .find(|c| c.r#type == ComponentType::File)
                    .or_else(|| components.first())
                    .map(|c| (p.clone(), c.id))
            })
            .collect()
    }

    fn remove(&self, id: ComponentId) -> Option<Component> {
        self.graph.write().unwrap().remove_component(id)
    }
}

impl RelationshipRepository for InMemoryStorage {
    fn upsert_many(&self, batch: Vec<Relationship>) {
        let mut graph = self.graph.write().unwrap();
        for rel in batch {
            graph.add_relationship(rel);
        }
    }

    fn update_targets(&self, batch: Vec<TargetUpdate>) {
        let mut graph = self.graph.write().unwrap();
        for update in batch {
            graph.resolve_endpoint(update.id, true, update.resolved_target_id);
        }
    }

    fn update_sources(&self, batch: Vec<SourceUpdate>) {
        let mut graph = self.graph.write().unwrap();
        for update in batch {
            graph.resolve_endpoint(update.id, false, update.resolved_source_id);
        }
    }

    fn delete_by_source(&self, id: ComponentId) {
        let mut graph = self.graph.write().unwrap();
        let ids: Vec<_> = graph
            .all_relationships()
            .filter(|r| r.source_id.resolved() == Some(id))
            .map(|r| r.id)
            .collect();
        for rid in ids {
            graph.remove_relationship(rid);
        }
    }

    fn delete_by_target(&self, id: ComponentId) {
        let mut graph = self.graph.write().unwrap();
        let ids: Vec<_> = graph
            .all_relationships()
            .filter(|r| r.target_id.resolved() == Some(id))
            .map(|r| r.id)
            .collect();
        for rid in ids {
            graph.remove_relationship(rid);
        }
    }

    fn query_by(&self, query: &RelationshipQuery) -> Vec<Relationship> {
        let graph = self.graph.read().unwrap();
        graph
            .all_relationships()
            .filter(|r| {
                query
                    .source_id
                    .is_none_or(|id| r.source_id.resolved() == Some(id))
            })
            .filter(|r| {
                query
                    .target_id
                    .is_none_or(|id| r.target_id.resolved() == Some(id))
            })
            .filter(|r| query.r#type.is_none_or(|t| r.r#type == t))
            .cloned()
            .collect()
    }

    fn get(&self, id: RelationshipId) -> Option<Relationship> {
        self.graph.read().unwrap().relationship(id).cloned()
    }

    fn delete(&self, id: RelationshipId) {
        self.graph.write().unwrap().remove_relationship(id);
    }

    fn revert_target_to_symbolic(&self, id: RelationshipId, symbolic: String) {
        self.graph.write().unwrap().revert_endpoint(id, true, symbolic);
    }

    fn revert_source_to_symbolic(&self, id: RelationshipId, symbolic: String) {
        self.graph.write().unwrap().revert_endpoint(id, false, symbolic);
    }
}

impl EmbeddingRepository for InMemoryStorage {
    fn get_embedding(&self, id: ComponentId, entity_type: &str) -> Option<EmbeddingRow> {
        self.embeddings
            .read()
            .unwrap()
            .get(&(id, entity_type.to_string()))
            .cloned()
    }

    fn get_by_type(&self, entity_type: &str) -> Vec<EmbeddingRow> {
        self.embeddings
            .read()
            .unwrap()
            .values()
            .filter(|row| row.entity_type == entity_type)
            .cloned()
            .collect()
    }

    fn store(&self, row: EmbeddingRow) {
        self.embeddings
            .write()
            .unwrap()
            .insert((row.entity_id, row.entity_type.clone()), row);
    }

    fn find_similar(&self, query: &[f32], k: usize, types: &[String]) -> Vec<SimilarityMatch> {
        let embeddings = self.embeddings.read().unwrap();
        let mut scored: Vec<SimilarityMatch> = embeddings
            .values()
            .filter(|row| types.is_empty() || types.contains(&row.entity_type))
            .map(|row| SimilarityMatch {
                entity_id: row.entity_id,
                entity_type: row.entity_type.clone(),
                similarity: cosine_similarity(query, &row.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        scored.truncate(k);
        scored
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComponentMetadata, Language, Location};

    fn sample(id: u128, name: &str) -> Component {
        Component {
            id: ComponentId(id),
            name: name.to_string(),
            r#type: ComponentType::Function,
            language: Language::Rust,
            file_path: "src/lib.rs".into(),
            location: Location { start_line: 1, end_line: 1, start_column: 0, end_column: 1 },
            code: Some("fn f(){}".into()),
            metadata: ComponentMetadata::default(),
        }
    }

    #[test]
    fn store_and_get_roundtrips() {
        let storage = InMemoryStorage::new();
        ComponentRepository::store(&storage, sample(1, "f"));
        assert_eq!(ComponentRepository::get(&storage, ComponentId(1)).unwrap().name, "f");
        assert_eq!(storage.count(), 1);
    }

    fn embedding(id: u128, vector: Vec<f32>) -> EmbeddingRow {
        EmbeddingRow {
            entity_id: ComponentId(id),
            entity_type: "component".into(),
            vector,
            model_version: "test-v1".into(),
            content_hash: 0,
        }
    }

    #[test]
    fn get_by_file_path_prefers_the_dedicated_file_component_over_any_other() {
        let storage = InMemoryStorage::new();
        // Non-`file` component stored first so a naive "first match wins"
        // fallback would shadow the dedicated `file` component stored after it.
        ComponentRepository::store(&storage, sample(1, "f"));
        ComponentRepository::store(&storage, Component {
            id: ComponentId(2),
            r#type: ComponentType::File,
            ..sample(2, "src/lib.rs")
        });

        let hits = storage.get_by_file_path(&["src/lib.rs".to_string()]);
        assert_eq!(hits["src/lib.rs"], ComponentId(2));
    }

    #[test]
    fn get_by_file_path_falls_back_to_any_component_when_no_file_type_exists() {
        let storage = InMemoryStorage::new();
        ComponentRepository::store(&storage, sample(1, "f"));

        let hits = storage.get_by_file_path(&["src/lib.rs".to_string()]);
        assert_eq!(hits["src/lib.rs"], ComponentId(1));
    }

    #[test]
    fn find_similar_ranks_by_cosine() {
        let storage = InMemoryStorage::new();
        storage.store_embedding_for_test(embedding(1, vec![1.0, 0.0]));
        storage.store_embedding_for_test(embedding(2, vec![0.0, 1.0]));
        let results = storage.find_similar(&[1.0, 0.0], 2, &[]);
        assert_eq!(results[0].entity_id, ComponentId(1));
    }

    impl InMemoryStorage {
        fn store_embedding_for_test(&self, row: EmbeddingRow) {
            EmbeddingRepository::store(self, row);
        }
    }
}
