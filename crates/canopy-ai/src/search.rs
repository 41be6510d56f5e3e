//! Search entrypoint (C9): embeds the query, asks storage for nearest
//! neighbors, applies cheap pre-filters, then reranks the survivors.

use canopy_core::model::{ComponentType, Language};
use canopy_core::storage::{ComponentRepository, EmbeddingRepository, RelationshipQuery, RelationshipRepository};

use crate::embedding::EmbeddingProvider;
use crate::rerank::{rerank, Candidate, RankedResult, RerankConfig};

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub component_type: Option<ComponentType>,
    pub language: Option<Language>,
    pub file_path_includes: Option<String>,
    pub file_path_excludes: Option<String>,
}

pub struct SearchConfig {
    pub k: usize,
    pub entity_types: Vec<String>,
    pub filters: SearchFilters,
    pub rerank: RerankConfig,
    pub context: String,
}

impl SearchConfig {
    pub fn new(k: usize, rerank: RerankConfig) -> Self {
        SearchConfig { k, entity_types: vec!["component".to_string()], filters: SearchFilters::default(), rerank, context: String::new() }
    }
}

pub async fn search(
    query: &str,
    cfg: &SearchConfig,
    provider: &dyn EmbeddingProvider,
    embeddings: &dyn EmbeddingRepository,
    components: &dyn ComponentRepository,
    relationships: &dyn RelationshipRepository,
) -> anyhow::Result<Vec<RankedResult>> {
    let query_vector = provider.embed(query).await?;
    let oversampled_k = cfg.k * 2;
    let matches = embeddings.find_similar(&query_vector, oversampled_k, &cfg.entity_types);

    let mut candidates = Vec::new();
    for m in matches {
        let Some(component) = components.get(m.entity_id) else { continue };
        if let Some(t) = cfg.filters.component_type {
            if component.r#type != t {
                continue;
            }
        }
        if let Some(l) = cfg.filters.language {
            if component.language != l {
                continue;
            }
        }
        if let Some(substr) = &cfg.filters.file_path_includes {
            if !component.file_path.contains(substr.as_str()) {
                continue;
            }
        }
        if let Some(substr) = &cfg.filters.file_path_excludes {
            if component.file_path.contains(substr.as_str()) {
                continue;
            }
        }

        let relationship_count = relationships
            .query_by(&RelationshipQuery { source_id: Some(component.id), ..Default::default() })
            .len()
            + relationships.query_by(&RelationshipQuery { target_id: Some(component.id), ..Default::default() }).len();

        candidates.push(Candidate { component, similarity: m.similarity, relationship_count });
    }

    let now = chrono::Utc::now();
    let mut ranked = rerank(candidates, query, &cfg.context, &cfg.rerank, now);
    ranked.retain(|r| r.final_score >= cfg.rerank.similarity_threshold);
    ranked.truncate(cfg.k);
    Ok(ranked)
}
