//! Supplemental AI-assisted relationship pass (§4.10.1): after the
//! structural/basic/initial relationship sources have been merged, an
//! optional post-pass asks an [`AnalysisProvider`] to propose additional
//! edges for newly added components. Strictly additive, gated by a token
//! budget and an acceptance confidence threshold, disabled by default.

use anyhow::Result;
use canopy_core::model::{Component, ComponentId, RelationshipType};
use serde::{Deserialize, Serialize};

pub type Confidence = f32;

/// Relationship kinds an analysis provider may propose. Distinct from
/// [`RelationshipType`] because the model is reasoning in looser semantic
/// terms than a parser's syntactic edge kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemanticRelationship {
    Calls,
    DependsOn,
    Implements,
    Extends,
    Uses,
    /// Catch-all for a relationship the model is confident about but that
    /// doesn't map onto one of the syntactic kinds above.
    SemanticReference,
}

impl From<SemanticRelationship> for RelationshipType {
    fn from(rel: SemanticRelationship) -> Self {
        match rel {
            SemanticRelationship::Calls => RelationshipType::Calls,
            SemanticRelationship::DependsOn => RelationshipType::DependsOn,
            SemanticRelationship::Implements => RelationshipType::Implements,
            SemanticRelationship::Extends => RelationshipType::Extends,
            SemanticRelationship::Uses => RelationshipType::Uses,
            SemanticRelationship::SemanticReference => RelationshipType::References,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub file_path: String,
    pub language: String,
    pub enclosing_context: Vec<String>,
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub source: Component,
    pub candidates: Vec<Component>,
    pub context: AnalysisContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferredRelationship {
    pub source_id: ComponentId,
    pub target_id: ComponentId,
    pub relationship: SemanticRelationship,
    pub confidence: Confidence,
    pub explanation: String,
    pub line_reference: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub relationships: Vec<InferredRelationship>,
    pub explanation: String,
    pub tokens_used: u32,
}

#[async_trait::async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult>;
    fn name(&self) -> &str;
}

#[async_trait::async_trait]
impl AnalysisProvider for Box<dyn AnalysisProvider> {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
        (**self).analyze(request).await
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Runs `provider` over `requests`, accepting only relationships at or above
/// `accept_threshold` and stopping early once `budget` is spent.
pub async fn propose_relationships(
    provider: &dyn AnalysisProvider,
    budget: &mut crate::budget::Budget,
    cache: &mut crate::cache::AnalysisCache,
    accept_threshold: Confidence,
    requests: Vec<AnalysisRequest>,
) -> Vec<InferredRelationship> {
    let mut accepted = Vec::new();
    for request in requests {
        let content_hash = crate::cache::compute_content_hash(
            &request.source.code.clone().unwrap_or_default(),
        );
        if let Some(cached) = cache.get(request.source.id, content_hash) {
            accepted.extend(cached.relationships.iter().cloned().filter(|r| r.confidence >= accept_threshold));
            continue;
        }

        let estimated = crate::budget::Budget::estimate_tokens(
            request.context.enclosing_context.iter().map(|s| s.len()).sum::<usize>()
                + request.source.code.as_deref().map_or(0, str::len),
        );
        if !budget.has_budget(estimated) {
            tracing::warn!("AI analysis budget exhausted; stopping early");
            break;
        }

        match provider.analyze(request.clone()).await {
            Ok(result) => {
                budget.use_tokens(result.tokens_used);
                cache.insert(request.source.id, content_hash, result.relationships.clone());
                accepted.extend(result.relationships.into_iter().filter(|r| r.confidence >= accept_threshold));
            }
            Err(e) => tracing::warn!("AI analysis request failed: {e}"),
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::Budget;
    use crate::cache::AnalysisCache;
    use canopy_core::model::{ComponentId, ComponentMetadata, ComponentType, Language, Location};
    use std::time::Duration;

    fn component(id: u128, code: &str) -> Component {
        Component {
            id: ComponentId(id),
            name: "handler".into(),
            r#type: ComponentType::Function,
            language: Language::Rust,
            file_path: "src/handler.rs".into(),
            location: Location { start_line: 1, end_line: 1, start_column: 1, end_column: 1 },
            code: Some(code.to_string()),
            metadata: ComponentMetadata::default(),
        }
    }

    struct StubProvider;

    #[async_trait::async_trait]
    impl AnalysisProvider for StubProvider {
        async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
            Ok(AnalysisResult {
                relationships: vec![InferredRelationship {
                    source_id: request.source.id,
                    target_id: ComponentId(99),
                    relationship: SemanticRelationship::Calls,
                    confidence: 0.9,
                    explanation: "stub".into(),
                    line_reference: None,
                }],
                explanation: "stub analysis".into(),
                tokens_used: 100,
            })
        }
        fn name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn accepts_only_relationships_above_threshold() {
        let provider = StubProvider;
        let mut budget = Budget::new(10_000);
        let mut cache = AnalysisCache::new(Duration::from_secs(60));
        let requests = vec![AnalysisRequest {
            source: component(1, "fn handler() { other() }"),
            candidates: vec![],
            context: AnalysisContext {
                file_path: "src/handler.rs".into(),
                language: "rust".into(),
                enclosing_context: vec![],
                imports: vec![],
            },
        }];

        let accepted = propose_relationships(&provider, &mut budget, &mut cache, 0.95, requests.clone()).await;
        assert!(accepted.is_empty());

        let accepted = propose_relationships(&provider, &mut budget, &mut cache, 0.5, requests).await;
        assert_eq!(accepted.len(), 1);
    }

    #[tokio::test]
    async fn stops_once_budget_is_exhausted() {
        let provider = StubProvider;
        let mut budget = Budget::new(10);
        let mut cache = AnalysisCache::new(Duration::from_secs(60));
        let requests = vec![AnalysisRequest {
            source: component(1, "fn handler() {}"),
            candidates: vec![],
            context: AnalysisContext {
                file_path: "src/handler.rs".into(),
                language: "rust".into(),
                enclosing_context: vec![],
                imports: vec![],
            },
        }];

        let accepted = propose_relationships(&provider, &mut budget, &mut cache, 0.5, requests).await;
        assert!(accepted.is_empty());
    }
}
