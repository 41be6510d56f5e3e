//! Embedding Orchestrator (C8): computes and persists vectors for
//! components, content-hash gated against what's already stored.

use anyhow::Result;
use canopy_core::model::{Component, ComponentMetadata, ComponentType};
use canopy_core::storage::EmbeddingRepository;
use canopy_core::{fingerprint, EmbeddingRow};

/// Contract with the embedding model: `embed`/`batch_embed` map text to a
/// fixed-dimensionality vector, `D` fixed per `model_version`.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn batch_embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn model_version(&self) -> &str;
    fn dimensions(&self) -> usize;
}

#[async_trait::async_trait]
impl EmbeddingProvider for Box<dyn EmbeddingProvider> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }
    async fn batch_embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).batch_embed(texts).await
    }
    fn model_version(&self) -> &str {
        (**self).model_version()
    }
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }
}

/// Pure conversion of an entity into the canonical text an embedding model
/// sees. Kept separate from the provider so the text contract is stable
/// regardless of which model backs it.
pub struct TextConverters;

impl TextConverters {
    /// `"<type> <name> in <language>\n<truncated code>\n<documentation>"`.
    pub fn component(c: &Component) -> String {
        const MAX_CODE_CHARS: usize = 2000;
        let code = c.code.as_deref().unwrap_or("");
        let truncated: String = code.chars().take(MAX_CODE_CHARS).collect();
        let doc = c.metadata.documentation.as_deref().unwrap_or("");
        format!(
            "{} {} in {:?}\n{}\n{}",
            type_label(c.r#type),
            c.name,
            c.language,
            truncated,
            doc
        )
    }
}

fn type_label(t: ComponentType) -> &'static str {
    use ComponentType::*;
    match t {
        Class => "class",
        Interface => "interface",
        Struct => "struct",
        Enum => "enum",
        Method => "method",
        Function => "function",
        Property => "property",
        Field => "field",
        Event => "event",
        Namespace => "namespace",
        Module => "module",
        File => "file",
        Variable => "variable",
        Comment => "comment",
        Section => "section",
        Import => "import",
        ExternalModule => "external module",
        StdlibSymbol => "stdlib symbol",
        Generic => "generic",
        Unknown => "unknown",
    }
}

/// Metadata projection with volatile fields (`updatedAt`, `backend`,
/// `parsingLevel`) excluded, hashed alongside the converter output so a
/// change to a stable field still invalidates the cached embedding.
fn stable_metadata_json(m: &ComponentMetadata) -> String {
    serde_json::json!({
        "parameters": m.parameters,
        "return_type": m.return_type,
        "accessibility": m.accessibility,
        "is_static": m.is_static,
        "documentation": m.documentation,
        "attributes": m.attributes,
        "is_external": m.is_external,
        "external_kind": m.external_kind,
        "entity_type": m.entity_type,
    })
    .to_string()
}

/// Outcome of one batch: persisted rows plus whatever the provider failed on.
#[derive(Debug, Default)]
pub struct EmbedBatchOutcome {
    pub embedded: usize,
    pub skipped_fresh: usize,
    pub failed: Vec<String>,
}

pub struct EmbeddingOrchestrator<P: EmbeddingProvider> {
    provider: P,
    batch_size: usize,
}

impl<P: EmbeddingProvider> EmbeddingOrchestrator<P> {
    pub fn new(provider: P) -> Self {
        EmbeddingOrchestrator { provider, batch_size: 128 }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Embeds every component whose stored row is missing or stale
    /// (`content_hash`/`model_version` mismatch), writing surviving rows even
    /// if some entries in a batch error out.
    pub async fn embed_components(
        &self,
        components: &[Component],
        repo: &dyn EmbeddingRepository,
    ) -> EmbedBatchOutcome {
        let mut outcome = EmbedBatchOutcome::default();
        let mut due: Vec<(&Component, String, u128)> = Vec::new();

        for component in components {
            if component.code.as_deref().unwrap_or("").is_empty() {
                continue;
            }
            let text = TextConverters::component(component);
            let hash = fingerprint::content_hash(
                component.r#type,
                &component.name,
                &text,
                &stable_metadata_json(&component.metadata),
            );
            let entity_type = entity_type_tag(component.r#type);
            let fresh = repo
                .get_embedding(component.id, entity_type)
                .is_some_and(|row| row.content_hash == hash && row.model_version == self.provider.model_version());
            if fresh {
                outcome.skipped_fresh += 1;
                continue;
            }
            due.push((component, text, hash));
        }

        for chunk in due.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|(_, t, _)| t.clone()).collect();
            match self.provider.batch_embed(&texts).await {
                Ok(vectors) => {
                    for ((component, _, hash), vector) in chunk.iter().zip(vectors) {
                        repo.store(EmbeddingRow {
                            entity_id: component.id,
                            entity_type: entity_type_tag(component.r#type).to_string(),
                            vector,
                            model_version: self.provider.model_version().to_string(),
                            content_hash: *hash,
                        });
                        outcome.embedded += 1;
                    }
                }
                Err(e) => {
                    outcome.failed.extend(chunk.iter().map(|(c, _, _)| c.file_path.clone()));
                    tracing::warn!("embedding batch failed, {} rows not written: {e}", chunk.len());
                }
            }
        }

        outcome
    }
}

fn entity_type_tag(t: ComponentType) -> &'static str {
    type_label(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::model::{ComponentId, Location};
    use canopy_core::InMemoryStorage;

    struct StubProvider;

    #[async_trait::async_trait]
    impl EmbeddingProvider for StubProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0; 4])
        }
        async fn batch_embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
        }
        fn model_version(&self) -> &str {
            "stub-v1"
        }
        fn dimensions(&self) -> usize {
            4
        }
    }

    fn component(id: u128, code: &str) -> Component {
        Component {
            id: ComponentId(id),
            name: "greet".into(),
            r#type: ComponentType::Function,
            language: canopy_core::model::Language::Rust,
            file_path: "src/lib.rs".into(),
            location: Location { start_line: 1, end_line: 1, start_column: 1, end_column: 1 },
            code: Some(code.to_string()),
            metadata: ComponentMetadata::default(),
        }
    }

    #[tokio::test]
    async fn embeds_new_components_and_skips_fresh_ones() {
        let storage = InMemoryStorage::new();
        let orchestrator = EmbeddingOrchestrator::new(StubProvider);
        let c = component(1, "fn greet() {}");

        let outcome = orchestrator.embed_components(&[c.clone()], &storage).await;
        assert_eq!(outcome.embedded, 1);
        assert_eq!(outcome.skipped_fresh, 0);

        let outcome2 = orchestrator.embed_components(&[c], &storage).await;
        assert_eq!(outcome2.embedded, 0);
        assert_eq!(outcome2.skipped_fresh, 1);
    }

    #[tokio::test]
    async fn a_changed_body_invalidates_the_cached_row() {
        let storage = InMemoryStorage::new();
        let orchestrator = EmbeddingOrchestrator::new(StubProvider);
        let c1 = component(1, "fn greet() {}");
        orchestrator.embed_components(&[c1], &storage).await;

        let c2 = component(1, "fn greet() { println!(\"hi\"); }");
        let outcome = orchestrator.embed_components(&[c2], &storage).await;
        assert_eq!(outcome.embedded, 1);
    }

    #[tokio::test]
    async fn empty_code_produces_no_embedding() {
        let storage = InMemoryStorage::new();
        let orchestrator = EmbeddingOrchestrator::new(StubProvider);
        let mut c = component(1, "");
        c.code = None;
        let outcome = orchestrator.embed_components(&[c], &storage).await;
        assert_eq!(outcome.embedded, 0);
        assert_eq!(outcome.skipped_fresh, 0);
    }
}
