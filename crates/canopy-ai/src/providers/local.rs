//! Deterministic, offline embedding adapter: hashes the input text into a
//! fixed-dimensionality vector. No network dependency; used in tests and as
//! an offline fallback when no real embedding model is configured.

use anyhow::Result;
use xxhash_rust::xxh3::xxh3_128;

use crate::embedding::EmbeddingProvider;

pub struct LocalEmbeddingProvider {
    dimensions: usize,
}

impl LocalEmbeddingProvider {
    pub fn new() -> Self {
        Self { dimensions: 32 }
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }
}

impl Default for LocalEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let seeded = format!("{i}:{text}");
            let hash = xxh3_128(seeded.as_bytes());
            // Fold the 128-bit digest into a value in [-1.0, 1.0].
            let component = ((hash as u64 % 2_000_001) as f32 / 1_000_000.0) - 1.0;
            vector.push(component);
        }
        Ok(vector)
    }

    async fn batch_embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn model_version(&self) -> &str {
        "local-hash-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedding_is_deterministic_for_the_same_text() {
        let provider = LocalEmbeddingProvider::new();
        let a = provider.embed("fn greet() {}").await.unwrap();
        let b = provider.embed("fn greet() {}").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_text_yields_a_different_vector() {
        let provider = LocalEmbeddingProvider::new();
        let a = provider.embed("fn greet() {}").await.unwrap();
        let b = provider.embed("fn farewell() {}").await.unwrap();
        assert_ne!(a, b);
    }
}
