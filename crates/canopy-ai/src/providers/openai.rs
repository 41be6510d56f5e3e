//! OpenAI embeddings adapter (`/v1/embeddings`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;

pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl OpenAIEmbeddingProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.unwrap_or_else(|| std::env::var("OPENAI_API_KEY").unwrap_or_default()),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }

    pub fn with_model(mut self, model: String, dimensions: usize) -> Self {
        self.model = model;
        self.dimensions = dimensions;
        self
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.batch_embed(std::slice::from_ref(&text.to_string())).await?;
        results.pop().context("OpenAI returned no embeddings for a single-text request")
    }

    async fn batch_embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest { model: &self.model, input: texts };

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("failed to send request to OpenAI embeddings endpoint")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI embeddings API error: {error_text}");
        }

        let mut body: EmbeddingsResponse = response.json().await.context("failed to parse OpenAI embeddings response")?;
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_version(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
