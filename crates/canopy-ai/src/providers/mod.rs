//! Concrete embedding / analysis provider adapters.

pub mod anthropic;
pub mod local;
pub mod openai;

use anyhow::Result;

use crate::analysis::AnalysisProvider;
use crate::embedding::EmbeddingProvider;

pub fn create_embedding_provider(provider_name: &str, api_key: Option<String>) -> Result<Box<dyn EmbeddingProvider>> {
    match provider_name {
        "openai" => Ok(Box::new(openai::OpenAIEmbeddingProvider::new(api_key))),
        "local" => Ok(Box::new(local::LocalEmbeddingProvider::new())),
        _ => anyhow::bail!("unknown embedding provider: {provider_name}"),
    }
}

pub fn create_analysis_provider(provider_name: &str, api_key: Option<String>) -> Result<Box<dyn AnalysisProvider>> {
    match provider_name {
        "anthropic" => Ok(Box::new(anthropic::AnthropicAnalysisProvider::new(api_key))),
        _ => anyhow::bail!("unknown analysis provider: {provider_name}"),
    }
}
