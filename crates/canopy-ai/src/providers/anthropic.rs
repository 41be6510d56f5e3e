//! Anthropic-backed `AnalysisProvider` for the supplemental AI-assisted
//! relationship pass (§4.10.1). Routed through OpenRouter's OpenAI-compatible
//! chat endpoint, as the teacher's bridge already did.

use anyhow::{Context, Result};
use canopy_core::model::ComponentId;
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisProvider, AnalysisRequest, AnalysisResult, InferredRelationship, SemanticRelationship};

pub struct AnthropicAnalysisProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicAnalysisProvider {
    pub fn new(api_key: Option<String>) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
            .unwrap_or_default();

        Self { client: reqwest::Client::new(), api_key, model: "anthropic/claude-3-haiku-20240307".to_string() }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnalysisResponseJson {
    relationships: Vec<InferredRelationshipJson>,
    explanation: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct InferredRelationshipJson {
    source_id: u128,
    target_id: u128,
    relationship: String,
    confidence: f32,
    explanation: String,
    line_reference: Option<u32>,
}

fn parse_relationship(tag: &str) -> Option<SemanticRelationship> {
    match tag {
        "Calls" => Some(SemanticRelationship::Calls),
        "DependsOn" => Some(SemanticRelationship::DependsOn),
        "Implements" => Some(SemanticRelationship::Implements),
        "Extends" => Some(SemanticRelationship::Extends),
        "Uses" => Some(SemanticRelationship::Uses),
        "SemanticReference" => Some(SemanticRelationship::SemanticReference),
        _ => None,
    }
}

#[async_trait::async_trait]
impl AnalysisProvider for AnthropicAnalysisProvider {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
        let candidates_desc = request
            .candidates
            .iter()
            .map(|c| format!("- {} (id: {}, type: {:?}, lines {}-{})", c.name, c.id.0, c.r#type, c.location.start_line, c.location.end_line))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            r#"You are a code analysis expert. Identify semantic relationships between the source element and the candidate elements below.

File: {}
Language: {}
Source element: {} (id: {}, lines {}-{})

Source code:
```
{}
```

Candidate elements:
{}

Look for: Calls, DependsOn, Implements, Extends, Uses, SemanticReference.

Respond with JSON exactly in this shape:
{{
  "relationships": [
    {{"source_id": {}, "target_id": <candidate_id>, "relationship": "Calls|DependsOn|Implements|Extends|Uses|SemanticReference", "confidence": 0.0-1.0, "explanation": "...", "line_reference": <line_or_null>}}
  ],
  "explanation": "overall summary"
}}"#,
            request.context.file_path,
            request.context.language,
            request.source.name,
            request.source.id.0,
            request.source.location.start_line,
            request.source.location.end_line,
            request.source.code.as_deref().unwrap_or(""),
            candidates_desc,
            request.source.id.0,
        );

        let chat_request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: "You are a code analysis expert. Respond only with valid JSON.".to_string() },
                ChatMessage { role: "user".to_string(), content: prompt },
            ],
            temperature: 0.1,
            max_tokens: 1200,
        };

        let response = self
            .client
            .post("https://openrouter.ai/api/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&chat_request)
            .send()
            .await
            .context("failed to send request to OpenRouter")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenRouter API error: {error_text}");
        }

        let chat_response: ChatResponse = response.json().await.context("failed to parse OpenRouter response")?;
        let content = &chat_response.choices[0].message.content;
        let analysis: AnalysisResponseJson = serde_json::from_str(content).context("failed to parse analysis JSON from model output")?;

        let relationships = analysis
            .relationships
            .into_iter()
            .filter_map(|r| {
                Some(InferredRelationship {
                    source_id: ComponentId(r.source_id),
                    target_id: ComponentId(r.target_id),
                    relationship: parse_relationship(&r.relationship)?,
                    confidence: r.confidence,
                    explanation: r.explanation,
                    line_reference: r.line_reference,
                })
            })
            .collect();

        Ok(AnalysisResult {
            relationships,
            explanation: analysis.explanation,
            tokens_used: chat_response.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }

    fn name(&self) -> &str {
        "anthropic (via openrouter)"
    }
}
