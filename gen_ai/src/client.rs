use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use common::env_config::GeminiConfig;

use crate::error::GenerateError;
use crate::parse::{RepurposedContent, parse_generated};
use crate::prompt::build_prompt;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// The generative-AI collaborator boundary: source text in, four
/// repurposed formats out. The ledger and the routes only ever see this
/// trait.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn repurpose(&self, source: &str) -> Result<RepurposedContent, GenerateError>;
}

/// Gemini REST client for content generation.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Self {
        GeminiClient {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    async fn generate_text(&self, prompt: &str) -> Result<String, GenerateError> {
        let url = format!("{API_BASE}/{}:generateContent", self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerateError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or(GenerateError::EmptyResponse)
    }
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn repurpose(&self, source: &str) -> Result<RepurposedContent, GenerateError> {
        let prompt = build_prompt(source);
        let raw = self.generate_text(&prompt).await?;
        log::debug!("gemini returned {} chars", raw.len());
        Ok(parse_generated(&raw)?)
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Canned generator for tests and offline development.
#[derive(Debug, Clone, Default)]
pub struct MockGenerator {
    /// Simulate an upstream failure instead of answering.
    pub simulate_failure: bool,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        MockGenerator {
            simulate_failure: true,
        }
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn repurpose(&self, source: &str) -> Result<RepurposedContent, GenerateError> {
        if self.simulate_failure {
            return Err(GenerateError::Api {
                status: 503,
                body: "simulated failure".to_string(),
            });
        }
        let preview: String = source.chars().take(48).collect();
        Ok(RepurposedContent {
            social: format!("Social posts about: {preview}"),
            email: format!("Newsletter about: {preview}"),
            linkedin: format!("LinkedIn thread about: {preview}"),
            youtube: format!("Video script about: {preview}"),
        })
    }
}
