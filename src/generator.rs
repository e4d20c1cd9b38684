use async_trait::async_trait;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use thiserror::Error;

use crate::{config::OpenAiConfig, error::GatewayError, models::Blueprint};

/// GenerationError
///
/// Failure of the AI generation collaborator. Always surfaced as `ExternalFailure`.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("generation provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("generation provider returned an unusable document: {0}")]
    Malformed(String),
}

impl From<GenerationError> for GatewayError {
    fn from(err: GenerationError) -> Self {
        tracing::error!("blueprint generation failure: {}", err);
        GatewayError::ExternalFailure(err.to_string())
    }
}

/// BlueprintGenerator Trait
///
/// The AI generation call, treated as opaque: two strings in, a structured document out.
#[async_trait]
pub trait BlueprintGenerator: Send + Sync {
    async fn generate(&self, idea: &str, audience: &str) -> Result<Blueprint, GenerationError>;
}

/// GeneratorState
///
/// The concrete type used to share the generator across the application state.
pub type GeneratorState = Arc<dyn BlueprintGenerator>;

const SYSTEM_PROMPT: &str = "You are a startup analyst. Reply with a single JSON object with the keys \
title, summary, target_audience, problems, features, revenue_streams, risks, next_steps. \
List-valued keys hold arrays of short strings.";

/// OpenAiGenerator
///
/// Calls an OpenAI-compatible chat completion endpoint in JSON mode.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    completions_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(config: &OpenAiConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            completions_url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl BlueprintGenerator for OpenAiGenerator {
    async fn generate(&self, idea: &str, audience: &str) -> Result<Blueprint, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!("Idea: {}\nTarget audience: {}", idea, audience),
                },
            ],
        });

        let response = self
            .client
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Provider { status, body });
        }

        let completion = response.json::<CompletionResponse>().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Malformed("empty completion".to_string()))?;

        serde_json::from_str::<Blueprint>(&content)
            .map_err(|e| GenerationError::Malformed(e.to_string()))
    }
}

/// CannedGenerator
///
/// Deterministic stand-in for local development without an API key.
#[derive(Clone, Default)]
pub struct CannedGenerator;

#[async_trait]
impl BlueprintGenerator for CannedGenerator {
    async fn generate(&self, idea: &str, audience: &str) -> Result<Blueprint, GenerationError> {
        Ok(Blueprint {
            title: idea.chars().take(60).collect(),
            summary: format!("{} for {}", idea, audience),
            target_audience: audience.to_string(),
            problems: vec![format!("{} lack a focused tool for this", audience)],
            features: vec!["Core workflow".to_string(), "Onboarding".to_string()],
            revenue_streams: vec!["Subscription".to_string()],
            risks: vec!["Unvalidated demand".to_string()],
            next_steps: vec![format!("Interview five people from {}", audience)],
        })
    }
}
