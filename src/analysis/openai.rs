//! OpenAI chat completions analyst.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::{Analyst, HeuristicAnalyst};
use crate::news::NewsItem;
use crate::store::Language;

pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("OpenAI request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI answered with HTTP {0}")]
    Status(u16),

    #[error("OpenAI returned no content")]
    Empty,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Analyst backed by an OpenAI chat model.
pub struct OpenAiAnalyst {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    fallback: HeuristicAnalyst,
}

impl OpenAiAnalyst {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: OPENAI_ENDPOINT.to_owned(),
            fallback: HeuristicAnalyst,
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, AnalysisError> {
        let request = CompletionRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: 0.7,
            max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AnalysisError::Status(response.status().as_u16()));
        }

        let body: CompletionResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty())
            .ok_or(AnalysisError::Empty)
    }
}

fn language_name(lang: Language) -> &'static str {
    match lang {
        Language::Ru => "Russian",
        Language::En => "English",
    }
}

#[async_trait]
impl Analyst for OpenAiAnalyst {
    async fn summary(&self, item: &NewsItem, lang: Language) -> String {
        let prompt = format!(
            "Analyze TON news ({}, 2 sentences): {}",
            language_name(lang),
            item.title()
        );
        match self.complete(&prompt, 100).await {
            Ok(text) => text,
            Err(e) => {
                warn!("AI analysis failed, using heuristic: {}", e);
                self.fallback.summary(item, lang).await
            }
        }
    }

    async fn price_impact(&self, item: &NewsItem, lang: Language) -> String {
        let prompt = format!(
            "Analyze this TON/crypto news and predict price impact in {}:\n\
             Title: {}\n\
             Content: {}\n\n\
             Respond with ONLY one of these formats:\n\
             📈 Growth - Brief explanation (max 15 words)\n\
             📉 Decline - Brief explanation (max 15 words)\n\
             ↔️ Neutral - Brief explanation (max 15 words)",
            language_name(lang),
            item.title(),
            item.body()
        );
        match self.complete(&prompt, 80).await {
            Ok(text) => text,
            Err(e) => {
                warn!("AI price impact failed, using heuristic: {}", e);
                self.fallback.price_impact(item, lang).await
            }
        }
    }
}
