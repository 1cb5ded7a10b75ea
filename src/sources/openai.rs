//! Title guessing through an OpenAI-compatible chat completions endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ResolverConfig;
use crate::sources::{SourceError, TitleGuess, TitleGuesser};
use crate::utils::{status_error, HttpClient};

const SYSTEM_PROMPT: &str = "You extract bibliographic metadata from the first pages of \
academic papers. Reply with a single JSON object with the keys \"title\" (string), \
\"authors\" (array of strings, in order) and \"year\" (integer or null). \
Do not add any other text.";

/// Guesser backed by `/chat/completions`
#[derive(Debug, Clone)]
pub struct OpenAiGuesser {
    client: Arc<HttpClient>,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiGuesser {
    pub fn new(config: &ResolverConfig, api_key: &str) -> Result<Self, SourceError> {
        if api_key.trim().is_empty() {
            return Err(SourceError::NotConfigured("empty OpenAI API key".to_string()));
        }
        Ok(Self {
            client: Arc::new(HttpClient::new()?),
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            model: config.llm_model.clone(),
            api_key: api_key.trim().to_string(),
        })
    }
}

#[async_trait]
impl TitleGuesser for OpenAiGuesser {
    fn id(&self) -> &str {
        "openai"
    }

    async fn guess(&self, snippet: &str) -> Result<TitleGuess, SourceError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: snippet.to_string(),
                },
            ],
            temperature: Some(0.0),
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response, "Chat completions").await);
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SourceError::Parse("response has no choices".to_string()))?;

        parse_guess(&content)
    }
}

/// Read the model's JSON reply, tolerating a Markdown code fence around it
fn parse_guess(content: &str) -> Result<TitleGuess, SourceError> {
    let trimmed = content.trim();
    let json = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => {
            return Err(SourceError::Parse(format!(
                "no JSON object in reply: {}",
                trimmed.chars().take(80).collect::<String>()
            )))
        }
    };

    let mut guess: TitleGuess = serde_json::from_str(json)?;
    guess.title = guess.title.split_whitespace().collect::<Vec<_>>().join(" ");
    if guess.title.is_empty() {
        return Err(SourceError::Parse("model returned an empty title".to_string()));
    }
    guess.authors.retain(|a| !a.trim().is_empty());
    Ok(guess)
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
