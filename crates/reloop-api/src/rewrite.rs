use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use reloop_types::api::RewriteResponse;

const SYSTEM_PROMPT: &str = "You are an AI assistant specializing in waste management and \
     environmental sustainability. Your task is to analyze waste descriptions and provide \
     recommendations for repurposing or disposal.";

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("text-generation API key is not configured")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("service returned {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },
    #[error("response contained no completion")]
    EmptyCompletion,
}

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct DescriptionRewriter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl DescriptionRewriter {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
        }
    }

    /// Ask the model to analyse a listing. `original_desc` is the prompt that
    /// was sent, `improved_desc` the model's answer.
    pub async fn rewrite(&self, title: &str, _category: &str) -> Result<RewriteResponse, RewriteError> {
        let api_key = self.api_key.as_deref().ok_or(RewriteError::MissingApiKey)?;
        let prompt = prompt_for(title);

        let body = json!({
            "model": self.model,
            "messages": [
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: &prompt },
            ],
        });

        let url = format!("{}/chat/completions", self.base_url);
        debug!("Requesting description rewrite from {}", url);
        let response = self.client.post(&url).bearer_auth(api_key).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RewriteError::Status { status, body });
        }

        let completion: Completion = response.json().await?;
        let improved = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(RewriteError::EmptyCompletion)?;

        Ok(RewriteResponse { original_desc: prompt, improved_desc: improved })
    }
}

pub fn prompt_for(title: &str) -> String {
    format!(
        "Analyze the following waste: \"{title}\". Provide the following details:\n\
         1. What type of waste is it?\n\
         2. What can it be repurposed or made into?\n\
         3. How should it be disposed of properly (recycled, composted, or other)?"
    )
}
