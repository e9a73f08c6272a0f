//! Prompt enhancement through the chat-completion endpoint.
//!
//! Enhancement is best-effort flavor: when it cannot run (disabled, no
//! credential, no author persona) the original prompt passes through
//! unchanged, and an empty completion degrades the same way.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::DalleConfig;
use crate::error::Result;
use crate::openai::{ChatMessage, ChatRequest, ChatResponse, provider_error};

/// Fixed sampling seed so enhancement stays as reproducible as the
/// provider allows.
const ENHANCE_SEED: i64 = 1337;
const ENHANCE_TEMPERATURE: f64 = 0.2;

/// Calls the chat-completion endpoint to rewrite the main prompt in the
/// author persona's voice.
pub struct Enhancer {
    client: reqwest::Client,
    config: Arc<DalleConfig>,
}

impl Enhancer {
    pub fn new(client: reqwest::Client, config: Arc<DalleConfig>) -> Self {
        Self { client, config }
    }

    /// Enhance `prompt` using `author_context` as the system persona.
    ///
    /// Short-circuits to the original prompt when enhancement is
    /// disabled, the API key is absent, or the persona is empty.
    pub async fn enhance(&self, prompt: &str, author_context: &str) -> Result<String> {
        if self.config.enhance_disabled {
            debug!("enhancement disabled by flag");
            return Ok(prompt.to_string());
        }
        let Some(api_key) = self.config.api_key.as_deref() else {
            debug!("enhancement skipped, no api key");
            return Ok(prompt.to_string());
        };
        if author_context.is_empty() {
            debug!("enhancement skipped, empty author context");
            return Ok(prompt.to_string());
        }

        let payload = ChatRequest {
            model: self.config.chat_model.clone(),
            seed: ENHANCE_SEED,
            temperature: ENHANCE_TEMPERATURE,
            messages: vec![
                ChatMessage::system(author_context),
                ChatMessage::user(prompt),
            ],
        };

        let start = Instant::now();
        debug!(url = %self.config.chat_url, model = %payload.model, "sending enhancement request");
        let response = self
            .client
            .post(&self.config.chat_url)
            .bearer_auth(api_key)
            .timeout(self.config.chat_timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        info!(status = %status, elapsed = ?start.elapsed(), "enhancement response");
        if !status.is_success() {
            return Err(provider_error(status.as_u16(), &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).unwrap_or_default();
        match parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.is_empty())
        {
            Some(content) => Ok(content),
            None => {
                warn!("enhancement returned no content, keeping original prompt");
                Ok(prompt.to_string())
            }
        }
    }
}
