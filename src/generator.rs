use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, warn};

use crate::error::{RagError, Result};
use crate::provider::ProviderClient;

/// Prompt-in, text-out language model.
pub trait TextGenerator: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Outcome of one generation call. `Failed` renders with an `ERROR:` prefix
/// so it can be shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Ok(String),
    Failed(String),
}

impl Generation {
    pub fn is_ok(&self) -> bool {
        matches!(self, Generation::Ok(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Generation::Ok(text) => Some(text),
            Generation::Failed(_) => None,
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Ok(text) => f.write_str(text),
            Generation::Failed(reason) => write!(f, "ERROR: {}", reason),
        }
    }
}

/// Runs `prompt` through `generator`, folding raised and empty responses into
/// [`Generation::Failed`].
pub fn generate(generator: &dyn TextGenerator, prompt: &str) -> Generation {
    match generator.complete(prompt) {
        Ok(text) if text.trim().is_empty() => {
            warn!("Generation model returned an empty response");
            Generation::Failed(
                "the model returned an empty response for test case generation".to_string(),
            )
        }
        Ok(text) => {
            debug!("Generated {} characters", text.len());
            Generation::Ok(text)
        }
        Err(e) => {
            error!("Error during test case generation: {}", e);
            Generation::Failed(format!("failed calling the generation model: {}", e))
        }
    }
}

/// Chat-completions endpoint of an OpenAI-compatible provider.
pub struct ChatClient {
    provider: ProviderClient,
    model: String,
}

impl ChatClient {
    pub fn new(provider: ProviderClient, model: &str) -> Self {
        Self {
            provider,
            model: model.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl TextGenerator for ChatClient {
    fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let response: ChatResponse = self.provider.post_json("chat/completions", &request)?;
        debug!("Response choices length: {}", response.choices.len());
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Upstream("response had no choices".to_string()))?;
        choice.message.content.ok_or(RagError::EmptyResponse)
    }
}
