//! Chat completion against an Azure OpenAI deployment
//!
//! A [`Conversation`] owns the system prompt and the retained dialogue
//! history; a [`ChatCompleter`] turns a message list into a reply.

use std::fmt;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::{AzureOpenAiResource, ChatConfig, ChatSettings};
use crate::error::Service;
use crate::http::{build_client, network_error, send};
use crate::{Error, Result};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of a chat prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Parse and validate a raw JSON prompt list
///
/// The value must be an array of objects, each with a `role` of `system`,
/// `user` or `assistant` and a string `content`.
///
/// # Errors
///
/// Returns `Error::Prompt` describing the first violation
pub fn prompts_from_json(raw: &str) -> Result<Vec<ChatMessage>> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| Error::Prompt(format!("not valid JSON: {e}")))?;
    validate_prompts(&value)
}

/// Validate an already parsed prompt list
///
/// # Errors
///
/// Returns `Error::Prompt` describing the first violation
pub fn validate_prompts(value: &serde_json::Value) -> Result<Vec<ChatMessage>> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::Prompt("prompts must be a list".to_string()))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let obj = item
                .as_object()
                .ok_or_else(|| Error::Prompt(format!("prompt {i} must be an object")))?;

            let role = obj
                .get("role")
                .ok_or_else(|| Error::Prompt(format!("prompt {i} is missing 'role'")))?;
            let content = obj
                .get("content")
                .ok_or_else(|| Error::Prompt(format!("prompt {i} is missing 'content'")))?;

            let role = role
                .as_str()
                .and_then(Role::parse)
                .ok_or_else(|| Error::Prompt(format!("prompt {i} has invalid role {role}")))?;
            let content = content
                .as_str()
                .ok_or_else(|| Error::Prompt(format!("prompt {i} content must be a string")))?;

            Ok(ChatMessage {
                role,
                content: content.to_string(),
            })
        })
        .collect()
}

/// System prompt plus the dialogue retained between turns
#[derive(Debug, Clone)]
pub struct Conversation {
    system_prompt: String,
    history: Vec<ChatMessage>,
    history_limit: usize,
}

impl Conversation {
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, history_limit: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            history_limit,
        }
    }

    /// Conversation configured from chat parameters
    #[must_use]
    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.system_prompt.clone(), config.history_limit)
    }

    /// Prompt for a new user message: system, history, then the message
    #[must_use]
    pub fn prompt_for(&self, user_text: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(user_text));
        messages
    }

    /// Append a completed exchange and trim the oldest pairs past the limit
    pub fn record(&mut self, user_text: &str, reply: &str) {
        self.history.push(ChatMessage::user(user_text));
        self.history.push(ChatMessage::assistant(reply));

        while self.history.len() > self.history_limit {
            let drop = self.history.len().min(2);
            self.history.drain(..drop);
        }
    }

    /// Retained history, oldest first
    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

/// Produces a reply for a message list
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    /// Complete the prompt, returning the assistant's reply
    ///
    /// # Errors
    ///
    /// Returns error if the service call fails or returns no content
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Azure OpenAI chat completions client
pub struct AzureChatClient {
    client: reqwest::Client,
    resource: AzureOpenAiResource,
    model: String,
    params: ChatConfig,
}

impl AzureChatClient {
    /// Create a client from validated settings
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(settings: ChatSettings) -> Result<Self> {
        Ok(Self {
            client: build_client(settings.timeout)?,
            resource: settings.resource,
            model: settings.model,
            params: settings.params,
        })
    }

    /// Chat deployment in use
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatCompleter for AzureChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = CompletionRequest {
            messages,
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
            top_p: self.params.top_p,
            frequency_penalty: self.params.frequency_penalty,
            presence_penalty: self.params.presence_penalty,
        };
        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            "requesting chat completion"
        );

        let request = self
            .client
            .post(self.resource.deployment_url(&self.model, "chat/completions"))
            .header("api-key", self.resource.api_key.expose_secret())
            .json(&body);
        let response = send(Service::Chat, request).await?;

        let result: CompletionResponse = response
            .json()
            .await
            .map_err(|e| network_error(Service::Chat, e))?;
        let reply = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Chat("completion returned no content".to_string()))?;

        tracing::info!(response = %reply, "chat completion received");
        Ok(reply)
    }
}
