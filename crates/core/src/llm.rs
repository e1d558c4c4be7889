use crate::conversation::ConversationLog;
use crate::error::InferenceError;
use crate::models::Role;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_CHAT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_CHAT_MODEL: &str = "llama3-8b-8192";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// One inference call: system instruction, prior messages, then the human turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub history: Vec<ChatMessage>,
    pub input: String,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, history: &ConversationLog, input: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            history: history
                .turns()
                .iter()
                .map(|turn| ChatMessage {
                    role: turn.role,
                    content: turn.content.clone(),
                })
                .collect(),
            input: input.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, InferenceError>;
}

/// Chat client for OpenAI-compatible `/chat/completions` APIs (Groq by default).
pub struct OpenAiCompatibleChat {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<usize>,
}

impl OpenAiCompatibleChat {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: Option<usize>,
        timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: base.join("chat/completions")?,
            api_key: api_key.into(),
            model: model.into(),
            temperature,
            max_tokens,
        })
    }

    fn provider(&self) -> String {
        self.endpoint.host_str().unwrap_or("llm").to_string()
    }

    fn body<'a>(&'a self, request: &'a ChatRequest) -> CompletionRequest<'a> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(WireMessage {
            role: "system",
            content: &request.system,
        });
        messages.extend(request.history.iter().map(|message| WireMessage {
            role: match message.role {
                Role::Human => "user",
                Role::Assistant => "assistant",
            },
            content: &message.content,
        }));
        messages.push(WireMessage {
            role: "user",
            content: &request.input,
        });

        CompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String, InferenceError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.trim())
            .json(&self.body(request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(InferenceError::Upstream {
                provider: self.provider(),
                status,
                body,
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| InferenceError::EmptyResponse {
                provider: self.provider(),
            })
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}
