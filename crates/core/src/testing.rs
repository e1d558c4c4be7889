use crate::error::{IngestError, InferenceError};
use crate::extractor::PdfExtractor;
use crate::llm::{ChatModel, ChatRequest};
use crate::models::PageText;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Replays canned replies in order and records every request it receives.
#[derive(Default)]
pub struct ScriptedChat {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.replies.lock().push_back(Ok(text.to_string()));
        self
    }

    /// Queues an upstream failure carrying `body` verbatim.
    pub fn fail(self, body: &str) -> Self {
        self.replies.lock().push_back(Err(body.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String, InferenceError> {
        self.requests.lock().push(request.clone());
        match self.replies.lock().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(body)) => Err(InferenceError::Upstream {
                provider: "scripted".to_string(),
                status: 429,
                body,
            }),
            None => Err(InferenceError::EmptyResponse {
                provider: "scripted".to_string(),
            }),
        }
    }
}

/// Answers without scripting: rewrites echo the question, answers quote it.
#[derive(Default)]
pub struct EchoChat;

#[async_trait]
impl ChatModel for EchoChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String, InferenceError> {
        tokio::task::yield_now().await;
        if request.system == crate::rewriter::CONTEXTUALIZE_PROMPT {
            Ok(request.input.clone())
        } else {
            Ok(format!("answer to: {}", request.input))
        }
    }
}

/// Treats upload bytes as UTF-8 text with pages separated by form feeds.
pub struct TextExtractor;

impl PdfExtractor for TextExtractor {
    fn extract(&self, source: &str, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let text = std::str::from_utf8(bytes).map_err(|error| IngestError::Extraction {
            source_name: source.to_string(),
            reason: error.to_string(),
        })?;
        Ok(text
            .split('\u{000c}')
            .enumerate()
            .map(|(index, page)| PageText {
                source: source.to_string(),
                page: index as u32 + 1,
                text: page.to_string(),
            })
            .collect())
    }
}
