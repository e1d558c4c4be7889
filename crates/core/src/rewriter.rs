use crate::conversation::ConversationLog;
use crate::error::InferenceError;
use crate::llm::{ChatModel, ChatRequest};

pub const CONTEXTUALIZE_PROMPT: &str = "Given a chat history and the latest user question, \
which might reference context in the chat history, rewrite the question as a standalone \
question that can be understood without the chat history. Return only the rewritten \
question. Do not answer it and do not add any commentary. If the question is already \
standalone, return it unchanged.";

/// Restates `question` so it no longer depends on `history`. The model is
/// called even when the history is empty.
pub async fn rewrite<M>(
    model: &M,
    history: &ConversationLog,
    question: &str,
) -> Result<String, InferenceError>
where
    M: ChatModel + ?Sized,
{
    let request = ChatRequest::new(CONTEXTUALIZE_PROMPT, history, question);
    let rewritten = model.complete(&request).await?;
    let rewritten = rewritten.trim();

    if rewritten.is_empty() {
        Ok(question.to_string())
    } else {
        Ok(rewritten.to_string())
    }
}
