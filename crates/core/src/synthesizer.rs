use crate::conversation::ConversationLog;
use crate::error::InferenceError;
use crate::llm::{ChatModel, ChatRequest};
use crate::models::RetrievedChunk;

pub const ANSWER_PROMPT: &str = "You are an expert document analyst. Answer the question \
using only the pieces of retrieved context below. If the context does not contain the \
answer, say that you don't know instead of making one up. Be precise and professional.";

/// Joins chunk texts in rank order, separated by blank lines.
pub fn render_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|retrieved| retrieved.chunk.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn answer_system_prompt(chunks: &[RetrievedChunk]) -> String {
    format!("{ANSWER_PROMPT}\n\nContext:\n{}", render_context(chunks))
}

/// Answers `question` from `chunks`. The model output is returned untouched.
pub async fn synthesize<M>(
    model: &M,
    question: &str,
    chunks: &[RetrievedChunk],
    history: &ConversationLog,
) -> Result<String, InferenceError>
where
    M: ChatModel + ?Sized,
{
    let request = ChatRequest::new(answer_system_prompt(chunks), history, question);
    model.complete(&request).await
}
