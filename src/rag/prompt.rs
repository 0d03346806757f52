//! Prompt assembly for a conversational RAG turn.

use super::traits::RetrievedChunk;
use crate::sessions::{Message, Role};

const SYSTEM_PREAMBLE: &str =
    "You are a helpful AI assistant. Maintain a friendly tone and answer clearly.";

const HISTORY_PREAMBLE: &str = "You are a helpful AI assistant. Below is the previous conversation \
history to maintain context. Use it to understand ongoing topics, preferences, and references.";

const HISTORY_CLOSING: &str =
    "Continue the conversation, referring to the relevant parts of the history when helpful.";

const CONTEXT_INSTRUCTIONS: &str = "Use the following pieces of context to answer the question \
at the end. If you don't know the answer, just say that you don't know, don't try to make up an answer.";

const NO_CONTEXT: &str = "(no relevant documents were found)";

/// System text carrying the prior conversation, one `Role: content` line per message.
pub fn render_history(history: &[Message]) -> String {
    if history.is_empty() {
        return SYSTEM_PREAMBLE.to_string();
    }

    let mut lines = Vec::with_capacity(history.len() + 2);
    lines.push(HISTORY_PREAMBLE.to_string());
    for message in history {
        let speaker = match message.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        lines.push(format!("{speaker}: {}", message.content.trim()));
    }
    lines.push(HISTORY_CLOSING.to_string());
    lines.join("\n")
}

/// Full prompt: conversation history, retrieved context, then the question.
pub fn build_prompt(history: &[Message], sources: &[RetrievedChunk], question: &str) -> String {
    let context = if sources.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        sources
            .iter()
            .map(|chunk| chunk.text.trim())
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "{}\n\n{CONTEXT_INSTRUCTIONS}\n\nContext: {context}\n\nQuestion: {}\n\nAnswer:",
        render_history(history),
        question.trim()
    )
}
