//! Prompt payload assembly.
//!
//! Combines the system instruction (with the grounding context interpolated),
//! and a bounded trailing window of conversation turns into the ordered
//! message list sent to the synthesis service. The payload is built fresh
//! per query and discarded after the call returns.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default system instruction. `{context}` is replaced with the grounding
/// text. The answer-only-from-documents and admit-ignorance directions are a
/// hard requirement: they are the only mechanism steering the model away
/// from answering beyond the corpus.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are an assistant for internal office \
documents. Answer using only the document content provided below. If the documents do not \
contain the answer, say that you do not know rather than guessing. Keep answers concise.\n\n\
[Document content]\n{context}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged message in the synthesis request payload.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// One committed turn of a conversation. Appended strictly in order; never
/// persisted beyond the session.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// Build the prompt payload: a system message carrying the instruction with
/// `{context}` replaced by the grounding text, followed by the last `window`
/// turns of `history` in original order with roles preserved. Older turns
/// are dropped silently.
pub fn assemble(
    instruction: &str,
    grounding: &str,
    history: &[ConversationTurn],
    window: usize,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(window + 1);
    messages.push(ChatMessage {
        role: Role::System,
        content: instruction.replace("{context}", grounding),
    });

    let start = history.len().saturating_sub(window);
    for turn in &history[start..] {
        messages.push(ChatMessage {
            role: turn.role,
            content: turn.text.clone(),
        });
    }

    messages
}
