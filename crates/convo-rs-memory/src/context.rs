//! Context window projection for language-model callers.

use crate::model::{Role, UserMemory};
use serde::{Deserialize, Serialize};

/// Base instruction placed at the start of every system entry.
pub const BASE_INSTRUCTION: &str = "You are a friendly and helpful AI assistant. You remember our earlier conversation and keep your replies consistent with it.";
/// Clause appended for `tone = "formal"`.
pub const FORMAL_DIRECTIVE: &str = " Please respond in a polite, formal tone.";
/// Clause appended for `tone = "casual"`.
pub const CASUAL_DIRECTIVE: &str = " Please respond in a relaxed, casual tone.";
/// Preference key selecting the reply tone.
pub const TONE_PREFERENCE: &str = "tone";
/// Older records stored the tone under this key.
const LEGACY_TONE_PREFERENCE: &str = "language";
/// Conversations longer than this mention how many exchanges took place.
const CONTINUITY_THRESHOLD: u64 = 10;

/// Role of an entry in a context window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContextRole {
    System,
    User,
    Assistant,
}

impl From<Role> for ContextRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => ContextRole::User,
            Role::Assistant => ContextRole::Assistant,
        }
    }
}

/// A `{role, content}` pair handed to a language model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextMessage {
    pub role: ContextRole,
    pub content: String,
}

impl ContextMessage {
    pub fn new(role: ContextRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Build the system entry plus the last `max_messages` turns, oldest first.
///
/// The result always starts with the system entry, so it is never empty.
pub fn build_context(memory: &UserMemory, max_messages: usize) -> Vec<ContextMessage> {
    let messages = memory.messages();
    let start = messages.len().saturating_sub(max_messages);
    let window = &messages[start..];

    let mut context = Vec::with_capacity(window.len() + 1);
    context.push(ContextMessage::new(
        ContextRole::System,
        system_prompt(memory),
    ));
    context.extend(
        window
            .iter()
            .map(|message| ContextMessage::new(message.role.into(), message.content.clone())),
    );
    context
}

/// Synthesize the system instruction from a user's preferences.
pub fn system_prompt(memory: &UserMemory) -> String {
    let mut prompt = BASE_INSTRUCTION.to_string();

    let tone = memory
        .preference(TONE_PREFERENCE)
        .or_else(|| memory.preference(LEGACY_TONE_PREFERENCE));
    match tone {
        Some("formal") => prompt.push_str(FORMAL_DIRECTIVE),
        Some("casual") => prompt.push_str(CASUAL_DIRECTIVE),
        _ => {}
    }

    if memory.total_messages() > CONTINUITY_THRESHOLD {
        prompt.push_str(&format!(
            " We have exchanged {} messages so far.",
            memory.total_messages()
        ));
    }
    prompt
}
