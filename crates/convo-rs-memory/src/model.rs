//! Chat turn and per-user memory records.

use crate::error::MemoryError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Speaker role for a stored turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User-authored turn.
    User,
    /// Assistant-authored turn.
    Assistant,
}

impl Role {
    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = MemoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(MemoryError::validation(format!("unknown role: {other}"))),
        }
    }
}

/// Provenance tag for a turn. Not interpreted by the memory core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Voice,
    Image,
}

impl MessageType {
    /// Return the message type as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Voice => "voice",
            MessageType::Image => "image",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = MemoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(MessageType::Text),
            "voice" => Ok(MessageType::Voice),
            "image" => Ok(MessageType::Image),
            other => Err(MemoryError::validation(format!(
                "unknown message type: {other}"
            ))),
        }
    }
}

/// A single chat turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Who produced the turn.
    pub role: Role,
    /// Turn text.
    pub content: String,
    /// Creation timestamp.
    pub timestamp: DateTime<Utc>,
    /// Provenance tag.
    #[serde(default)]
    pub message_type: MessageType,
}

impl ChatMessage {
    /// Create a turn stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>, message_type: MessageType) -> Self {
        Self::with_timestamp(role, content, message_type, Utc::now())
    }

    /// Create a turn with an explicit timestamp.
    pub fn with_timestamp(
        role: Role,
        content: impl Into<String>,
        message_type: MessageType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
            message_type,
        }
    }
}

/// Bounded history, preferences and bookkeeping for one user.
///
/// Fields are private so that the ordering and counter invariants can only be
/// changed through [`UserMemory::append`] and [`UserMemory::set_preference`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserMemory {
    user_id: String,
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    preferences: BTreeMap<String, String>,
    #[serde(default)]
    total_messages: u64,
    last_interaction: DateTime<Utc>,
}

impl UserMemory {
    /// Create an empty record for a user.
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            messages: Vec::new(),
            preferences: BTreeMap::new(),
            total_messages: 0,
            last_interaction: now,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Retained turns, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn preferences(&self) -> &BTreeMap<String, String> {
        &self.preferences
    }

    pub fn preference(&self, key: &str) -> Option<&str> {
        self.preferences.get(key).map(String::as_str)
    }

    /// Count of every turn ever appended, including evicted ones.
    pub fn total_messages(&self) -> u64 {
        self.total_messages
    }

    pub fn last_interaction(&self) -> DateTime<Utc> {
        self.last_interaction
    }

    /// Append a turn and evict the oldest turns beyond `max_messages`.
    ///
    /// Returns the number of evicted turns. A timestamp earlier than the
    /// current tail is clamped so the history stays ordered.
    pub fn append(&mut self, mut message: ChatMessage, max_messages: usize) -> usize {
        if let Some(last) = self.messages.last()
            && message.timestamp < last.timestamp
        {
            message.timestamp = last.timestamp;
        }
        self.touch(message.timestamp);
        self.messages.push(message);
        self.total_messages += 1;
        self.retain_latest(max_messages)
    }

    /// Evict the oldest turns beyond `max_messages`. Returns how many went.
    ///
    /// `total_messages` is unaffected.
    pub fn retain_latest(&mut self, max_messages: usize) -> usize {
        let overflow = self.messages.len().saturating_sub(max_messages);
        if overflow > 0 {
            self.messages.drain(..overflow);
        }
        overflow
    }

    /// Insert or replace a preference value.
    pub fn set_preference(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.preferences.insert(key.into(), value.into());
        self.touch(now);
    }

    /// Immutable copy for readers.
    pub fn snapshot(&self) -> UserMemory {
        self.clone()
    }

    /// Whether the user has been inactive for longer than `expire_days`.
    pub fn is_expired(&self, now: DateTime<Utc>, expire_days: u32) -> bool {
        now.signed_duration_since(self.last_interaction) > Duration::days(i64::from(expire_days))
    }

    /// Repair invariants on a record read from storage.
    pub fn normalized(mut self) -> Self {
        self.messages.sort_by_key(|message| message.timestamp);
        let retained = self.messages.len() as u64;
        if self.total_messages < retained {
            self.total_messages = retained;
        }
        self
    }

    /// Derive usage statistics from the retained turns.
    pub fn stats(&self) -> UserStats {
        let mut stats = UserStats::empty(self.user_id.clone());
        stats.total_messages = self.total_messages;
        stats.messages_in_store = self.messages.len();
        for message in &self.messages {
            match message.message_type {
                MessageType::Text => stats.text_messages += 1,
                MessageType::Voice => stats.voice_messages += 1,
                MessageType::Image => stats.image_messages += 1,
            }
            match message.role {
                Role::User => stats.user_messages += 1,
                Role::Assistant => stats.assistant_messages += 1,
            }
        }
        stats.last_interaction = Some(self.last_interaction);
        stats.preferences = self.preferences.clone();
        stats
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_interaction {
            self.last_interaction = at;
        }
    }
}

/// Usage statistics for one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserStats {
    pub user_id: String,
    pub total_messages: u64,
    pub messages_in_store: usize,
    pub voice_messages: usize,
    pub text_messages: usize,
    pub image_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    /// None for a user with no stored record.
    pub last_interaction: Option<DateTime<Utc>>,
    pub preferences: BTreeMap<String, String>,
}

impl UserStats {
    /// Zeroed stats, as reported for unseen users.
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            total_messages: 0,
            messages_in_store: 0,
            voice_messages: 0,
            text_messages: 0,
            image_messages: 0,
            user_messages: 0,
            assistant_messages: 0,
            last_interaction: None,
            preferences: BTreeMap::new(),
        }
    }
}
