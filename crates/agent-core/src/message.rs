//! Conversation Turns
//!
//! Provider-neutral conversation representation. Every backend call rebuilds
//! its request from the full turn sequence; no server-side state is assumed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::{ToolCall, ToolResult};

/// Role of a turn author
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User input
    User,
    /// Model output (text or a tool call)
    Model,
    /// Tool result fed back to the model
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Model => write!(f, "model"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "model" | "assistant" => Ok(Self::Model),
            "tool" | "function" => Ok(Self::Tool),
            other => Err(crate::AgentError::Parse(format!("unknown role '{other}'"))),
        }
    }
}

/// Opaque value a backend attaches to a tool-call turn.
///
/// Only the adapter that produced it knows what it means; everything else
/// carries it unmodified.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens can be large and are meaningless to a reader.
impl std::fmt::Debug for ContinuationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContinuationToken({} bytes)", self.0.len())
    }
}

/// A single turn in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<ContinuationToken>,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    fn blank(role: Role) -> Self {
        Self {
            role,
            content: None,
            tool_call: None,
            tool_result: None,
            continuation_token: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a plain text turn
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::blank(role)
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self::text(Role::Model, content)
    }

    /// Model turn carrying a tool call, with optional leading text
    pub fn model_tool_call(
        call: ToolCall,
        content: Option<String>,
        token: Option<ContinuationToken>,
    ) -> Self {
        Self {
            content,
            tool_call: Some(call),
            continuation_token: token,
            ..Self::blank(Role::Model)
        }
    }

    /// Tool turn carrying a dispatcher result
    pub fn tool_result(result: ToolResult, token: Option<ContinuationToken>) -> Self {
        Self {
            tool_result: Some(result),
            continuation_token: token,
            ..Self::blank(Role::Tool)
        }
    }

    pub fn is_tool_call(&self) -> bool {
        self.tool_call.is_some()
    }

    pub fn is_tool_result(&self) -> bool {
        self.tool_result.is_some()
    }

    /// Text content or the empty string
    pub fn text_or_empty(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// Append-only turn sequence
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }

    /// Append a turn
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn extend(&mut self, turns: impl IntoIterator<Item = ConversationTurn>) {
        self.turns.extend(turns);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn into_turns(self) -> Vec<ConversationTurn> {
        self.turns
    }

    /// First tool-call turn not immediately followed by a result of the same
    /// name, if any. A well-formed conversation returns `None`.
    pub fn unpaired_tool_call(&self) -> Option<&str> {
        self.turns.iter().enumerate().find_map(|(idx, turn)| {
            let call = turn.tool_call.as_ref()?;
            let paired = self
                .turns
                .get(idx + 1)
                .and_then(|next| next.tool_result.as_ref())
                .is_some_and(|result| result.name == call.name);
            (!paired).then_some(call.name.as_str())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::JsonMap;

    #[test]
    fn test_turn_creation() {
        let turn = ConversationTurn::user("Hello");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.text_or_empty(), "Hello");
        assert!(!turn.is_tool_call());
    }

    #[test]
    fn test_role_parsing_accepts_aliases() {
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Model);
        assert_eq!("USER".parse::<Role>().unwrap(), Role::User);
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn test_token_debug_hides_content() {
        let token = ContinuationToken::new("secret-signature");
        assert_eq!(format!("{token:?}"), "ContinuationToken(16 bytes)");
    }

    #[test]
    fn test_unpaired_tool_call_detection() {
        let call = ToolCall::new("lookup", JsonMap::new());
        let mut conv = Conversation::new();
        conv.push(ConversationTurn::user("hi"));
        conv.push(ConversationTurn::model_tool_call(call, None, None));
        assert_eq!(conv.unpaired_tool_call(), Some("lookup"));

        conv.push(ConversationTurn::tool_result(
            ToolResult::success("lookup", JsonMap::new()),
            None,
        ));
        assert_eq!(conv.unpaired_tool_call(), None);
    }

    #[test]
    fn test_mismatched_result_name_is_unpaired() {
        let mut conv = Conversation::new();
        conv.push(ConversationTurn::model_tool_call(
            ToolCall::new("lookup", JsonMap::new()),
            None,
            None,
        ));
        conv.push(ConversationTurn::tool_result(
            ToolResult::failure("search", "boom"),
            None,
        ));
        assert_eq!(conv.unpaired_tool_call(), Some("lookup"));
    }
}
