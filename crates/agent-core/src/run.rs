//! Orchestration Runs
//!
//! A run exists only for the duration of one user message. It owns the
//! working copy of the conversation and the bookkeeping the caller gets back.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Conversation, ConversationTurn};
use crate::tool::{JsonMap, ToolResult};

/// Unique run identifier, used to correlate log lines
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One dispatched tool call with the arguments it received
#[derive(Clone, Debug, Serialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: JsonMap,
    pub result: ToolResult,
}

/// Structured content shown next to the answer text
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

impl Attachment {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

/// Derives attachments from the tool calls of a completed run
pub trait AttachmentExtractor: Send + Sync {
    fn extract(&self, invocations: &[ToolInvocation]) -> Vec<Attachment>;
}

/// In-flight state of one orchestration run
#[derive(Debug)]
pub struct OrchestrationRun {
    pub id: RunId,
    pub started_at: DateTime<Utc>,
    started: Instant,
    pub conversation: Conversation,
    pub tools_invoked: Vec<String>,
    pub invocations: Vec<ToolInvocation>,
    pub iteration_count: usize,
}

impl OrchestrationRun {
    /// Start from prior history with the user's message appended
    pub fn start(history: &[ConversationTurn], user_turn: ConversationTurn) -> Self {
        let mut conversation = Conversation::from_turns(history.to_vec());
        conversation.push(user_turn);
        Self {
            id: RunId::new(),
            started_at: Utc::now(),
            started: Instant::now(),
            conversation,
            tools_invoked: Vec::new(),
            invocations: Vec::new(),
            iteration_count: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record a finished dispatch
    pub fn record(&mut self, name: String, arguments: JsonMap, result: ToolResult) {
        self.tools_invoked.push(name.clone());
        self.invocations.push(ToolInvocation {
            name,
            arguments,
            result,
        });
    }

    pub fn finish(self, final_text: String, degraded: bool, limit_reached: bool) -> RunOutcome {
        RunOutcome {
            run_id: self.id,
            elapsed: self.started.elapsed(),
            final_text,
            tools_invoked: self.tools_invoked,
            invocations: self.invocations,
            attachments: Vec::new(),
            iterations: self.iteration_count,
            history: self.conversation.into_turns(),
            degraded,
            limit_reached,
        }
    }
}

/// What a finished run hands back to its caller
#[derive(Clone, Debug, Serialize)]
pub struct RunOutcome {
    pub run_id: RunId,

    /// Text to show the user
    pub final_text: String,

    /// Tool names in call order, duplicates kept
    pub tools_invoked: Vec<String>,

    /// Every dispatch with its arguments and result
    #[serde(skip)]
    pub invocations: Vec<ToolInvocation>,

    /// Derived from the invocations when the run completes normally
    pub attachments: Vec<Attachment>,

    /// Tool round trips performed
    pub iterations: usize,

    /// Full conversation including this run's turns
    #[serde(skip)]
    pub history: Vec<ConversationTurn>,

    /// The breaker refused a backend call
    pub degraded: bool,

    /// The iteration bound stopped the run
    pub limit_reached: bool,

    #[serde(skip)]
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_appends_user_turn() {
        let history = vec![
            ConversationTurn::user("earlier"),
            ConversationTurn::model("reply"),
        ];
        let run = OrchestrationRun::start(&history, ConversationTurn::user("now"));
        assert_eq!(run.conversation.len(), 3);
        assert_eq!(run.conversation.last().unwrap().text_or_empty(), "now");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_finish_carries_bookkeeping() {
        let mut run = OrchestrationRun::start(&[], ConversationTurn::user("hi"));
        let mut args = JsonMap::new();
        args.insert("q".into(), "phone".into());
        run.record(
            "lookup".into(),
            args.clone(),
            ToolResult::failure("lookup", "not found"),
        );
        run.iteration_count = 1;

        let outcome = run.finish("done".into(), false, false);
        assert_eq!(outcome.tools_invoked, vec!["lookup"]);
        assert_eq!(outcome.invocations.len(), 1);
        assert_eq!(outcome.invocations[0].arguments, args);
        assert!(outcome.invocations[0].result.is_error());
        assert!(outcome.attachments.is_empty());
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.history.len(), 1);
        assert!(!outcome.degraded);
    }
}
