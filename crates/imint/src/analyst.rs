//! Analyst message model and per-conversation state.
//!
//! The analyst service turns a free-text question into an answer, an
//! optional SQL statement and optional follow-up suggestions. This module
//! owns the wire types and the conversation state machine; transport lives
//! in the runtime.
//!
//! ```text
//! Idle ──begin──▶ AwaitingResponse ──complete──▶ Answered ──acknowledge──▶ Idle
//!                                  └──fail─────▶ Failed   ──acknowledge──▶ Idle
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ImintError, ImintResult};

/// Turns shown when a conversation is replayed to the user.
pub const DEFAULT_REPLAY_WINDOW: usize = 10;

/// Speaker of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Analyst,
}

/// One typed block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Sql {
        statement: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<serde_json::Value>,
    },
    Suggestions {
        suggestions: Vec<String>,
    },
    /// Block types this client does not interpret.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }
}

/// Request body of the analyst message endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalystRequest {
    pub messages: Vec<Message>,
    pub semantic_model_file: String,
}

/// Response body of the analyst message endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalystResponse {
    pub message: Message,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub warnings: Vec<serde_json::Value>,
}

/// The interpreted content of an analyst answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalystReply {
    pub answer_text: String,
    pub sql: Option<String>,
    pub suggestions: Option<Vec<String>>,
    pub request_id: Option<String>,
}

impl AnalystReply {
    /// Interpret a response. Text blocks are joined; the first SQL block
    /// wins; suggestion blocks are concatenated.
    pub fn from_response(response: &AnalystResponse) -> ImintResult<Self> {
        if response.message.role != Role::Analyst {
            return Err(ImintError::MalformedResponse(
                "response message is not from the analyst".into(),
            ));
        }

        let mut texts = Vec::new();
        let mut sql = None;
        let mut suggestions: Option<Vec<String>> = None;
        for block in &response.message.content {
            match block {
                ContentBlock::Text { text } => texts.push(text.as_str()),
                ContentBlock::Sql { statement, .. } => {
                    if sql.is_none() && !statement.trim().is_empty() {
                        sql = Some(statement.clone());
                    }
                }
                ContentBlock::Suggestions { suggestions: s } => {
                    suggestions.get_or_insert_with(Vec::new).extend(s.iter().cloned());
                }
                ContentBlock::Unknown => {}
            }
        }

        if texts.is_empty() && sql.is_none() && suggestions.is_none() {
            return Err(ImintError::MalformedResponse(
                "response has no text, sql or suggestions".into(),
            ));
        }

        Ok(Self {
            answer_text: texts.join("\n\n"),
            sql,
            suggestions,
            request_id: response.request_id.clone(),
        })
    }
}

// ── Conversation ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    AwaitingResponse,
    Answered,
    Failed,
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConversationState::Idle => "idle",
            ConversationState::AwaitingResponse => "awaiting a response",
            ConversationState::Answered => "answered",
            ConversationState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    Pending,
    Answered { message: Message, reply: AnalystReply },
    Failed { error: String },
}

/// One question and what came back for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub asked_at: DateTime<Utc>,
    pub outcome: TurnOutcome,
}

impl Turn {
    pub fn reply(&self) -> Option<&AnalystReply> {
        match &self.outcome {
            TurnOutcome::Answered { reply, .. } => Some(reply),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            TurnOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// An append-only conversation with the analyst.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<Turn>,
    state: ConversationState,
    replay_window: usize,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_WINDOW)
    }
}

impl Conversation {
    pub fn new(replay_window: usize) -> Self {
        Self {
            turns: Vec::new(),
            state: ConversationState::Idle,
            replay_window: replay_window.max(1),
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The last turns inside the replay window, oldest first.
    pub fn recent_turns(&self) -> &[Turn] {
        let start = self.turns.len().saturating_sub(self.replay_window);
        &self.turns[start..]
    }

    fn expect_state(&self, expected: ConversationState, action: &'static str) -> ImintResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ImintError::ConversationState {
                state: self.state.to_string(),
                action,
            })
        }
    }

    /// Messages to send to the API: every answered exchange, then `extra`.
    /// Failed turns are left out so roles keep alternating.
    fn api_messages(&self, extra: Option<&str>) -> Vec<Message> {
        let mut messages = Vec::new();
        for turn in &self.turns {
            if let TurnOutcome::Answered { message, .. } = &turn.outcome {
                messages.push(Message::user_text(turn.question.clone()));
                messages.push(message.clone());
            }
        }
        if let Some(q) = extra {
            messages.push(Message::user_text(q));
        }
        messages
    }

    /// Record a new question and return the messages to send.
    pub fn begin(&mut self, question: &str) -> ImintResult<Vec<Message>> {
        self.expect_state(ConversationState::Idle, "ask a question")?;
        let question = question.trim();
        if question.is_empty() {
            return Err(ImintError::InvalidInput("question is empty".into()));
        }

        let messages = self.api_messages(Some(question));
        self.turns.push(Turn {
            question: question.to_string(),
            asked_at: Utc::now(),
            outcome: TurnOutcome::Pending,
        });
        self.state = ConversationState::AwaitingResponse;
        Ok(messages)
    }

    /// Attach the analyst's response to the pending turn.
    ///
    /// A response that cannot be interpreted fails the turn and returns
    /// the error.
    pub fn complete(&mut self, response: AnalystResponse) -> ImintResult<AnalystReply> {
        self.expect_state(ConversationState::AwaitingResponse, "record a response")?;
        match AnalystReply::from_response(&response) {
            Ok(reply) => {
                self.set_outcome(TurnOutcome::Answered {
                    message: response.message,
                    reply: reply.clone(),
                });
                self.state = ConversationState::Answered;
                Ok(reply)
            }
            Err(e) => {
                self.set_outcome(TurnOutcome::Failed {
                    error: e.to_string(),
                });
                self.state = ConversationState::Failed;
                Err(e)
            }
        }
    }

    /// Mark the pending turn as failed.
    pub fn fail(&mut self, error: impl Into<String>) -> ImintResult<()> {
        self.expect_state(ConversationState::AwaitingResponse, "record a failure")?;
        self.set_outcome(TurnOutcome::Failed {
            error: error.into(),
        });
        self.state = ConversationState::Failed;
        Ok(())
    }

    /// The outcome has been shown; accept the next question.
    pub fn acknowledge(&mut self) -> ImintResult<()> {
        match self.state {
            ConversationState::Answered | ConversationState::Failed => {
                self.state = ConversationState::Idle;
                Ok(())
            }
            _ => Err(ImintError::ConversationState {
                state: self.state.to_string(),
                action: "acknowledge",
            }),
        }
    }

    fn set_outcome(&mut self, outcome: TurnOutcome) {
        if let Some(turn) = self.turns.last_mut() {
            turn.outcome = outcome;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> AnalystResponse {
        serde_json::from_str(json).unwrap()
    }

    fn answered() -> AnalystResponse {
        response(
            r#"{
                "message": {
                    "role": "analyst",
                    "content": [
                        {"type": "text", "text": "This is our interpretation of your question."},
                        {"type": "sql", "statement": "SELECT COUNT(*) AS n FROM silver_imagery_metadata"}
                    ]
                },
                "request_id": "req-1"
            }"#,
        )
    }

    #[test]
    fn test_reply_extracts_blocks() {
        let reply = AnalystReply::from_response(&answered()).unwrap();
        assert_eq!(reply.answer_text, "This is our interpretation of your question.");
        assert_eq!(
            reply.sql.as_deref(),
            Some("SELECT COUNT(*) AS n FROM silver_imagery_metadata")
        );
        assert!(reply.suggestions.is_none());
        assert_eq!(reply.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_reply_with_suggestions_and_unknown_block() {
        let resp = response(
            r#"{
                "message": {
                    "role": "analyst",
                    "content": [
                        {"type": "text", "text": "Your question is ambiguous."},
                        {"type": "suggestions", "suggestions": ["How many SAR images?", "Average quality by region?"]},
                        {"type": "chart", "spec": {}}
                    ]
                }
            }"#,
        );
        let reply = AnalystReply::from_response(&resp).unwrap();
        assert!(reply.sql.is_none());
        assert_eq!(reply.suggestions.unwrap().len(), 2);
    }

    #[test]
    fn test_empty_reply_is_malformed() {
        let resp = response(r#"{"message": {"role": "analyst", "content": []}}"#);
        assert!(matches!(
            AnalystReply::from_response(&resp),
            Err(ImintError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_request_serialization() {
        let req = AnalystRequest {
            messages: vec![Message::user_text("How many satellite images do we have?")],
            semantic_model_file: "@stage/model.yaml".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "messages": [{"role": "user", "content": [{"type": "text", "text": "How many satellite images do we have?"}]}],
                "semantic_model_file": "@stage/model.yaml"
            })
        );
    }

    #[test]
    fn test_conversation_happy_path() {
        let mut conv = Conversation::default();
        let msgs = conv.begin("How many images?").unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(conv.state(), ConversationState::AwaitingResponse);

        let reply = conv.complete(answered()).unwrap();
        assert!(reply.sql.is_some());
        assert_eq!(conv.state(), ConversationState::Answered);
        conv.acknowledge().unwrap();

        // the answered exchange is replayed before the next question
        let msgs = conv.begin("And by sensor?").unwrap();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[1].role, Role::Analyst);
        assert_eq!(msgs[2], Message::user_text("And by sensor?"));
    }

    #[test]
    fn test_out_of_order_calls_rejected() {
        let mut conv = Conversation::default();
        assert!(matches!(
            conv.complete(answered()),
            Err(ImintError::ConversationState { .. })
        ));
        assert!(conv.acknowledge().is_err());

        conv.begin("q").unwrap();
        assert!(conv.begin("again").is_err());
        assert!(conv.acknowledge().is_err());
    }

    #[test]
    fn test_failed_turn_kept_but_not_replayed() {
        let mut conv = Conversation::default();
        conv.begin("first").unwrap();
        conv.fail("analyst returned 500").unwrap();
        assert_eq!(conv.state(), ConversationState::Failed);
        conv.acknowledge().unwrap();

        let msgs = conv.begin("second").unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(conv.turns().len(), 2);
        assert_eq!(conv.turns()[0].error(), Some("analyst returned 500"));
    }

    #[test]
    fn test_malformed_response_fails_turn() {
        let mut conv = Conversation::default();
        conv.begin("q").unwrap();
        let bad = response(r#"{"message": {"role": "analyst", "content": []}}"#);
        assert!(conv.complete(bad).is_err());
        assert_eq!(conv.state(), ConversationState::Failed);
        assert!(conv.turns()[0].error().is_some());
    }

    #[test]
    fn test_empty_question_rejected() {
        let mut conv = Conversation::default();
        assert!(matches!(conv.begin("   "), Err(ImintError::InvalidInput(_))));
        assert_eq!(conv.state(), ConversationState::Idle);
    }

    #[test]
    fn test_replay_window() {
        let mut conv = Conversation::new(2);
        for q in ["a", "b", "c"] {
            conv.begin(q).unwrap();
            conv.fail("x").unwrap();
            conv.acknowledge().unwrap();
        }
        let recent: Vec<_> = conv.recent_turns().iter().map(|t| t.question.as_str()).collect();
        assert_eq!(recent, vec!["b", "c"]);
        assert_eq!(conv.turns().len(), 3);
    }
}
