//! Conversation store: the transcript plus the two input gates.
//!
//! `input_disabled` is session-scoped (no sending before the server
//! establishes the session). The per-turn lock is a [`TurnState`]: a send
//! moves it to `AwaitingReply`, and any inbound event that resolves a turn
//! moves it back to `Idle`.

use tracing::debug;

use crate::protocol::contains_tool_marker;
use crate::types::{ChatMessage, Icon, Sender, UserRole};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnState {
    #[default]
    Idle,
    AwaitingReply,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationStore {
    messages: Vec<ChatMessage>,
    input_text: String,
    input_disabled: bool,
    turn: TurnState,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            input_text: String::new(),
            input_disabled: true,
            turn: TurnState::Idle,
        }
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        debug!(
            sender = ?message.sender,
            len = message.message.len(),
            total = self.messages.len() + 1,
            "Appending transcript entry"
        );
        self.messages.push(message);
    }

    /// The local participant's own turn.
    pub fn add_user_message(&mut self, text: impl Into<String>, role: Option<UserRole>) {
        let icon = if role == Some(UserRole::Interviewer) {
            Icon::Interviewer
        } else {
            Icon::Patient
        };
        self.add_message(ChatMessage {
            sender: Sender::User,
            message: text.into(),
            icon,
        });
    }

    /// A reply from the counterpart, shown opposite the viewer's own role.
    pub fn add_counterpart_message(&mut self, text: impl Into<String>, role: Option<UserRole>) {
        let icon = if role == Some(UserRole::Interviewer) {
            Icon::Patient
        } else {
            Icon::Interviewer
        };
        self.add_message(ChatMessage {
            sender: Sender::Assistant,
            message: text.into(),
            icon,
        });
    }

    pub fn add_system_message(&mut self, text: impl Into<String>) {
        self.add_message(ChatMessage {
            sender: Sender::System,
            message: text.into(),
            icon: Icon::Alert,
        });
    }

    /// Observer right lane: the interviewer AI. Returns false when the body
    /// carried the tool marker and was dropped.
    pub fn add_nurse_ai_message(&mut self, text: impl Into<String>) -> bool {
        self.add_observer_lane(text.into(), Sender::User, Icon::Interviewer)
    }

    /// Observer left lane: the patient AI.
    pub fn add_patient_ai_message(&mut self, text: impl Into<String>) -> bool {
        self.add_observer_lane(text.into(), Sender::Assistant, Icon::Patient)
    }

    fn add_observer_lane(&mut self, text: String, sender: Sender, icon: Icon) -> bool {
        if contains_tool_marker(&text) {
            debug!("Suppressed tool-call text in observer lane");
            return false;
        }
        self.add_message(ChatMessage {
            sender,
            message: text,
            icon,
        });
        true
    }

    pub fn set_input_text(&mut self, text: impl Into<String>) {
        self.input_text = text.into();
    }

    pub fn clear_input_text(&mut self) {
        self.input_text.clear();
    }

    pub fn set_input_disabled(&mut self, disabled: bool) {
        self.input_disabled = disabled;
    }

    pub fn begin_turn(&mut self) {
        self.turn = TurnState::AwaitingReply;
    }

    /// The single "turn resolved" transition. Inbound events carry no
    /// correlation id, so whichever resolving event arrives first unlocks.
    pub fn resolve_turn(&mut self) {
        self.turn = TurnState::Idle;
    }

    /// Replace the transcript with server-held history, order untouched.
    pub fn restore_messages(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn input_text(&self) -> &str {
        &self.input_text
    }

    pub fn is_input_disabled(&self) -> bool {
        self.input_disabled
    }

    pub fn is_input_locked(&self) -> bool {
        self.turn == TurnState::AwaitingReply
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn
    }

    pub fn can_send_message(&self) -> bool {
        !self.input_disabled && !self.is_input_locked() && !self.input_text.trim().is_empty()
    }
}
