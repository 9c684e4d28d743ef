use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::InboundMessage;

/// Data handed to [`SessionEvents::on_established`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstablishedInfo {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interview_date: Option<String>,
}

/// Caller hooks for protocol events. Every method defaults to a no-op, so
/// implementors override only what they care about.
///
/// Hooks run on the connection's reader task after the store lock has been
/// released; they may query the client state freely.
pub trait SessionEvents: Send + Sync + 'static {
    /// Every successfully decoded inbound frame, after its own hook.
    fn on_message(&self, _message: &InboundMessage) {}

    /// A reconnection opened. The server session already exists, so no
    /// fresh `Established` frame should be expected.
    fn on_reconnected(&self) {}

    fn on_established(&self, _info: &EstablishedInfo) {}

    /// The server ended the session or the connection closed.
    fn on_session_terminated(&self) {}

    /// Raw debrief payload, exactly as received.
    fn on_debriefing_response(&self, _data: &Value) {}

    fn on_tool_call_detected(&self) {}

    fn on_conversation_continue_accepted(&self) {}

    fn on_message_rejected(&self, _reason: &str) {}
}

impl SessionEvents for () {}
