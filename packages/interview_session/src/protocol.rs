//! Wire protocol types
//!
//! JSON text frames tagged by `msg_type`. Inbound frames come from the chat
//! server over the WebSocket; outbound frames are the client's intents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Marker the upstream model emits when it tries to end the interview via a
/// tool call. Text carrying it must never reach an observer transcript.
pub const TOOL_CALL_MARKER: &str = "end_conversation_and_start_debriefing";

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg_type")]
pub enum InboundMessage {
    Established {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interview_date: Option<String>,
    },
    MessageForwarded {
        /// Usually a string, but the server occasionally forwards objects.
        #[serde(default)]
        user_msg: Value,
        /// Set only on frames delivered to an observer.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ai_role: Option<String>,
    },
    SessionTerminated,
    DebriefingResponse {
        #[serde(default)]
        debriefing_data: Value,
    },
    ToolCallDetected,
    ConversationContinueAccepted,
    MessageRejected {
        /// Free text in practice; other shapes are coerced like `user_msg`.
        #[serde(default)]
        reason: Value,
    },
    /// Any tag this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Established { .. } => "Established",
            InboundMessage::MessageForwarded { .. } => "MessageForwarded",
            InboundMessage::SessionTerminated => "SessionTerminated",
            InboundMessage::DebriefingResponse { .. } => "DebriefingResponse",
            InboundMessage::ToolCallDetected => "ToolCallDetected",
            InboundMessage::ConversationContinueAccepted => "ConversationContinueAccepted",
            InboundMessage::MessageRejected { .. } => "MessageRejected",
            InboundMessage::Unknown => "Unknown",
        }
    }
}

/// Frames sent by the client over the WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg_type")]
pub enum OutboundMessage {
    MessageSubmitted {
        session_id: String,
        user_id: String,
        user_msg: String,
    },
    DebriefingRequest {
        session_id: String,
        user_id: String,
    },
    ContinueConversationRequest {
        session_id: String,
        user_id: String,
    },
    EndSessionRequest {
        session_id: String,
        user_id: String,
    },
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::MessageSubmitted { .. } => "MessageSubmitted",
            OutboundMessage::DebriefingRequest { .. } => "DebriefingRequest",
            OutboundMessage::ContinueConversationRequest { .. } => "ContinueConversationRequest",
            OutboundMessage::EndSessionRequest { .. } => "EndSessionRequest",
        }
    }
}

/// Decode one text frame.
///
/// Fails on invalid JSON, on a frame without a `msg_type` string, and on a
/// known tag whose required fields are missing. Unknown tags decode to
/// [`InboundMessage::Unknown`].
pub fn decode_frame(text: &str) -> Result<InboundMessage, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
    if !value.get("msg_type").is_some_and(Value::is_string) {
        return Err(ProtocolError::MissingTag);
    }
    InboundMessage::deserialize(value).map_err(ProtocolError::InvalidFrame)
}

pub fn encode_frame(message: &OutboundMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(ProtocolError::Encode)
}

/// Coerce a body of any JSON shape into displayable text.
pub fn normalize_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

pub fn contains_tool_marker(text: &str) -> bool {
    text.to_lowercase().contains(TOOL_CALL_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_established() {
        let msg =
            decode_frame(r#"{"msg_type":"Established","session_id":"S","interview_date":"2024-04-01"}"#)
                .unwrap();
        assert_eq!(
            msg,
            InboundMessage::Established {
                session_id: "S".to_string(),
                interview_date: Some("2024-04-01".to_string()),
            }
        );
    }

    #[test]
    fn decode_established_without_session_id_fails() {
        let err = decode_frame(r#"{"msg_type":"Established"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidFrame(_)));
    }

    #[test]
    fn decode_unit_tags_ignore_extra_fields() {
        let msg =
            decode_frame(r#"{"msg_type":"SessionTerminated","session_id":"S","user_id":"U"}"#)
                .unwrap();
        assert_eq!(msg, InboundMessage::SessionTerminated);
        let msg = decode_frame(r#"{"msg_type":"ToolCallDetected","user_msg":""}"#).unwrap();
        assert_eq!(msg, InboundMessage::ToolCallDetected);
    }

    #[test]
    fn decode_unknown_tag() {
        let msg = decode_frame(r#"{"msg_type":"RosterDistribution","users":[]}"#).unwrap();
        assert_eq!(msg, InboundMessage::Unknown);
        assert_eq!(msg.kind(), "Unknown");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode_frame("not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            decode_frame(r#"{"session_id":"S"}"#),
            Err(ProtocolError::MissingTag)
        ));
        assert!(matches!(
            decode_frame(r#"{"msg_type":42}"#),
            Err(ProtocolError::MissingTag)
        ));
    }

    #[test]
    fn decode_forwarded_object_body() {
        let msg = decode_frame(r#"{"msg_type":"MessageForwarded","user_msg":{"foo":1}}"#).unwrap();
        match msg {
            InboundMessage::MessageForwarded { user_msg, ai_role } => {
                assert_eq!(user_msg, json!({"foo": 1}));
                assert!(ai_role.is_none());
            }
            other => panic!("Expected MessageForwarded, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejected_without_reason() {
        let msg = decode_frame(r#"{"msg_type":"MessageRejected"}"#).unwrap();
        assert_eq!(msg, InboundMessage::MessageRejected { reason: Value::Null });
    }

    #[test]
    fn decode_rejected_with_object_reason() {
        let msg = decode_frame(r#"{"msg_type":"MessageRejected","reason":{"code":503}}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::MessageRejected {
                reason: json!({"code": 503}),
            }
        );
    }

    #[test]
    fn outbound_wire_shape() {
        let msg = OutboundMessage::MessageSubmitted {
            session_id: "S".to_string(),
            user_id: "U".to_string(),
            user_msg: "hi".to_string(),
        };
        let json: Value = serde_json::from_str(&encode_frame(&msg).unwrap()).unwrap();
        assert_eq!(json["msg_type"], "MessageSubmitted");
        assert_eq!(json["session_id"], "S");
        assert_eq!(json["user_id"], "U");
        assert_eq!(json["user_msg"], "hi");

        let msg = OutboundMessage::EndSessionRequest {
            session_id: "S".to_string(),
            user_id: "U".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"msg_type": "EndSessionRequest", "session_id": "S", "user_id": "U"}));
    }

    #[test]
    fn normalize_text_shapes() {
        assert_eq!(normalize_text(&json!("ok")), "ok");
        assert_eq!(normalize_text(&json!({"foo": 1})), r#"{"foo":1}"#);
        assert_eq!(normalize_text(&json!([1, 2])), "[1,2]");
        assert_eq!(normalize_text(&json!(3)), "3");
        assert_eq!(normalize_text(&json!(true)), "true");
        assert_eq!(normalize_text(&Value::Null), "");
    }

    #[test]
    fn tool_marker_is_case_insensitive() {
        assert!(contains_tool_marker("call end_conversation_and_start_debriefing now"));
        assert!(contains_tool_marker("END_CONVERSATION_AND_START_DEBRIEFING"));
        assert!(!contains_tool_marker("how are you feeling today?"));
    }
}
