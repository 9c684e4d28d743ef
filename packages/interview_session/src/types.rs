use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Participant role. Wire strings are the labels the server uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    #[serde(rename = "保健師", alias = "interviewer")]
    Interviewer,
    #[serde(rename = "患者", alias = "patient")]
    Patient,
    #[serde(rename = "評価者", alias = "evaluator")]
    Evaluator,
    #[serde(rename = "傍聴者", alias = "observer")]
    Observer,
}

impl UserRole {
    pub fn as_wire(&self) -> &'static str {
        match self {
            UserRole::Interviewer => "保健師",
            UserRole::Patient => "患者",
            UserRole::Evaluator => "評価者",
            UserRole::Observer => "傍聴者",
        }
    }

    /// Parse either the wire label or the English alias.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "保健師" | "interviewer" => Some(UserRole::Interviewer),
            "患者" | "patient" => Some(UserRole::Patient),
            "評価者" | "evaluator" => Some(UserRole::Evaluator),
            "傍聴者" | "observer" => Some(UserRole::Observer),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire(s).ok_or_else(|| format!("unknown role: {s}"))
    }
}

/// Registration lifecycle of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    Initial,
    Registered,
    Prepared,
    Established,
    Waiting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub user_name: String,
    pub role: UserRole,
    pub status: UserStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Payload of the durable slot used to resume a session after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    /// The counterpart side of the dialogue.
    Assistant,
    System,
}

/// Display category attached to every transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Icon {
    #[serde(rename = "mdi-account-tie-woman")]
    Interviewer,
    #[serde(rename = "mdi-account")]
    Patient,
    #[serde(rename = "mdi-alert-circle-outline")]
    Alert,
}

impl Icon {
    pub fn as_str(&self) -> &'static str {
        match self {
            Icon::Interviewer => "mdi-account-tie-woman",
            Icon::Patient => "mdi-account",
            Icon::Alert => "mdi-alert-circle-outline",
        }
    }
}

/// One transcript entry. Same shape as the server's `chat_history` items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub message: String,
    pub icon: Icon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInfo {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub birth_date: String,
    pub residence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infection_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onset_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationSymbol {
    #[serde(rename = "◎")]
    Excellent,
    #[serde(rename = "○")]
    Good,
    #[serde(rename = "△")]
    Fair,
    #[serde(rename = "✕")]
    Poor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroEvaluation {
    pub utterance: String,
    pub evaluation_symbol: EvaluationSymbol,
    pub advice: String,
}

/// Typed view of a debriefing payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebriefingData {
    #[serde(default)]
    pub overall_score: f64,
    #[serde(default)]
    pub information_retrieval_ratio: String,
    #[serde(default)]
    pub information_quality: String,
    #[serde(default)]
    pub micro_evaluations: Vec<MicroEvaluation>,
    #[serde(default)]
    pub overall_comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DebriefingData {
    /// The debrief callback receives raw JSON; callers that want a typed
    /// report parse it here.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }
}
