//! Plain-text rendering of transcript entries, REST rows and debrief reports.

use chrono::{DateTime, Local, NaiveDateTime};
use serde_json::Value;

use interview_session::{
    ChatLog, ChatMessage, DebriefingData, Icon, PatientInfo, Sender, SessionLog,
};

pub fn transcript_line(entry: &ChatMessage) -> String {
    let speaker = match (entry.sender, entry.icon) {
        (Sender::System, _) | (_, Icon::Alert) => "system",
        (_, Icon::Interviewer) => "interviewer",
        (_, Icon::Patient) => "patient",
    };
    let side = match entry.sender {
        Sender::User => ">",
        Sender::Assistant => "<",
        Sender::System => "!",
    };
    format!("{side} [{speaker}] {}", entry.message)
}

pub fn patient_line(patient: &PatientInfo) -> String {
    let mut line = format!(
        "{:>4}  {} ({}, {})  {}",
        patient.id, patient.name, patient.age, patient.gender, patient.residence
    );
    if let Some(profile) = patient.profile.as_deref().filter(|p| !p.is_empty()) {
        line.push_str("\n      ");
        line.push_str(profile);
    }
    line
}

/// Server timestamps are ISO 8601, with or without an offset.
pub fn format_timestamp(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string();
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| raw.to_string())
}

pub fn session_log_line(log: &SessionLog) -> String {
    format!(
        "{}  {}  {} ({})  patient {}",
        format_timestamp(&log.started_at),
        log.session_id,
        log.user_name,
        log.user_role,
        log.patient_id.as_deref().unwrap_or("-"),
    )
}

pub fn chat_log_line(entry: &ChatLog) -> String {
    let speaker = entry.ai_role.as_deref().unwrap_or(&entry.role);
    format!(
        "{}  {}: {}",
        format_timestamp(&entry.created_at),
        speaker,
        entry.message
    )
}

/// Formatted debrief, or the raw payload when it does not parse or `raw`
/// is requested.
pub fn debrief_report(data: &Value, raw: bool) -> String {
    let parsed = if raw {
        None
    } else {
        DebriefingData::from_value(data).ok()
    };
    let Some(report) = parsed else {
        return serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
    };

    if let Some(error) = report.error.as_deref().filter(|e| !e.is_empty()) {
        return format!("Debriefing failed: {error}");
    }

    let mut out = String::new();
    out.push_str("=== Debriefing ===\n");
    out.push_str(&format!("Overall score:          {}\n", report.overall_score));
    out.push_str(&format!(
        "Information retrieved:  {}\n",
        report.information_retrieval_ratio
    ));
    out.push_str(&format!(
        "Information quality:    {}\n",
        report.information_quality
    ));
    if !report.micro_evaluations.is_empty() {
        out.push_str("\nUtterances:\n");
        for eval in &report.micro_evaluations {
            let symbol = serde_json::to_value(eval.evaluation_symbol)
                .ok()
                .and_then(|v| v.as_str().map(str::to_owned))
                .unwrap_or_default();
            out.push_str(&format!("  {symbol} {}\n", eval.utterance));
            if !eval.advice.is_empty() {
                out.push_str(&format!("      {}\n", eval.advice));
            }
        }
    }
    if !report.overall_comment.is_empty() {
        out.push('\n');
        out.push_str(&report.overall_comment);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transcript_lines_name_the_speaker() {
        let line = transcript_line(&ChatMessage {
            sender: Sender::Assistant,
            message: "I'm tired.".to_string(),
            icon: Icon::Patient,
        });
        assert_eq!(line, "< [patient] I'm tired.");

        let line = transcript_line(&ChatMessage {
            sender: Sender::System,
            message: "System error: busy".to_string(),
            icon: Icon::Alert,
        });
        assert_eq!(line, "! [system] System error: busy");
    }

    #[test]
    fn naive_timestamps_are_shortened() {
        assert_eq!(format_timestamp("2024-04-01T10:05:33"), "2024-04-01 10:05");
        assert_eq!(
            format_timestamp("2024-04-01 10:05:33.123456"),
            "2024-04-01 10:05"
        );
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }

    #[test]
    fn session_log_without_patient() {
        let line = session_log_line(&SessionLog {
            session_id: "S1".to_string(),
            user_role: "保健師".to_string(),
            user_name: "Sato".to_string(),
            patient_id: None,
            started_at: "2024-04-01T10:00:00".to_string(),
        });
        assert_eq!(line, "2024-04-01 10:00  S1  Sato (保健師)  patient -");
    }

    #[test]
    fn chat_log_prefers_ai_role() {
        let line = chat_log_line(&ChatLog {
            id: 2,
            sender: "AI".to_string(),
            role: "傍聴者".to_string(),
            ai_role: Some("患者".to_string()),
            message: "hello".to_string(),
            created_at: "2024-04-01T10:00:02".to_string(),
        });
        assert_eq!(line, "2024-04-01 10:00  患者: hello");
    }

    #[test]
    fn debrief_report_formats_evaluations() {
        let data = json!({
            "overall_score": 72,
            "information_retrieval_ratio": "8/10",
            "information_quality": "good",
            "micro_evaluations": [
                {"utterance": "How are you?", "evaluation_symbol": "△", "advice": "Ask about symptoms"}
            ],
            "overall_comment": "Solid start."
        });
        let report = debrief_report(&data, false);
        assert!(report.contains("Overall score:          72"));
        assert!(report.contains("  △ How are you?"));
        assert!(report.contains("Ask about symptoms"));
        assert!(report.ends_with("Solid start.\n"));
    }

    #[test]
    fn debrief_report_falls_back_to_json() {
        let data = json!({"overall_score": "n/a"});
        assert!(debrief_report(&data, false).contains("\"overall_score\": \"n/a\""));

        let good = json!({"overall_score": 50});
        assert!(debrief_report(&good, true).starts_with('{'));

        let failed = json!({"error": "model timeout"});
        assert_eq!(debrief_report(&failed, false), "Debriefing failed: model timeout");
    }
}
