pub mod chat;
pub mod render;

use anyhow::{Context, Result};
use tracing::warn;

use interview_session::{ApiClient, Endpoint};

use crate::config::InterviewConfig;

pub use chat::{chat_command, resume_command};

pub(crate) fn endpoint(config: &InterviewConfig) -> Result<Endpoint> {
    Endpoint::from_origin(&config.file.server.origin)
        .with_context(|| format!("Invalid server origin: {}", config.file.server.origin))
}

pub(crate) fn api_client(config: &InterviewConfig) -> Result<ApiClient> {
    let endpoint = endpoint(config)?;
    ApiClient::with_timeout(&endpoint, config.file.server.request_timeout())
        .context("Failed to build HTTP client")
}

/// `interview patients`: every patient id with its profile line.
pub async fn patients_command(config: &InterviewConfig) -> Result<()> {
    let api = api_client(config)?;
    let ids = api
        .patient_ids()
        .await
        .context("Failed to fetch patient list")?;

    if ids.is_empty() {
        eprintln!("No patients available.");
        return Ok(());
    }

    for id in ids {
        match api.patient_details(&id).await {
            Ok(patient) => println!("{}", render::patient_line(&patient)),
            Err(e) => {
                warn!("Failed to fetch patient {}: {}", id, e);
                println!("{id:>4}  (details unavailable)");
            }
        }
    }
    Ok(())
}

/// `interview logs [--session ID]`.
pub async fn logs_command(config: &InterviewConfig, session_id: Option<&str>) -> Result<()> {
    let api = api_client(config)?;

    let Some(session_id) = session_id else {
        let sessions = api
            .session_logs()
            .await
            .context("Failed to fetch session logs")?;
        if sessions.is_empty() {
            eprintln!("No sessions recorded yet.");
        }
        for log in &sessions {
            println!("{}", render::session_log_line(log));
        }
        return Ok(());
    };

    let entries = api
        .session_log_detail(session_id)
        .await
        .with_context(|| format!("Failed to fetch log for session {session_id}"))?;
    for entry in &entries {
        println!("{}", render::chat_log_line(entry));
    }
    Ok(())
}
