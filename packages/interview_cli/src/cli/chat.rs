//! `interview chat` and `interview resume`: the interactive session loop.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use interview_session::{
    ClientError, EstablishedInfo, FileSlot, InboundMessage, ProtocolClient, RegistrationRequest,
    SessionEvents, SessionSlot, SessionStore, User, UserRole, UserStatus, WsConnector,
};

use super::{api_client, endpoint, render};
use crate::config::InterviewConfig;

type Client = ProtocolClient<WsConnector, ChannelEvents>;

/// Protocol events, forwarded from the connection task to the input loop.
#[derive(Debug)]
enum UiEvent {
    Established(EstablishedInfo),
    Reconnected,
    Transcript,
    Terminated,
    Debriefing(Value),
    ToolCall,
    ContinueAccepted,
    Rejected(String),
}

struct ChannelEvents {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelEvents {
    fn forward(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            debug!("Input loop gone, dropping event");
        }
    }
}

impl SessionEvents for ChannelEvents {
    fn on_message(&self, message: &InboundMessage) {
        if matches!(
            message,
            InboundMessage::MessageForwarded { .. } | InboundMessage::MessageRejected { .. }
        ) {
            self.forward(UiEvent::Transcript);
        }
    }

    fn on_reconnected(&self) {
        self.forward(UiEvent::Reconnected);
    }

    fn on_established(&self, info: &EstablishedInfo) {
        self.forward(UiEvent::Established(info.clone()));
    }

    fn on_session_terminated(&self) {
        self.forward(UiEvent::Terminated);
    }

    fn on_debriefing_response(&self, data: &Value) {
        self.forward(UiEvent::Debriefing(data.clone()));
    }

    fn on_tool_call_detected(&self) {
        self.forward(UiEvent::ToolCall);
    }

    fn on_conversation_continue_accepted(&self) {
        self.forward(UiEvent::ContinueAccepted);
    }

    fn on_message_rejected(&self, reason: &str) {
        self.forward(UiEvent::Rejected(reason.to_string()));
    }
}

/// One line typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Say(&'a str),
    Debrief,
    Continue,
    End,
    Quit,
    Help,
    Unknown(&'a str),
    Empty,
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "/debrief" => Input::Debrief,
        "/continue" => Input::Continue,
        "/end" => Input::End,
        "/quit" | "/exit" => Input::Quit,
        "/help" => Input::Help,
        cmd if cmd.starts_with('/') => Input::Unknown(cmd),
        text => Input::Say(text),
    }
}

const HELP: &str = "Type a message and press Enter to send it.\n  /debrief   request the debriefing\n  /continue  keep talking after the AI tried to end\n  /end       end the session\n  /quit      leave (the session can be resumed)";

fn new_client(config: &InterviewConfig) -> Result<(Client, mpsc::UnboundedReceiver<UiEvent>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let client = ProtocolClient::new(WsConnector, endpoint(config)?, ChannelEvents { tx });
    Ok((client, rx))
}

/// `interview chat --name N --role R [--patient P]`
pub async fn chat_command(
    config: &InterviewConfig,
    name: String,
    role: UserRole,
    patient: Option<String>,
) -> Result<()> {
    let api = api_client(config)?;
    let registration = api
        .register_user(&RegistrationRequest {
            user_name: name.clone(),
            user_role: role,
            target_patient_id: patient.clone(),
        })
        .await
        .context("Registration failed")?;
    info!(user_id = %registration.user_id, "Registered");

    let (client, events) = new_client(config)?;
    client.set_user(User {
        user_id: registration.user_id.clone(),
        user_name: name,
        role,
        status: UserStatus::Registered,
        target_patient_id: patient,
        session_id: registration.session_id.clone(),
    });

    client
        .connect(&registration.user_id, false)
        .await
        .context("Failed to connect to the chat server")?;
    eprintln!("Connected. Waiting for the session to be established...");

    let slot = FileSlot::new(config.session_slot_path());
    run_session(config, &client, events, &slot).await
}

/// `interview resume [--session ID]`
pub async fn resume_command(config: &InterviewConfig, session_id: Option<String>) -> Result<()> {
    let slot = FileSlot::new(config.session_slot_path());
    let session_id = match session_id {
        Some(id) => id,
        None => match SessionStore::load_from_slot(&slot) {
            Some(info) => info.session_id,
            None => bail!("No active session to resume; pass --session"),
        },
    };

    let api = api_client(config)?;
    let restore = api
        .restore_session(&session_id)
        .await
        .with_context(|| format!("Failed to restore session {session_id}"))?;
    if let Some(patient) = &restore.patient_info {
        eprintln!("Patient: {}", render::patient_line(patient));
    }

    let (client, events) = new_client(config)?;
    client
        .resume(restore)
        .await
        .context("Failed to reconnect to the chat server")?;
    if let Err(e) = client.with_state(|state| state.session.save_to_slot(&slot)) {
        warn!("Failed to persist session slot: {}", e);
    }

    run_session(config, &client, events, &slot).await
}

/// Print transcript entries added since `printed`; returns the new count.
fn print_new_entries(client: &Client, printed: usize) -> usize {
    client.with_state(|state| {
        let messages = state.conversation.messages();
        for entry in messages.iter().skip(printed) {
            println!("{}", render::transcript_line(entry));
        }
        messages.len()
    })
}

async fn run_session(
    config: &InterviewConfig,
    client: &Client,
    mut events: mpsc::UnboundedReceiver<UiEvent>,
    slot: &dyn SessionSlot,
) -> Result<()> {
    let mut printed = print_new_entries(client, 0);
    let mut established = client.with_state(|state| state.session.is_established());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let establish_deadline = tokio::time::sleep(config.file.chat.establish_timeout());
    tokio::pin!(establish_deadline);

    loop {
        tokio::select! {
            _ = &mut establish_deadline, if !established => {
                client.disconnect();
                bail!("Timed out waiting for the session to be established");
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    UiEvent::Established(info) => {
                        established = true;
                        eprintln!("Session {} established.", info.session_id);
                        if let Some(date) = info.interview_date {
                            eprintln!("Interview date: {date}");
                        }
                        if let Err(e) = client.with_state(|state| state.session.save_to_slot(slot)) {
                            warn!("Failed to persist session slot: {}", e);
                        }
                        eprintln!("Type /help for commands.");
                    }
                    UiEvent::Reconnected => {
                        established = true;
                        eprintln!("Reconnected. Type /help for commands.");
                    }
                    UiEvent::Transcript => {}
                    UiEvent::Terminated => {
                        // An inbound SessionTerminated leaves the socket open;
                        // a dropped link does not.
                        if client.is_connected() {
                            eprintln!("The session has ended.");
                            client.clear_session(slot).context("Failed to clear session slot")?;
                        } else if let Some(err) = client.connection_error() {
                            eprintln!("{err}. Run `interview resume` to reconnect.");
                        } else {
                            eprintln!("Connection closed. Run `interview resume` to reconnect.");
                        }
                        break;
                    }
                    UiEvent::Debriefing(data) => {
                        println!("{}", render::debrief_report(&data, config.file.chat.raw_debrief));
                    }
                    UiEvent::ToolCall => eprintln!(
                        "The interviewer AI wants to end the interview. /debrief to review, /continue to keep talking."
                    ),
                    UiEvent::ContinueAccepted => eprintln!("Conversation continues."),
                    UiEvent::Rejected(reason) => debug!(%reason, "Message rejected"),
                }
                printed = print_new_entries(client, printed);
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    client.disconnect();
                    break;
                };
                match parse_input(&line) {
                    Input::Empty => {}
                    Input::Help => eprintln!("{HELP}"),
                    Input::Unknown(cmd) => eprintln!("Unknown command: {cmd} (try /help)"),
                    Input::Quit => {
                        client.disconnect();
                        eprintln!("Left the session. Run `interview resume` to come back.");
                        break;
                    }
                    Input::Say(text) => {
                        if send_turn(client, text) {
                            printed = print_new_entries(client, printed);
                        }
                    }
                    Input::Debrief => report(client.send_debriefing_request()),
                    Input::Continue => report(client.send_continue_conversation()),
                    Input::End => report(client.send_end_session()),
                }
            }
        }
    }
    Ok(())
}

/// Send one chat turn if the input gates allow it.
fn send_turn(client: &Client, text: &str) -> bool {
    let (can_send, disabled) = client.with_state(|state| {
        state.conversation.set_input_text(text);
        let gates = (
            state.conversation.can_send_message(),
            state.conversation.is_input_disabled(),
        );
        state.conversation.clear_input_text();
        gates
    });
    if !can_send {
        if disabled {
            eprintln!("The session is not open for input.");
        } else {
            eprintln!("Waiting for the reply...");
        }
        return false;
    }
    match client.send_chat_message(text) {
        Ok(()) => true,
        Err(e) => {
            report::<()>(Err(e));
            false
        }
    }
}

fn report<T>(result: Result<T, ClientError>) {
    if let Err(e) = result {
        eprintln!("Could not send: {e}");
    }
}
