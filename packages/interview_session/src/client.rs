//! Session protocol client
//!
//! Owns the one live connection per identity, turns inbound frames into
//! store mutations plus [`SessionEvents`] hooks, and exposes the outbound
//! intents. Frames are dispatched one at a time in arrival order on the
//! connection's reader task; outbound frames are queued to a writer task in
//! call order.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::SessionRestoreResponse;
use crate::conversation::ConversationStore;
use crate::error::{ClientError, TransportError};
use crate::events::{EstablishedInfo, SessionEvents};
use crate::protocol::{InboundMessage, OutboundMessage, decode_frame, encode_frame, normalize_text};
use crate::session_store::{SessionSlot, SessionStore};
use crate::transport::{Connector, Endpoint, Frame, FrameSink, FrameStream};
use crate::types::{SessionInfo, User, UserRole, UserStatus};

/// User-facing text recorded when the transport fails.
pub const CONNECTION_ERROR_TEXT: &str = "WebSocket connection error";

/// Reason reported to `on_message_rejected` when the server gives none.
pub const UNKNOWN_REJECTION_REASON: &str = "Unknown error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close,
}

#[derive(Debug)]
struct ActiveConnection {
    generation: u64,
    outbound: mpsc::UnboundedSender<Outgoing>,
    reader: JoinHandle<()>,
}

impl ActiveConnection {
    /// Queue a close for the writer and stop reading immediately.
    fn close(self) {
        let _ = self.outbound.send(Outgoing::Close);
        self.reader.abort();
    }
}

/// Everything the client tracks, behind one lock.
#[derive(Debug, Default)]
pub struct ClientState {
    pub session: SessionStore,
    pub conversation: ConversationStore,
    connecting: bool,
    connection_error: Option<String>,
    connection: Option<ActiveConnection>,
}

impl ClientState {
    pub fn is_connecting(&self) -> bool {
        self.connecting
    }

    pub fn connection_error(&self) -> Option<&str> {
        self.connection_error.as_deref()
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.generation == generation)
    }

    /// Outbound queue of the live connection, if it reports open.
    fn open_outbound(&self) -> Option<mpsc::UnboundedSender<Outgoing>> {
        match &self.connection {
            Some(conn) if self.session.is_connected() && !conn.outbound.is_closed() => {
                Some(conn.outbound.clone())
            }
            _ => None,
        }
    }
}

struct Shared<E> {
    state: Mutex<ClientState>,
    events: E,
    next_generation: AtomicU64,
}

impl<E: SessionEvents> Shared<E> {
    fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dispatch(&self, generation: u64, text: &str) {
        let message = match decode_frame(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping inbound frame: {}", e);
                return;
            }
        };
        debug!(msg_type = message.kind(), "WS received");

        if message == InboundMessage::Unknown {
            debug!("Ignoring unrecognized msg_type");
            return;
        }

        {
            let mut state = self.lock();
            if !state.is_current(generation) {
                debug!("Dropping frame from superseded connection");
                return;
            }
            apply_inbound(&mut state, &message);
        }

        notify(&self.events, &message);
    }

    fn handle_transport_error(&self, generation: u64, err: &TransportError) {
        let mut state = self.lock();
        if !state.is_current(generation) {
            return;
        }
        warn!("WebSocket error: {}", err);
        state.connecting = false;
        state.connection_error = Some(CONNECTION_ERROR_TEXT.to_string());
        state.session.set_connected(false);
        state.session.set_loading(false);
    }

    fn handle_closed(&self, generation: u64) {
        {
            let mut state = self.lock();
            if !state.is_current(generation) {
                return;
            }
            // Dropping the handle closes the writer queue.
            state.connection = None;
            state.connecting = false;
            state.session.set_connected(false);
            state.conversation.set_input_disabled(true);
        }
        info!("WebSocket closed");
        self.events.on_session_terminated();
    }
}

/// Apply one decoded inbound frame to the stores.
pub(crate) fn apply_inbound(state: &mut ClientState, message: &InboundMessage) {
    match message {
        InboundMessage::Established {
            session_id,
            interview_date,
        } => {
            state.session.set_session_id(session_id.as_str());
            state.session.update_user_status(UserStatus::Established);
            if let Some(date) = interview_date {
                state.session.set_interview_date(date.as_str());
            }
            state.session.set_loading(false);
            state.conversation.set_input_disabled(false);
        }
        InboundMessage::MessageForwarded { user_msg, ai_role } => {
            if user_msg.is_object() || user_msg.is_array() {
                warn!("Received non-string message body, stringifying");
            }
            let body = normalize_text(user_msg);
            if !body.is_empty() {
                let role = state.session.role();
                match (role, ai_role) {
                    (Some(UserRole::Observer), Some(ai_role)) => {
                        match UserRole::from_wire(ai_role) {
                            Some(UserRole::Interviewer) => {
                                state.conversation.add_nurse_ai_message(body);
                            }
                            Some(UserRole::Patient) => {
                                state.conversation.add_patient_ai_message(body);
                            }
                            _ => debug!(ai_role = %ai_role, "No observer lane for AI role"),
                        }
                    }
                    _ => state.conversation.add_counterpart_message(body, role),
                }
            }
            state.conversation.resolve_turn();
        }
        InboundMessage::ConversationContinueAccepted => {
            state.conversation.resolve_turn();
        }
        InboundMessage::MessageRejected { reason } => {
            let reason = normalize_text(reason);
            if !reason.is_empty() {
                state
                    .conversation
                    .add_system_message(format!("System error: {reason}"));
            }
            state.conversation.resolve_turn();
        }
        InboundMessage::SessionTerminated => {
            state.conversation.set_input_disabled(true);
        }
        InboundMessage::DebriefingResponse { .. }
        | InboundMessage::ToolCallDetected
        | InboundMessage::Unknown => {}
    }
}

fn notify<E: SessionEvents>(events: &E, message: &InboundMessage) {
    match message {
        InboundMessage::Established {
            session_id,
            interview_date,
        } => events.on_established(&EstablishedInfo {
            session_id: session_id.clone(),
            interview_date: interview_date.clone(),
        }),
        InboundMessage::MessageForwarded { .. } => {}
        InboundMessage::SessionTerminated => events.on_session_terminated(),
        InboundMessage::DebriefingResponse { debriefing_data } => {
            events.on_debriefing_response(debriefing_data)
        }
        InboundMessage::ToolCallDetected => events.on_tool_call_detected(),
        InboundMessage::ConversationContinueAccepted => {
            events.on_conversation_continue_accepted()
        }
        InboundMessage::MessageRejected { reason } => {
            let reason = normalize_text(reason);
            events.on_message_rejected(if reason.is_empty() {
                UNKNOWN_REJECTION_REASON
            } else {
                &reason
            })
        }
        InboundMessage::Unknown => return,
    }
    events.on_message(message);
}

async fn read_loop<E: SessionEvents>(
    shared: Arc<Shared<E>>,
    generation: u64,
    mut stream: FrameStream,
    installed: oneshot::Receiver<()>,
) {
    // Frames are not dispatched until the connection is the current one.
    if installed.await.is_err() {
        return;
    }
    while let Some(item) = stream.next().await {
        match item {
            Ok(Frame::Text(text)) => shared.dispatch(generation, &text),
            Ok(Frame::Close) => {
                debug!("Close frame received");
                break;
            }
            Err(e) => {
                shared.handle_transport_error(generation, &e);
                break;
            }
        }
    }
    shared.handle_closed(generation);
}

async fn write_loop(mut sink: FrameSink, mut outbound: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outgoing::Text(text) => {
                if let Err(e) = sink.send(text).await {
                    warn!("Failed to send frame: {}", e);
                    break;
                }
            }
            Outgoing::Close => break,
        }
    }
    if let Err(e) = sink.close().await {
        debug!("Error closing connection: {}", e);
    }
}

/// Client for one participant's session.
pub struct ProtocolClient<C, E> {
    connector: C,
    endpoint: Endpoint,
    shared: Arc<Shared<E>>,
}

impl<C: Connector, E: SessionEvents> ProtocolClient<C, E> {
    pub fn new(connector: C, endpoint: Endpoint, events: E) -> Self {
        Self {
            connector,
            endpoint,
            shared: Arc::new(Shared {
                state: Mutex::new(ClientState::default()),
                events,
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn events(&self) -> &E {
        &self.shared.events
    }

    /// Lock the client state.
    ///
    /// Every other method on the client takes the same lock, so the guard
    /// must be dropped before calling any of them (including as a temporary
    /// in the same expression) and must not be held across an `.await`.
    /// Prefer [`ProtocolClient::with_state`].
    pub fn state(&self) -> MutexGuard<'_, ClientState> {
        self.shared.lock()
    }

    /// Run `f` with the state locked. The lock is released when `f` returns,
    /// so `f` itself must not call back into the client.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut ClientState) -> R) -> R {
        f(&mut self.shared.lock())
    }

    pub fn set_user(&self, user: User) {
        self.shared.lock().session.set_user(user);
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().session.is_connected()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        let state = self.shared.lock();
        if state.connecting {
            ConnectionStatus::Connecting
        } else if state.session.is_connected() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    pub fn connection_error(&self) -> Option<String> {
        self.shared.lock().connection_error.clone()
    }

    /// Open the connection for `user_id`, retiring any previous one first.
    ///
    /// Resolves once the transport is open. With `is_reconnection` the
    /// server session is assumed to exist already: the loading indicator is
    /// cleared right away and [`SessionEvents::on_reconnected`] fires.
    pub async fn connect(&self, user_id: &str, is_reconnection: bool) -> Result<(), ClientError> {
        if user_id.is_empty() {
            return Err(ClientError::EmptyUserId);
        }

        {
            let mut state = self.shared.lock();
            if let Some(previous) = state.connection.take() {
                debug!("Closing previous connection");
                previous.close();
            }
            state.session.set_connected(false);
            state.session.set_loading(true);
            state.connecting = true;
            state.connection_error = None;
        }

        let url = self.endpoint.ws_url(user_id);
        info!("Connecting to {}", url);

        let (sink, stream) = match self.connector.connect(&url).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("WebSocket connection failed: {}", e);
                let mut state = self.shared.lock();
                state.connecting = false;
                state.connection_error = Some(CONNECTION_ERROR_TEXT.to_string());
                state.session.set_connected(false);
                state.session.set_loading(false);
                return Err(ClientError::ConnectFailed(e));
            }
        };

        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (installed_tx, installed_rx) = oneshot::channel();
        tokio::spawn(write_loop(sink, outbound_rx));
        let reader = tokio::spawn(read_loop(
            Arc::clone(&self.shared),
            generation,
            stream,
            installed_rx,
        ));

        {
            let mut state = self.shared.lock();
            let active = ActiveConnection {
                generation,
                outbound: outbound_tx,
                reader,
            };
            // A concurrent connect may have installed its own link meanwhile.
            if let Some(displaced) = state.connection.replace(active) {
                displaced.close();
            }
            state.connecting = false;
            state.session.set_connected(true);
            if is_reconnection {
                state.session.set_loading(false);
            }
        }
        let _ = installed_tx.send(());
        info!(generation, is_reconnection, "WebSocket open");

        if is_reconnection {
            self.shared.events.on_reconnected();
        }
        Ok(())
    }

    /// Close the live connection, if any. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let previous = {
            let mut state = self.shared.lock();
            state.connecting = false;
            state.session.set_connected(false);
            state.conversation.set_input_disabled(true);
            state.connection.take()
        };
        if let Some(conn) = previous {
            info!("Disconnecting");
            conn.close();
            self.shared.events.on_session_terminated();
        }
    }

    /// Serialize and queue any outbound frame. Requires an open connection.
    pub fn send_message(&self, message: &OutboundMessage) -> Result<(), ClientError> {
        let frame = encode_frame(message)?;
        let outbound = self
            .shared
            .lock()
            .open_outbound()
            .ok_or(ClientError::NotConnected)?;
        outbound
            .send(Outgoing::Text(frame))
            .map_err(|_| ClientError::NotConnected)?;
        debug!(msg_type = message.kind(), "WS sent");
        Ok(())
    }

    /// Submit one chat turn.
    ///
    /// The turn is appended to the transcript and the input locked before
    /// the frame is queued, so the caller sees its own message at once.
    pub fn send_chat_message(&self, text: &str) -> Result<(), ClientError> {
        let mut state = self.shared.lock();
        let SessionInfo {
            session_id,
            user_id,
        } = state
            .session
            .session_info()
            .ok_or(ClientError::SessionNotEstablished)?;
        let outbound = state.open_outbound().ok_or(ClientError::NotConnected)?;
        let message = OutboundMessage::MessageSubmitted {
            session_id,
            user_id,
            user_msg: text.to_string(),
        };
        let frame = encode_frame(&message)?;

        let role = state.session.role();
        state.conversation.begin_turn();
        state.conversation.add_user_message(text, role);
        drop(state);

        outbound
            .send(Outgoing::Text(frame))
            .map_err(|_| ClientError::NotConnected)?;
        debug!(msg_type = message.kind(), "WS sent");
        Ok(())
    }

    pub fn send_debriefing_request(&self) -> Result<(), ClientError> {
        self.send_intent(|session_id, user_id| OutboundMessage::DebriefingRequest {
            session_id,
            user_id,
        })
    }

    pub fn send_continue_conversation(&self) -> Result<(), ClientError> {
        self.send_intent(
            |session_id, user_id| OutboundMessage::ContinueConversationRequest {
                session_id,
                user_id,
            },
        )
    }

    pub fn send_end_session(&self) -> Result<(), ClientError> {
        self.send_intent(|session_id, user_id| OutboundMessage::EndSessionRequest {
            session_id,
            user_id,
        })
    }

    fn send_intent(
        &self,
        build: impl FnOnce(String, String) -> OutboundMessage,
    ) -> Result<(), ClientError> {
        let info = self
            .shared
            .lock()
            .session
            .session_info()
            .ok_or(ClientError::SessionNotEstablished)?;
        self.send_message(&build(info.session_id, info.user_id))
    }

    /// Pick up a session the server already holds: seed identity and
    /// transcript from the restore payload, then reconnect.
    pub async fn resume(&self, restore: SessionRestoreResponse) -> Result<(), ClientError> {
        let user_id = restore.user_id.clone();
        {
            let mut state = self.shared.lock();
            state.session.set_user(User {
                user_id: restore.user_id,
                user_name: restore.user_name,
                role: restore.user_role,
                status: UserStatus::Established,
                target_patient_id: restore.patient_id,
                session_id: Some(restore.session_id.clone()),
            });
            state.session.set_session_id(restore.session_id);
            if let Some(date) = restore.interview_date.filter(|d| !d.is_empty()) {
                state.session.set_interview_date(date);
            }
            state.conversation.restore_messages(restore.chat_history);
        }

        self.connect(&user_id, true).await?;

        let mut state = self.shared.lock();
        state.conversation.resolve_turn();
        state.conversation.set_input_disabled(false);
        Ok(())
    }

    /// Drop the connection, both stores, and the durable slot.
    pub fn clear_session(&self, slot: &dyn SessionSlot) -> io::Result<()> {
        self.disconnect();
        let mut state = self.shared.lock();
        state.conversation.reset();
        state.connection_error = None;
        state.session.clear_session(slot)
    }
}
