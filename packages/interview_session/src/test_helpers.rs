//! Shared fixtures for unit tests: an in-memory connector and a recording
//! event sink.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures::{SinkExt, StreamExt};
use serde_json::Value;

use crate::error::TransportError;
use crate::events::{EstablishedInfo, SessionEvents};
use crate::protocol::InboundMessage;
use crate::transport::{Connector, Frame, FrameSink, FrameStream};
use crate::types::{User, UserRole, UserStatus};

pub fn test_user(role: UserRole) -> User {
    User {
        user_id: "user-1".to_string(),
        user_name: "Tester".to_string(),
        role,
        status: UserStatus::Registered,
        target_patient_id: None,
        session_id: None,
    }
}

/// The server end of one in-memory connection.
pub struct ServerSide {
    to_client: UnboundedSender<Result<Frame, TransportError>>,
    from_client: UnboundedReceiver<String>,
}

impl ServerSide {
    pub fn send(&self, frame: Value) {
        self.send_raw(&frame.to_string());
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.to_client.unbounded_send(Ok(Frame::Text(text.to_string())));
    }

    pub fn close(&self) {
        let _ = self.to_client.unbounded_send(Ok(Frame::Close));
    }

    pub fn fail(&self) {
        let _ = self
            .to_client
            .unbounded_send(Err(TransportError::Other("connection reset".to_string())));
    }

    /// Next frame the client wrote, or `None` once the client side closed.
    pub async fn recv(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(2), self.from_client.next())
            .await
            .unwrap_or(None)
    }
}

#[derive(Default)]
struct ConnectorInner {
    urls: Vec<String>,
    servers: VecDeque<ServerSide>,
    fail_next: bool,
}

#[derive(Clone, Default)]
pub struct ChannelConnector {
    inner: Arc<Mutex<ConnectorInner>>,
}

impl ChannelConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self) {
        self.inner.lock().unwrap().fail_next = true;
    }

    pub fn urls(&self) -> Vec<String> {
        self.inner.lock().unwrap().urls.clone()
    }

    /// Server end of the oldest connection not yet taken.
    pub fn take_server(&self) -> ServerSide {
        self.inner
            .lock()
            .unwrap()
            .servers
            .pop_front()
            .expect("no pending connection")
    }
}

impl Connector for ChannelConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.urls.push(url.to_string());
        if std::mem::take(&mut inner.fail_next) {
            return Err(TransportError::Other("connection refused".to_string()));
        }

        let (to_client, client_rx) = unbounded();
        let (client_tx, from_client) = unbounded::<String>();
        inner.servers.push_back(ServerSide {
            to_client,
            from_client,
        });

        let sink: FrameSink = Box::pin(client_tx.sink_map_err(|_| TransportError::Closed));
        let stream: FrameStream = Box::pin(client_rx);
        Ok((sink, stream))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Message(String),
    Reconnected,
    Established(EstablishedInfo),
    Terminated,
    Debriefing(Value),
    ToolCall,
    ContinueAccepted,
    Rejected(String),
}

#[derive(Default)]
pub struct RecordingEvents {
    log: Mutex<Vec<Recorded>>,
}

impl RecordingEvents {
    pub fn recorded(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    fn push(&self, event: Recorded) {
        self.log.lock().unwrap().push(event);
    }
}

impl SessionEvents for RecordingEvents {
    fn on_message(&self, message: &InboundMessage) {
        self.push(Recorded::Message(message.kind().to_string()));
    }

    fn on_reconnected(&self) {
        self.push(Recorded::Reconnected);
    }

    fn on_established(&self, info: &EstablishedInfo) {
        self.push(Recorded::Established(info.clone()));
    }

    fn on_session_terminated(&self) {
        self.push(Recorded::Terminated);
    }

    fn on_debriefing_response(&self, data: &Value) {
        self.push(Recorded::Debriefing(data.clone()));
    }

    fn on_tool_call_detected(&self) {
        self.push(Recorded::ToolCall);
    }

    fn on_conversation_continue_accepted(&self) {
        self.push(Recorded::ContinueAccepted);
    }

    fn on_message_rejected(&self, reason: &str) {
        self.push(Recorded::Rejected(reason.to_string()));
    }
}

/// Poll `cond` until it holds, failing the test after two seconds.
pub async fn eventually(cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Give spawned tasks a chance to drain whatever is queued.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
