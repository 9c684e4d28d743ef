//! # Interview Session
//!
//! Client-side session layer for the interview simulation chat server.
//!
//! ## Overview
//!
//! A participant (interviewer, patient, or observer) registers over REST,
//! then holds one WebSocket per identity while the server relays turns
//! between humans and AI roles. This crate provides:
//! - The wire protocol (`msg_type`-tagged JSON frames)
//! - A session identity store with a durable resume slot
//! - A conversation store with the per-turn input lock
//! - [`ProtocolClient`], which owns the connection and drives both stores
//! - [`ApiClient`] for the REST endpoints (patients, registration, restore, logs)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use interview_session::{Endpoint, ProtocolClient, WsConnector};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = Endpoint::from_origin("http://127.0.0.1:8889")?;
//! let client = ProtocolClient::new(WsConnector, endpoint, ());
//! client.connect("user-id-from-registration", false).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod conversation;
pub mod error;
pub mod events;
pub mod protocol;
pub mod session_store;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use api::{
    ApiClient, ApiError, ChatLog, RegistrationRequest, RegistrationResponse, SessionLog,
    SessionRestoreResponse,
};
pub use client::{ClientState, ConnectionStatus, ProtocolClient};
pub use conversation::{ConversationStore, TurnState};
pub use error::{ClientError, ProtocolError, TransportError};
pub use events::{EstablishedInfo, SessionEvents};
pub use protocol::{InboundMessage, OutboundMessage};
pub use session_store::{FileSlot, MemorySlot, SessionSlot, SessionStore};
pub use transport::{Connector, Endpoint, Frame, WsConnector};
pub use types::*;
