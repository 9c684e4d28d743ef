//! Session identity store
//!
//! Holds who the local participant is, which server session they belong to,
//! and whether the connection is currently open. The socket itself is owned
//! by [`crate::ProtocolClient`]; this store only sees the connected flag.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::types::{SessionInfo, User, UserRole, UserStatus};

/// Durable key-value slot holding one serialized [`SessionInfo`].
pub trait SessionSlot: Send + Sync {
    fn read(&self) -> Option<String>;
    fn write(&self, value: &str) -> io::Result<()>;
    fn remove(&self) -> io::Result<()>;
}

/// Slot backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionSlot for FileSlot {
    fn read(&self) -> Option<String> {
        std::fs::read_to_string(&self.path).ok()
    }

    fn write(&self, value: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Readers never observe a partially written slot.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &self.path)
    }

    fn remove(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// In-process slot, used by tests and by callers that do not persist.
#[derive(Debug, Default)]
pub struct MemorySlot {
    value: Mutex<Option<String>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionSlot for MemorySlot {
    fn read(&self) -> Option<String> {
        self.value
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn write(&self, value: &str) -> io::Result<()> {
        *self.value.lock().unwrap_or_else(|e| e.into_inner()) = Some(value.to_string());
        Ok(())
    }

    fn remove(&self) -> io::Result<()> {
        *self.value.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStore {
    user: Option<User>,
    session_id: Option<String>,
    connected: bool,
    /// Waiting for the server to establish the session.
    loading: bool,
    interview_date: Option<String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_user(&mut self, user: User) {
        if let Some(session_id) = &user.session_id {
            self.session_id = Some(session_id.clone());
        }
        self.user = Some(user);
    }

    /// No-op when no identity is set.
    pub fn update_user_status(&mut self, status: UserStatus) {
        if let Some(user) = self.user.as_mut() {
            user.status = status;
        }
    }

    pub fn set_session_id(&mut self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        if let Some(user) = self.user.as_mut() {
            user.session_id = Some(session_id.clone());
        }
        self.session_id = Some(session_id);
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn set_interview_date(&mut self, date: impl Into<String>) {
        self.interview_date = Some(date.into());
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Established by the server and currently connected.
    pub fn is_established(&self) -> bool {
        self.connected
            && self
                .user
                .as_ref()
                .is_some_and(|u| u.status == UserStatus::Established)
    }

    pub fn role(&self) -> Option<UserRole> {
        self.user.as_ref().map(|u| u.role)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.user_id.as_str())
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.user_name.as_str())
    }

    pub fn target_patient_id(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.target_patient_id.as_deref())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn interview_date(&self) -> Option<&str> {
        self.interview_date.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Both ids, if the session is far enough along to send intents.
    pub fn session_info(&self) -> Option<SessionInfo> {
        match (self.session_id(), self.user_id()) {
            (Some(session_id), Some(user_id)) if !session_id.is_empty() && !user_id.is_empty() => {
                Some(SessionInfo {
                    session_id: session_id.to_string(),
                    user_id: user_id.to_string(),
                })
            }
            _ => None,
        }
    }

    /// Persist `{sessionId, userId}`. Does nothing until both are known.
    pub fn save_to_slot(&self, slot: &dyn SessionSlot) -> io::Result<()> {
        let Some(info) = self.session_info() else {
            debug!("No session to persist yet");
            return Ok(());
        };
        let json = serde_json::to_string(&info).map_err(io::Error::other)?;
        slot.write(&json)
    }

    /// Read back a persisted session. Absent or corrupt data yields `None`.
    pub fn load_from_slot(slot: &dyn SessionSlot) -> Option<SessionInfo> {
        let stored = slot.read()?;
        match serde_json::from_str(&stored) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Ignoring corrupt session slot: {}", e);
                None
            }
        }
    }

    /// Reset every field and drop the durable slot.
    pub fn clear_session(&mut self, slot: &dyn SessionSlot) -> io::Result<()> {
        self.reset();
        slot.remove()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::test_user;

    #[test]
    fn established_needs_status_and_connection() {
        let mut store = SessionStore::new();
        assert!(!store.is_established());

        store.set_user(test_user(UserRole::Interviewer));
        store.update_user_status(UserStatus::Established);
        assert!(!store.is_established());

        store.set_connected(true);
        assert!(store.is_established());

        store.update_user_status(UserStatus::Waiting);
        assert!(!store.is_established());
    }

    #[test]
    fn update_status_without_user_is_noop() {
        let mut store = SessionStore::new();
        store.update_user_status(UserStatus::Established);
        assert!(store.user().is_none());
    }

    #[test]
    fn set_session_id_mirrors_onto_user() {
        let mut store = SessionStore::new();
        store.set_user(test_user(UserRole::Patient));
        store.set_session_id("S-1");
        assert_eq!(store.session_id(), Some("S-1"));
        assert_eq!(store.user().unwrap().session_id.as_deref(), Some("S-1"));
    }

    #[test]
    fn derived_queries() {
        let mut store = SessionStore::new();
        assert_eq!(store.role(), None);
        assert_eq!(store.user_id(), None);

        let mut user = test_user(UserRole::Observer);
        user.target_patient_id = Some("7".to_string());
        store.set_user(user);
        assert_eq!(store.role(), Some(UserRole::Observer));
        assert_eq!(store.user_id(), Some("user-1"));
        assert_eq!(store.user_name(), Some("Tester"));
        assert_eq!(store.target_patient_id(), Some("7"));
    }

    #[test]
    fn slot_round_trip_and_clear() {
        let slot = MemorySlot::new();
        let mut store = SessionStore::new();

        // Nothing to save before a session id exists.
        store.set_user(test_user(UserRole::Interviewer));
        store.save_to_slot(&slot).unwrap();
        assert!(slot.read().is_none());

        store.set_session_id("S-9");
        store.save_to_slot(&slot).unwrap();
        let info = SessionStore::load_from_slot(&slot).unwrap();
        assert_eq!(info.session_id, "S-9");
        assert_eq!(info.user_id, "user-1");

        store.set_connected(true);
        store.set_interview_date("2024-04-01");
        store.clear_session(&slot).unwrap();
        assert!(store.user().is_none());
        assert!(store.session_id().is_none());
        assert!(store.interview_date().is_none());
        assert!(!store.is_connected());
        assert!(SessionStore::load_from_slot(&slot).is_none());
    }

    #[test]
    fn corrupt_slot_loads_as_none() {
        let slot = MemorySlot::new();
        slot.write("{not json").unwrap();
        assert!(SessionStore::load_from_slot(&slot).is_none());
        slot.write(r#"{"sessionId":"S"}"#).unwrap();
        assert!(SessionStore::load_from_slot(&slot).is_none());
    }

    #[test]
    fn file_slot_persists_across_instances() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state/active_session.json");

        let mut store = SessionStore::new();
        store.set_user(test_user(UserRole::Interviewer));
        store.set_session_id("S-2");
        store.save_to_slot(&FileSlot::new(&path)).unwrap();
        assert!(path.exists());

        let info = SessionStore::load_from_slot(&FileSlot::new(&path)).unwrap();
        assert_eq!(info.session_id, "S-2");

        let slot = FileSlot::new(&path);
        store.clear_session(&slot).unwrap();
        assert!(!path.exists());
        // Removing an absent slot is fine.
        slot.remove().unwrap();
        assert!(SessionStore::load_from_slot(&slot).is_none());
    }
}
