//! In-process session store with JSON file persistence.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;

use super::error::{SessionError, SessionResult};
use super::persist;
use super::types::{Message, Metadata, Role, Session, SessionSummary};
use crate::util::write_atomic;

/// Keyed collection of conversation sessions.
///
/// All operations take `&self`; a single read-write lock guards the map, so a
/// store can be shared behind an `Arc` by concurrent request handlers.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create an empty session, generating an id when none is given.
    ///
    /// A caller-supplied id that already exists is rejected with
    /// [`SessionError::AlreadyExists`]; use [`open_session`](Self::open_session)
    /// for "reuse if present" semantics.
    pub fn create_session(&self, session_id: Option<&str>) -> SessionResult<String> {
        self.create_session_with_metadata(session_id, None)
    }

    pub fn create_session_with_metadata(
        &self,
        session_id: Option<&str>,
        metadata: Option<Metadata>,
    ) -> SessionResult<String> {
        let mut sessions = self.sessions.write();
        let id = match session_id {
            Some(id) => {
                let id = validate_id(id)?;
                if sessions.contains_key(id) {
                    return Err(SessionError::AlreadyExists(id.to_string()));
                }
                id.to_string()
            }
            None => generate_id(&sessions),
        };

        sessions.insert(id.clone(), Session::new(id.clone(), metadata));
        tracing::info!(session_id = %id, "Created conversation session");
        Ok(id)
    }

    /// Return the existing session with `session_id`, creating it if absent.
    ///
    /// The boolean is `true` when a new session was created.
    pub fn open_session(
        &self,
        session_id: &str,
        metadata: Option<Metadata>,
    ) -> SessionResult<(String, bool)> {
        let id = validate_id(session_id)?;
        let mut sessions = self.sessions.write();
        if sessions.contains_key(id) {
            return Ok((id.to_string(), false));
        }
        sessions.insert(id.to_string(), Session::new(id.to_string(), metadata));
        tracing::info!(session_id = %id, "Created conversation session");
        Ok((id.to_string(), true))
    }

    /// Append a message to an existing session.
    ///
    /// `role` must be exactly `"user"` or `"assistant"` and `content` must not
    /// be blank; anything else is an [`SessionError::InvalidArgument`] and
    /// leaves the session untouched.
    pub fn append_message(
        &self,
        session_id: &str,
        role: impl AsRef<str>,
        content: impl Into<String>,
        metadata: Option<Metadata>,
    ) -> SessionResult<()> {
        let role: Role = role.as_ref().parse()?;
        let content = content.into();
        if content.trim().is_empty() {
            return Err(SessionError::InvalidArgument(
                "message content must not be empty".to_string(),
            ));
        }
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        session.push(role, content, metadata);
        tracing::debug!(
            session_id,
            role = role.as_str(),
            messages = session.messages.len(),
            "Appended message"
        );
        Ok(())
    }

    /// Copy of the session transcript; empty when the session does not exist.
    pub fn get_history(&self, session_id: &str) -> Vec<Message> {
        self.sessions
            .read()
            .get(session_id)
            .map(|session| session.messages.clone())
            .unwrap_or_default()
    }

    /// The last `limit` messages of a session, oldest first.
    pub fn recent_history(&self, session_id: &str, limit: usize) -> Vec<Message> {
        let sessions = self.sessions.read();
        let Some(session) = sessions.get(session_id) else {
            return Vec::new();
        };
        let start = session.messages.len().saturating_sub(limit);
        session.messages[start..].to_vec()
    }

    pub fn get_session(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().get(session_id).cloned()
    }

    /// All session ids, sorted.
    pub fn list_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// One row per session, most recently updated first.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut rows: Vec<SessionSummary> =
            self.sessions.read().values().map(Session::summary).collect();
        rows.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        rows
    }

    /// Remove a session. Returns whether anything was removed.
    pub fn delete_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id).is_some();
        if removed {
            tracing::info!(session_id, "Deleted conversation session");
        }
        removed
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Write every session to `path` as one JSON document.
    ///
    /// The file is replaced atomically; a failed save leaves both the store
    /// and any previous file unchanged.
    pub async fn save(&self, path: impl AsRef<Path>) -> SessionResult<()> {
        let path = path.as_ref();
        let (document, count) = {
            let sessions = self.sessions.read();
            let document = persist::encode(&sessions)
                .map_err(|e| SessionError::io(path, std::io::Error::other(e)))?;
            (document, sessions.len())
        };

        write_atomic(path, document.as_bytes())
            .await
            .map_err(|e| SessionError::io(path, e))?;

        tracing::info!(path = %path.display(), sessions = count, "Saved sessions");
        Ok(())
    }

    /// Replace the whole store with the sessions stored at `path`.
    ///
    /// Nothing in memory changes unless the entire document is valid.
    pub async fn load(&self, path: impl AsRef<Path>) -> SessionResult<()> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SessionError::io(path, e))?;
        let loaded = persist::decode(&contents).map_err(|source| SessionError::Format {
            path: path.to_path_buf(),
            source,
        })?;

        let count = loaded.len();
        *self.sessions.write() = loaded;
        tracing::info!(path = %path.display(), sessions = count, "Loaded sessions");
        Ok(())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_id(session_id: &str) -> SessionResult<&str> {
    if session_id.trim().is_empty() {
        return Err(SessionError::InvalidArgument(
            "session id must not be empty".to_string(),
        ));
    }
    Ok(session_id)
}

/// `session_<unix seconds>_<8 hex>`, retried until unused in this store.
fn generate_id(existing: &HashMap<String, Session>) -> String {
    loop {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let candidate = format!("session_{}_{}", Utc::now().timestamp(), &suffix[..8]);
        if !existing.contains_key(&candidate) {
            return candidate;
        }
    }
}
