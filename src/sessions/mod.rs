//! Session management: conversation transcripts keyed by session id, with
//! whole-store JSON persistence.

pub mod commands;
pub mod error;
pub mod persist;
pub mod store;
pub(crate) mod timestamp;
pub mod types;

pub use error::{DocumentError, SessionError, SessionResult};
pub use store::SessionStore;
pub use types::{Message, Metadata, Role, Session, SessionSummary};

use std::path::Path;

/// Build a store, pre-populated from `path` when that file exists.
pub async fn open_session_store(path: &Path) -> SessionResult<SessionStore> {
    let store = SessionStore::new();
    if tokio::fs::try_exists(path)
        .await
        .map_err(|e| SessionError::io(path, e))?
    {
        store.load(path).await?;
    } else {
        tracing::debug!(path = %path.display(), "No sessions file yet; starting empty");
    }
    Ok(store)
}
