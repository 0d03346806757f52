//! JSON document codec for the whole session store.
//!
//! The document is an object keyed by session id whose values are the full
//! [`Session`] records. Keys are written in sorted order so repeated saves of
//! the same state produce identical files.

use std::collections::{BTreeMap, HashMap};

use super::error::DocumentError;
use super::types::Session;

/// Render the store contents as a pretty-printed JSON document.
pub fn encode(sessions: &HashMap<String, Session>) -> Result<String, serde_json::Error> {
    let ordered: BTreeMap<&str, &Session> = sessions
        .iter()
        .map(|(id, session)| (id.as_str(), session))
        .collect();
    serde_json::to_string_pretty(&ordered)
}

/// Parse and validate a session document.
///
/// Either every entry is accepted or the whole document is rejected.
pub fn decode(contents: &str) -> Result<HashMap<String, Session>, DocumentError> {
    let raw: HashMap<String, Session> = serde_json::from_str(contents)?;
    for (key, session) in &raw {
        if key.trim().is_empty() {
            return Err(DocumentError::EmptyId);
        }
        if *key != session.session_id {
            return Err(DocumentError::IdMismatch {
                key: key.clone(),
                inner: session.session_id.clone(),
            });
        }
        if session.updated_at < session.created_at {
            return Err(DocumentError::UpdatedBeforeCreated(key.clone()));
        }
        if !messages_in_order(session) {
            return Err(DocumentError::MessagesOutOfOrder(key.clone()));
        }
    }
    Ok(raw)
}

/// Message timestamps are non-decreasing and lie within `created_at..=updated_at`.
fn messages_in_order(session: &Session) -> bool {
    let stamps = || session.messages.iter().map(|m| m.timestamp);
    stamps().min().map_or(true, |first| first >= session.created_at)
        && stamps().max().map_or(true, |last| last <= session.updated_at)
        && session
            .messages
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
}
